//! Run-wide counters and side-channel lists.
//!
//! Every shared collection sits behind its own lock so recording a failure
//! never contends with a worker bumping the totals.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::Mutex;

use registerscout_shared::{DiscoverySource, IssueKind, Official, OfficialId};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal state of one official's attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// A register document was stored in this run.
    Stored { url: String, source: DiscoverySource },
    /// Every strategy was exhausted without a confirmed match.
    Unmatched,
    /// A document was already stored before this run started.
    AlreadyStored,
    /// Attribution raised an error that was not a per-candidate failure.
    Failed { reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored { .. } => "stored",
            Self::Unmatched => "unmatched",
            Self::AlreadyStored => "already_stored",
            Self::Failed { .. } => "failed",
        }
    }

    /// True when the official ends the run with a stored document.
    pub fn has_register(&self) -> bool {
        matches!(self, Self::Stored { .. } | Self::AlreadyStored)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub processed: u64,
    pub stored: u64,
    pub already_stored: u64,
    pub missing: u64,
    pub register_fetch_error: u64,
    pub search_error: u64,
    pub profile_fetch_error: u64,
    pub failed: u64,
}

/// A PDF found while looking for an official's register but never confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualReviewPdf {
    pub official_id: OfficialId,
    pub name: String,
    pub council: String,
    pub pdf_url: String,
    /// Page the link was found on, if any.
    pub found_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub official_id: OfficialId,
    pub name: String,
    pub council: String,
    pub issue_kind: String,
    pub detail: String,
}

/// Snapshot of everything recorded during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub totals: RunTotals,
    pub outcomes: BTreeMap<OfficialId, Outcome>,
    pub missing: Vec<Official>,
    pub manual_review: Vec<ManualReviewPdf>,
    pub failures: Vec<FailureRecord>,
}

// ---------------------------------------------------------------------------
// RunLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RunLedger {
    totals: Mutex<RunTotals>,
    outcomes: Mutex<BTreeMap<OfficialId, Outcome>>,
    missing: Mutex<Vec<Official>>,
    manual_review: Mutex<Vec<ManualReviewPdf>>,
    failures: Mutex<Vec<FailureRecord>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a non-fatal issue and keep it for the failures report.
    ///
    /// `missing_register_url` is counted through [`record_outcome`](Self::record_outcome)
    /// instead, so it only lands in the failures list here.
    pub async fn record_issue(&self, official: &Official, kind: IssueKind, detail: &str) {
        {
            let mut totals = self.totals.lock().await;
            match kind {
                IssueKind::SearchError => totals.search_error += 1,
                IssueKind::RegisterFetchError => totals.register_fetch_error += 1,
                IssueKind::ProfileFetchError => totals.profile_fetch_error += 1,
                IssueKind::MissingRegisterUrl => {}
            }
        }

        self.failures.lock().await.push(FailureRecord {
            official_id: official.id,
            name: official.name.clone(),
            council: official.council.clone(),
            issue_kind: kind.as_str().to_string(),
            detail: detail.to_string(),
        });
    }

    pub async fn record_outcome(&self, official: &Official, outcome: Outcome) {
        {
            let mut totals = self.totals.lock().await;
            totals.processed += 1;
            match &outcome {
                Outcome::Stored { .. } => totals.stored += 1,
                Outcome::AlreadyStored => totals.already_stored += 1,
                Outcome::Unmatched => totals.missing += 1,
                Outcome::Failed { .. } => totals.failed += 1,
            }
        }

        if outcome == Outcome::Unmatched {
            self.missing.lock().await.push(official.clone());
        }

        self.outcomes.lock().await.insert(official.id, outcome);
    }

    pub async fn add_manual_review(&self, official: &Official, pdf_url: &str, found_on: Option<&str>) {
        let mut list = self.manual_review.lock().await;
        if list
            .iter()
            .any(|r| r.official_id == official.id && r.pdf_url == pdf_url)
        {
            return;
        }
        list.push(ManualReviewPdf {
            official_id: official.id,
            name: official.name.clone(),
            council: official.council.clone(),
            pdf_url: pdf_url.to_string(),
            found_on: found_on.map(str::to_string),
        });
    }

    pub async fn summary(&self) -> RunSummary {
        RunSummary {
            totals: self.totals.lock().await.clone(),
            outcomes: self.outcomes.lock().await.clone(),
            missing: self.missing.lock().await.clone(),
            manual_review: self.manual_review.lock().await.clone(),
            failures: self.failures.lock().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn official(id: i64) -> Official {
        Official {
            id: OfficialId(id),
            name: format!("Member {id}"),
            council: "Sandshire".into(),
            ward: None,
        }
    }

    #[tokio::test]
    async fn totals_follow_outcomes_and_issues() {
        let ledger = RunLedger::new();
        let a = official(1);
        let b = official(2);

        ledger
            .record_issue(&a, IssueKind::RegisterFetchError, "HTTP 404")
            .await;
        ledger
            .record_outcome(
                &a,
                Outcome::Stored {
                    url: "https://democracy.sandshire.gov.uk/mgRofI.aspx?UID=1".into(),
                    source: DiscoverySource::IndexPage,
                },
            )
            .await;
        ledger
            .record_issue(&b, IssueKind::MissingRegisterUrl, "all strategies exhausted")
            .await;
        ledger.record_outcome(&b, Outcome::Unmatched).await;

        let summary = ledger.summary().await;
        assert_eq!(summary.totals.processed, 2);
        assert_eq!(summary.totals.stored, 1);
        assert_eq!(summary.totals.missing, 1);
        assert_eq!(summary.totals.register_fetch_error, 1);
        assert_eq!(summary.missing, vec![b.clone()]);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.outcomes[&b.id], Outcome::Unmatched);
        assert!(summary.outcomes[&a.id].has_register());
    }

    #[tokio::test]
    async fn manual_review_deduplicates_per_official() {
        let ledger = RunLedger::new();
        let a = official(1);
        ledger.add_manual_review(&a, "https://x.gov.uk/a.pdf", None).await;
        ledger
            .add_manual_review(&a, "https://x.gov.uk/a.pdf", Some("https://x.gov.uk/"))
            .await;
        ledger
            .add_manual_review(&official(2), "https://x.gov.uk/a.pdf", None)
            .await;
        assert_eq!(ledger.summary().await.manual_review.len(), 2);
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(Outcome::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
