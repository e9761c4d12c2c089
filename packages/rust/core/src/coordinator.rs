//! Bounded worker pool over the official list.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use registerscout_shared::{Official, Result, RunConfig};

use crate::ledger::{Outcome, RunSummary};
use crate::orchestrator::Attributor;
use crate::report;

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called once the official list is known.
    fn started(&self, total: usize);
    /// Called after each official reaches a terminal state.
    fn official_done(&self, official: &Official, outcome: &Outcome, completed: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn started(&self, _total: usize) {}
    fn official_done(&self, _official: &Official, _outcome: &Outcome, _completed: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Runs one [`Attributor`] across many officials in parallel.
pub struct Coordinator {
    attributor: Arc<Attributor>,
    config: RunConfig,
}

impl Coordinator {
    pub fn new(attributor: Arc<Attributor>, config: RunConfig) -> Self {
        Self { attributor, config }
    }

    /// Attribute every official in the database. Failing to read the
    /// official list is the only fatal error.
    pub async fn run(&self, progress: Arc<dyn ProgressReporter>) -> Result<RunSummary> {
        let officials = self.attributor.storage().list_officials().await?;
        self.run_officials(officials, progress).await
    }

    #[instrument(skip_all, fields(officials = officials.len(), workers = self.config.workers))]
    pub async fn run_officials(
        &self,
        officials: Vec<Official>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let total = officials.len();
        progress.started(total);
        info!("starting attribution run");

        let queue = Arc::new(Mutex::new(VecDeque::from(officials)));
        let completed = Arc::new(AtomicUsize::new(0));
        let ledger = self.attributor.ledger();
        let width = self.config.workers.max(1).min(total.max(1));

        let mut workers = JoinSet::new();
        for worker in 0..width {
            let queue = Arc::clone(&queue);
            let completed = Arc::clone(&completed);
            let attributor = Arc::clone(&self.attributor);
            let ledger = Arc::clone(&ledger);
            let progress = Arc::clone(&progress);

            workers.spawn(async move {
                loop {
                    let Some(official) = queue.lock().await.pop_front() else {
                        break;
                    };

                    // Own task per official, so a panic fails that official only.
                    let task = {
                        let attributor = Arc::clone(&attributor);
                        let official = official.clone();
                        tokio::spawn(async move { attributor.attribute(&official).await })
                    };

                    let outcome = match task.await {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(e)) => {
                            warn!(worker, official_id = %official.id, error = %e, "attribution failed");
                            Outcome::Failed {
                                reason: e.to_string(),
                            }
                        }
                        Err(e) => {
                            warn!(worker, official_id = %official.id, error = %e, "attribution task aborted");
                            Outcome::Failed {
                                reason: format!("attribution task aborted: {e}"),
                            }
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.official_done(&official, &outcome, done, total);
                    ledger.record_outcome(&official, outcome).await;
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task ended abnormally");
            }
        }

        let summary = ledger.summary().await;

        if let Some(dir) = &self.config.reports_dir {
            match report::write_reports(dir, &summary) {
                Ok(paths) => info!(dir = %dir.display(), files = paths.len(), "reports written"),
                Err(e) => warn!(error = %e, "failed to write reports"),
            }
        }

        info!(
            processed = summary.totals.processed,
            stored = summary.totals.stored,
            missing = summary.totals.missing,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "attribution run complete"
        );
        progress.done(&summary);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer};

    use super::*;
    use crate::testutil::{Harness, html_page};
    use registerscout_shared::OfficialId;

    const INDEX_HTML: &str = r#"<html><body>
        <a href="/mgUserInfo.aspx?UID=1">Alex Carter</a>
        <a href="/mgUserInfo.aspx?UID=2">Blair Dunn</a>
        <a href="/mgUserInfo.aspx?UID=3">Casey Evans</a>
        </body></html>"#;

    async fn mount_council(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/mgMemberIndex.aspx"))
            .respond_with(html_page(INDEX_HTML))
            .mount(server)
            .await;
        for (uid, name) in [("1", "Alex Carter"), ("2", "Blair Dunn")] {
            Mock::given(method("GET"))
                .and(path("/mgUserInfo.aspx"))
                .and(query_param("UID", uid))
                .respond_with(html_page(&format!(
                    "<html><body><h2>Register of interests</h2><p>{name}</p></body></html>"
                )))
                .mount(server)
                .await;
        }
        // Casey's profile exists but carries no register.
        Mock::given(method("GET"))
            .and(path("/mgUserInfo.aspx"))
            .and(query_param("UID", "3"))
            .respond_with(html_page("<html><body><p>Casey Evans</p></body></html>"))
            .mount(server)
            .await;
    }

    async fn seed(harness: &Harness) {
        harness
            .storage
            .cache_homepage("Sandshire", &format!("{}/", harness.www_base()))
            .await
            .unwrap();
        for name in ["Alex Carter", "Blair Dunn", "Casey Evans", "Drew Fox"] {
            harness.official(name, "Sandshire", None).await;
        }
    }

    fn labels(summary: &RunSummary) -> BTreeMap<OfficialId, &'static str> {
        summary
            .outcomes
            .iter()
            .map(|(id, outcome)| (*id, outcome.label()))
            .collect()
    }

    async fn run_with_width(workers: usize) -> (RunSummary, BTreeMap<OfficialId, &'static str>) {
        let server = MockServer::start().await;
        mount_council(&server).await;
        let harness = Harness::new(&server).await;
        seed(&harness).await;

        let coordinator = Coordinator::new(
            Arc::new(harness.fresh_attributor()),
            RunConfig {
                workers,
                reports_dir: None,
            },
        );
        let summary = coordinator.run(Arc::new(SilentProgress)).await.unwrap();
        let labels = labels(&summary);
        (summary, labels)
    }

    #[tokio::test]
    async fn width_does_not_change_outcomes() {
        let (narrow, narrow_labels) = run_with_width(1).await;
        let (wide, wide_labels) = run_with_width(8).await;

        assert_eq!(narrow_labels, wide_labels);
        assert_eq!(narrow.totals, wide.totals);
        assert_eq!(narrow.totals.processed, 4);
        assert_eq!(narrow.totals.stored, 2);
        assert_eq!(narrow.totals.missing, 2);
        assert_eq!(narrow.missing.len(), 2);
    }

    #[tokio::test]
    async fn rerun_adds_no_rows_or_audits() {
        let server = MockServer::start().await;
        mount_council(&server).await;
        let harness = Harness::new(&server).await;
        seed(&harness).await;
        let config = RunConfig {
            workers: 4,
            reports_dir: None,
        };

        let first = Coordinator::new(Arc::new(harness.fresh_attributor()), config.clone())
            .run(Arc::new(SilentProgress))
            .await
            .unwrap();
        assert_eq!(first.totals.stored, 2);
        let registers = harness.storage.count_registers().await.unwrap();
        let audits = harness.storage.list_audit(None).await.unwrap().len();

        let second = Coordinator::new(Arc::new(harness.fresh_attributor()), config)
            .run(Arc::new(SilentProgress))
            .await
            .unwrap();
        assert_eq!(second.totals.already_stored, 2);
        assert_eq!(second.totals.stored, 0);
        assert_eq!(harness.storage.count_registers().await.unwrap(), registers);

        // Only the two unresolved officials are audited again.
        let new_audits: Vec<_> = harness
            .storage
            .list_audit(None)
            .await
            .unwrap()
            .into_iter()
            .skip(audits)
            .collect();
        let stored_ids: Vec<OfficialId> = first
            .outcomes
            .iter()
            .filter(|(_, o)| o.has_register())
            .map(|(id, _)| *id)
            .collect();
        assert!(
            new_audits
                .iter()
                .all(|a| a.official_id.is_some_and(|id| !stored_ids.contains(&id)))
        );
    }

    #[tokio::test]
    async fn panicking_official_is_counted_as_failed() {
        let server = MockServer::start().await;
        mount_council(&server).await;
        let harness = Harness::new(&server).await;
        seed(&harness).await;
        harness.searcher.panic_when_query_contains("Drew Fox");

        let summary = Coordinator::new(
            Arc::new(harness.fresh_attributor()),
            RunConfig {
                workers: 2,
                reports_dir: None,
            },
        )
        .run(Arc::new(SilentProgress))
        .await
        .unwrap();

        assert_eq!(summary.totals.processed, 4);
        assert_eq!(summary.totals.failed, 1);
        assert_eq!(summary.totals.stored, 2);
        let failed: Vec<&Outcome> = summary
            .outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
    }

    #[tokio::test]
    async fn empty_run_completes() {
        let server = MockServer::start().await;
        let harness = Harness::new(&server).await;
        let coordinator = Coordinator::new(
            Arc::new(harness.fresh_attributor()),
            RunConfig {
                workers: 4,
                reports_dir: None,
            },
        );
        let summary = coordinator.run(Arc::new(SilentProgress)).await.unwrap();
        assert_eq!(summary.totals.processed, 0);
        assert!(summary.outcomes.is_empty());
    }
}
