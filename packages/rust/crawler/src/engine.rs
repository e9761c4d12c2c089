//! Breadth-first council-site crawler.
//!
//! Starting from a homepage plus a few likely top-level paths, the crawler
//! walks internal links and records every anchor that looks like a register
//! of interests or a PDF. A pass that finds nothing is retried once with a
//! wider budget (see [`CrawlConfig::budgets`]); pages fetched by an earlier
//! pass are replayed from memory, never requested twice.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, instrument};
use url::Url;

use registerscout_classify::{has_governance_keyword, is_pdf_link, looks_like_register};
use registerscout_extract::Anchor;
use registerscout_shared::{
    CandidateUrl, CrawlBudget, CrawlConfig, DiscoverySource, Result, ScoutError,
};

use crate::fetch::Fetcher;

// ---------------------------------------------------------------------------
// CrawlReport
// ---------------------------------------------------------------------------

/// Outcome of crawling one council site.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub homepage: Url,
    /// Register-hint matches first, then bare PDF links; each in discovery order.
    pub findings: Vec<CandidateUrl>,
    /// Distinct URLs requested over all passes.
    pub pages_fetched: usize,
    /// Budget of the pass that produced `findings`.
    pub budget: CrawlBudget,
    pub passes: usize,
}

// ---------------------------------------------------------------------------
// SiteCrawler
// ---------------------------------------------------------------------------

pub struct SiteCrawler {
    fetcher: Fetcher,
    config: CrawlConfig,
}

/// Anchors of every page already requested; `None` marks a failed page.
type PageMemo = HashMap<String, Option<Vec<Anchor>>>;

impl SiteCrawler {
    pub fn new(fetcher: Fetcher, config: CrawlConfig) -> Self {
        Self { fetcher, config }
    }

    /// Crawl the council site rooted at `homepage`.
    ///
    /// Per-page failures are skipped; the only error is an unusable homepage.
    #[instrument(skip_all, fields(homepage = %homepage))]
    pub async fn crawl(&self, homepage: &Url) -> Result<CrawlReport> {
        let scope = CrawlScope::new(homepage)?;
        let mut memo = PageMemo::new();
        let budgets = self.config.budgets();

        let mut report = CrawlReport {
            homepage: homepage.clone(),
            findings: Vec::new(),
            pages_fetched: 0,
            budget: budgets.first().copied().unwrap_or(CrawlBudget {
                max_pages: self.config.max_pages,
                max_depth: self.config.max_depth,
            }),
            passes: 0,
        };

        for budget in budgets {
            let findings = self.crawl_pass(homepage, &scope, budget, &mut memo).await;
            report.passes += 1;
            report.budget = budget;
            report.pages_fetched = memo.len();

            info!(
                pass = report.passes,
                max_pages = budget.max_pages,
                max_depth = budget.max_depth,
                findings = findings.len(),
                pages = memo.len(),
                "crawl pass finished"
            );

            if !findings.is_empty() {
                report.findings = findings;
                break;
            }
        }

        Ok(report)
    }

    async fn crawl_pass(
        &self,
        homepage: &Url,
        scope: &CrawlScope,
        budget: CrawlBudget,
        memo: &mut PageMemo,
    ) -> Vec<CandidateUrl> {
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        let mut findings = Findings::default();
        let mut visited = 0usize;

        let seeds = std::iter::once(homepage.clone()).chain(
            self.config
                .seed_paths
                .iter()
                .filter_map(|path| homepage.join(path).ok()),
        );
        for seed in seeds {
            if scope.is_internal(&seed) && queued.insert(normalize_url(&seed)) {
                queue.push_back((seed, 0));
            }
        }

        while let Some((url, depth)) = queue.pop_front() {
            if visited >= budget.max_pages {
                debug!(remaining = queue.len() + 1, "page budget exhausted");
                break;
            }
            visited += 1;

            let Some(anchors) = self.load(&url, memo).await else {
                continue;
            };

            let mut broad = 0usize;
            for anchor in anchors {
                let href = anchor.href.as_str();
                let register = looks_like_register(&anchor.text, href);
                let pdf = is_pdf_link(&anchor.href);

                if register || pdf {
                    findings.record(&anchor, depth + 1, register);
                }

                if pdf || depth >= budget.max_depth || !scope.is_internal(&anchor.href) {
                    continue;
                }

                let key = normalize_url(&anchor.href);
                if queued.contains(&key) {
                    continue;
                }

                let follow = if depth == 0 && broad < self.config.broad_first_hop {
                    broad += 1;
                    true
                } else {
                    has_governance_keyword(&anchor.text, href)
                };

                if follow {
                    queued.insert(key);
                    queue.push_back((anchor.href.clone(), depth + 1));
                }
            }
        }

        findings.into_ordered()
    }

    /// Return the page's anchors, fetching it only the first time.
    async fn load(&self, url: &Url, memo: &mut PageMemo) -> Option<Vec<Anchor>> {
        let key = normalize_url(url);
        if let Some(cached) = memo.get(&key) {
            return cached.clone();
        }

        let anchors = match self.fetcher.fetch_page(url).await {
            Ok(page) => {
                debug!(%url, anchors = page.anchors.len(), "page crawled");
                Some(page.anchors)
            }
            Err(e) => {
                debug!(%url, error = %e, "page skipped");
                None
            }
        };

        memo.insert(key, anchors.clone());
        anchors
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Findings {
    register: Vec<CandidateUrl>,
    pdf: Vec<CandidateUrl>,
    seen: HashSet<String>,
}

impl Findings {
    fn record(&mut self, anchor: &Anchor, depth: u32, register: bool) {
        if !self.seen.insert(normalize_url(&anchor.href)) {
            return;
        }
        let candidate = CandidateUrl::new(anchor.href.clone(), depth, DiscoverySource::Crawl)
            .with_anchor(anchor.text.clone())
            .with_register_hint(register);
        if register {
            self.register.push(candidate);
        } else {
            self.pdf.push(candidate);
        }
    }

    fn into_ordered(mut self) -> Vec<CandidateUrl> {
        self.register.append(&mut self.pdf);
        self.register
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// The council's domain: the homepage host's last three labels.
///
/// `www.sandshire.gov.uk` gives `sandshire.gov.uk`, so subdomains such as
/// `democracy.sandshire.gov.uk` are internal.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    suffix: String,
}

impl CrawlScope {
    pub fn new(homepage: &Url) -> Result<Self> {
        if !matches!(homepage.scheme(), "http" | "https") {
            return Err(ScoutError::validation(format!(
                "no usable homepage: unsupported scheme in {homepage}"
            )));
        }

        let suffix = match homepage.host() {
            Some(url::Host::Domain(host)) if !host.is_empty() => {
                let host = host.to_ascii_lowercase();
                let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
                labels[labels.len().saturating_sub(3)..].join(".")
            }
            Some(url::Host::Ipv4(ip)) => ip.to_string(),
            Some(url::Host::Ipv6(ip)) => format!("[{ip}]"),
            _ => {
                return Err(ScoutError::validation(format!(
                    "no usable homepage: {homepage} has no host"
                )));
            }
        };

        Ok(Self { suffix })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn is_internal(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == self.suffix || host.ends_with(&format!(".{}", self.suffix))
    }
}

/// Normalize a URL for deduplication (strip fragment and trailing slash).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    // Keep the slash on a bare origin.
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}
