//! Per-official attribution state machine.
//!
//! Discovery runs as a lazy priority chain: the councillor index and the
//! official's profile page first, then web search, then a full crawl of the
//! council site. Each strategy yields a [`Discovery`]; candidates are tried
//! in order and the first one that names the official and looks like a
//! register is stored. Per-candidate failures become audit entries and never
//! abort the official.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use registerscout_classify::{
    anchor_names_official, is_pdf_link, looks_like_register, looks_like_register_text,
    name_matches,
};
use registerscout_crawler::{FetchedDocument, Fetcher, SiteCrawler, normalize_url};
use registerscout_discovery::{
    HomepageResolver, WebSearcher, accepts_council_result, council_tokens, index_urls,
};
use registerscout_extract::Anchor;
use registerscout_shared::{
    AttributionConfig, AuditEntry, CandidateUrl, CrawlConfig, DiscoverySource, FetchedContent,
    IssueKind, Official, RegisterDocument, Result,
};
use registerscout_storage::Storage;

use crate::cache::RunCaches;
use crate::ledger::{Outcome, RunLedger};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an official's attribution currently is; emitted on the tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionState {
    IndexLookup,
    ProfileFollow,
    SearchFallback,
    SiteCrawl,
    RegisterCandidates,
    NameMatch,
    Stored,
    Unmatched,
}

/// A link to evaluate, with how much we already trust it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub link: CandidateUrl,
    /// Found on (or is) the official's own profile page, so the name check
    /// is already satisfied.
    pub official_specific: bool,
    /// Page the link was found on.
    pub found_on: Option<Url>,
}

/// Result of one discovery strategy.
#[derive(Debug, Clone)]
pub enum Discovery {
    Found(Vec<Candidate>),
    Empty,
}

impl Discovery {
    fn from_candidates(candidates: Vec<Candidate>) -> Self {
        if candidates.is_empty() {
            Self::Empty
        } else {
            Self::Found(candidates)
        }
    }
}

/// Ordered candidate list, deduplicated by normalized URL.
#[derive(Default)]
struct CandidateList {
    seen: HashSet<String>,
    items: Vec<Candidate>,
}

impl CandidateList {
    fn push(&mut self, candidate: Candidate) -> bool {
        if self.seen.insert(normalize_url(&candidate.link.url)) {
            self.items.push(candidate);
            true
        } else {
            false
        }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn into_discovery(self) -> Discovery {
        Discovery::from_candidates(self.items)
    }
}

// ---------------------------------------------------------------------------
// Attributor
// ---------------------------------------------------------------------------

/// Runs the attribution state machine for one official at a time.
///
/// Cheap to share across workers behind an `Arc`; all mutable state lives in
/// the injected [`RunCaches`] and [`RunLedger`].
pub struct Attributor {
    storage: Arc<Storage>,
    fetcher: Fetcher,
    crawler: SiteCrawler,
    resolver: HomepageResolver,
    searcher: Arc<dyn WebSearcher>,
    caches: Arc<RunCaches>,
    ledger: Arc<RunLedger>,
    config: AttributionConfig,
}

impl Attributor {
    pub fn new(
        storage: Arc<Storage>,
        fetcher: Fetcher,
        crawl: CrawlConfig,
        searcher: Arc<dyn WebSearcher>,
        config: AttributionConfig,
    ) -> Self {
        Self {
            storage,
            crawler: SiteCrawler::new(fetcher.clone(), crawl),
            fetcher,
            resolver: HomepageResolver::new(Arc::clone(&searcher), config.search_max_results),
            searcher,
            caches: Arc::new(RunCaches::new()),
            ledger: Arc::new(RunLedger::new()),
            config,
        }
    }

    /// Substitute the run caches (e.g. to share them between attributors).
    pub fn with_caches(mut self, caches: Arc<RunCaches>) -> Self {
        self.caches = caches;
        self
    }

    pub fn caches(&self) -> Arc<RunCaches> {
        Arc::clone(&self.caches)
    }

    pub fn ledger(&self) -> Arc<RunLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn storage(&self) -> Arc<Storage> {
        Arc::clone(&self.storage)
    }

    /// Attribute one official. Errors are storage failures only; everything
    /// network-related is audited and absorbed.
    #[instrument(skip_all, fields(official_id = %official.id, council = %official.council))]
    pub async fn attribute(&self, official: &Official) -> Result<Outcome> {
        if self.storage.has_register(official.id).await? {
            debug!("register already stored");
            return Ok(Outcome::AlreadyStored);
        }

        enter(AttributionState::IndexLookup);
        if let Discovery::Found(candidates) = self.profile_candidates(official).await {
            if let Some(outcome) = self.try_candidates(official, candidates).await? {
                return Ok(outcome);
            }
        }

        enter(AttributionState::SearchFallback);
        if let Discovery::Found(candidates) = self.search_candidates(official).await {
            if let Some(outcome) = self.try_candidates(official, candidates).await? {
                return Ok(outcome);
            }
        }

        enter(AttributionState::SiteCrawl);
        if let Discovery::Found(candidates) = self.crawl_candidates(official).await {
            if let Some(outcome) = self.try_candidates(official, candidates).await? {
                return Ok(outcome);
            }
        }

        enter(AttributionState::Unmatched);
        self.audit(
            official,
            IssueKind::MissingRegisterUrl,
            "no confirmed register via index, search or crawl".into(),
        )
        .await;
        Ok(Outcome::Unmatched)
    }

    // -----------------------------------------------------------------------
    // Strategy: councillor index → profile page
    // -----------------------------------------------------------------------

    async fn profile_candidates(&self, official: &Official) -> Discovery {
        let Some(index_url) = self.index_url(&official.council).await else {
            return Discovery::Empty;
        };

        let index = match self.document(&index_url).await {
            Ok(doc) => doc,
            Err(e) => {
                self.audit(
                    official,
                    IssueKind::ProfileFetchError,
                    format!("index page {index_url}: {e}"),
                )
                .await;
                return Discovery::Empty;
            }
        };

        enter(AttributionState::ProfileFollow);
        let Some(profile_anchor) = index
            .anchors
            .iter()
            .find(|a| anchor_names_official(&a.text, &official.name))
        else {
            debug!(index = %index_url, "official not listed on index page");
            return Discovery::Empty;
        };
        let profile_url = profile_anchor.href.clone();

        let profile = match self.document(&profile_url).await {
            Ok(doc) => doc,
            Err(e) => {
                self.audit(
                    official,
                    IssueKind::ProfileFetchError,
                    format!("profile page {profile_url}: {e}"),
                )
                .await;
                return Discovery::Empty;
            }
        };

        let mut list = CandidateList::default();
        for anchor in &profile.anchors {
            let register = looks_like_register(&anchor.text, anchor.href.as_str())
                || looks_like_register(&anchor.context, anchor.href.as_str());
            if register || is_pdf_link(&anchor.href) {
                list.push(Candidate {
                    link: CandidateUrl::new(anchor.href.clone(), 1, DiscoverySource::IndexPage)
                        .with_anchor(anchor.text.clone())
                        .with_register_hint(register),
                    official_specific: true,
                    found_on: Some(profile_url.clone()),
                });
            }
        }
        list.push(Candidate {
            link: CandidateUrl::new(profile_url.clone(), 0, DiscoverySource::IndexPage)
                .with_anchor(profile_anchor.text.clone()),
            official_specific: true,
            found_on: Some(index_url),
        });

        info!(profile = %profile_url, candidates = list.items.len(), "profile page found");
        list.into_discovery()
    }

    /// Councillor index URL: run cache, then storage, then template probes.
    async fn index_url(&self, council: &str) -> Option<Url> {
        if let Some(cached) = self.caches.index_pages.get(council).await {
            return cached;
        }

        match self.storage.get_index_page(council).await {
            Ok(Some(stored)) => {
                if let Ok(url) = Url::parse(&stored) {
                    self.caches.index_pages.insert(council, Some(url.clone())).await;
                    return Some(url);
                }
                warn!(stored = %stored, "ignoring unparseable stored index URL");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "index page lookup failed"),
        }

        let mut found = None;
        for url in index_urls(&self.config.index_url_templates, council) {
            match self.document(&url).await {
                Ok(doc) if doc.content.is_html() => {
                    found = Some(url);
                    break;
                }
                Ok(_) => debug!(url = %url, "index probe answered with non-HTML"),
                Err(e) => debug!(url = %url, error = %e, "index probe missed"),
            }
        }

        match &found {
            Some(url) => {
                info!(index = %url, "councillor index discovered");
                if let Err(e) = self.storage.cache_index_page(council, url.as_str()).await {
                    warn!(error = %e, "failed to persist index page");
                }
            }
            None => debug!("no councillor index template answered"),
        }

        self.caches.index_pages.insert(council, found.clone()).await;
        found
    }

    // -----------------------------------------------------------------------
    // Strategy: web search
    // -----------------------------------------------------------------------

    fn search_queries(official: &Official) -> Vec<String> {
        let name = &official.name;
        let council = &official.council;
        let mut queries = Vec::with_capacity(4);
        if let Some(ward) = official.ward.as_deref().filter(|w| !w.trim().is_empty()) {
            queries.push(format!("\"{name}\" {ward} {council} register of interests"));
        }
        queries.push(format!("\"{name}\" {council} register of interests"));
        queries.push(format!("\"{name}\" {council} councillor"));
        queries.push(format!("{council} council register of interests"));
        queries
    }

    async fn search_candidates(&self, official: &Official) -> Discovery {
        let tokens = council_tokens(&official.council);
        if tokens.is_empty() {
            return Discovery::Empty;
        }

        for query in Self::search_queries(official) {
            let results = match self
                .searcher
                .search(&query, self.config.search_max_results)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    self.audit(
                        official,
                        IssueKind::SearchError,
                        format!("query {query:?}: {e}"),
                    )
                    .await;
                    continue;
                }
            };

            let mut list = CandidateList::default();
            for result in results {
                let Ok(url) = Url::parse(&result.url) else {
                    continue;
                };
                if !accepts_council_result(&url, &tokens) {
                    debug!(url = %url, "search result outside council");
                    continue;
                }

                let hint = looks_like_register(&result.title, url.as_str());
                list.push(Candidate {
                    link: CandidateUrl::new(url.clone(), 0, DiscoverySource::Search)
                        .with_anchor(result.title)
                        .with_register_hint(hint),
                    official_specific: false,
                    found_on: None,
                });
                self.harvest(&url, &tokens, &mut list).await;
            }

            if !list.is_empty() {
                info!(query = %query, candidates = list.items.len(), "search produced candidates");
                return list.into_discovery();
            }
        }

        Discovery::Empty
    }

    /// Collect register and PDF links reachable from a search result page,
    /// following HTML register links up to the configured harvest depth.
    async fn harvest(&self, root: &Url, tokens: &[String], list: &mut CandidateList) {
        let mut frontier = vec![root.clone()];

        for depth in 1..=self.config.search_harvest_depth {
            let mut next = Vec::new();
            for page in frontier {
                let doc = match self.document(&page).await {
                    Ok(doc) if doc.content.is_html() => doc,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(url = %page, error = %e, "harvest fetch failed");
                        continue;
                    }
                };

                for anchor in &doc.anchors {
                    if !accepts_council_result(&anchor.href, tokens) {
                        continue;
                    }
                    let register = looks_like_register(&anchor.text, anchor.href.as_str());
                    let pdf = is_pdf_link(&anchor.href);
                    if !register && !pdf {
                        continue;
                    }
                    let added = list.push(Candidate {
                        link: CandidateUrl::new(anchor.href.clone(), depth, DiscoverySource::Search)
                            .with_anchor(anchor.text.clone())
                            .with_register_hint(register),
                        official_specific: false,
                        found_on: Some(page.clone()),
                    });
                    if added && !pdf {
                        next.push(anchor.href.clone());
                    }
                }
            }
            frontier = next;
        }
    }

    // -----------------------------------------------------------------------
    // Strategy: full-site crawl
    // -----------------------------------------------------------------------

    async fn crawl_candidates(&self, official: &Official) -> Discovery {
        let council = official.council.as_str();

        let findings = match self.caches.crawls.get(council).await {
            Some(findings) => findings,
            None => {
                let Some(homepage) = self.homepage(official).await else {
                    return Discovery::Empty;
                };
                match self.crawler.crawl(&homepage).await {
                    Ok(report) => {
                        let findings = Arc::new(report.findings);
                        self.caches.crawls.insert(council, Arc::clone(&findings)).await;
                        findings
                    }
                    Err(e) => {
                        self.audit(
                            official,
                            IssueKind::SearchError,
                            format!("council crawl failed for {homepage}: {e}"),
                        )
                        .await;
                        // A failed crawl is not retried for later officials.
                        self.caches.crawls.insert(council, Arc::new(Vec::new())).await;
                        return Discovery::Empty;
                    }
                }
            }
        };

        Discovery::from_candidates(
            findings
                .iter()
                .map(|link| Candidate {
                    link: link.clone(),
                    official_specific: false,
                    found_on: None,
                })
                .collect(),
        )
    }

    /// Council homepage: run cache, then storage, then the resolver.
    async fn homepage(&self, official: &Official) -> Option<Url> {
        let council = official.council.as_str();
        if let Some(cached) = self.caches.homepages.get(council).await {
            return cached;
        }

        match self.storage.get_cached_homepage(council).await {
            Ok(Some(stored)) => {
                if let Ok(url) = Url::parse(&stored) {
                    self.caches.homepages.insert(council, Some(url.clone())).await;
                    return Some(url);
                }
                warn!(stored = %stored, "ignoring unparseable stored homepage");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "homepage cache lookup failed"),
        }

        let resolved = match self.resolver.resolve(council).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.audit(
                    official,
                    IssueKind::SearchError,
                    format!("homepage lookup failed: {e}"),
                )
                .await;
                self.caches.homepages.insert(council, None).await;
                return None;
            }
        };

        match &resolved {
            Some(url) => {
                if let Err(e) = self.storage.cache_homepage(council, url.as_str()).await {
                    warn!(error = %e, "failed to persist homepage");
                }
            }
            None => info!("homepage not found; crawl unavailable"),
        }

        self.caches.homepages.insert(council, resolved.clone()).await;
        resolved
    }

    // -----------------------------------------------------------------------
    // Candidate evaluation
    // -----------------------------------------------------------------------

    async fn try_candidates(
        &self,
        official: &Official,
        candidates: Vec<Candidate>,
    ) -> Result<Option<Outcome>> {
        enter(AttributionState::RegisterCandidates);
        for candidate in candidates {
            if let Some(outcome) = self.evaluate(official, &candidate).await? {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    async fn evaluate(&self, official: &Official, candidate: &Candidate) -> Result<Option<Outcome>> {
        enter(AttributionState::NameMatch);
        let url = &candidate.link.url;

        let doc = match self.document(url).await {
            Ok(doc) => doc,
            Err(e) => {
                self.audit(official, IssueKind::RegisterFetchError, format!("{url}: {e}"))
                    .await;
                return Ok(None);
            }
        };
        let content = &doc.content;

        if content.is_pdf() && content.text.trim().is_empty() {
            self.manual_review(official, url, candidate.found_on.as_ref())
                .await;
            return Ok(None);
        }

        let anchor_text = candidate.link.anchor_text.as_deref().unwrap_or("");
        let register_ok = candidate.link.register_hint
            || looks_like_register(anchor_text, url.as_str())
            || looks_like_register_text(&content.text);
        let name_ok =
            candidate.official_specific || name_matches(&doc.body_text, &official.name);

        if name_ok && register_ok {
            return self.store(official, candidate.link.source, content).await.map(Some);
        }
        if name_ok || !content.is_html() {
            return Ok(None);
        }

        self.extra_hop(official, candidate, &doc, register_ok).await
    }

    /// One more hop from an HTML candidate that did not name the official:
    /// follow links that do, then the page's PDFs.
    async fn extra_hop(
        &self,
        official: &Official,
        candidate: &Candidate,
        doc: &FetchedDocument,
        parent_register_ok: bool,
    ) -> Result<Option<Outcome>> {
        let page = &candidate.link.url;
        let page_key = normalize_url(page);
        let source = candidate.link.source;

        let name_links: Vec<&Anchor> = doc
            .anchors
            .iter()
            .filter(|a| anchor_names_official(&a.text, &official.name))
            .filter(|a| normalize_url(&a.href) != page_key)
            .take(self.config.max_name_links)
            .collect();

        for anchor in name_links {
            if let Some(outcome) = self
                .try_sub_link(official, anchor, page, source, parent_register_ok)
                .await?
            {
                return Ok(Some(outcome));
            }
        }

        let pdf_links: Vec<&Anchor> = doc
            .anchors
            .iter()
            .filter(|a| is_pdf_link(&a.href))
            .take(self.config.max_pdf_links)
            .collect();

        for anchor in pdf_links {
            if let Some(outcome) = self
                .try_sub_link(official, anchor, page, source, parent_register_ok)
                .await?
            {
                return Ok(Some(outcome));
            }
            self.manual_review(official, &anchor.href, Some(page)).await;
        }

        Ok(None)
    }

    async fn try_sub_link(
        &self,
        official: &Official,
        anchor: &Anchor,
        parent: &Url,
        source: DiscoverySource,
        parent_register_ok: bool,
    ) -> Result<Option<Outcome>> {
        let doc = match self.document(&anchor.href).await {
            Ok(doc) => doc,
            Err(e) => {
                self.audit(
                    official,
                    IssueKind::RegisterFetchError,
                    format!("{} (linked from {parent}): {e}", anchor.href),
                )
                .await;
                return Ok(None);
            }
        };
        let content = &doc.content;

        if content.is_pdf() && content.text.trim().is_empty() {
            self.manual_review(official, &anchor.href, Some(parent)).await;
            return Ok(None);
        }

        let register_ok = parent_register_ok
            || looks_like_register(&anchor.text, anchor.href.as_str())
            || looks_like_register_text(&content.text);
        if register_ok && name_matches(&doc.body_text, &official.name) {
            return self.store(official, source, content).await.map(Some);
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    async fn store(
        &self,
        official: &Official,
        source: DiscoverySource,
        content: &FetchedContent,
    ) -> Result<Outcome> {
        let doc = RegisterDocument::from_content(official.id, content);
        if self.storage.insert_register(&doc).await? {
            enter(AttributionState::Stored);
            info!(url = %content.url, source = source.as_str(), "register stored");
            Ok(Outcome::Stored {
                url: content.url.to_string(),
                source,
            })
        } else {
            Ok(Outcome::AlreadyStored)
        }
    }

    /// Fetch through the run-wide document cache.
    async fn document(&self, url: &Url) -> Result<Arc<FetchedDocument>> {
        if let Some(doc) = self.caches.documents.get(url.as_str()).await {
            return Ok(doc);
        }
        let doc = Arc::new(self.fetcher.fetch_document(url).await?);
        self.caches
            .documents
            .insert(url.as_str(), Arc::clone(&doc))
            .await;
        Ok(doc)
    }

    async fn audit(&self, official: &Official, kind: IssueKind, detail: String) {
        warn!(kind = %kind, detail = %detail, "attribution issue");
        let entry = AuditEntry::new(Some(official.id), kind, detail.as_str());
        if let Err(e) = self.storage.insert_audit(&entry).await {
            warn!(error = %e, "failed to persist audit entry");
        }
        self.ledger.record_issue(official, kind, &detail).await;
    }

    async fn manual_review(&self, official: &Official, pdf: &Url, found_on: Option<&Url>) {
        debug!(pdf = %pdf, "queued PDF for manual review");
        self.ledger
            .add_manual_review(official, pdf.as_str(), found_on.map(Url::as_str))
            .await;
    }
}

fn enter(state: AttributionState) {
    debug!(state = ?state, "attribution state");
}
