//! Council homepage resolution via web search.

use std::sync::Arc;

use registerscout_shared::{Result, ScoutError};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::search::WebSearcher;

/// Public-sector host suffixes accepted as council websites.
const GOV_SUFFIXES: &[&str] = &[".gov.uk", ".gov.wales", ".gov.scot", ".llyw.cymru"];

/// Host fragments of hosted council-software platforms.
const PLATFORM_MARKERS: &[&str] = &["moderngov", "democracy", "cmis"];

/// Words too common in council names to identify one.
const GENERIC_WORDS: &[&str] = &[
    "council",
    "borough",
    "district",
    "county",
    "city",
    "metropolitan",
    "royal",
];

/// Minimum token length for a council-name token to count.
const MIN_TOKEN_LEN: usize = 4;

/// Identifying tokens of a council name, e.g. "Sandshire District Council" →
/// `["sandshire"]`.
///
/// Falls back to the unfiltered tokens when every token is generic.
pub fn council_tokens(council: &str) -> Vec<String> {
    let all: Vec<String> = council
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect();

    let specific: Vec<String> = all
        .iter()
        .filter(|t| !GENERIC_WORDS.contains(&t.as_str()))
        .cloned()
        .collect();

    if specific.is_empty() { all } else { specific }
}

/// True when a search result plausibly belongs to the council.
///
/// The host or path must contain one of `tokens`, and the host must carry a
/// public-sector suffix or a council-platform marker.
pub fn accepts_council_result(url: &Url, tokens: &[String]) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    let path = url.path().to_lowercase();

    let names_council = tokens
        .iter()
        .any(|t| host.contains(t.as_str()) || path.contains(t.as_str()));
    let official_host = GOV_SUFFIXES.iter().any(|s| host.ends_with(s))
        || PLATFORM_MARKERS.iter().any(|m| host.contains(m));

    names_council && official_host
}

/// Finds a council's homepage through a [`WebSearcher`].
#[derive(Clone)]
pub struct HomepageResolver {
    searcher: Arc<dyn WebSearcher>,
    max_results: usize,
}

impl HomepageResolver {
    pub fn new(searcher: Arc<dyn WebSearcher>, max_results: usize) -> Self {
        Self {
            searcher,
            max_results: max_results.max(1),
        }
    }

    fn queries(council: &str) -> [String; 3] {
        [
            format!("{council} council"),
            format!("{council} council website"),
            format!("{council} local authority"),
        ]
    }

    /// Resolve a council name to the root URL of its website.
    ///
    /// `Ok(None)` means no acceptable result; an error is returned only when
    /// every query failed and nothing was found.
    #[instrument(skip_all, fields(council = %council, searcher = self.searcher.name()))]
    pub async fn resolve(&self, council: &str) -> Result<Option<Url>> {
        let tokens = council_tokens(council);
        if tokens.is_empty() {
            warn!("council name has no usable tokens");
            return Ok(None);
        }

        let mut last_error: Option<ScoutError> = None;

        for query in Self::queries(council) {
            let results = match self.searcher.search(&query, self.max_results).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(query = %query, error = %e, "homepage search failed");
                    last_error = Some(e);
                    continue;
                }
            };

            for result in results {
                let Ok(url) = Url::parse(&result.url) else {
                    continue;
                };
                if !accepts_council_result(&url, &tokens) {
                    debug!(url = %url, "rejected search result");
                    continue;
                }
                let homepage = url.join("/").unwrap_or(url);
                info!(homepage = %homepage, query = %query, "homepage resolved");
                return Ok(Some(homepage));
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => {
                info!("homepage not found");
                Ok(None)
            }
        }
    }
}
