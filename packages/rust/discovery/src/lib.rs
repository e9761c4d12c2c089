//! Council web-presence discovery.
//!
//! Before crawling, RegisterScout needs to know where a council lives on the
//! web. Two sources are used: ModernGov-style councillor-index URL templates
//! (cheap, deterministic) and a web-search provider behind the
//! [`WebSearcher`] trait, whose results are only trusted when they pass the
//! council-token rule in [`accepts_council_result`].

mod homepage;
mod index;
mod search;

pub use homepage::{HomepageResolver, accepts_council_result, council_tokens};
pub use index::{SLUG_PLACEHOLDER, council_slug, index_urls};
pub use search::{NoopSearcher, SERPER_ENDPOINT, SearchResult, SerperSearcher, WebSearcher};
