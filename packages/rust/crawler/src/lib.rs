//! Content fetcher and council-site crawler.
//!
//! - [`Fetcher`]: HTTP transport with SSRF protection and host pinning
//! - [`SiteCrawler`]: breadth-first crawl yielding register/PDF candidates

pub mod engine;
pub mod fetch;

pub use engine::{CrawlReport, CrawlScope, SiteCrawler, normalize_url};
pub use fetch::{FetchedDocument, Fetcher, HtmlPage, RawResponse, USER_AGENT, is_ssrf_target};
