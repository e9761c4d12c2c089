//! Shared types, error model, and configuration for RegisterScout.
//!
//! This crate is the foundation depended on by all other RegisterScout crates.
//! It provides:
//! - [`ScoutError`], the unified error type
//! - Domain types ([`Official`], [`CandidateUrl`], [`FetchedContent`],
//!   [`RegisterDocument`], [`AuditEntry`])
//! - Configuration ([`AppConfig`] and the runtime configs derived from it)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AttributionConfig, CrawlBudget, CrawlConfig, CrawlSection, DefaultsConfig,
    FetchConfig, IndexSection, RunConfig, SearchConfig, SearchSection, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, ScoutError};
pub use types::{
    AuditEntry, CandidateUrl, ContentKind, DiscoverySource, FetchedContent, IssueKind, Official,
    OfficialId, RegisterDocument, content_hash,
};
