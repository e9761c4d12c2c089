//! Attribution pipeline for RegisterScout.
//!
//! This crate ties together index discovery, web search, site crawling,
//! content extraction and persistence into one run:
//! - [`Attributor`]: the per-official state machine
//! - [`Coordinator`]: the bounded worker pool over all officials
//! - [`RunCaches`] / [`RunLedger`]: run-scoped shared state
//! - [`report`]: end-of-run CSV side-channel reports

pub mod cache;
pub mod coordinator;
pub mod ledger;
pub mod orchestrator;
pub mod report;

#[cfg(test)]
mod testutil;

pub use cache::{RunCache, RunCaches};
pub use coordinator::{Coordinator, ProgressReporter, SilentProgress};
pub use ledger::{FailureRecord, ManualReviewPdf, Outcome, RunLedger, RunSummary, RunTotals};
pub use orchestrator::{AttributionState, Attributor, Candidate, Discovery};
pub use report::write_reports;
