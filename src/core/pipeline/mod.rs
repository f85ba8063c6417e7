//! Per-category sync pipelines
//!
//! - [`sync`] - match-or-insert ingest and create-or-update submission
//! - [`payload`] - pure payload builders for clinical items
//! - [`guard`] - in-process claims preventing concurrent creates
//! - [`set`] - one pipeline per item kind with category isolation
//! - [`summary`] - per-pass counters

pub mod guard;
pub mod payload;
pub mod set;
pub mod summary;
pub mod sync;

pub use guard::{SubmissionClaim, SubmissionGuard};
pub use set::{PipelineSet, DEFAULT_CONDITION_KEY};
pub use summary::{ItemOutcome, PipelineSummary};
pub use sync::SyncPipeline;
