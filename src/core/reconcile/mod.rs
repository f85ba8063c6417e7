//! Reconciliation sweeps over persisted state

pub mod scheduler;
pub mod summary;

pub use scheduler::ReconciliationScheduler;
pub use summary::{SweepError, SweepErrorType, SweepSummary};
