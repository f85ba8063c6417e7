//! Duplicate-refusal recovery

pub mod reconciler;

pub use reconciler::{DuplicateReconciler, ResolveOutcome};
