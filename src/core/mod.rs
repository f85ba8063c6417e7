//! Core sync logic
//!
//! # Modules
//!
//! - [`lifecycle`] - encounter history, readiness and submission
//! - [`pipeline`] - per-category match-or-insert and submission
//! - [`chain`] - ordered diagnostic resource chains
//! - [`duplicate`] - recovery of duplicate refusals
//! - [`reconcile`] - on-demand sweeps over persisted state
//! - [`engine`] - entry point wiring everything together
//!
//! # Flow
//!
//! 1. A lifecycle event updates the stored encounter
//! 2. A ready encounter is submitted; on acceptance every item category
//!    is submitted, diagnostics through their chain
//! 3. A duplicate refusal leaves a marker for the duplicate sweep
//! 4. Anything left unsynced is picked up by the next sweep

pub mod chain;
pub mod context;
pub mod directory;
pub mod duplicate;
pub mod engine;
pub mod lifecycle;
pub mod pipeline;
pub mod reconcile;

pub use context::SyncContext;
pub use directory::{HospitalDirectory, HospitalProfile};
pub use engine::SyncEngine;
