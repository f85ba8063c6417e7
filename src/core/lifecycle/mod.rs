//! Encounter lifecycle
//!
//! - [`history`] - status period bookkeeping and repair
//! - [`service`] - applies lifecycle events to stored encounters
//! - [`payload`] - the FHIR Encounter payload
//! - [`submitter`] - primary-path encounter submission

pub mod history;
pub mod payload;
pub mod service;
pub mod submitter;

pub use history::{is_monotonic, is_ready_submission, readiness_issue, record_event, repair_history};
pub use service::{rank_diagnoses, EncounterService};
pub use submitter::{EncounterOutcome, EncounterSubmission, EncounterSubmitter};
