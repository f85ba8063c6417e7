//! Domain models and types for MedBridge.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EncounterId`], [`ItemId`], [`HospitalId`], [`RegistrationId`])
//! - **Encounter model** ([`Encounter`], [`History`], [`SyncState`], [`DuplicateMarker`])
//! - **Clinical items** ([`ClinicalItem`], [`SyncableItem`], [`ItemKind`])
//! - **Diagnostic chain** ([`ChainChild`], [`ChainStage`], [`DiagnosticCategory`])
//! - **Events** ([`InboundEvent`], [`Notification`])
//! - **Error types** ([`BridgeError`], [`RegistryError`], [`StoreError`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, BridgeError>`]:
//!
//! ```rust
//! use medbridge::domain::{BridgeError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(BridgeError::NotFound("encounter H1/REG-1".to_string()))
//! }
//! assert!(example().is_err());
//! ```

pub mod chain;
pub mod encounter;
pub mod errors;
pub mod events;
pub mod history;
pub mod ids;
pub mod items;
pub mod result;

// Re-export commonly used types for convenience
pub use chain::{ChainChild, ChainRefs, ChainStage, DiagnosticCategory};
pub use encounter::{
    Diagnosis, DuplicateMarker, Encounter, EncounterStatus, ExternalRef, SyncState,
};
pub use errors::{BridgeError, RegistryError, StoreError};
pub use events::{
    DiagnosisInput, EncounterEvent, InboundEvent, ItemBatchEvent, Notification, SweepKind,
    VitalSigns, VitalSignsEvent,
};
pub use history::{History, Period};
pub use ids::{EncounterId, HospitalId, ItemId, RegistrationId};
pub use items::{ClinicalItem, ItemKind, SyncableItem};
pub use result::Result;
