//! External system integrations for MedBridge.
//!
//! This module provides adapters for integrating with external systems:
//!
//! - [`registry`] - Remote FHIR registry (HTTP client, token cache, dry run)
//! - [`database`] - Datastore abstraction layer (trait-based) and in-memory store
//! - [`postgresql`] - PostgreSQL datastore
//! - [`notify`] - Outbound notification sinks
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing with scripted implementations. The sync core only sees
//! `Arc<dyn RegistryClient>`, `Arc<dyn SyncStore>` and `Arc<dyn NotificationSink>`.
//!
//! ```rust
//! use medbridge::adapters::database::{EncounterStore, MemoryStore};
//! use medbridge::domain::{Encounter, EncounterStatus, HospitalId, RegistrationId};
//!
//! # async fn example() -> medbridge::domain::Result<()> {
//! let store = MemoryStore::new();
//! let encounter = Encounter::new(
//!     HospitalId::new("RS-01").unwrap(),
//!     RegistrationId::new("REG-1").unwrap(),
//!     EncounterStatus::Arrived,
//! );
//! store.insert_encounter(&encounter).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod notify;
pub mod postgresql;
pub mod registry;
