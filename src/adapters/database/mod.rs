//! Datastore abstraction layer
//!
//! This module provides a trait-based abstraction for persistence,
//! allowing MedBridge to run against memory or PostgreSQL.

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::create_sync_store;
pub use memory::MemoryStore;
pub use traits::{
    ChainStore, DuplicateStore, EncounterFilter, EncounterStore, ItemStore, SyncStore,
};
