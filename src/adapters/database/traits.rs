//! Datastore traits
//!
//! This module defines the traits that datastore adapters must implement
//! to persist encounters, syncable items, chain children and duplicate
//! markers. Encounter, child and marker writes are whole-record overwrites
//! (last writer wins). Item writes touch either the record or the sync
//! state, never both.

use crate::domain::chain::{ChainChild, ChainStage, DiagnosticCategory};
use crate::domain::encounter::{DuplicateMarker, Encounter, EncounterStatus};
use crate::domain::ids::{EncounterId, HospitalId, ItemId, RegistrationId};
use crate::domain::items::{ClinicalItem, ItemKind, SyncableItem};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Selection used by the reconciliation sweeps and the status command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncounterFilter {
    /// Only encounters in this status
    pub status: Option<EncounterStatus>,

    /// `Some(true)` for encounters holding an external id,
    /// `Some(false)` for encounters never accepted
    pub synced: Option<bool>,

    /// Only encounters of this hospital
    pub hospital_id: Option<HospitalId>,

    /// `Some(true)` for encounters changed since the registry accepted them
    pub pending_update: Option<bool>,
}

impl EncounterFilter {
    /// Finished encounters the registry has not accepted yet
    pub fn unsynced_finished() -> Self {
        Self {
            status: Some(EncounterStatus::Finished),
            synced: Some(false),
            ..Default::default()
        }
    }

    /// Finished encounters the registry holds an outdated copy of
    pub fn pending_updates() -> Self {
        Self {
            status: Some(EncounterStatus::Finished),
            synced: Some(true),
            pending_update: Some(true),
            ..Default::default()
        }
    }

    /// Whether an encounter passes the filter
    pub fn matches(&self, encounter: &Encounter) -> bool {
        encounter.active
            && self.status.map_or(true, |s| encounter.status == s)
            && self
                .synced
                .map_or(true, |synced| encounter.sync.is_synced() == synced)
            && self
                .hospital_id
                .as_ref()
                .map_or(true, |h| &encounter.hospital_id == h)
            && self
                .pending_update
                .map_or(true, |pending| encounter.sync.pending_update == pending)
    }
}

/// Encounter persistence
#[async_trait]
pub trait EncounterStore: Send + Sync {
    /// Load an encounter by local id
    async fn find_encounter(&self, id: &EncounterId) -> Result<Option<Encounter>>;

    /// Load an encounter by its secondary key
    async fn find_by_registration(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
    ) -> Result<Option<Encounter>>;

    /// Insert a new encounter
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the (hospital, registration) pair exists.
    async fn insert_encounter(&self, encounter: &Encounter) -> Result<()>;

    /// Overwrite an existing encounter
    async fn update_encounter(&self, encounter: &Encounter) -> Result<()>;

    /// List active encounters matching a filter, oldest first
    async fn list_encounters(&self, filter: &EncounterFilter) -> Result<Vec<Encounter>>;
}

/// Syncable item persistence
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// All items of one kind attached to an encounter
    async fn list_items(&self, encounter_id: &EncounterId, kind: ItemKind)
        -> Result<Vec<SyncableItem>>;

    /// Load an item by local id
    async fn find_item(&self, id: &ItemId) -> Result<Option<SyncableItem>>;

    /// Insert a new item
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the (encounter, kind, natural key)
    /// triple exists.
    async fn insert_item(&self, item: &SyncableItem) -> Result<()>;

    /// Store the sync state of a finished submission without touching the
    /// record, see [`SyncableItem::merge_sync`]
    async fn update_item_sync(&self, item: &SyncableItem) -> Result<()>;

    /// Replace the record of an existing item, keeping the sync state
    /// currently stored.
    ///
    /// Returns the updated item, or `None` when the record is unchanged.
    /// A registry id written between the caller's read and this call is
    /// preserved.
    async fn update_item_record(
        &self,
        id: &ItemId,
        record: &ClinicalItem,
    ) -> Result<Option<SyncableItem>>;

    /// Encounters with at least one item waiting for submission
    async fn encounters_with_pending_items(&self) -> Result<Vec<EncounterId>>;

    /// Pending item counts per kind
    async fn count_pending_items(&self) -> Result<BTreeMap<ItemKind, usize>>;
}

/// Diagnostic chain persistence
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Stage state for one diagnostic item
    async fn find_child(
        &self,
        ref_id: &ItemId,
        category: DiagnosticCategory,
        stage: ChainStage,
    ) -> Result<Option<ChainChild>>;

    /// Every stage stored for one diagnostic item
    async fn list_children(&self, ref_id: &ItemId) -> Result<Vec<ChainChild>>;

    /// Insert or overwrite a stage keyed by (ref_id, category, stage)
    async fn upsert_child(&self, child: &ChainChild) -> Result<()>;
}

/// Duplicate marker persistence
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    /// The active marker of an encounter, if any
    async fn find_active_marker(&self, encounter_id: &EncounterId)
        -> Result<Option<DuplicateMarker>>;

    async fn insert_marker(&self, marker: &DuplicateMarker) -> Result<()>;

    async fn update_marker(&self, marker: &DuplicateMarker) -> Result<()>;

    /// All active markers, oldest first
    async fn list_active_markers(&self) -> Result<Vec<DuplicateMarker>>;
}

/// Complete datastore used by the sync engine
#[async_trait]
pub trait SyncStore: EncounterStore + ItemStore + ChainStore + DuplicateStore {
    /// Test the datastore connection
    ///
    /// # Errors
    ///
    /// Returns an error if the connection test fails.
    async fn test_connection(&self) -> Result<()>;

    /// Backend name used in logs and status output
    fn backend_name(&self) -> &str;
}
