//! In-process datastore
//!
//! Backs tests, dry runs and single-node deployments that can afford to
//! lose state on restart. Secondary keys are enforced like the SQL schema
//! enforces them with unique indexes.

use super::traits::{
    ChainStore, DuplicateStore, EncounterFilter, EncounterStore, ItemStore, SyncStore,
};
use crate::domain::chain::{ChainChild, ChainStage, DiagnosticCategory};
use crate::domain::encounter::{DuplicateMarker, Encounter};
use crate::domain::errors::StoreError;
use crate::domain::ids::{EncounterId, HospitalId, ItemId, RegistrationId};
use crate::domain::items::{ClinicalItem, ItemKind, SyncableItem};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    encounters: HashMap<EncounterId, Encounter>,
    registrations: HashMap<(HospitalId, RegistrationId), EncounterId>,
    items: HashMap<ItemId, SyncableItem>,
    item_keys: HashMap<(EncounterId, ItemKind, String), ItemId>,
    children: HashMap<(ItemId, DiagnosticCategory, ChainStage), ChainChild>,
    markers: HashMap<String, DuplicateMarker>,
}

/// [`SyncStore`] kept in memory behind a `RwLock`
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EncounterStore for MemoryStore {
    async fn find_encounter(&self, id: &EncounterId) -> Result<Option<Encounter>> {
        Ok(self.state.read().await.encounters.get(id).cloned())
    }

    async fn find_by_registration(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
    ) -> Result<Option<Encounter>> {
        let state = self.state.read().await;
        Ok(state
            .registrations
            .get(&(hospital_id.clone(), registration_id.clone()))
            .and_then(|id| state.encounters.get(id))
            .cloned())
    }

    async fn insert_encounter(&self, encounter: &Encounter) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (
            encounter.hospital_id.clone(),
            encounter.registration_id.clone(),
        );
        if state.registrations.contains_key(&key) || state.encounters.contains_key(&encounter.id) {
            return Err(StoreError::Conflict(format!(
                "encounter {}/{} already exists",
                encounter.hospital_id, encounter.registration_id
            ))
            .into());
        }
        state.registrations.insert(key, encounter.id.clone());
        state
            .encounters
            .insert(encounter.id.clone(), encounter.clone());
        Ok(())
    }

    async fn update_encounter(&self, encounter: &Encounter) -> Result<()> {
        let mut state = self.state.write().await;
        match state.encounters.get_mut(&encounter.id) {
            Some(stored) => {
                *stored = encounter.clone();
                Ok(())
            }
            None => Err(StoreError::UpdateFailed(format!(
                "encounter {} does not exist",
                encounter.id
            ))
            .into()),
        }
    }

    async fn list_encounters(&self, filter: &EncounterFilter) -> Result<Vec<Encounter>> {
        let state = self.state.read().await;
        let mut encounters: Vec<Encounter> = state
            .encounters
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        encounters.sort_by_key(|e| e.created_at);
        Ok(encounters)
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn list_items(
        &self,
        encounter_id: &EncounterId,
        kind: ItemKind,
    ) -> Result<Vec<SyncableItem>> {
        let state = self.state.read().await;
        let mut items: Vec<SyncableItem> = state
            .items
            .values()
            .filter(|i| &i.encounter_id == encounter_id && i.kind == kind)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn find_item(&self, id: &ItemId) -> Result<Option<SyncableItem>> {
        Ok(self.state.read().await.items.get(id).cloned())
    }

    async fn insert_item(&self, item: &SyncableItem) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (
            item.encounter_id.clone(),
            item.kind,
            item.natural_key.clone(),
        );
        if state.item_keys.contains_key(&key) || state.items.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!(
                "{} item '{}' already exists for encounter {}",
                item.kind, item.natural_key, item.encounter_id
            ))
            .into());
        }
        state.item_keys.insert(key, item.id.clone());
        state.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn update_item_sync(&self, item: &SyncableItem) -> Result<()> {
        let mut state = self.state.write().await;
        match state.items.get_mut(&item.id) {
            Some(stored) => {
                stored.merge_sync(item);
                Ok(())
            }
            None => Err(StoreError::UpdateFailed(format!("item {} does not exist", item.id)).into()),
        }
    }

    async fn update_item_record(
        &self,
        id: &ItemId,
        record: &ClinicalItem,
    ) -> Result<Option<SyncableItem>> {
        let mut state = self.state.write().await;
        let Some(stored) = state.items.get_mut(id) else {
            return Err(StoreError::UpdateFailed(format!("item {id} does not exist")).into());
        };
        Ok(stored.apply_record(record.clone()).then(|| stored.clone()))
    }

    async fn encounters_with_pending_items(&self) -> Result<Vec<EncounterId>> {
        let state = self.state.read().await;
        let ids: BTreeSet<EncounterId> = state
            .items
            .values()
            .filter(|i| i.is_pending())
            .map(|i| i.encounter_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn count_pending_items(&self) -> Result<BTreeMap<ItemKind, usize>> {
        let state = self.state.read().await;
        let mut counts = BTreeMap::new();
        for item in state.items.values().filter(|i| i.is_pending()) {
            *counts.entry(item.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn find_child(
        &self,
        ref_id: &ItemId,
        category: DiagnosticCategory,
        stage: ChainStage,
    ) -> Result<Option<ChainChild>> {
        Ok(self
            .state
            .read()
            .await
            .children
            .get(&(ref_id.clone(), category, stage))
            .cloned())
    }

    async fn list_children(&self, ref_id: &ItemId) -> Result<Vec<ChainChild>> {
        let state = self.state.read().await;
        let mut children: Vec<ChainChild> = state
            .children
            .values()
            .filter(|c| &c.ref_id == ref_id)
            .cloned()
            .collect();
        children.sort_by_key(|c| c.stage);
        Ok(children)
    }

    async fn upsert_child(&self, child: &ChainChild) -> Result<()> {
        self.state.write().await.children.insert(
            (child.ref_id.clone(), child.category, child.stage),
            child.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl DuplicateStore for MemoryStore {
    async fn find_active_marker(
        &self,
        encounter_id: &EncounterId,
    ) -> Result<Option<DuplicateMarker>> {
        Ok(self
            .state
            .read()
            .await
            .markers
            .values()
            .find(|m| m.active && &m.encounter_id == encounter_id)
            .cloned())
    }

    async fn insert_marker(&self, marker: &DuplicateMarker) -> Result<()> {
        let mut state = self.state.write().await;
        if state.markers.contains_key(&marker.id) {
            return Err(StoreError::Conflict(format!("marker {} already exists", marker.id)).into());
        }
        let active_exists = state
            .markers
            .values()
            .any(|m| m.active && m.encounter_id == marker.encounter_id);
        if marker.active && active_exists {
            return Err(StoreError::Conflict(format!(
                "encounter {} already has an active marker",
                marker.encounter_id
            ))
            .into());
        }
        state.markers.insert(marker.id.clone(), marker.clone());
        Ok(())
    }

    async fn update_marker(&self, marker: &DuplicateMarker) -> Result<()> {
        let mut state = self.state.write().await;
        match state.markers.get_mut(&marker.id) {
            Some(stored) => {
                *stored = marker.clone();
                Ok(())
            }
            None => {
                Err(StoreError::UpdateFailed(format!("marker {} does not exist", marker.id)).into())
            }
        }
    }

    async fn list_active_markers(&self) -> Result<Vec<DuplicateMarker>> {
        let state = self.state.read().await;
        let mut markers: Vec<DuplicateMarker> =
            state.markers.values().filter(|m| m.active).cloned().collect();
        markers.sort_by_key(|m| m.created_at);
        Ok(markers)
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
