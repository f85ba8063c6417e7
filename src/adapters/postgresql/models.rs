//! PostgreSQL row models
//!
//! Each table stores the full domain record as JSONB plus the columns
//! needed for lookups and sweep selection. These rows are built from the
//! domain types on write and decoded from the `document` column on read.

use crate::domain::chain::ChainChild;
use crate::domain::encounter::{DuplicateMarker, Encounter};
use crate::domain::errors::StoreError;
use crate::domain::items::SyncableItem;
use crate::domain::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_postgres::Row;

/// Row of the `encounters` table
#[derive(Debug, Clone)]
pub struct EncounterRow {
    pub id: String,
    pub hospital_id: String,
    pub registration_id: String,
    pub status: String,
    pub synced: bool,
    pub active: bool,
    pub document: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EncounterRow {
    pub fn from_domain(encounter: &Encounter) -> Result<Self> {
        Ok(Self {
            id: encounter.id.to_string(),
            hospital_id: encounter.hospital_id.to_string(),
            registration_id: encounter.registration_id.to_string(),
            status: encounter.status.as_str().to_string(),
            synced: encounter.sync.is_synced(),
            active: encounter.active,
            document: serde_json::to_value(encounter)?,
            created_at: encounter.created_at,
            updated_at: encounter.updated_at,
        })
    }
}

/// Row of the `sync_items` table
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: String,
    pub encounter_id: String,
    pub kind: String,
    pub natural_key: String,
    pub pending: bool,
    pub document: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemRow {
    pub fn from_domain(item: &SyncableItem) -> Result<Self> {
        Ok(Self {
            id: item.id.to_string(),
            encounter_id: item.encounter_id.to_string(),
            kind: item.kind.as_str().to_string(),
            natural_key: item.natural_key.clone(),
            pending: item.is_pending(),
            document: serde_json::to_value(item)?,
            created_at: item.created_at,
            updated_at: item.updated_at,
        })
    }
}

/// Row of the `chain_children` table
#[derive(Debug, Clone)]
pub struct ChainChildRow {
    pub ref_id: String,
    pub category: String,
    pub stage: String,
    pub id: String,
    pub document: Value,
    pub updated_at: DateTime<Utc>,
}

impl ChainChildRow {
    pub fn from_domain(child: &ChainChild) -> Result<Self> {
        Ok(Self {
            ref_id: child.ref_id.to_string(),
            category: child.category.as_str().to_string(),
            stage: child.stage.as_str().to_string(),
            id: child.id.to_string(),
            document: serde_json::to_value(child)?,
            updated_at: child.updated_at,
        })
    }
}

/// Row of the `duplicate_markers` table
#[derive(Debug, Clone)]
pub struct MarkerRow {
    pub id: String,
    pub encounter_id: String,
    pub active: bool,
    pub document: Value,
    pub created_at: DateTime<Utc>,
}

impl MarkerRow {
    pub fn from_domain(marker: &DuplicateMarker) -> Result<Self> {
        Ok(Self {
            id: marker.id.clone(),
            encounter_id: marker.encounter_id.to_string(),
            active: marker.active,
            document: serde_json::to_value(marker)?,
            created_at: marker.created_at,
        })
    }
}

/// Decodes the `document` column of a row
pub fn decode_document<T: DeserializeOwned>(row: &Row) -> Result<T> {
    let document: Value = row
        .try_get("document")
        .map_err(|e| StoreError::DeserializationFailed(format!("missing document column: {e}")))?;
    serde_json::from_value(document)
        .map_err(|e| StoreError::DeserializationFailed(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encounter::EncounterStatus;
    use crate::domain::ids::{HospitalId, RegistrationId};
    use crate::domain::items::{ClinicalItem, ItemKind, VitalSignCategory, VitalSignRecord};

    #[test]
    fn test_encounter_row_columns() {
        let encounter = Encounter::new(
            HospitalId::new("H1").unwrap(),
            RegistrationId::new("R1").unwrap(),
            EncounterStatus::InProgress,
        );
        let row = EncounterRow::from_domain(&encounter).unwrap();
        assert_eq!(row.status, "inprogress");
        assert!(!row.synced);
        let back: Encounter = serde_json::from_value(row.document).unwrap();
        assert_eq!(back, encounter);
    }

    #[test]
    fn test_item_row_pending_flag() {
        let item = SyncableItem::new(
            crate::domain::ids::EncounterId::generate(),
            ClinicalItem::Observation(VitalSignRecord {
                category: VitalSignCategory::HeartRate,
                value: 80.0,
                measured_at: None,
            }),
        );
        let row = ItemRow::from_domain(&item).unwrap();
        assert!(row.pending);
        assert_eq!(row.kind, ItemKind::Observation.as_str());
        assert_eq!(row.natural_key, "heart_rate");
    }
}
