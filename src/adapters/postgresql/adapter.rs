//! PostgreSQL adapter implementing the datastore traits

use crate::adapters::database::traits::{
    ChainStore, DuplicateStore, EncounterFilter, EncounterStore, ItemStore, SyncStore,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    decode_document, ChainChildRow, EncounterRow, ItemRow, MarkerRow,
};
use crate::domain::chain::{ChainChild, ChainStage, DiagnosticCategory};
use crate::domain::encounter::{DuplicateMarker, Encounter};
use crate::domain::errors::StoreError;
use crate::domain::ids::{EncounterId, HospitalId, ItemId, RegistrationId};
use crate::domain::items::{ClinicalItem, ItemKind, SyncableItem};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// PostgreSQL implementation of [`SyncStore`]
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    /// Applies `change` to the stored item under a row lock and writes it
    /// back when it reports a change
    async fn modify_item<F>(&self, id: &ItemId, change: F) -> Result<Option<SyncableItem>>
    where
        F: FnOnce(&mut SyncableItem) -> bool + Send,
    {
        let query_failed = |e: tokio_postgres::Error| StoreError::QueryFailed(e.to_string());
        let mut conn = self.client.get_connection().await?;
        let tx = conn.transaction().await.map_err(query_failed)?;

        let rows = tx
            .query(
                "SELECT document FROM sync_items WHERE id = $1 FOR UPDATE",
                &[&id.as_str()],
            )
            .await
            .map_err(query_failed)?;
        let Some(row) = rows.first() else {
            return Err(StoreError::UpdateFailed(format!("item {id} does not exist")).into());
        };
        let mut item: SyncableItem = decode_document(row)?;
        if !change(&mut item) {
            return Ok(None);
        }

        let row = ItemRow::from_domain(&item)?;
        tx.execute(
            "UPDATE sync_items SET pending = $2, document = $3, updated_at = $4 WHERE id = $1",
            &[&row.id, &row.pending, &row.document, &row.updated_at],
        )
        .await
        .map_err(query_failed)?;
        tx.commit().await.map_err(query_failed)?;
        Ok(Some(item))
    }

    fn decode_all<T: serde::de::DeserializeOwned>(rows: &[tokio_postgres::Row]) -> Result<Vec<T>> {
        rows.iter().map(decode_document).collect()
    }
}

#[async_trait]
impl EncounterStore for PostgreSQLAdapter {
    async fn find_encounter(&self, id: &EncounterId) -> Result<Option<Encounter>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM encounters WHERE id = $1",
                &[&id.as_str()],
            )
            .await?;
        rows.first().map(decode_document).transpose()
    }

    async fn find_by_registration(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
    ) -> Result<Option<Encounter>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM encounters WHERE hospital_id = $1 AND registration_id = $2",
                &[&hospital_id.as_str(), &registration_id.as_str()],
            )
            .await?;
        rows.first().map(decode_document).transpose()
    }

    async fn insert_encounter(&self, encounter: &Encounter) -> Result<()> {
        let row = EncounterRow::from_domain(encounter)?;
        self.client
            .execute(
                r#"
                INSERT INTO encounters (
                    id, hospital_id, registration_id, status, synced, active,
                    document, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                &[
                    &row.id,
                    &row.hospital_id,
                    &row.registration_id,
                    &row.status,
                    &row.synced,
                    &row.active,
                    &row.document,
                    &row.created_at,
                    &row.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_encounter(&self, encounter: &Encounter) -> Result<()> {
        let row = EncounterRow::from_domain(encounter)?;
        let updated = self
            .client
            .execute(
                r#"
                UPDATE encounters
                SET status = $2, synced = $3, active = $4, document = $5, updated_at = $6
                WHERE id = $1
                "#,
                &[
                    &row.id,
                    &row.status,
                    &row.synced,
                    &row.active,
                    &row.document,
                    &row.updated_at,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(StoreError::UpdateFailed(format!(
                "encounter {} does not exist",
                encounter.id
            ))
            .into());
        }
        Ok(())
    }

    async fn list_encounters(&self, filter: &EncounterFilter) -> Result<Vec<Encounter>> {
        let status = filter.status.map(|s| s.as_str().to_string());
        let hospital = filter.hospital_id.as_ref().map(|h| h.to_string());
        let rows = self
            .client
            .query(
                r#"
                SELECT document FROM encounters
                WHERE active
                  AND ($1::TEXT IS NULL OR status = $1)
                  AND ($2::BOOLEAN IS NULL OR synced = $2)
                  AND ($3::TEXT IS NULL OR hospital_id = $3)
                  AND ($4::BOOLEAN IS NULL
                       OR COALESCE((document->'sync'->>'pendingUpdate')::BOOLEAN, FALSE) = $4)
                ORDER BY created_at
                "#,
                &[&status, &filter.synced, &hospital, &filter.pending_update],
            )
            .await?;
        Self::decode_all(&rows)
    }
}

#[async_trait]
impl ItemStore for PostgreSQLAdapter {
    async fn list_items(
        &self,
        encounter_id: &EncounterId,
        kind: ItemKind,
    ) -> Result<Vec<SyncableItem>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM sync_items WHERE encounter_id = $1 AND kind = $2 ORDER BY created_at",
                &[&encounter_id.as_str(), &kind.as_str()],
            )
            .await?;
        Self::decode_all(&rows)
    }

    async fn find_item(&self, id: &ItemId) -> Result<Option<SyncableItem>> {
        let rows = self
            .client
            .query("SELECT document FROM sync_items WHERE id = $1", &[&id.as_str()])
            .await?;
        rows.first().map(decode_document).transpose()
    }

    async fn insert_item(&self, item: &SyncableItem) -> Result<()> {
        let row = ItemRow::from_domain(item)?;
        self.client
            .execute(
                r#"
                INSERT INTO sync_items (
                    id, encounter_id, kind, natural_key, pending,
                    document, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &row.id,
                    &row.encounter_id,
                    &row.kind,
                    &row.natural_key,
                    &row.pending,
                    &row.document,
                    &row.created_at,
                    &row.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_item_sync(&self, item: &SyncableItem) -> Result<()> {
        self.modify_item(&item.id, |stored| {
            stored.merge_sync(item);
            true
        })
        .await
        .map(|_| ())
    }

    async fn update_item_record(
        &self,
        id: &ItemId,
        record: &ClinicalItem,
    ) -> Result<Option<SyncableItem>> {
        let record = record.clone();
        self.modify_item(id, move |item| item.apply_record(record))
            .await
    }

    async fn encounters_with_pending_items(&self) -> Result<Vec<EncounterId>> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT encounter_id FROM sync_items WHERE pending ORDER BY encounter_id",
                &[],
            )
            .await?;
        rows.iter()
            .map(|row| {
                let id: String = row.get("encounter_id");
                EncounterId::new(id).map_err(|e| StoreError::DeserializationFailed(e).into())
            })
            .collect()
    }

    async fn count_pending_items(&self) -> Result<BTreeMap<ItemKind, usize>> {
        let rows = self
            .client
            .query(
                "SELECT kind, COUNT(*) AS pending FROM sync_items WHERE pending GROUP BY kind",
                &[],
            )
            .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let kind: String = row.get("kind");
            let count: i64 = row.get("pending");
            let kind = kind
                .parse::<ItemKind>()
                .map_err(StoreError::DeserializationFailed)?;
            counts.insert(kind, count as usize);
        }
        Ok(counts)
    }
}

#[async_trait]
impl ChainStore for PostgreSQLAdapter {
    async fn find_child(
        &self,
        ref_id: &ItemId,
        category: DiagnosticCategory,
        stage: ChainStage,
    ) -> Result<Option<ChainChild>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM chain_children WHERE ref_id = $1 AND category = $2 AND stage = $3",
                &[&ref_id.as_str(), &category.as_str(), &stage.as_str()],
            )
            .await?;
        rows.first().map(decode_document).transpose()
    }

    async fn list_children(&self, ref_id: &ItemId) -> Result<Vec<ChainChild>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM chain_children WHERE ref_id = $1",
                &[&ref_id.as_str()],
            )
            .await?;
        let mut children: Vec<ChainChild> = Self::decode_all(&rows)?;
        children.sort_by_key(|c| c.stage);
        Ok(children)
    }

    async fn upsert_child(&self, child: &ChainChild) -> Result<()> {
        let row = ChainChildRow::from_domain(child)?;
        self.client
            .execute(
                r#"
                INSERT INTO chain_children (ref_id, category, stage, id, document, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (ref_id, category, stage) DO UPDATE SET
                    document = EXCLUDED.document,
                    updated_at = EXCLUDED.updated_at
                "#,
                &[
                    &row.ref_id,
                    &row.category,
                    &row.stage,
                    &row.id,
                    &row.document,
                    &row.updated_at,
                ],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DuplicateStore for PostgreSQLAdapter {
    async fn find_active_marker(
        &self,
        encounter_id: &EncounterId,
    ) -> Result<Option<DuplicateMarker>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM duplicate_markers WHERE encounter_id = $1 AND active",
                &[&encounter_id.as_str()],
            )
            .await?;
        rows.first().map(decode_document).transpose()
    }

    async fn insert_marker(&self, marker: &DuplicateMarker) -> Result<()> {
        let row = MarkerRow::from_domain(marker)?;
        self.client
            .execute(
                r#"
                INSERT INTO duplicate_markers (id, encounter_id, active, document, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[
                    &row.id,
                    &row.encounter_id,
                    &row.active,
                    &row.document,
                    &row.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_marker(&self, marker: &DuplicateMarker) -> Result<()> {
        let row = MarkerRow::from_domain(marker)?;
        let updated = self
            .client
            .execute(
                "UPDATE duplicate_markers SET active = $2, document = $3 WHERE id = $1",
                &[&row.id, &row.active, &row.document],
            )
            .await?;
        if updated == 0 {
            return Err(
                StoreError::UpdateFailed(format!("marker {} does not exist", marker.id)).into(),
            );
        }
        Ok(())
    }

    async fn list_active_markers(&self) -> Result<Vec<DuplicateMarker>> {
        let rows = self
            .client
            .query(
                "SELECT document FROM duplicate_markers WHERE active ORDER BY created_at",
                &[],
            )
            .await?;
        Self::decode_all(&rows)
    }
}

#[async_trait]
impl SyncStore for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    fn backend_name(&self) -> &str {
        "postgresql"
    }
}
