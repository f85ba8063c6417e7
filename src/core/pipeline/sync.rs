//! Generic match-or-insert and create-or-update pipeline
//!
//! One [`SyncPipeline`] exists per item kind. Lab and radiology pipelines
//! hand each item to the [`ChainSubmitter`] instead of writing a single
//! resource.

use crate::adapters::registry::RegistryResponse;
use crate::core::chain::ChainSubmitter;
use crate::core::context::SyncContext;
use crate::core::pipeline::payload::{build_item_payload, PayloadContext};
use crate::core::pipeline::summary::{ItemOutcome, PipelineSummary};
use crate::domain::encounter::Encounter;
use crate::domain::errors::BridgeError;
use crate::domain::events::Notification;
use crate::domain::items::{ClinicalItem, ItemKind, SyncableItem};
use crate::domain::Result;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SyncPipeline {
    kind: ItemKind,
    ctx: SyncContext,
    chain: Arc<ChainSubmitter>,
}

impl SyncPipeline {
    pub fn new(kind: ItemKind, ctx: SyncContext, chain: Arc<ChainSubmitter>) -> Self {
        Self { kind, ctx, chain }
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Matches incoming records against stored items by natural key.
    ///
    /// The whole batch is validated before anything is written. A matched
    /// item keeps its id and registry id; an unmatched record becomes a new
    /// unsynced item.
    pub async fn ingest(
        &self,
        encounter: &Encounter,
        records: Vec<ClinicalItem>,
    ) -> Result<PipelineSummary> {
        for record in &records {
            if record.kind() != self.kind {
                return Err(BridgeError::Validation(format!(
                    "{} record '{}' sent to the {} pipeline",
                    record.kind(),
                    record.natural_key(),
                    self.kind
                )));
            }
            record.validate().map_err(BridgeError::Validation)?;
        }

        let mut existing: HashMap<String, SyncableItem> = self
            .ctx
            .store
            .list_items(&encounter.id, self.kind)
            .await?
            .into_iter()
            .map(|item| (item.natural_key.clone(), item))
            .collect();

        let mut summary = PipelineSummary::new();
        for record in records {
            let key = record.natural_key();
            match existing.get_mut(&key) {
                Some(item) => {
                    if let Some(updated) =
                        self.ctx.store.update_item_record(&item.id, &record).await?
                    {
                        *item = updated;
                        summary.updated += 1;
                        tracing::debug!(
                            encounter_id = %encounter.id,
                            kind = %self.kind,
                            natural_key = %key,
                            pending_update = item.sync.pending_update,
                            "Item updated"
                        );
                    } else {
                        summary.unchanged += 1;
                    }
                }
                None => {
                    let item = SyncableItem::new(encounter.id.clone(), record);
                    self.ctx.store.insert_item(&item).await?;
                    summary.inserted += 1;
                    tracing::debug!(
                        encounter_id = %encounter.id,
                        kind = %self.kind,
                        natural_key = %key,
                        "Item inserted"
                    );
                    existing.insert(key, item);
                }
            }
        }

        tracing::info!(
            encounter_id = %encounter.id,
            kind = %self.kind,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Items ingested"
        );
        Ok(summary)
    }

    /// Submits every pending item of the encounter.
    ///
    /// Items are written one after the other. A failed item is counted and
    /// logged and never stops its siblings.
    pub async fn submit(&self, encounter: &Encounter) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::new();

        if !self.ctx.directory.is_enabled(&encounter.hospital_id) {
            tracing::debug!(
                hospital_id = %encounter.hospital_id,
                kind = %self.kind,
                "Hospital disabled, items not submitted"
            );
            return Ok(summary);
        }
        if !encounter.sync.is_synced() {
            tracing::debug!(
                encounter_id = %encounter.id,
                kind = %self.kind,
                "Encounter not registered yet, items wait"
            );
            return Ok(summary);
        }

        let pending: Vec<SyncableItem> = self
            .ctx
            .store
            .list_items(&encounter.id, self.kind)
            .await?
            .into_iter()
            .filter(SyncableItem::is_pending)
            .collect();

        for item in pending {
            let natural_key = item.natural_key.clone();
            match self.submit_item(encounter, item).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    tracing::warn!(
                        encounter_id = %encounter.id,
                        kind = %self.kind,
                        natural_key = %natural_key,
                        error = %e,
                        "Item submission failed"
                    );
                    summary.record_failure(self.kind, &natural_key, e);
                }
            }
        }

        Ok(summary)
    }

    async fn submit_item(&self, encounter: &Encounter, item: SyncableItem) -> Result<ItemOutcome> {
        let Some(_claim) = self.ctx.guard.try_claim(item.id.as_str()) else {
            return Ok(ItemOutcome::Skipped("submission in progress elsewhere"));
        };

        // Another pass may have finished this item since it was listed
        let item = match self.ctx.store.find_item(&item.id).await? {
            Some(item) if item.is_pending() => item,
            _ => return Ok(ItemOutcome::Skipped("no longer pending")),
        };

        if self.kind.is_chained() {
            return self.chain.submit_item(encounter, item).await;
        }
        self.submit_flat(encounter, item).await
    }

    async fn submit_flat(&self, encounter: &Encounter, mut item: SyncableItem) -> Result<ItemOutcome> {
        let profile = self.ctx.directory.require(&encounter.hospital_id)?;
        let payload_ctx = PayloadContext::new(
            encounter,
            &profile.organization_id,
            self.ctx.directory.identifier_system(),
        );
        let payload = build_item_payload(&item.record, &payload_ctx).ok_or_else(|| {
            BridgeError::Validation(format!("{} items have no single payload", self.kind))
        })?;

        let existing = item.sync.external_id.clone().filter(|id| !id.trim().is_empty());
        let response = self
            .ctx
            .write_resource(
                &encounter.hospital_id,
                self.kind.resource_type(),
                existing.as_deref(),
                &payload,
            )
            .await;

        let outcome = match response {
            Ok(RegistryResponse::Accepted(accepted)) => {
                item.sync.record_accepted(
                    accepted.id.clone(),
                    accepted.resource_type,
                    payload,
                    accepted.body,
                );
                tracing::info!(
                    encounter_id = %encounter.id,
                    kind = %self.kind,
                    natural_key = %item.natural_key,
                    external_id = %accepted.id,
                    updated = existing.is_some(),
                    "Item accepted"
                );
                ItemOutcome::Accepted(accepted.id)
            }
            Ok(RegistryResponse::Rejected(rejection)) => {
                let needs_fix = rejection.needs_upstream_fix();
                item.sync.record_rejection(
                    payload,
                    rejection.body,
                    rejection.message.clone(),
                    needs_fix,
                );
                tracing::warn!(
                    encounter_id = %encounter.id,
                    kind = %self.kind,
                    natural_key = %item.natural_key,
                    reason = %rejection.message,
                    "Item rejected"
                );
                ItemOutcome::Rejected(rejection.message)
            }
            Err(e) => {
                item.sync.record_failure(Some(payload), e.to_string());
                item.updated_at = Utc::now();
                self.ctx.store.update_item_sync(&item).await?;
                return Err(e);
            }
        };

        item.updated_at = Utc::now();
        self.ctx.store.update_item_sync(&item).await?;

        let notification = Notification::new(
            self.kind.as_str(),
            encounter.hospital_id.clone(),
            encounter.registration_id.clone(),
        )
        .with_natural_key(item.natural_key.clone())
        .with_outcome(item.sync.external_id.clone(), item.sync.description.clone())
        .with_extra(json!({
            "itemId": item.id,
            "resourceType": self.kind.resource_type(),
        }));
        self.ctx.notify(notification).await;

        Ok(outcome)
    }
}
