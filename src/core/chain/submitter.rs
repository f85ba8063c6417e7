//! Diagnostic chain submission
//!
//! Stages are written strictly in order. Every stage is persisted on its
//! own, so an interrupted chain resumes at its first stage without a
//! registry id.

use crate::adapters::registry::RegistryResponse;
use crate::core::chain::payload::build_stage_payload;
use crate::core::context::SyncContext;
use crate::core::pipeline::payload::PayloadContext;
use crate::core::pipeline::summary::ItemOutcome;
use crate::domain::chain::{ChainChild, ChainRefs, ChainStage, DiagnosticCategory};
use crate::domain::encounter::Encounter;
use crate::domain::errors::BridgeError;
use crate::domain::events::Notification;
use crate::domain::items::SyncableItem;
use crate::domain::Result;
use chrono::Utc;
use serde_json::{json, Value};

/// Sequences ServiceRequest, Specimen (lab only), Observation and
/// DiagnosticReport for one diagnostic item
pub struct ChainSubmitter {
    ctx: SyncContext,
}

impl ChainSubmitter {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Drives the chain of one lab or radiology item as far as it goes.
    ///
    /// Stages that already hold a registry id are reused unless the item
    /// itself changed since it was accepted.
    pub async fn submit_item(
        &self,
        encounter: &Encounter,
        mut item: SyncableItem,
    ) -> Result<ItemOutcome> {
        let category = DiagnosticCategory::from_kind(item.kind).ok_or_else(|| {
            BridgeError::Validation(format!("{} items have no diagnostic chain", item.kind))
        })?;
        let record = item
            .record
            .as_diagnostic()
            .cloned()
            .ok_or_else(|| {
                BridgeError::Validation(format!("item {} is not a diagnostic record", item.id))
            })?;
        let profile = self.ctx.directory.require(&encounter.hospital_id)?;
        let payload_ctx = PayloadContext::new(
            encounter,
            &profile.organization_id,
            self.ctx.directory.identifier_system(),
        );
        let rewrite = item.sync.pending_update;

        let mut refs = ChainRefs::default();
        let mut last: Option<(Value, Value)> = None;

        for &stage in category.stages() {
            let mut child = self
                .ctx
                .store
                .find_child(&item.id, category, stage)
                .await?
                .unwrap_or_else(|| ChainChild::new(item.id.clone(), category, stage));

            if child.sync.is_synced() && !rewrite {
                if let Some(id) = child.sync.external_id.as_deref() {
                    refs.set(stage, id);
                }
                continue;
            }

            let payload = build_stage_payload(stage, category, &record, &refs, &payload_ctx);
            let existing = child
                .sync
                .external_id
                .clone()
                .filter(|id| !id.trim().is_empty());
            let response = self
                .ctx
                .write_resource(
                    &encounter.hospital_id,
                    stage.resource_type(),
                    existing.as_deref(),
                    &payload,
                )
                .await;

            match response {
                Ok(RegistryResponse::Accepted(accepted)) => {
                    child.sync.record_accepted(
                        accepted.id.clone(),
                        accepted.resource_type.clone(),
                        payload.clone(),
                        accepted.body.clone(),
                    );
                    child.updated_at = Utc::now();
                    self.ctx.store.upsert_child(&child).await?;
                    tracing::info!(
                        item_id = %item.id,
                        natural_key = %item.natural_key,
                        stage = %stage,
                        external_id = %accepted.id,
                        "Chain stage accepted"
                    );
                    refs.set(stage, accepted.id);
                    last = Some((payload, accepted.body));
                }
                Ok(RegistryResponse::Rejected(rejection)) => {
                    let needs_fix = rejection.needs_upstream_fix();
                    let description = format!("{stage}: {}", rejection.message);
                    child.sync.record_rejection(
                        payload.clone(),
                        rejection.body.clone(),
                        rejection.message.clone(),
                        needs_fix,
                    );
                    child.updated_at = Utc::now();
                    self.ctx.store.upsert_child(&child).await?;

                    item.sync
                        .record_rejection(payload, rejection.body, description.clone(), needs_fix);
                    item.updated_at = Utc::now();
                    self.ctx.store.update_item_sync(&item).await?;
                    tracing::warn!(
                        item_id = %item.id,
                        natural_key = %item.natural_key,
                        stage = %stage,
                        reason = %rejection.message,
                        "Chain stage rejected"
                    );
                    self.notify(encounter, &item, &refs, Some(description.clone()))
                        .await;
                    return Ok(ItemOutcome::Rejected(description));
                }
                Err(e) => {
                    child.sync.record_failure(Some(payload), e.to_string());
                    child.updated_at = Utc::now();
                    self.ctx.store.upsert_child(&child).await?;

                    item.sync.record_failure(None, format!("{stage}: {e}"));
                    item.updated_at = Utc::now();
                    self.ctx.store.update_item_sync(&item).await?;
                    tracing::warn!(
                        item_id = %item.id,
                        natural_key = %item.natural_key,
                        stage = %stage,
                        error = %e,
                        "Chain halted"
                    );
                    return Err(e);
                }
            }
        }

        let report_id = match refs.get(ChainStage::DiagnosticReport) {
            Some(id) => id.to_string(),
            None => return Ok(ItemOutcome::Incomplete(ChainStage::DiagnosticReport)),
        };
        let (request, response) = last.unwrap_or((Value::Null, Value::Null));
        item.sync.record_accepted(
            report_id.clone(),
            ChainStage::DiagnosticReport.resource_type(),
            request,
            response,
        );
        item.updated_at = Utc::now();
        self.ctx.store.update_item_sync(&item).await?;
        self.notify(encounter, &item, &refs, None).await;

        Ok(ItemOutcome::Accepted(report_id))
    }

    async fn notify(
        &self,
        encounter: &Encounter,
        item: &SyncableItem,
        refs: &ChainRefs,
        description: Option<String>,
    ) {
        let notification = Notification::new(
            item.kind.as_str(),
            encounter.hospital_id.clone(),
            encounter.registration_id.clone(),
        )
        .with_natural_key(item.natural_key.clone())
        .with_outcome(item.sync.external_id.clone(), description)
        .with_extra(json!({ "chain": refs }));
        self.ctx.notify(notification).await;
    }
}
