//! All pipelines of an engine, one per item kind

use crate::config::SyncConfig;
use crate::core::chain::ChainSubmitter;
use crate::core::context::SyncContext;
use crate::core::pipeline::summary::PipelineSummary;
use crate::core::pipeline::sync::SyncPipeline;
use crate::domain::encounter::Encounter;
use crate::domain::errors::BridgeError;
use crate::domain::items::{ClinicalItem, ConditionRecord, ItemKind};
use crate::domain::Result;
use std::sync::Arc;

/// Natural key of the condition synthesized for uncoded encounters
pub const DEFAULT_CONDITION_KEY: &str = "default-condition";

pub struct PipelineSet {
    ctx: SyncContext,
    pipelines: Vec<SyncPipeline>,
    default_condition_code: String,
    default_condition_name: String,
}

impl PipelineSet {
    pub fn new(ctx: SyncContext, sync: &SyncConfig) -> Self {
        let chain = Arc::new(ChainSubmitter::new(ctx.clone()));
        let pipelines = ItemKind::ALL
            .iter()
            .map(|&kind| SyncPipeline::new(kind, ctx.clone(), Arc::clone(&chain)))
            .collect();
        Self {
            ctx,
            pipelines,
            default_condition_code: sync.default_condition_code.clone(),
            default_condition_name: sync.default_condition_name.clone(),
        }
    }

    pub fn get(&self, kind: ItemKind) -> Result<&SyncPipeline> {
        self.pipelines
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or_else(|| BridgeError::Validation(format!("no pipeline for {kind} items")))
    }

    /// Submits every category of the encounter.
    ///
    /// A category that fails as a whole is logged and counted; the other
    /// categories still run.
    pub async fn submit_all(&self, encounter: &Encounter) -> PipelineSummary {
        let mut summary = PipelineSummary::new();
        for pipeline in &self.pipelines {
            match pipeline.submit(encounter).await {
                Ok(result) => summary.merge(result),
                Err(e) => {
                    tracing::error!(
                        encounter_id = %encounter.id,
                        kind = %pipeline.kind(),
                        error = %e,
                        "Category submission failed"
                    );
                    summary.failed += 1;
                    summary.errors.push(format!("{}: {e}", pipeline.kind()));
                }
            }
        }
        summary
    }

    /// Adds a general examination condition to an encounter without
    /// diagnosis codes or condition items
    pub async fn ensure_default_condition(&self, encounter: &Encounter) -> Result<bool> {
        if !encounter.diagnoses.is_empty() {
            return Ok(false);
        }
        let conditions = self
            .ctx
            .store
            .list_items(&encounter.id, ItemKind::Condition)
            .await?;
        if !conditions.is_empty() {
            return Ok(false);
        }

        let record = ClinicalItem::Condition(ConditionRecord {
            pmr_id: DEFAULT_CONDITION_KEY.to_string(),
            code: self.default_condition_code.clone(),
            name: self.default_condition_name.clone(),
            recorded_at: encounter.history.finished.end,
        });
        self.get(ItemKind::Condition)?
            .ingest(encounter, vec![record])
            .await?;
        tracing::info!(
            encounter_id = %encounter.id,
            code = %self.default_condition_code,
            "Default condition added"
        );
        Ok(true)
    }

    /// Runs after the encounter itself was accepted
    pub async fn cascade(&self, encounter: &Encounter) -> PipelineSummary {
        let mut summary = PipelineSummary::new();
        if let Err(e) = self.ensure_default_condition(encounter).await {
            tracing::warn!(
                encounter_id = %encounter.id,
                error = %e,
                "Failed to add default condition"
            );
            summary.errors.push(format!("default condition: {e}"));
        }
        summary.merge(self.submit_all(encounter).await);
        summary
    }
}
