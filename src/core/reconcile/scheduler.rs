//! Reconciliation sweeps
//!
//! Sweeps are triggered from outside (CLI, HTTP or a queue message) and
//! work purely over persisted state. Each sweep walks encounters one at a
//! time and checks the shutdown signal between encounters.

use crate::adapters::database::EncounterFilter;
use crate::core::context::SyncContext;
use crate::core::duplicate::DuplicateReconciler;
use crate::core::lifecycle::submitter::{EncounterOutcome, EncounterSubmitter};
use crate::core::pipeline::PipelineSet;
use crate::core::reconcile::summary::{SweepError, SweepErrorType, SweepSummary};
use crate::domain::events::SweepKind;
use crate::domain::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

pub struct ReconciliationScheduler {
    ctx: SyncContext,
    encounters: Arc<EncounterSubmitter>,
    pipelines: Arc<PipelineSet>,
    duplicates: Arc<DuplicateReconciler>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ReconciliationScheduler {
    pub fn new(
        ctx: SyncContext,
        encounters: Arc<EncounterSubmitter>,
        pipelines: Arc<PipelineSet>,
        duplicates: Arc<DuplicateReconciler>,
    ) -> Self {
        Self {
            ctx,
            encounters,
            pipelines,
            duplicates,
            shutdown: None,
        }
    }

    /// Stops sweeps between encounters once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Runs one sweep. `All` resolves duplicates first, then encounters,
    /// then items, and stops early on shutdown.
    pub async fn run(&self, kind: SweepKind) -> Result<SweepSummary> {
        let started = Instant::now();
        tracing::info!(sweep = %kind, "Reconciliation started");

        let summary = match kind {
            SweepKind::Duplicates => self.sweep_duplicates().await?,
            SweepKind::Encounters => self.sweep_encounters().await?,
            SweepKind::Items => self.sweep_items().await?,
            SweepKind::All => {
                let mut all = SweepSummary::new(SweepKind::All);
                all.merge(self.sweep_duplicates().await?);
                if !all.interrupted {
                    all.merge(self.sweep_encounters().await?);
                }
                if !all.interrupted {
                    all.merge(self.sweep_items().await?);
                }
                all
            }
        };

        let summary = summary.with_duration(started.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Active duplicate markers: resubmit, then cascade every recovered
    /// encounter into its item categories
    pub async fn sweep_duplicates(&self) -> Result<SweepSummary> {
        let (mut summary, resolved) = self.duplicates.sweep(self.shutdown.as_ref()).await?;
        for encounter in resolved {
            if self.is_shutting_down() {
                summary.interrupted = true;
                break;
            }
            summary.items.merge(self.pipelines.cascade(&encounter).await);
        }
        Ok(summary)
    }

    /// Finished encounters without an external id, or with changes the
    /// registry has not seen: submit, then cascade into every item category
    /// on acceptance
    pub async fn sweep_encounters(&self) -> Result<SweepSummary> {
        let mut summary = SweepSummary::new(SweepKind::Encounters);
        let mut candidates = self
            .ctx
            .store
            .list_encounters(&EncounterFilter::unsynced_finished())
            .await?;
        candidates.extend(
            self.ctx
                .store
                .list_encounters(&EncounterFilter::pending_updates())
                .await?,
        );
        tracing::info!(candidates = candidates.len(), "Encounter sweep started");

        for encounter in candidates {
            if self.is_shutting_down() {
                summary.interrupted = true;
                break;
            }
            summary.encounters_examined += 1;

            if !self.ctx.directory.is_enabled(&encounter.hospital_id) {
                summary.encounters_skipped += 1;
                continue;
            }

            let submission = match self.encounters.submit(&encounter).await {
                Ok(submission) => submission,
                Err(e) => {
                    summary.encounters_failed += 1;
                    tracing::warn!(
                        encounter_id = %encounter.id,
                        registration_id = %encounter.registration_id,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Encounter submission failed"
                    );
                    summary.add_error(
                        SweepError::new(SweepErrorType::Encounter, e.to_string())
                            .with_context(format!("encounter={}", encounter.id)),
                    );
                    continue;
                }
            };

            match &submission.outcome {
                EncounterOutcome::Accepted(_) => {
                    summary.encounters_submitted += 1;
                    summary
                        .items
                        .merge(self.pipelines.cascade(&submission.encounter).await);
                }
                EncounterOutcome::NotReady(reason) => {
                    summary.encounters_not_ready += 1;
                    tracing::debug!(
                        encounter_id = %encounter.id,
                        reason,
                        "Encounter not ready"
                    );
                }
                EncounterOutcome::Duplicate { new_marker } => {
                    if *new_marker {
                        summary.duplicates_recorded += 1;
                    }
                }
                EncounterOutcome::Rejected(message) => {
                    summary.encounters_failed += 1;
                    summary.add_error(
                        SweepError::new(SweepErrorType::Encounter, message.clone())
                            .with_context(format!("encounter={}", encounter.id)),
                    );
                }
                EncounterOutcome::AlreadySynced(_) | EncounterOutcome::Skipped(_) => {
                    summary.encounters_skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Synced encounters with unsynced items: re-drive the item pipelines
    /// only, the encounter itself is never resubmitted here
    pub async fn sweep_items(&self) -> Result<SweepSummary> {
        let mut summary = SweepSummary::new(SweepKind::Items);
        let encounter_ids = self.ctx.store.encounters_with_pending_items().await?;
        tracing::info!(candidates = encounter_ids.len(), "Item sweep started");

        for encounter_id in encounter_ids {
            if self.is_shutting_down() {
                summary.interrupted = true;
                break;
            }

            let encounter = match self.ctx.store.find_encounter(&encounter_id).await {
                Ok(Some(encounter)) => encounter,
                Ok(None) => continue,
                Err(e) => {
                    summary.add_error(
                        SweepError::new(SweepErrorType::Storage, e.to_string())
                            .with_context(format!("encounter={encounter_id}")),
                    );
                    continue;
                }
            };
            summary.encounters_examined += 1;

            if !encounter.sync.is_synced() || !self.ctx.directory.is_enabled(&encounter.hospital_id)
            {
                summary.encounters_skipped += 1;
                continue;
            }

            let items = self.pipelines.submit_all(&encounter).await;
            if !items.is_successful() {
                summary.add_error(
                    SweepError::new(
                        SweepErrorType::Items,
                        format!("{} item(s) failed", items.failed),
                    )
                    .with_context(format!("encounter={encounter_id}")),
                );
            }
            summary.items.merge(items);
        }

        Ok(summary)
    }
}
