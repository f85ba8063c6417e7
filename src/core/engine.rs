//! Sync engine - entry point for inbound events and sweeps
//!
//! The engine wires the datastore, the registry client and the notification
//! sink into the lifecycle service, the per-category pipelines, the
//! duplicate reconciler and the scheduler. HTTP handlers, the NDJSON
//! consumer and the CLI all go through it.

use crate::adapters::database::{create_sync_store, EncounterFilter, SyncStore};
use crate::adapters::notify::{create_notification_sink, NotificationSink};
use crate::adapters::registry::{create_registry_client, RegistryClient};
use crate::config::{BridgeConfig, SyncConfig};
use crate::core::context::SyncContext;
use crate::core::directory::HospitalDirectory;
use crate::core::duplicate::DuplicateReconciler;
use crate::core::lifecycle::service::EncounterService;
use crate::core::lifecycle::submitter::{EncounterOutcome, EncounterSubmitter};
use crate::core::pipeline::{PipelineSet, PipelineSummary};
use crate::core::reconcile::{ReconciliationScheduler, SweepSummary};
use crate::domain::encounter::Encounter;
use crate::domain::errors::BridgeError;
use crate::domain::events::{
    EncounterEvent, InboundEvent, ItemBatchEvent, SweepKind, VitalSignsEvent,
};
use crate::domain::ids::{EncounterId, HospitalId, RegistrationId};
use crate::domain::items::{ItemKind, SyncableItem};
use crate::domain::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Result of an encounter lifecycle event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterReport {
    pub encounter: Encounter,
    /// Absent when no submission was attempted
    pub outcome: Option<EncounterOutcome>,
    pub items: PipelineSummary,
    /// Submission error left for the next sweep
    pub error: Option<String>,
}

/// Result of a sub-resource batch event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBatchReport {
    pub encounter_id: EncounterId,
    pub category: ItemKind,
    pub ingest: PipelineSummary,
    /// Absent when the encounter is not registered yet or submission is off
    pub submit: Option<PipelineSummary>,
}

/// Outcome of any inbound event
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventReport {
    Encounter(Box<EncounterReport>),
    Items(ItemBatchReport),
    Sweep(SweepSummary),
}

/// Snapshot of outstanding work
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub backend: String,
    pub hospitals: usize,
    pub pending_encounters: usize,
    pub pending_items: BTreeMap<String, usize>,
    pub active_duplicate_markers: usize,
}

pub struct SyncEngine {
    ctx: SyncContext,
    lifecycle: EncounterService,
    encounters: Arc<EncounterSubmitter>,
    pipelines: Arc<PipelineSet>,
    scheduler: ReconciliationScheduler,
    submit_on_event: bool,
    /// Serializes sweeps started from different surfaces
    sweep_lock: Mutex<()>,
}

impl SyncEngine {
    /// Builds the engine and every adapter named in the configuration
    pub async fn from_config(config: &BridgeConfig) -> Result<Self> {
        let store = create_sync_store(config).await?;
        let registry = create_registry_client(config)?;
        let sink = create_notification_sink(&config.notifications)?;
        let directory = Arc::new(HospitalDirectory::from_config(config)?);

        tracing::info!(
            backend = store.backend_name(),
            registry = registry.name(),
            hospitals = directory.len(),
            dry_run = config.application.dry_run,
            "Sync engine created"
        );
        Ok(Self::new(store, registry, sink, directory, &config.sync))
    }

    pub fn new(
        store: Arc<dyn SyncStore>,
        registry: Arc<dyn RegistryClient>,
        sink: Arc<dyn NotificationSink>,
        directory: Arc<HospitalDirectory>,
        sync: &SyncConfig,
    ) -> Self {
        let ctx = SyncContext::new(
            Arc::clone(&store),
            registry,
            sink,
            directory,
            Duration::from_secs(sync.item_timeout_seconds),
        );
        let duplicates = Arc::new(DuplicateReconciler::new(ctx.clone()));
        let encounters = Arc::new(EncounterSubmitter::new(ctx.clone(), Arc::clone(&duplicates)));
        let pipelines = Arc::new(PipelineSet::new(ctx.clone(), sync));
        let scheduler = ReconciliationScheduler::new(
            ctx.clone(),
            Arc::clone(&encounters),
            Arc::clone(&pipelines),
            duplicates,
        );

        Self {
            ctx,
            lifecycle: EncounterService::new(store),
            encounters,
            pipelines,
            scheduler,
            submit_on_event: sync.submit_on_event,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Sweeps stop between encounters once the receiver reads `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.scheduler = self.scheduler.with_shutdown(shutdown);
        self
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.ctx.store
    }

    /// Applies a lifecycle event and submits the encounter when it is ready.
    ///
    /// A failed submission is reported, not returned: the encounter stays
    /// pending for the next sweep.
    pub async fn handle_encounter_event(&self, event: &EncounterEvent) -> Result<EncounterReport> {
        let encounter = self.lifecycle.apply_event(event).await?;
        let mut report = EncounterReport {
            encounter,
            outcome: None,
            items: PipelineSummary::new(),
            error: None,
        };

        if !self.submit_on_event || !self.ctx.directory.is_enabled(&event.hospital_id) {
            return Ok(report);
        }

        match self.encounters.submit(&report.encounter).await {
            Ok(submission) => {
                if submission.is_accepted() {
                    report.items = self.pipelines.cascade(&submission.encounter).await;
                }
                report.outcome = Some(submission.outcome);
                report.encounter = submission.encounter;
            }
            Err(e) => {
                tracing::warn!(
                    encounter_id = %report.encounter.id,
                    registration_id = %report.encounter.registration_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Encounter submission deferred to reconciliation"
                );
                report.error = Some(e.to_string());
            }
        }

        Ok(report)
    }

    /// Stores a sub-resource batch and submits it once the encounter is
    /// registered.
    ///
    /// An invalid batch or an unknown encounter fails before anything is
    /// written.
    pub async fn handle_item_batch(&self, event: ItemBatchEvent) -> Result<ItemBatchReport> {
        event.validate().map_err(BridgeError::Validation)?;
        let encounter = self
            .find_registration(&event.hospital_id, &event.registration_id)
            .await?;
        let pipeline = self.pipelines.get(event.category)?;

        let ingest = pipeline.ingest(&encounter, event.items).await?;
        let mut report = ItemBatchReport {
            encounter_id: encounter.id.clone(),
            category: event.category,
            ingest,
            submit: None,
        };

        if self.submit_on_event && encounter.sync.is_synced() {
            let summary = match pipeline.submit(&encounter).await {
                Ok(summary) => summary,
                Err(e) => {
                    tracing::warn!(
                        encounter_id = %encounter.id,
                        kind = %event.category,
                        error = %e,
                        "Item submission deferred to reconciliation"
                    );
                    let mut summary = PipelineSummary::new();
                    summary.errors.push(e.to_string());
                    summary
                }
            };
            report.submit = Some(summary);
        }

        Ok(report)
    }

    /// Splits bedside vitals into observation items
    pub async fn handle_vital_signs(&self, event: VitalSignsEvent) -> Result<ItemBatchReport> {
        let batch = event.into_batch().map_err(BridgeError::Validation)?;
        self.handle_item_batch(batch).await
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<EventReport> {
        match event {
            InboundEvent::Encounter(event) => Ok(EventReport::Encounter(Box::new(
                self.handle_encounter_event(&event).await?,
            ))),
            InboundEvent::Items(event) => Ok(EventReport::Items(self.handle_item_batch(event).await?)),
            InboundEvent::VitalSigns(event) => {
                Ok(EventReport::Items(self.handle_vital_signs(event).await?))
            }
            InboundEvent::Reconcile { sweep } => Ok(EventReport::Sweep(self.reconcile(sweep).await?)),
        }
    }

    /// Runs a reconciliation sweep; concurrent callers wait their turn
    pub async fn reconcile(&self, kind: SweepKind) -> Result<SweepSummary> {
        let _running = self.sweep_lock.lock().await;
        self.scheduler.run(kind).await
    }

    pub async fn get_encounter(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
    ) -> Result<Encounter> {
        self.find_registration(hospital_id, registration_id).await
    }

    pub async fn list_items(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
        kind: ItemKind,
    ) -> Result<Vec<SyncableItem>> {
        let encounter = self.find_registration(hospital_id, registration_id).await?;
        self.ctx.store.list_items(&encounter.id, kind).await
    }

    pub async fn status(&self) -> Result<EngineStatus> {
        let pending_encounters = self
            .ctx
            .store
            .list_encounters(&EncounterFilter::unsynced_finished())
            .await?
            .len();
        let pending_items = self
            .ctx
            .store
            .count_pending_items()
            .await?
            .into_iter()
            .map(|(kind, count)| (kind.as_str().to_string(), count))
            .collect();
        let active_duplicate_markers = self.ctx.store.list_active_markers().await?.len();

        Ok(EngineStatus {
            backend: self.ctx.store.backend_name().to_string(),
            hospitals: self.ctx.directory.len(),
            pending_encounters,
            pending_items,
            active_duplicate_markers,
        })
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.ctx.store.test_connection().await
    }

    async fn find_registration(
        &self,
        hospital_id: &HospitalId,
        registration_id: &RegistrationId,
    ) -> Result<Encounter> {
        self.ctx
            .store
            .find_by_registration(hospital_id, registration_id)
            .await?
            .ok_or_else(|| {
                BridgeError::NotFound(format!("encounter {hospital_id}/{registration_id}"))
            })
    }
}
