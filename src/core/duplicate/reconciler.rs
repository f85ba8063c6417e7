//! Recovery of encounters refused as duplicates
//!
//! A duplicate refusal leaves one active marker per encounter. Marked
//! encounters are only ever resubmitted from [`DuplicateReconciler::sweep`].

use crate::adapters::registry::{is_dry_run, RegistryResponse};
use crate::core::context::SyncContext;
use crate::core::lifecycle::payload::build_encounter_payload;
use crate::core::lifecycle::submitter::{status_notification, ENCOUNTER_SENT};
use crate::core::reconcile::summary::{SweepError, SweepErrorType, SweepSummary};
use crate::domain::encounter::{DuplicateMarker, Encounter};
use crate::domain::errors::{BridgeError, RegistryError, StoreError};
use crate::domain::events::SweepKind;
use crate::domain::Result;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::watch;

/// Result of resolving one marker
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The encounter now holds a registry id and the marker is inactive
    Resolved(Box<Encounter>),
    /// Nothing was sent; the marker stays active
    Skipped(&'static str),
}

pub struct DuplicateReconciler {
    ctx: SyncContext,
}

impl DuplicateReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Marks an encounter after a duplicate refusal.
    ///
    /// Returns `true` when a new marker was created, `false` when one was
    /// already active.
    pub async fn record_duplicate(&self, encounter: &Encounter, message: &str) -> Result<bool> {
        if self
            .ctx
            .store
            .find_active_marker(&encounter.id)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let marker = DuplicateMarker::new(encounter.id.clone(), Some(message.to_string()));
        match self.ctx.store.insert_marker(&marker).await {
            Ok(()) => {
                tracing::warn!(
                    encounter_id = %encounter.id,
                    registration_id = %encounter.registration_id,
                    marker_id = %marker.id,
                    "Encounter marked as duplicate"
                );
                Ok(true)
            }
            // A concurrent refusal marked it first
            Err(BridgeError::Store(StoreError::Conflict(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resubmits the encounter of one active marker.
    ///
    /// An encounter the registry already holds under the same identifier is
    /// adopted by overwriting it. Otherwise the encounter is created again
    /// with the marker id as identifier value. A refusal on this path is an
    /// error and the marker stays active.
    pub async fn resolve(&self, mut marker: DuplicateMarker) -> Result<ResolveOutcome> {
        let Some(mut encounter) = self.ctx.store.find_encounter(&marker.encounter_id).await? else {
            return Ok(ResolveOutcome::Skipped("encounter not found"));
        };
        if !self.ctx.directory.is_enabled(&encounter.hospital_id) {
            return Ok(ResolveOutcome::Skipped("hospital disabled"));
        }
        if encounter.sync.is_synced() {
            self.deactivate(&mut marker).await?;
            return Ok(ResolveOutcome::Resolved(Box::new(encounter)));
        }

        let profile = self.ctx.directory.require(&encounter.hospital_id)?;
        let system = self
            .ctx
            .directory
            .encounter_identifier_system(&profile.organization_id);
        let mut payload = build_encounter_payload(&encounter, &profile.organization_id, &system);

        let registered = self.find_registered(&encounter, &system).await?;
        if registered.is_none() {
            payload["identifier"] = json!([{ "system": system, "value": marker.id }]);
        }

        let response = self
            .ctx
            .write_resource(
                &encounter.hospital_id,
                "Encounter",
                registered.as_deref(),
                &payload,
            )
            .await;

        match response {
            Ok(RegistryResponse::Accepted(accepted)) => {
                encounter.sync.record_accepted(
                    accepted.id.clone(),
                    accepted.resource_type,
                    payload,
                    accepted.body,
                );
                encounter.note(ENCOUNTER_SENT);
                self.ctx.store.update_encounter(&encounter).await?;
                self.deactivate(&mut marker).await?;
                tracing::info!(
                    encounter_id = %encounter.id,
                    registration_id = %encounter.registration_id,
                    external_id = %accepted.id,
                    adopted = registered.is_some(),
                    "Duplicate encounter resolved"
                );
                self.ctx.notify(status_notification(&encounter)).await;
                Ok(ResolveOutcome::Resolved(Box::new(encounter)))
            }
            Ok(RegistryResponse::Rejected(rejection)) if is_dry_run(&rejection) => {
                Ok(ResolveOutcome::Skipped("dry run"))
            }
            Ok(RegistryResponse::Rejected(rejection)) => {
                encounter.sync.record_rejection(
                    payload,
                    rejection.body,
                    rejection.message.clone(),
                    false,
                );
                encounter.updated_at = Utc::now();
                self.ctx.store.update_encounter(&encounter).await?;
                self.ctx.notify(status_notification(&encounter)).await;
                Err(RegistryError::Rejected {
                    status: rejection.status,
                    message: rejection.message,
                }
                .into())
            }
            Err(e) => {
                encounter.sync.record_failure(Some(payload), e.to_string());
                encounter.updated_at = Utc::now();
                self.ctx.store.update_encounter(&encounter).await?;
                Err(e)
            }
        }
    }

    /// Resolves every active marker, oldest first.
    ///
    /// Returns the recovered encounters alongside the summary so their
    /// items can be cascaded.
    pub async fn sweep(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<(SweepSummary, Vec<Encounter>)> {
        let mut summary = SweepSummary::new(SweepKind::Duplicates);
        let mut resolved = Vec::new();
        let markers = self.ctx.store.list_active_markers().await?;
        tracing::info!(active_markers = markers.len(), "Duplicate sweep started");

        for marker in markers {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                summary.interrupted = true;
                break;
            }
            summary.encounters_examined += 1;
            let encounter_id = marker.encounter_id.clone();

            match self.resolve(marker).await {
                Ok(ResolveOutcome::Resolved(encounter)) => {
                    summary.duplicates_resolved += 1;
                    resolved.push(*encounter);
                }
                Ok(ResolveOutcome::Skipped(reason)) => {
                    summary.encounters_skipped += 1;
                    tracing::debug!(encounter_id = %encounter_id, reason, "Duplicate skipped");
                }
                Err(e) => {
                    summary.duplicates_failed += 1;
                    tracing::error!(
                        encounter_id = %encounter_id,
                        error = %e,
                        "Duplicate resolution failed"
                    );
                    summary.add_error(
                        SweepError::new(SweepErrorType::Duplicate, e.to_string())
                            .with_context(format!("encounter={encounter_id}")),
                    );
                }
            }
        }

        Ok((summary, resolved))
    }

    async fn deactivate(&self, marker: &mut DuplicateMarker) -> Result<()> {
        marker.deactivate();
        self.ctx.store.update_marker(marker).await
    }

    /// Registry id of an encounter already registered under the identifier
    async fn find_registered(&self, encounter: &Encounter, system: &str) -> Result<Option<String>> {
        let params = vec![(
            "identifier".to_string(),
            format!("{system}|{}", encounter.registration_id),
        )];
        let search = self
            .ctx
            .registry
            .search(&encounter.hospital_id, "Encounter", &params);
        let resources = tokio::time::timeout(self.ctx.item_timeout, search)
            .await
            .map_err(|_| BridgeError::Timeout("encounter search timed out".to_string()))??;

        Ok(resources
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str))
            .find(|id| !id.trim().is_empty())
            .map(str::to_string))
    }
}
