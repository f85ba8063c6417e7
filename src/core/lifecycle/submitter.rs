//! Encounter submission on the primary path

use crate::adapters::registry::RegistryResponse;
use crate::core::context::SyncContext;
use crate::core::duplicate::DuplicateReconciler;
use crate::core::lifecycle::history::readiness_issue;
use crate::core::lifecycle::payload::build_encounter_payload;
use crate::core::pipeline::payload::format_timestamp;
use crate::domain::encounter::Encounter;
use crate::domain::errors::BridgeError;
use crate::domain::events::Notification;
use crate::domain::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Progress note appended once the registry holds the encounter
pub const ENCOUNTER_SENT: &str = "Encounter sent";

/// Status notification published after every encounter submission
pub fn status_notification(encounter: &Encounter) -> Notification {
    Notification::new(
        "encounter",
        encounter.hospital_id.clone(),
        encounter.registration_id.clone(),
    )
    .with_natural_key(encounter.registration_id.to_string())
    .with_outcome(
        encounter.sync.external_id.clone(),
        encounter.sync.description.clone(),
    )
    .with_extra(json!({
        "date": encounter.history.finished.end.map(format_timestamp),
        "notes": encounter.notes,
    }))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum EncounterOutcome {
    /// Created or overwritten under this registry id
    Accepted(String),
    /// Already registered and unchanged
    AlreadySynced(String),
    NotReady(&'static str),
    Skipped(&'static str),
    /// Refused as duplicate; `new_marker` is false when a marker was already active
    Duplicate {
        #[serde(rename = "newMarker")]
        new_marker: bool,
    },
    Rejected(String),
}

/// An outcome together with the encounter as stored afterwards
#[derive(Debug, Clone)]
pub struct EncounterSubmission {
    pub outcome: EncounterOutcome,
    pub encounter: Encounter,
}

impl EncounterSubmission {
    fn new(outcome: EncounterOutcome, encounter: Encounter) -> Self {
        Self { outcome, encounter }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, EncounterOutcome::Accepted(_))
    }
}

pub struct EncounterSubmitter {
    ctx: SyncContext,
    duplicates: Arc<DuplicateReconciler>,
}

impl EncounterSubmitter {
    pub fn new(ctx: SyncContext, duplicates: Arc<DuplicateReconciler>) -> Self {
        Self { ctx, duplicates }
    }

    /// Submits an encounter that is ready and not marked as duplicate.
    ///
    /// The stored record is re-read under a claim, so the caller's copy may
    /// be stale.
    pub async fn submit(&self, encounter: &Encounter) -> Result<EncounterSubmission> {
        let claim_key = format!("encounter:{}", encounter.id);
        let Some(_claim) = self.ctx.guard.try_claim(claim_key) else {
            return Ok(EncounterSubmission::new(
                EncounterOutcome::Skipped("submission in progress elsewhere"),
                encounter.clone(),
            ));
        };

        let mut encounter = self
            .ctx
            .store
            .find_encounter(&encounter.id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("encounter {}", encounter.id)))?;

        if !self.ctx.directory.is_enabled(&encounter.hospital_id) {
            return Ok(EncounterSubmission::new(
                EncounterOutcome::Skipped("hospital disabled"),
                encounter,
            ));
        }
        if let Some(id) = encounter.sync.external_id.clone() {
            if encounter.sync.is_synced() && !encounter.sync.pending_update {
                return Ok(EncounterSubmission::new(
                    EncounterOutcome::AlreadySynced(id),
                    encounter,
                ));
            }
        }
        if !encounter.sync.needs_submission() {
            return Ok(EncounterSubmission::new(
                EncounterOutcome::Skipped("rejected, waiting for corrected data"),
                encounter,
            ));
        }
        if let Some(reason) = readiness_issue(&encounter) {
            return Ok(EncounterSubmission::new(
                EncounterOutcome::NotReady(reason),
                encounter,
            ));
        }
        if self
            .ctx
            .store
            .find_active_marker(&encounter.id)
            .await?
            .is_some()
        {
            return Ok(EncounterSubmission::new(
                EncounterOutcome::Skipped("duplicate marker active"),
                encounter,
            ));
        }

        let profile = self.ctx.directory.require(&encounter.hospital_id)?;
        let system = self
            .ctx
            .directory
            .encounter_identifier_system(&profile.organization_id);
        let payload = build_encounter_payload(&encounter, &profile.organization_id, &system);
        let existing = encounter
            .sync
            .external_id
            .clone()
            .filter(|id| !id.trim().is_empty());

        let response = self
            .ctx
            .write_resource(
                &encounter.hospital_id,
                "Encounter",
                existing.as_deref(),
                &payload,
            )
            .await;

        let outcome = match response {
            Ok(RegistryResponse::Accepted(accepted)) => {
                encounter.sync.record_accepted(
                    accepted.id.clone(),
                    accepted.resource_type,
                    payload,
                    accepted.body,
                );
                encounter.note(ENCOUNTER_SENT);
                tracing::info!(
                    encounter_id = %encounter.id,
                    registration_id = %encounter.registration_id,
                    external_id = %accepted.id,
                    "Encounter accepted"
                );
                EncounterOutcome::Accepted(accepted.id)
            }
            Ok(RegistryResponse::Rejected(rejection)) if rejection.is_duplicate() => {
                let new_marker = self
                    .duplicates
                    .record_duplicate(&encounter, &rejection.message)
                    .await?;
                encounter.sync.record_rejection(
                    payload,
                    rejection.body,
                    format!("duplicate: {}", rejection.message),
                    false,
                );
                encounter.updated_at = Utc::now();
                EncounterOutcome::Duplicate { new_marker }
            }
            Ok(RegistryResponse::Rejected(rejection)) => {
                let needs_fix = rejection.needs_upstream_fix();
                encounter.sync.record_rejection(
                    payload,
                    rejection.body,
                    rejection.message.clone(),
                    needs_fix,
                );
                encounter.updated_at = Utc::now();
                tracing::warn!(
                    encounter_id = %encounter.id,
                    registration_id = %encounter.registration_id,
                    reason = %rejection.message,
                    "Encounter rejected"
                );
                EncounterOutcome::Rejected(rejection.message)
            }
            Err(e) => {
                encounter.sync.record_failure(Some(payload), e.to_string());
                encounter.updated_at = Utc::now();
                self.ctx.store.update_encounter(&encounter).await?;
                self.ctx.notify(status_notification(&encounter)).await;
                return Err(e);
            }
        };

        self.ctx.store.update_encounter(&encounter).await?;
        self.ctx.notify(status_notification(&encounter)).await;
        Ok(EncounterSubmission::new(outcome, encounter))
    }
}
