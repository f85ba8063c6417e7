//! Encounter record maintenance
//!
//! Applies inbound lifecycle events to the stored encounter. Nothing here
//! talks to the registry.

use crate::adapters::database::SyncStore;
use crate::core::lifecycle::history::record_event;
use crate::domain::encounter::{Diagnosis, Encounter};
use crate::domain::events::{DiagnosisInput, EncounterEvent};
use crate::domain::Result;
use std::sync::Arc;

/// Sorts diagnoses primary-first, then by creation time, and ranks them 1..n.
///
/// One uncoded diagnosis makes the whole list unusable, so an empty list is
/// returned in that case.
pub fn rank_diagnoses(inputs: &[DiagnosisInput]) -> Vec<Diagnosis> {
    if inputs.iter().any(|d| d.code.trim().is_empty()) {
        return Vec::new();
    }
    let mut sorted: Vec<&DiagnosisInput> = inputs.iter().collect();
    sorted.sort_by(|a, b| {
        b.is_primary
            .cmp(&a.is_primary)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    sorted
        .into_iter()
        .zip(1u32..)
        .map(|(d, rank)| Diagnosis {
            code: d.code.trim().to_string(),
            name: d.name.clone(),
            is_primary: d.is_primary,
            rank,
        })
        .collect()
}

/// Owns encounter records in the datastore
pub struct EncounterService {
    store: Arc<dyn SyncStore>,
}

impl EncounterService {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    /// Creates or updates the encounter an event refers to.
    ///
    /// Returns the stored encounter. Submission is left to the caller.
    pub async fn apply_event(&self, event: &EncounterEvent) -> Result<Encounter> {
        let existing = self
            .store
            .find_by_registration(&event.hospital_id, &event.registration_id)
            .await?;

        let (mut encounter, is_new) = match existing {
            Some(encounter) => (encounter, false),
            None => (
                Encounter::new(
                    event.hospital_id.clone(),
                    event.registration_id.clone(),
                    event.status,
                ),
                true,
            ),
        };

        let history = record_event(
            &encounter.history,
            event.status,
            event.process_date,
            event.is_paid,
        );
        let changed = history != encounter.history || encounter.status != event.status;

        encounter.history = history;
        encounter.status = event.status;
        encounter.is_paid = event.is_paid;
        if let Some(patient) = &event.patient {
            encounter.patient = Some(patient.clone());
        }
        if let Some(practitioner) = &event.practitioner {
            encounter.practitioner = Some(practitioner.clone());
        }
        if let Some(location) = &event.location {
            encounter.location = Some(location.clone());
        }
        if !event.diagnoses.is_empty() {
            encounter.diagnoses = rank_diagnoses(&event.diagnoses);
        }

        if is_new {
            self.store.insert_encounter(&encounter).await?;
            tracing::info!(
                encounter_id = %encounter.id,
                registration_id = %encounter.registration_id,
                status = %encounter.status,
                "Encounter created"
            );
        } else {
            if changed {
                // Corrected data makes a refused encounter eligible again
                encounter.sync.needs_upstream_fix = false;
                if encounter.sync.is_synced() {
                    encounter.sync.pending_update = true;
                }
                encounter.note("Encounter updated");
            }
            self.store.update_encounter(&encounter).await?;
            tracing::info!(
                encounter_id = %encounter.id,
                registration_id = %encounter.registration_id,
                status = %encounter.status,
                pending_update = encounter.sync.pending_update,
                "Encounter updated"
            );
        }

        Ok(encounter)
    }
}
