//! Encounter model
//!
//! An encounter is one hospital visit. It is created by the first lifecycle
//! event seen for a (hospital, registration) pair and is never deleted.

use crate::domain::history::History;
use crate::domain::ids::{EncounterId, HospitalId, RegistrationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterStatus {
    Arrived,
    #[serde(rename = "inprogress", alias = "in-progress")]
    InProgress,
    Finished,
    Cancelled,
}

impl EncounterStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterStatus::Arrived => "arrived",
            EncounterStatus::InProgress => "inprogress",
            EncounterStatus::Finished => "finished",
            EncounterStatus::Cancelled => "cancelled",
        }
    }

    /// FHIR `Encounter.status` code
    pub fn fhir_code(&self) -> &'static str {
        match self {
            EncounterStatus::Arrived => "arrived",
            EncounterStatus::InProgress => "in-progress",
            EncounterStatus::Finished => "finished",
            EncounterStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncounterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arrived" => Ok(EncounterStatus::Arrived),
            "inprogress" | "in-progress" => Ok(EncounterStatus::InProgress),
            "finished" => Ok(EncounterStatus::Finished),
            "cancelled" => Ok(EncounterStatus::Cancelled),
            other => Err(format!(
                "Invalid encounter status '{other}'. Must be one of: arrived, inprogress, finished, cancelled"
            )),
        }
    }
}

/// Reference to a resource that already exists in the registry
/// (patient, practitioner, location)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    /// Registry id of the referenced resource
    pub id: String,

    /// Human-readable name sent as `display`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ExternalRef {
    pub fn new(id: impl Into<String>, display: Option<String>) -> Self {
        Self {
            id: id.into(),
            display,
        }
    }

    /// A reference is usable only when it carries a non-blank id
    pub fn is_present(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// A ranked, coded diagnosis attached to an encounter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    /// ICD-10 code
    pub code: String,

    /// Display name
    pub name: String,

    /// Primary diagnosis flag
    #[serde(default)]
    pub is_primary: bool,

    /// 1-based rank, primary first
    pub rank: u32,
}

/// Remote synchronization state shared by encounters, items and chain children
///
/// `external_id == None` means the registry never accepted the record.
/// Once set, later submissions are updates against that id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Id assigned by the registry
    #[serde(default)]
    pub external_id: Option<String>,

    /// Resource type echoed by the registry
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Last payload sent
    #[serde(default)]
    pub last_request: Option<serde_json::Value>,

    /// Last body received
    #[serde(default)]
    pub last_response: Option<serde_json::Value>,

    /// Explanation of the last failure or rejection
    #[serde(default)]
    pub description: Option<String>,

    /// The registry rejected a value; resubmitting unchanged data is pointless
    #[serde(default)]
    pub needs_upstream_fix: bool,

    /// Domain fields changed after the record was accepted
    #[serde(default)]
    pub pending_update: bool,

    /// Number of submission attempts
    #[serde(default)]
    pub attempts: u32,

    /// When the registry last accepted the record
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// The registry holds a copy of this record
    pub fn is_synced(&self) -> bool {
        self.external_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Eligible for a create or update on the next pass
    pub fn needs_submission(&self) -> bool {
        !self.needs_upstream_fix && (!self.is_synced() || self.pending_update)
    }

    /// Records an accepted create or update
    pub fn record_accepted(
        &mut self,
        external_id: impl Into<String>,
        resource_type: impl Into<String>,
        request: serde_json::Value,
        response: serde_json::Value,
    ) {
        self.external_id = Some(external_id.into());
        self.resource_type = Some(resource_type.into());
        self.last_request = Some(request);
        self.last_response = Some(response);
        self.description = None;
        self.needs_upstream_fix = false;
        self.pending_update = false;
        self.attempts += 1;
        self.synced_at = Some(Utc::now());
    }

    /// Records a rejection returned by the registry
    pub fn record_rejection(
        &mut self,
        request: serde_json::Value,
        response: serde_json::Value,
        description: impl Into<String>,
        needs_upstream_fix: bool,
    ) {
        self.last_request = Some(request);
        self.last_response = Some(response);
        self.description = Some(description.into());
        self.needs_upstream_fix = needs_upstream_fix;
        self.attempts += 1;
    }

    /// Records a transport level failure; the record stays retryable
    pub fn record_failure(&mut self, request: Option<serde_json::Value>, description: impl Into<String>) {
        if request.is_some() {
            self.last_request = request;
        }
        self.description = Some(description.into());
        self.attempts += 1;
    }
}

/// A hospital visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: EncounterId,
    pub hospital_id: HospitalId,
    pub registration_id: RegistrationId,
    pub status: EncounterStatus,
    #[serde(default)]
    pub history: History,

    /// Registry patient
    #[serde(default)]
    pub patient: Option<ExternalRef>,

    /// Registry practitioner
    #[serde(default)]
    pub practitioner: Option<ExternalRef>,

    /// Registry location
    #[serde(default)]
    pub location: Option<ExternalRef>,

    /// Ranked diagnoses, empty when uncoded
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,

    #[serde(default)]
    pub is_paid: bool,

    #[serde(default)]
    pub sync: SyncState,

    /// Progress log ("Encounter created", "Encounter sent", ...)
    #[serde(default)]
    pub notes: Vec<String>,

    #[serde(default = "default_true")]
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Encounter {
    /// Creates a fresh encounter for a (hospital, registration) pair
    pub fn new(
        hospital_id: HospitalId,
        registration_id: RegistrationId,
        status: EncounterStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EncounterId::generate(),
            hospital_id,
            registration_id,
            status,
            history: History::default(),
            patient: None,
            practitioner: None,
            location: None,
            diagnoses: Vec::new(),
            is_paid: false,
            sync: SyncState::default(),
            notes: vec!["Encounter created".to_string()],
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Patient, practitioner and location references are all present
    pub fn has_required_references(&self) -> bool {
        [&self.patient, &self.practitioner, &self.location]
            .iter()
            .all(|r| r.as_ref().is_some_and(ExternalRef::is_present))
    }

    /// Appends a progress note and bumps `updated_at`
    pub fn note(&mut self, text: impl Into<String>) {
        self.notes.push(text.into());
        self.updated_at = Utc::now();
    }
}

/// Marks an encounter whose create was rejected as a duplicate identifier
///
/// While an active marker exists the encounter is handled only by the
/// duplicate reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMarker {
    pub id: String,
    pub encounter_id: EncounterId,
    pub active: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DuplicateMarker {
    pub fn new(encounter_id: EncounterId, message: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encounter_id,
            active: true,
            message,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.resolved_at = Some(Utc::now());
    }
}

fn default_true() -> bool {
    true
}
