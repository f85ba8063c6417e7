//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use medbridge::adapters::database::MemoryStore;
use medbridge::adapters::notify::LogSink;
use medbridge::adapters::registry::{
    Accepted, RegistryClient, RegistryResponse, Rejection, RejectionKind,
};
use medbridge::config::SyncConfig;
use medbridge::core::{HospitalDirectory, HospitalProfile, SyncEngine};
use medbridge::domain::encounter::{EncounterStatus, ExternalRef};
use medbridge::domain::errors::RegistryError;
use medbridge::domain::events::{DiagnosisInput, EncounterEvent, ItemBatchEvent};
use medbridge::domain::ids::{HospitalId, RegistrationId};
use medbridge::domain::items::{ClinicalItem, DiagnosticRecord, ItemKind};
use medbridge::domain::Result;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const HOSPITAL: &str = "H1";
pub const ORGANIZATION: &str = "ORG1";
pub const IDENTIFIER_SYSTEM: &str = "http://sys-ids.example";

/// One write or search received by [`ScriptedRegistry`]
#[derive(Debug, Clone)]
pub struct RegistryCall {
    pub method: &'static str,
    pub resource_type: String,
    pub id: Option<String>,
    pub payload: Value,
}

/// In-memory registry whose answers are scripted per resource type
#[derive(Default)]
pub struct ScriptedRegistry {
    calls: Mutex<Vec<RegistryCall>>,
    rejections: Mutex<HashMap<String, Rejection>>,
    failures: Mutex<HashSet<String>>,
    search_results: Mutex<Vec<Value>>,
    delay: Mutex<Option<Duration>>,
    sequence: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuses every write of `resource_type` with the given kind
    pub fn reject(&self, resource_type: &str, kind: RejectionKind, message: &str) {
        let rejection = Rejection {
            status: 400,
            kind,
            message: message.to_string(),
            body: json!({
                "resourceType": "OperationOutcome",
                "issue": [{ "severity": "error", "diagnostics": message }]
            }),
        };
        self.rejections
            .lock()
            .unwrap()
            .insert(resource_type.to_string(), rejection);
    }

    /// Fails every write of `resource_type` at the transport level
    pub fn fail(&self, resource_type: &str) {
        self.failures.lock().unwrap().insert(resource_type.to_string());
    }

    /// Removes scripted rejections and failures
    pub fn heal(&self) {
        self.rejections.lock().unwrap().clear();
        self.failures.lock().unwrap().clear();
    }

    pub fn set_search_results(&self, resources: Vec<Value>) {
        *self.search_results.lock().unwrap() = resources;
    }

    /// Holds every write for `delay` after recording it
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, method: &str, resource_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.resource_type == resource_type)
            .count()
    }

    /// Resource types written, in call order
    pub fn written_types(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method != "search")
            .map(|c| c.resource_type.clone())
            .collect()
    }

    async fn write(
        &self,
        method: &'static str,
        resource_type: &str,
        id: Option<&str>,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        self.calls.lock().unwrap().push(RegistryCall {
            method,
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            payload: payload.clone(),
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(resource_type) {
            return Err(RegistryError::ConnectionFailed(format!("{resource_type} unreachable")).into());
        }
        if let Some(rejection) = self.rejections.lock().unwrap().get(resource_type) {
            return Ok(RegistryResponse::Rejected(rejection.clone()));
        }

        let id = match id {
            Some(id) => id.to_string(),
            None => {
                let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{}-{n}", resource_type.to_lowercase())
            }
        };
        Ok(RegistryResponse::Accepted(Accepted {
            id: id.clone(),
            resource_type: resource_type.to_string(),
            body: json!({ "resourceType": resource_type, "id": id }),
        }))
    }
}

#[async_trait]
impl RegistryClient for ScriptedRegistry {
    async fn create(
        &self,
        _hospital: &HospitalId,
        resource_type: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        self.write("create", resource_type, None, payload).await
    }

    async fn update(
        &self,
        _hospital: &HospitalId,
        resource_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<RegistryResponse> {
        self.write("update", resource_type, Some(id), payload).await
    }

    async fn search(
        &self,
        _hospital: &HospitalId,
        resource_type: &str,
        params: &[(String, String)],
    ) -> Result<Vec<Value>> {
        self.calls.lock().unwrap().push(RegistryCall {
            method: "search",
            resource_type: resource_type.to_string(),
            id: None,
            payload: json!(params),
        });
        Ok(self.search_results.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn directory() -> Arc<HospitalDirectory> {
    Arc::new(HospitalDirectory::new(
        vec![HospitalProfile::new(hospital(), ORGANIZATION)],
        IDENTIFIER_SYSTEM,
    ))
}

/// Engine over a fresh memory store and the given registry
pub fn engine(registry: Arc<ScriptedRegistry>) -> SyncEngine {
    engine_with(registry, &SyncConfig::default())
}

pub fn engine_with(registry: Arc<ScriptedRegistry>, sync: &SyncConfig) -> SyncEngine {
    SyncEngine::new(
        Arc::new(MemoryStore::new()),
        registry,
        Arc::new(LogSink),
        directory(),
        sync,
    )
}

pub fn hospital() -> HospitalId {
    HospitalId::new(HOSPITAL).unwrap()
}

pub fn registration(id: &str) -> RegistrationId {
    RegistrationId::new(id).unwrap()
}

pub fn t(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, minute, 0).unwrap()
}

/// Lifecycle event carrying every reference and one coded diagnosis
pub fn event(registration_id: &str, status: EncounterStatus, minute: u32, is_paid: bool) -> EncounterEvent {
    EncounterEvent {
        hospital_id: hospital(),
        registration_id: registration(registration_id),
        status,
        process_date: t(minute),
        is_paid,
        diagnoses: vec![DiagnosisInput {
            code: "A09".to_string(),
            name: "Gastroenteritis".to_string(),
            is_primary: true,
            created_at: Some(t(minute)),
        }],
        patient: Some(ExternalRef::new("P-1", Some("Budi".to_string()))),
        practitioner: Some(ExternalRef::new("PR-1", Some("dr. Sari".to_string()))),
        location: Some(ExternalRef::new("L-1", Some("Poli Umum".to_string()))),
    }
}

/// Arrival at t0, in progress at t1, paid finish at t2
pub fn lifecycle(registration_id: &str) -> Vec<EncounterEvent> {
    vec![
        event(registration_id, EncounterStatus::Arrived, 0, false),
        event(registration_id, EncounterStatus::InProgress, 1, false),
        event(registration_id, EncounterStatus::Finished, 2, true),
    ]
}

pub fn lab(pmr_uuid: &str) -> ClinicalItem {
    ClinicalItem::Lab(DiagnosticRecord {
        pmr_uuid: pmr_uuid.to_string(),
        code: "718-7".to_string(),
        name: "Hemoglobin".to_string(),
        result: Some("13.5".to_string()),
        value: Some(13.5),
        unit: Some("g/dL".to_string()),
        conclusion: Some("normal".to_string()),
        specimen_type: Some("blood".to_string()),
        requested_at: Some(t(3)),
        collected_at: Some(t(4)),
        issued_at: Some(t(5)),
    })
}

pub fn radiology(pmr_uuid: &str) -> ClinicalItem {
    ClinicalItem::Radiology(DiagnosticRecord {
        pmr_uuid: pmr_uuid.to_string(),
        code: "36643-5".to_string(),
        name: "Chest X-ray".to_string(),
        result: None,
        value: None,
        unit: None,
        conclusion: Some("no abnormality".to_string()),
        specimen_type: None,
        requested_at: Some(t(3)),
        collected_at: None,
        issued_at: Some(t(6)),
    })
}

pub fn batch(registration_id: &str, category: ItemKind, items: Vec<ClinicalItem>) -> ItemBatchEvent {
    ItemBatchEvent {
        hospital_id: hospital(),
        registration_id: registration(registration_id),
        category,
        items,
    }
}
