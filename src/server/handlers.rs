//! Route handlers

use crate::core::engine::{EncounterReport, EngineStatus, ItemBatchReport};
use crate::core::reconcile::SweepSummary;
use crate::domain::encounter::{Encounter, EncounterStatus, ExternalRef};
use crate::domain::events::{
    DiagnosisInput, EncounterEvent, ItemBatchEvent, SweepKind, VitalSigns, VitalSignsEvent,
};
use crate::domain::ids::{HospitalId, RegistrationId};
use crate::domain::items::{ClinicalItem, ItemKind, SyncableItem};
use crate::server::error::ApiError;
use crate::server::AppState;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: String,
}

/// Lifecycle event body; the encounter is named by the path
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterEventBody {
    pub status: EncounterStatus,
    pub process_date: DateTime<Utc>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub diagnoses: Vec<DiagnosisInput>,
    #[serde(default)]
    pub patient: Option<ExternalRef>,
    #[serde(default)]
    pub practitioner: Option<ExternalRef>,
    #[serde(default)]
    pub location: Option<ExternalRef>,
}

#[derive(Debug, Deserialize)]
pub struct ItemBatchBody {
    #[serde(default)]
    pub items: Vec<ClinicalItem>,
}

fn registration(hospital: &str, registration: &str) -> Result<(HospitalId, RegistrationId), ApiError> {
    let hospital_id = HospitalId::new(hospital).map_err(ApiError::bad_request)?;
    let registration_id = RegistrationId::new(registration).map_err(ApiError::bad_request)?;
    Ok((hospital_id, registration_id))
}

pub async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    state.engine.test_connection().await?;
    Ok(Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.engine.store().backend_name().to_string(),
    }))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<EngineStatus> {
    Ok(Json(state.engine.status().await?))
}

pub async fn get_encounter(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<Encounter> {
    let Path((hospital, reg)) = path?;
    let (hospital_id, registration_id) = registration(&hospital, &reg)?;
    Ok(Json(
        state
            .engine
            .get_encounter(&hospital_id, &registration_id)
            .await?,
    ))
}

pub async fn post_encounter(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Json<EncounterEventBody>, JsonRejection>,
) -> ApiResult<EncounterReport> {
    let Path((hospital, reg)) = path?;
    let (hospital_id, registration_id) = registration(&hospital, &reg)?;
    let Json(body) = body?;

    let event = EncounterEvent {
        hospital_id,
        registration_id,
        status: body.status,
        process_date: body.process_date,
        is_paid: body.is_paid,
        diagnoses: body.diagnoses,
        patient: body.patient,
        practitioner: body.practitioner,
        location: body.location,
    };
    Ok(Json(state.engine.handle_encounter_event(&event).await?))
}

pub async fn list_items(
    State(state): State<AppState>,
    path: Result<Path<(String, String, String)>, PathRejection>,
) -> ApiResult<Vec<SyncableItem>> {
    let Path((hospital, reg, category)) = path?;
    let (hospital_id, registration_id) = registration(&hospital, &reg)?;
    let kind = ItemKind::from_str(&category).map_err(ApiError::bad_request)?;
    Ok(Json(
        state
            .engine
            .list_items(&hospital_id, &registration_id, kind)
            .await?,
    ))
}

pub async fn post_items(
    State(state): State<AppState>,
    path: Result<Path<(String, String, String)>, PathRejection>,
    body: Result<Json<ItemBatchBody>, JsonRejection>,
) -> ApiResult<ItemBatchReport> {
    let Path((hospital, reg, category)) = path?;
    let (hospital_id, registration_id) = registration(&hospital, &reg)?;
    let category = ItemKind::from_str(&category).map_err(ApiError::bad_request)?;
    let Json(body) = body?;

    let event = ItemBatchEvent {
        hospital_id,
        registration_id,
        category,
        items: body.items,
    };
    Ok(Json(state.engine.handle_item_batch(event).await?))
}

pub async fn post_vital_signs(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Json<VitalSigns>, JsonRejection>,
) -> ApiResult<ItemBatchReport> {
    let Path((hospital, reg)) = path?;
    let (hospital_id, registration_id) = registration(&hospital, &reg)?;
    let Json(vitals) = body?;

    let event = VitalSignsEvent {
        hospital_id,
        registration_id,
        vitals,
    };
    Ok(Json(state.engine.handle_vital_signs(event).await?))
}

pub async fn reconcile(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<SweepSummary> {
    let Path(sweep) = path?;
    let kind = SweepKind::from_str(&sweep).map_err(ApiError::bad_request)?;
    crate::log_sweep_start!(kind, "http");
    Ok(Json(state.engine.reconcile(kind).await?))
}
