//! Inbound events and outbound notifications
//!
//! Inbound events arrive over HTTP or as NDJSON lines. Everything is
//! validated here, before any datastore mutation.

use crate::domain::encounter::{EncounterStatus, ExternalRef};
use crate::domain::ids::{HospitalId, RegistrationId};
use crate::domain::items::{ClinicalItem, ItemKind, VitalSignCategory, VitalSignRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Diagnosis as sent by the medical-record system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisInput {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Encounter lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterEvent {
    pub hospital_id: HospitalId,
    pub registration_id: RegistrationId,
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

/// Batch of sub-resources of one category for one encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBatchEvent {
    pub hospital_id: HospitalId,
    pub registration_id: RegistrationId,
    pub category: ItemKind,
    #[serde(default)]
    pub items: Vec<ClinicalItem>,
}

impl ItemBatchEvent {
    /// Every item must belong to the batch category and pass its own checks
    pub fn validate(&self) -> Result<(), String> {
        for item in &self.items {
            if item.kind() != self.category {
                return Err(format!(
                    "{} item '{}' sent in a {} batch",
                    item.kind(),
                    item.natural_key(),
                    self.category
                ));
            }
            item.validate()?;
        }
        Ok(())
    }
}

/// Vital signs captured at the bedside, one field per measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSigns {
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub respiratory_rate: Option<f64>,
    #[serde(default)]
    pub oxygen_saturation: Option<f64>,
    #[serde(default)]
    pub body_temperature: Option<f64>,
    /// "systolic/diastolic", e.g. "120/80"
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
}

impl VitalSigns {
    /// Splits the snapshot into one observation per present measurement
    pub fn into_items(self) -> Result<Vec<ClinicalItem>, String> {
        let measured_at = self.measured_at;
        let mut items = Vec::new();
        let mut push = |category: VitalSignCategory, value: Option<f64>| {
            if let Some(value) = value {
                items.push(ClinicalItem::Observation(VitalSignRecord {
                    category,
                    value,
                    measured_at,
                }));
            }
        };

        push(VitalSignCategory::HeartRate, self.heart_rate);
        push(VitalSignCategory::RespiratoryRate, self.respiratory_rate);
        push(VitalSignCategory::OxygenSaturation, self.oxygen_saturation);
        push(VitalSignCategory::BodyTemperature, self.body_temperature);

        if let Some(raw) = self.blood_pressure.as_deref().filter(|s| !s.trim().is_empty()) {
            let (systolic, diastolic) = parse_blood_pressure(raw)?;
            push(VitalSignCategory::SystolicBlood, Some(systolic));
            push(VitalSignCategory::DiastolicBlood, Some(diastolic));
        }

        Ok(items)
    }
}

fn parse_blood_pressure(raw: &str) -> Result<(f64, f64), String> {
    let (systolic, diastolic) = raw
        .split_once('/')
        .ok_or_else(|| format!("Invalid blood pressure '{raw}', expected systolic/diastolic"))?;
    let systolic = systolic
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid systolic value in '{raw}'"))?;
    let diastolic = diastolic
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid diastolic value in '{raw}'"))?;
    Ok((systolic, diastolic))
}

/// Vital sign event for one encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSignsEvent {
    pub hospital_id: HospitalId,
    pub registration_id: RegistrationId,
    pub vitals: VitalSigns,
}

impl VitalSignsEvent {
    pub fn into_batch(self) -> Result<ItemBatchEvent, String> {
        Ok(ItemBatchEvent {
            hospital_id: self.hospital_id,
            registration_id: self.registration_id,
            category: ItemKind::Observation,
            items: self.vitals.into_items()?,
        })
    }
}

/// Which reconciliation pass to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    /// Finished encounters never accepted by the registry
    Encounters,
    /// Synced encounters with unsynced sub-resources
    Items,
    /// Encounters marked as duplicates
    Duplicates,
    /// Duplicates, then encounters, then items
    All,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Encounters => "encounters",
            SweepKind::Items => "items",
            SweepKind::Duplicates => "duplicates",
            SweepKind::All => "all",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SweepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "encounters" => Ok(SweepKind::Encounters),
            "items" => Ok(SweepKind::Items),
            "duplicates" => Ok(SweepKind::Duplicates),
            "all" => Ok(SweepKind::All),
            other => Err(format!(
                "Unknown sweep '{other}'. Must be one of: encounters, items, duplicates, all"
            )),
        }
    }
}

/// Any event a queue consumer may receive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Encounter(EncounterEvent),
    Items(ItemBatchEvent),
    VitalSigns(VitalSignsEvent),
    Reconcile {
        #[serde(default = "default_sweep")]
        sweep: SweepKind,
    },
}

fn default_sweep() -> SweepKind {
    SweepKind::All
}

/// Outbound message published once per resolved record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// "encounter" or an item category
    pub category: String,
    pub hospital_id: HospitalId,
    pub registration_id: RegistrationId,
    #[serde(default)]
    pub natural_key: Option<String>,
    pub external_id: Option<String>,
    pub description: Option<String>,
    /// Category-specific echo fields
    #[serde(default)]
    pub extra: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(category: impl Into<String>, hospital_id: HospitalId, registration_id: RegistrationId) -> Self {
        Self {
            category: category.into(),
            hospital_id,
            registration_id,
            natural_key: None,
            external_id: None,
            description: None,
            extra: serde_json::Value::Null,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_natural_key(mut self, key: impl Into<String>) -> Self {
        self.natural_key = Some(key.into());
        self
    }

    pub fn with_outcome(mut self, external_id: Option<String>, description: Option<String>) -> Self {
        self.external_id = external_id;
        self.description = description;
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::items::ConditionRecord;
    use serde_json::json;

    #[test]
    fn test_vital_signs_split_blood_pressure() {
        let vitals = VitalSigns {
            heart_rate: Some(80.0),
            blood_pressure: Some("120/80".to_string()),
            ..Default::default()
        };
        let items = vitals.into_items().unwrap();
        let keys: Vec<String> = items.iter().map(ClinicalItem::natural_key).collect();
        assert_eq!(keys, vec!["heart_rate", "systolic_blood", "diastolic_blood"]);
    }

    #[test]
    fn test_vital_signs_bad_blood_pressure() {
        let vitals = VitalSigns {
            blood_pressure: Some("120-80".to_string()),
            ..Default::default()
        };
        assert!(vitals.into_items().is_err());
    }

    #[test]
    fn test_batch_rejects_mixed_kinds() {
        let batch = ItemBatchEvent {
            hospital_id: HospitalId::new("H1").unwrap(),
            registration_id: RegistrationId::new("R1").unwrap(),
            category: ItemKind::Procedure,
            items: vec![ClinicalItem::Condition(ConditionRecord {
                pmr_id: "D1".to_string(),
                code: "A00".to_string(),
                name: "Cholera".to_string(),
                recorded_at: None,
            })],
        };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_inbound_event_ndjson_shape() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "encounter",
            "hospitalId": "H1",
            "registrationId": "REG-1",
            "status": "finished",
            "processDate": "2024-03-01T10:00:00Z",
            "isPaid": true
        }))
        .unwrap();
        assert!(matches!(event, InboundEvent::Encounter(ref e) if e.is_paid));

        let reconcile: InboundEvent = serde_json::from_value(json!({"type": "reconcile"})).unwrap();
        assert_eq!(reconcile, InboundEvent::Reconcile { sweep: SweepKind::All });
    }

    #[test]
    fn test_sweep_kind_parse() {
        assert_eq!("items".parse::<SweepKind>().unwrap(), SweepKind::Items);
        assert!("nightly".parse::<SweepKind>().is_err());
    }
}
