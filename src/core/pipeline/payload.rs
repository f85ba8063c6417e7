//! Registry payloads for clinical items
//!
//! Every builder is a pure function of the stored record and the encounter
//! context. Persisting the outcome is the pipeline's job.

use crate::domain::encounter::Encounter;
use crate::domain::items::{
    AllergyRecord, CarePlanRecord, ClinicalItem, ConditionRecord, MedicationRecord,
    PrognosisRecord, ProcedureRecord, VitalSignRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

/// Formats a timestamp as `YYYY-MM-DDTHH:mm:ss.SSSZ`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Adds the registry id to a payload sent as an update
pub fn with_resource_id(mut payload: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut payload {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    payload
}

/// Encounter-level values shared by every item payload
#[derive(Debug, Clone, Copy)]
pub struct PayloadContext<'a> {
    pub encounter: &'a Encounter,
    pub organization_id: &'a str,
    /// Base of the identifier systems, without a trailing slash
    pub identifier_system: &'a str,
}

impl<'a> PayloadContext<'a> {
    pub fn new(encounter: &'a Encounter, organization_id: &'a str, identifier_system: &'a str) -> Self {
        Self {
            encounter,
            organization_id,
            identifier_system,
        }
    }

    fn patient_id(&self) -> &str {
        self.encounter.patient.as_ref().map_or("", |p| p.id.as_str())
    }

    pub fn patient_name(&self) -> &str {
        self.encounter
            .patient
            .as_ref()
            .and_then(|p| p.display.as_deref())
            .unwrap_or("")
    }

    pub fn patient(&self) -> Value {
        json!({ "reference": format!("Patient/{}", self.patient_id()) })
    }

    pub fn patient_with_display(&self) -> Value {
        json!({
            "reference": format!("Patient/{}", self.patient_id()),
            "display": self.patient_name(),
        })
    }

    pub fn practitioner(&self) -> Value {
        let id = self.encounter.practitioner.as_ref().map_or("", |p| p.id.as_str());
        json!({ "reference": format!("Practitioner/{id}") })
    }

    pub fn organization(&self) -> Value {
        json!({ "reference": format!("Organization/{}", self.organization_id) })
    }

    pub fn encounter(&self) -> Value {
        let id = self.encounter.sync.external_id.as_deref().unwrap_or("");
        json!({ "reference": format!("Encounter/{id}") })
    }

    /// Identifier under `{base}/{segment}/{organization}`
    pub fn identifier(&self, segment: &str, value: &str) -> Value {
        json!({
            "system": format!("{}/{segment}/{}", self.identifier_system, self.organization_id),
            "use": "official",
            "value": value,
        })
    }

    /// Fallback time for records without their own timestamp
    pub fn fallback_time(&self) -> DateTime<Utc> {
        self.encounter
            .history
            .finished
            .end
            .unwrap_or(self.encounter.updated_at)
    }

    fn timestamp(&self, at: Option<DateTime<Utc>>) -> String {
        format_timestamp(at.unwrap_or_else(|| self.fallback_time()))
    }
}

/// Builds the payload of a non-diagnostic item
///
/// Lab and radiology records are expanded into a chain instead and yield
/// `None` here.
pub fn build_item_payload(record: &ClinicalItem, ctx: &PayloadContext<'_>) -> Option<Value> {
    let payload = match record {
        ClinicalItem::Condition(r) => condition(r, ctx),
        ClinicalItem::Observation(r) => vital_sign(r, ctx),
        ClinicalItem::Procedure(r) => procedure(r, ctx),
        ClinicalItem::CarePlan(r) => care_plan(r, ctx),
        ClinicalItem::Prognosis(r) => prognosis(r, ctx),
        ClinicalItem::Allergy(r) => allergy(r, ctx),
        ClinicalItem::Medication(r) => medication(r, &record.natural_key(), ctx),
        ClinicalItem::Lab(_) | ClinicalItem::Radiology(_) => return None,
    };
    Some(payload)
}

fn condition(r: &ConditionRecord, ctx: &PayloadContext<'_>) -> Value {
    let mut payload = json!({
        "resourceType": "Condition",
        "clinicalStatus": {
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/condition-clinical",
                "code": "active",
                "display": "Active"
            }]
        },
        "category": [{
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/condition-category",
                "code": "encounter-diagnosis",
                "display": "Encounter Diagnosis"
            }]
        }],
        "code": {
            "coding": [{
                "system": "http://hl7.org/fhir/sid/icd-10",
                "code": r.code,
                "display": r.name
            }]
        },
        "subject": ctx.patient(),
        "encounter": ctx.encounter(),
    });
    if let Some(at) = r.recorded_at {
        payload["recordedDate"] = json!(format_timestamp(at));
    }
    payload
}

fn vital_sign(r: &VitalSignRecord, ctx: &PayloadContext<'_>) -> Value {
    let (code, display) = r.category.loinc();
    let (unit, unit_code) = r.category.unit();
    let at = ctx.timestamp(r.measured_at);
    json!({
        "resourceType": "Observation",
        "status": "final",
        "category": [{
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                "code": "vital-signs",
                "display": "Vital Signs"
            }]
        }],
        "code": {
            "coding": [{ "system": "http://loinc.org", "code": code, "display": display }]
        },
        "subject": ctx.patient(),
        "performer": [ctx.practitioner()],
        "encounter": ctx.encounter(),
        "effectiveDateTime": at,
        "issued": at,
        "valueQuantity": {
            "value": r.value,
            "unit": unit,
            "system": "http://unitsofmeasure.org",
            "code": unit_code
        }
    })
}

fn procedure(r: &ProcedureRecord, ctx: &PayloadContext<'_>) -> Value {
    let performed = ctx.timestamp(r.performed_at);
    let mut payload = json!({
        "resourceType": "Procedure",
        "status": "completed",
        "code": {
            "coding": [{
                "system": "http://hl7.org/fhir/sid/icd-9-cm",
                "code": r.code,
                "display": r.name
            }]
        },
        "subject": ctx.patient(),
        "encounter": ctx.encounter(),
        "performedPeriod": { "start": performed, "end": performed },
        "performer": [{ "actor": ctx.practitioner() }]
    });
    if let Some(note) = r.note.as_deref().filter(|n| !n.trim().is_empty()) {
        payload["note"] = json!([{ "text": note }]);
    }
    payload
}

fn care_plan(r: &CarePlanRecord, ctx: &PayloadContext<'_>) -> Value {
    let created = ctx.timestamp(r.created_at);
    json!({
        "resourceType": "CarePlan",
        "status": "active",
        "intent": "plan",
        "title": format!("Care plan {} towards {} at {created}", ctx.patient_name(), r.procedure_name),
        "category": [{
            "coding": [{
                "system": "http://snomed.info/sct",
                "code": "736372004",
                "display": "Discharge care plan"
            }]
        }],
        "description": r.description.as_deref().unwrap_or("-"),
        "subject": ctx.patient_with_display(),
        "encounter": ctx.encounter(),
        "created": created,
        "author": ctx.practitioner()
    })
}

fn prognosis(r: &PrognosisRecord, ctx: &PayloadContext<'_>) -> Value {
    let at = ctx.timestamp(None);
    json!({
        "resourceType": "ClinicalImpression",
        "identifier": [ctx.identifier("clinicalimpression", &r.pmr_prognosa_id)],
        "status": "completed",
        "subject": ctx.patient_with_display(),
        "encounter": ctx.encounter(),
        "effectiveDateTime": at,
        "date": at,
        "assessor": ctx.practitioner(),
        "summary": r.description.as_deref().unwrap_or(""),
        "prognosisCodeableConcept": [{
            "coding": [{
                "system": "http://snomed.info/sct",
                "code": r.code.as_deref().unwrap_or(""),
                "display": r.name.as_deref().unwrap_or("")
            }]
        }]
    })
}

fn allergy(r: &AllergyRecord, ctx: &PayloadContext<'_>) -> Value {
    json!({
        "resourceType": "AllergyIntolerance",
        "identifier": [ctx.identifier("allergy", &r.pmr_allergy_id)],
        "clinicalStatus": {
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical",
                "code": "active",
                "display": "Active"
            }]
        },
        "verificationStatus": {
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/allergyintolerance-verification",
                "code": "confirmed",
                "display": "Confirmed"
            }]
        },
        "category": [r.category.as_str()],
        "code": {
            "coding": [{
                "system": "http://snomed.info/sct",
                "code": r.code.as_deref().unwrap_or(""),
                "display": r.name
            }],
            "text": r.name
        },
        "patient": ctx.patient_with_display(),
        "encounter": ctx.encounter(),
        "recordedDate": ctx.timestamp(r.recorded_at),
        "recorder": ctx.practitioner()
    })
}

fn medication(r: &MedicationRecord, key: &str, ctx: &PayloadContext<'_>) -> Value {
    let kfa = "http://sys-ids.kemkes.go.id/kfa";
    let ingredients: Vec<Value> = r
        .ingredients
        .iter()
        .map(|i| {
            let mut ingredient = json!({
                "itemCodeableConcept": {
                    "coding": [{
                        "system": kfa,
                        "code": i.code.as_deref().unwrap_or(""),
                        "display": i.name
                    }]
                },
                "isActive": true
            });
            if let Some(strength) = i.strength.as_deref() {
                ingredient["strength"] = json!({ "text": strength });
            }
            ingredient
        })
        .collect();
    let (type_code, type_display) = if r.compound {
        ("SD", "Give of such doses")
    } else {
        ("NC", "Non-compound")
    };

    let mut payload = json!({
        "resourceType": "Medication",
        "identifier": [{
            "system": format!("{}/{}", ctx.identifier_system, ctx.organization_id),
            "use": "official",
            "value": key
        }],
        "code": {
            "coding": [{
                "system": kfa,
                "code": r.code.as_deref().unwrap_or(""),
                "display": r.name
            }]
        },
        "status": "active",
        "manufacturer": ctx.organization(),
        "ingredient": ingredients,
        "extension": [{
            "url": "https://fhir.kemkes.go.id/r4/StructureDefinition/MedicationType",
            "valueCodeableConcept": {
                "coding": [{
                    "system": "http://terminology.kemkes.go.id/CodeSystem/medication-type",
                    "code": type_code,
                    "display": type_display
                }]
            }
        }]
    });
    if let Some(instruction) = r.dosage_instruction.as_deref() {
        payload["note"] = json!([{ "text": instruction }]);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encounter::{EncounterStatus, ExternalRef};
    use crate::domain::ids::{HospitalId, RegistrationId};
    use crate::domain::items::{DiagnosticRecord, Ingredient, VitalSignCategory};
    use chrono::TimeZone;

    fn encounter() -> Encounter {
        let mut enc = Encounter::new(
            HospitalId::new("H1").unwrap(),
            RegistrationId::new("REG-1").unwrap(),
            EncounterStatus::Finished,
        );
        enc.patient = Some(ExternalRef::new("P100", Some("Budi".to_string())));
        enc.practitioner = Some(ExternalRef::new("N200", None));
        enc.sync.external_id = Some("enc-9".to_string());
        enc
    }

    #[test]
    fn test_format_timestamp_millis_utc() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-01T10:00:00.000Z");
    }

    #[test]
    fn test_condition_payload_references() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let record = ClinicalItem::Condition(ConditionRecord {
            pmr_id: "D1".to_string(),
            code: "A09".to_string(),
            name: "Diarrhoea".to_string(),
            recorded_at: None,
        });
        let payload = build_item_payload(&record, &ctx).unwrap();
        assert_eq!(payload["resourceType"], "Condition");
        assert_eq!(payload["subject"]["reference"], "Patient/P100");
        assert_eq!(payload["encounter"]["reference"], "Encounter/enc-9");
        assert_eq!(payload["code"]["coding"][0]["code"], "A09");
    }

    #[test]
    fn test_vital_sign_quantity() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let record = ClinicalItem::Observation(VitalSignRecord {
            category: VitalSignCategory::SystolicBlood,
            value: 120.0,
            measured_at: None,
        });
        let payload = build_item_payload(&record, &ctx).unwrap();
        assert_eq!(payload["code"]["coding"][0]["code"], "8480-6");
        assert_eq!(payload["valueQuantity"]["unit"], "mm[Hg]");
    }

    #[test]
    fn test_compound_medication_uses_concoction_id() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let record = ClinicalItem::Medication(MedicationRecord {
            pmr_receipt_id: "RX-1".to_string(),
            concoction_id: Some("RACIK-1".to_string()),
            compound: true,
            code: None,
            name: "Racikan batuk".to_string(),
            dosage_instruction: None,
            quantity: Some(10.0),
            unit: None,
            ingredients: vec![Ingredient {
                code: Some("93001019".to_string()),
                name: "Paracetamol".to_string(),
                strength: Some("500 mg".to_string()),
            }],
        });
        let payload = build_item_payload(&record, &ctx).unwrap();
        assert_eq!(payload["identifier"][0]["value"], "RACIK-1");
        assert_eq!(
            payload["extension"][0]["valueCodeableConcept"]["coding"][0]["code"],
            "SD"
        );
        assert_eq!(payload["ingredient"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_diagnostics_have_no_flat_payload() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let record = ClinicalItem::Lab(DiagnosticRecord {
            pmr_uuid: "LAB-1".to_string(),
            code: "718-7".to_string(),
            name: "Hemoglobin".to_string(),
            result: None,
            value: None,
            unit: None,
            conclusion: None,
            specimen_type: None,
            requested_at: None,
            collected_at: None,
            issued_at: None,
        });
        assert!(build_item_payload(&record, &ctx).is_none());
    }

    #[test]
    fn test_with_resource_id() {
        let payload = with_resource_id(json!({"resourceType": "Condition"}), "c-1");
        assert_eq!(payload["id"], "c-1");
    }
}
