//! Encounter payload
//!
//! Built from a repaired copy of the history; the stored history is never
//! changed by this module.

use crate::core::lifecycle::history::{needs_repair, repair_history};
use crate::core::pipeline::payload::format_timestamp;
use crate::domain::encounter::{Encounter, ExternalRef};
use crate::domain::history::{History, Period};
use serde_json::{json, Value};

/// Condition reference used when an encounter carries no ranked diagnosis
const PLACEHOLDER_CONDITION: &str = "urn:uuid:80fca897-e965-4c66-94d9-6cdfb9e8b62d";

fn period(p: &Period) -> Value {
    let mut value = json!({});
    if let Some(start) = p.start {
        value["start"] = json!(format_timestamp(start));
    }
    if let Some(end) = p.end {
        value["end"] = json!(format_timestamp(end));
    }
    value
}

fn reference(resource_type: &str, r: Option<&ExternalRef>) -> Value {
    let mut value = json!({
        "reference": format!("{resource_type}/{}", r.map_or("", |r| r.id.as_str()))
    });
    if let Some(display) = r.and_then(|r| r.display.as_deref()) {
        value["display"] = json!(display);
    }
    value
}

fn diagnosis_role() -> Value {
    json!({
        "coding": [{
            "system": "http://terminology.hl7.org/CodeSystem/diagnosis-role",
            "code": "DD",
            "display": "Discharge diagnosis"
        }]
    })
}

/// The history the payload is built from
pub fn payload_history(encounter: &Encounter) -> History {
    if needs_repair(&encounter.history) {
        repair_history(&encounter.history)
    } else {
        encounter.history.clone()
    }
}

/// Builds the encounter resource.
///
/// `identifier_system` is the full encounter identifier system of the
/// hospital's organization.
pub fn build_encounter_payload(
    encounter: &Encounter,
    organization_id: &str,
    identifier_system: &str,
) -> Value {
    let history = payload_history(encounter);

    let diagnosis: Vec<Value> = if encounter.diagnoses.is_empty() {
        vec![json!({
            "condition": {
                "reference": PLACEHOLDER_CONDITION,
                "display": "General medical examination"
            },
            "use": diagnosis_role(),
            "rank": 1
        })]
    } else {
        encounter
            .diagnoses
            .iter()
            .map(|d| {
                json!({
                    "condition": {
                        "reference": format!("urn:uuid:{}", d.code),
                        "display": d.name
                    },
                    "use": diagnosis_role(),
                    "rank": d.rank
                })
            })
            .collect()
    };

    json!({
        "resourceType": "Encounter",
        "identifier": [{
            "system": identifier_system,
            "value": encounter.registration_id.as_str()
        }],
        "status": encounter.status.fhir_code(),
        "class": {
            "system": "http://terminology.hl7.org/CodeSystem/v3-ActCode",
            "code": "AMB",
            "display": "ambulatory"
        },
        "subject": reference("Patient", encounter.patient.as_ref()),
        "participant": [{
            "type": [{
                "coding": [{
                    "system": "http://terminology.hl7.org/CodeSystem/v3-ParticipationType",
                    "code": "ATND",
                    "display": "attender"
                }]
            }],
            "individual": reference("Practitioner", encounter.practitioner.as_ref())
        }],
        "period": period(&Period {
            start: history.arrived.start,
            end: history.finished.end,
        }),
        "location": [{ "location": reference("Location", encounter.location.as_ref()) }],
        "diagnosis": diagnosis,
        "statusHistory": [
            { "status": "arrived", "period": period(&history.arrived) },
            { "status": "in-progress", "period": period(&history.in_progress) },
            { "status": "finished", "period": period(&history.finished) }
        ],
        "serviceProvider": { "reference": format!("Organization/{organization_id}") }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encounter::{Diagnosis, EncounterStatus};
    use crate::domain::ids::{HospitalId, RegistrationId};
    use chrono::{TimeZone, Utc};

    fn encounter() -> Encounter {
        let t = |m| Utc.with_ymd_and_hms(2024, 3, 1, 8, m, 0).unwrap();
        let mut enc = Encounter::new(
            HospitalId::new("H1").unwrap(),
            RegistrationId::new("REG-1").unwrap(),
            EncounterStatus::Finished,
        );
        enc.patient = Some(ExternalRef::new("P1", Some("Budi".to_string())));
        enc.practitioner = Some(ExternalRef::new("N1", Some("dr. Sari".to_string())));
        enc.location = Some(ExternalRef::new("L1", Some("Poli Umum".to_string())));
        enc.history.arrived = Period::closed(t(0), t(1));
        enc.history.in_progress = Period::closed(t(1), t(2));
        enc.history.finished = Period::closed(t(1), t(2));
        enc
    }

    #[test]
    fn test_payload_shape() {
        let enc = encounter();
        let payload = build_encounter_payload(
            &enc,
            "org-1",
            "http://sys-ids.kemkes.go.id/encounter/org-1",
        );
        assert_eq!(payload["resourceType"], "Encounter");
        assert_eq!(payload["identifier"][0]["value"], "REG-1");
        assert_eq!(payload["status"], "finished");
        assert_eq!(payload["class"]["code"], "AMB");
        assert_eq!(payload["subject"]["reference"], "Patient/P1");
        assert_eq!(payload["serviceProvider"]["reference"], "Organization/org-1");
        assert_eq!(payload["period"]["start"], "2024-03-01T08:00:00.000Z");
        assert_eq!(payload["statusHistory"][1]["status"], "in-progress");
    }

    #[test]
    fn test_payload_uses_repaired_copy() {
        let enc = encounter();
        let before = enc.history.clone();
        let payload = build_encounter_payload(&enc, "org-1", "sys");
        // finished started before in-progress ended, so it is pushed forward
        assert_eq!(
            payload["statusHistory"][2]["period"]["start"],
            "2024-03-01T08:02:01.000Z"
        );
        assert_eq!(enc.history, before);
    }

    #[test]
    fn test_placeholder_diagnosis() {
        let mut enc = encounter();
        let payload = build_encounter_payload(&enc, "org-1", "sys");
        assert_eq!(payload["diagnosis"][0]["condition"]["reference"], PLACEHOLDER_CONDITION);

        enc.diagnoses = vec![Diagnosis {
            code: "A09".to_string(),
            name: "Diarrhoea".to_string(),
            is_primary: true,
            rank: 1,
        }];
        let payload = build_encounter_payload(&enc, "org-1", "sys");
        assert_eq!(payload["diagnosis"][0]["condition"]["reference"], "urn:uuid:A09");
        assert_eq!(payload["diagnosis"][0]["rank"], 1);
    }
}
