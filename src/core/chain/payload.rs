//! Stage payloads of a diagnostic chain
//!
//! Each stage references the registry ids of the stages before it, taken
//! from [`ChainRefs`].

use crate::core::pipeline::payload::{format_timestamp, PayloadContext};
use crate::domain::chain::{ChainRefs, ChainStage, DiagnosticCategory};
use crate::domain::items::DiagnosticRecord;
use serde_json::{json, Value};

fn category_concept(category: DiagnosticCategory) -> Value {
    let (code, display) = match category {
        DiagnosticCategory::Lab => ("108252007", "Laboratory procedure"),
        DiagnosticCategory::Rad => ("363679005", "Imaging"),
    };
    json!([{
        "coding": [{ "system": "http://snomed.info/sct", "code": code, "display": display }]
    }])
}

fn loinc(record: &DiagnosticRecord) -> Value {
    json!({
        "coding": [{ "system": "http://loinc.org", "code": record.code, "display": record.name }],
        "text": record.name
    })
}

fn reference(resource_type: &str, id: Option<&str>) -> Value {
    json!({ "reference": format!("{resource_type}/{}", id.unwrap_or("")) })
}

/// Builds the payload of one chain stage
pub fn build_stage_payload(
    stage: ChainStage,
    category: DiagnosticCategory,
    record: &DiagnosticRecord,
    refs: &ChainRefs,
    ctx: &PayloadContext<'_>,
) -> Value {
    match stage {
        ChainStage::ServiceRequest => service_request(category, record, ctx),
        ChainStage::Specimen => specimen(record, refs, ctx),
        ChainStage::Observation => observation(category, record, refs, ctx),
        ChainStage::DiagnosticReport => diagnostic_report(category, record, refs, ctx),
    }
}

fn service_request(
    category: DiagnosticCategory,
    record: &DiagnosticRecord,
    ctx: &PayloadContext<'_>,
) -> Value {
    let reason = ctx
        .encounter
        .diagnoses
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let reason = if reason.is_empty() {
        "General Examination".to_string()
    } else {
        reason
    };
    let occurrence = record.requested_at.unwrap_or_else(|| ctx.fallback_time());

    json!({
        "resourceType": "ServiceRequest",
        "identifier": [ctx.identifier("servicerequest", &record.pmr_uuid)],
        "status": "active",
        "intent": "original-order",
        "category": category_concept(category),
        "code": loinc(record),
        "subject": ctx.patient(),
        "encounter": ctx.encounter(),
        "occurrenceDateTime": format_timestamp(occurrence),
        "requester": ctx.practitioner(),
        "performer": [ctx.practitioner()],
        "reasonCode": [{ "text": reason }]
    })
}

fn specimen(record: &DiagnosticRecord, refs: &ChainRefs, ctx: &PayloadContext<'_>) -> Value {
    let received = format_timestamp(record.collected_at.unwrap_or_else(|| ctx.fallback_time()));
    json!({
        "resourceType": "Specimen",
        "identifier": [ctx.identifier("specimen", &record.pmr_uuid)],
        "status": "available",
        "type": {
            "coding": [{
                "system": "http://snomed.info/sct",
                "code": record.specimen_type.as_deref().unwrap_or(""),
                "display": record.specimen_type.as_deref().unwrap_or("")
            }]
        },
        "subject": ctx.patient(),
        "request": [reference("ServiceRequest", refs.get(ChainStage::ServiceRequest))],
        "receivedTime": received,
        "extension": [{
            "url": "https://fhir.kemkes.go.id/r4/StructureDefinition/TransportedTime",
            "valueDateTime": received
        }]
    })
}

fn observation(
    category: DiagnosticCategory,
    record: &DiagnosticRecord,
    refs: &ChainRefs,
    ctx: &PayloadContext<'_>,
) -> Value {
    let issued = format_timestamp(record.issued_at.unwrap_or_else(|| ctx.fallback_time()));
    let mut payload = json!({
        "resourceType": "Observation",
        "identifier": [ctx.identifier("observation", &record.pmr_uuid)],
        "status": "final",
        "category": category_concept(category),
        "code": loinc(record),
        "subject": ctx.patient(),
        "encounter": ctx.encounter(),
        "effectiveDateTime": issued,
        "issued": issued,
        "performer": [ctx.practitioner(), ctx.organization()],
        "basedOn": [reference("ServiceRequest", refs.get(ChainStage::ServiceRequest))]
    });
    if category == DiagnosticCategory::Lab {
        payload["specimen"] = reference("Specimen", refs.get(ChainStage::Specimen));
    }
    match (record.value, record.result.as_deref()) {
        (Some(value), _) => {
            payload["valueQuantity"] = json!({
                "value": value,
                "unit": record.unit.as_deref().unwrap_or(""),
                "system": "http://unitsofmeasure.org",
                "code": record.unit.as_deref().unwrap_or("")
            });
        }
        (None, Some(result)) => payload["valueString"] = json!(result),
        (None, None) => {}
    }
    payload
}

fn diagnostic_report(
    category: DiagnosticCategory,
    record: &DiagnosticRecord,
    refs: &ChainRefs,
    ctx: &PayloadContext<'_>,
) -> Value {
    let issued = format_timestamp(record.issued_at.unwrap_or_else(|| ctx.fallback_time()));
    let (section, section_display) = match category {
        DiagnosticCategory::Lab => ("CH", "Chemistry"),
        DiagnosticCategory::Rad => ("RAD", "Radiology"),
    };
    let mut payload = json!({
        "resourceType": "DiagnosticReport",
        "identifier": [{
            "system": format!(
                "{}/diagnostic/{}/{}",
                ctx.identifier_system,
                ctx.organization_id,
                category.as_str()
            ),
            "use": "official",
            "value": record.pmr_uuid
        }],
        "status": "final",
        "category": [{
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/v2-0074",
                "code": section,
                "display": section_display
            }]
        }],
        "code": loinc(record),
        "subject": ctx.patient(),
        "encounter": ctx.encounter(),
        "effectiveDateTime": issued,
        "issued": issued,
        "performer": [ctx.practitioner(), ctx.organization()],
        "result": [reference("Observation", refs.get(ChainStage::Observation))],
        "basedOn": [reference("ServiceRequest", refs.get(ChainStage::ServiceRequest))]
    });
    if category == DiagnosticCategory::Lab {
        payload["specimen"] = json!([reference("Specimen", refs.get(ChainStage::Specimen))]);
    }
    if let Some(conclusion) = record.conclusion.as_deref() {
        payload["conclusion"] = json!(conclusion);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encounter::{Encounter, EncounterStatus, ExternalRef};
    use crate::domain::ids::{HospitalId, RegistrationId};

    fn record() -> DiagnosticRecord {
        DiagnosticRecord {
            pmr_uuid: "LAB-1".to_string(),
            code: "718-7".to_string(),
            name: "Hemoglobin".to_string(),
            result: None,
            value: Some(13.2),
            unit: Some("g/dL".to_string()),
            conclusion: Some("Normal".to_string()),
            specimen_type: Some("119297000".to_string()),
            requested_at: None,
            collected_at: None,
            issued_at: None,
        }
    }

    fn encounter() -> Encounter {
        let mut enc = Encounter::new(
            HospitalId::new("H1").unwrap(),
            RegistrationId::new("REG-1").unwrap(),
            EncounterStatus::Finished,
        );
        enc.patient = Some(ExternalRef::new("P1", None));
        enc.practitioner = Some(ExternalRef::new("N1", None));
        enc.sync.external_id = Some("enc-1".to_string());
        enc
    }

    fn refs() -> ChainRefs {
        let mut refs = ChainRefs::default();
        refs.set(ChainStage::ServiceRequest, "sr-1");
        refs.set(ChainStage::Specimen, "sp-1");
        refs.set(ChainStage::Observation, "obs-1");
        refs
    }

    #[test]
    fn test_lab_observation_links_specimen() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let payload = build_stage_payload(
            ChainStage::Observation,
            DiagnosticCategory::Lab,
            &record(),
            &refs(),
            &ctx,
        );
        assert_eq!(payload["basedOn"][0]["reference"], "ServiceRequest/sr-1");
        assert_eq!(payload["specimen"]["reference"], "Specimen/sp-1");
        assert_eq!(payload["valueQuantity"]["value"], 13.2);
    }

    #[test]
    fn test_rad_report_has_no_specimen() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let payload = build_stage_payload(
            ChainStage::DiagnosticReport,
            DiagnosticCategory::Rad,
            &record(),
            &refs(),
            &ctx,
        );
        assert!(payload.get("specimen").is_none());
        assert_eq!(payload["result"][0]["reference"], "Observation/obs-1");
        assert_eq!(
            payload["identifier"][0]["system"],
            "http://sys-ids.kemkes.go.id/diagnostic/org-1/rad"
        );
    }

    #[test]
    fn test_service_request_default_reason() {
        let enc = encounter();
        let ctx = PayloadContext::new(&enc, "org-1", "http://sys-ids.kemkes.go.id");
        let payload = build_stage_payload(
            ChainStage::ServiceRequest,
            DiagnosticCategory::Lab,
            &record(),
            &ChainRefs::default(),
            &ctx,
        );
        assert_eq!(payload["reasonCode"][0]["text"], "General Examination");
        assert_eq!(payload["intent"], "original-order");
    }
}
