//! Integration tests for sub-resource pipelines and diagnostic chains
//!
//! These tests verify that:
//! - Items wait until their encounter holds a registry id
//! - Lab chains are written in order and resume where they stopped
//! - A failing category never blocks the others
//! - Re-sent records are matched by natural key
//! - Concurrent submissions write each item at most once

mod common;

use common::{batch, engine, lab, lifecycle, radiology, ScriptedRegistry};
use medbridge::adapters::registry::RejectionKind;
use medbridge::domain::encounter::EncounterStatus;
use medbridge::domain::errors::BridgeError;
use medbridge::domain::events::{SweepKind, VitalSigns, VitalSignsEvent};
use medbridge::domain::items::{ClinicalItem, ConditionRecord, ItemKind};
use std::time::Duration;

const LAB_CHAIN: [&str; 4] = ["ServiceRequest", "Specimen", "Observation", "DiagnosticReport"];

fn condition(pmr_id: &str, code: &str) -> ClinicalItem {
    ClinicalItem::Condition(ConditionRecord {
        pmr_id: pmr_id.to_string(),
        code: code.to_string(),
        name: "Gastroenteritis".to_string(),
        recorded_at: Some(common::t(2)),
    })
}

fn vitals(registration_id: &str) -> VitalSignsEvent {
    VitalSignsEvent {
        hospital_id: common::hospital(),
        registration_id: common::registration(registration_id),
        vitals: VitalSigns {
            heart_rate: Some(88.0),
            respiratory_rate: Some(18.0),
            measured_at: Some(common::t(1)),
            ..VitalSigns::default()
        },
    }
}

#[tokio::test]
async fn test_items_wait_for_registered_encounter() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    let events = lifecycle("REG-10");
    engine.handle_encounter_event(&events[0]).await.unwrap();

    let report = engine
        .handle_item_batch(batch("REG-10", ItemKind::Lab, vec![lab("LAB-1")]))
        .await
        .unwrap();
    assert_eq!(report.ingest.inserted, 1);
    assert!(report.submit.is_none());
    assert!(registry.calls().is_empty());

    engine.handle_encounter_event(&events[1]).await.unwrap();
    let finished = engine.handle_encounter_event(&events[2]).await.unwrap();
    assert_eq!(finished.items.accepted, 1);

    let mut expected = vec!["Encounter"];
    expected.extend(LAB_CHAIN);
    assert_eq!(registry.written_types(), expected);

    let items = engine
        .list_items(&common::hospital(), &common::registration("REG-10"), ItemKind::Lab)
        .await
        .unwrap();
    assert_eq!(
        items[0].sync.external_id.as_deref(),
        Some("diagnosticreport-5")
    );
}

#[tokio::test]
async fn test_chain_links_earlier_stages() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-11") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.clear_calls();

    let report = engine
        .handle_item_batch(batch("REG-11", ItemKind::Lab, vec![lab("LAB-2")]))
        .await
        .unwrap();
    assert_eq!(report.submit.unwrap().accepted, 1);

    let calls = registry.calls();
    let specimen = &calls[1].payload;
    assert_eq!(specimen["request"][0]["reference"], "ServiceRequest/servicerequest-2");
    let report = &calls[3].payload;
    assert_eq!(report["basedOn"][0]["reference"], "ServiceRequest/servicerequest-2");
    assert_eq!(report["result"][0]["reference"], "Observation/observation-4");
}

#[tokio::test]
async fn test_radiology_chain_has_no_specimen() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-12") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.clear_calls();

    engine
        .handle_item_batch(batch("REG-12", ItemKind::Radiology, vec![radiology("RAD-1")]))
        .await
        .unwrap();
    assert_eq!(
        registry.written_types(),
        vec!["ServiceRequest", "Observation", "DiagnosticReport"]
    );
}

#[tokio::test]
async fn test_interrupted_chain_resumes_at_missing_stage() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-13") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.fail("Observation");

    let report = engine
        .handle_item_batch(batch("REG-13", ItemKind::Lab, vec![lab("LAB-3")]))
        .await
        .unwrap();
    let submit = report.submit.unwrap();
    assert_eq!(submit.failed, 1);
    assert_eq!(submit.accepted, 0);
    assert_eq!(registry.count("create", "ServiceRequest"), 1);
    assert_eq!(registry.count("create", "Specimen"), 1);

    registry.heal();
    registry.clear_calls();
    let sweep = engine.reconcile(SweepKind::Items).await.unwrap();
    assert_eq!(sweep.items.accepted, 1);
    assert_eq!(registry.written_types(), vec!["Observation", "DiagnosticReport"]);

    let calls = registry.calls();
    assert_eq!(
        calls[0].payload["specimen"]["reference"],
        "Specimen/specimen-3"
    );

    let status = engine.status().await.unwrap();
    assert!(status.pending_items.is_empty());
}

#[tokio::test]
async fn test_failing_category_does_not_block_others() {
    let registry = ScriptedRegistry::new();
    registry.fail("Condition");
    let engine = engine(registry.clone());
    let events = lifecycle("REG-14");
    engine.handle_encounter_event(&events[0]).await.unwrap();

    engine
        .handle_item_batch(batch("REG-14", ItemKind::Condition, vec![condition("D-1", "A09")]))
        .await
        .unwrap();
    engine.handle_vital_signs(vitals("REG-14")).await.unwrap();

    engine.handle_encounter_event(&events[1]).await.unwrap();
    let finished = engine.handle_encounter_event(&events[2]).await.unwrap();
    assert!(matches!(
        finished.outcome,
        Some(medbridge::core::lifecycle::EncounterOutcome::Accepted(_))
    ));
    assert_eq!(finished.items.accepted, 2);
    assert_eq!(finished.items.failed, 1);
    assert_eq!(registry.count("create", "Observation"), 2);

    registry.heal();
    let sweep = engine.reconcile(SweepKind::Items).await.unwrap();
    assert_eq!(sweep.items.accepted, 1);
    assert_eq!(registry.count("create", "Observation"), 2);
    assert_eq!(registry.count("create", "Condition"), 2);
}

#[tokio::test]
async fn test_resent_records_match_by_natural_key() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-15") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    engine
        .handle_item_batch(batch("REG-15", ItemKind::Condition, vec![condition("D-1", "A09")]))
        .await
        .unwrap();

    let unchanged = engine
        .handle_item_batch(batch("REG-15", ItemKind::Condition, vec![condition("D-1", "A09")]))
        .await
        .unwrap();
    assert_eq!(unchanged.ingest.unchanged, 1);
    assert_eq!(unchanged.submit.unwrap().accepted, 0);
    assert_eq!(registry.count("create", "Condition"), 1);

    let changed = engine
        .handle_item_batch(batch("REG-15", ItemKind::Condition, vec![condition("D-1", "A08")]))
        .await
        .unwrap();
    assert_eq!(changed.ingest.updated, 1);
    assert_eq!(changed.submit.unwrap().accepted, 1);
    assert_eq!(registry.count("create", "Condition"), 1);
    assert_eq!(registry.count("update", "Condition"), 1);

    let items = engine
        .list_items(&common::hospital(), &common::registration("REG-15"), ItemKind::Condition)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_changed_lab_rewrites_its_chain() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-16") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    engine
        .handle_item_batch(batch("REG-16", ItemKind::Lab, vec![lab("LAB-6")]))
        .await
        .unwrap();
    registry.clear_calls();

    let mut record = lab("LAB-6");
    if let ClinicalItem::Lab(ref mut r) = record {
        r.value = Some(11.2);
        r.result = Some("11.2".to_string());
    }
    engine
        .handle_item_batch(batch("REG-16", ItemKind::Lab, vec![record]))
        .await
        .unwrap();

    for stage in LAB_CHAIN {
        assert_eq!(registry.count("update", stage), 1, "{stage}");
        assert_eq!(registry.count("create", stage), 0, "{stage}");
    }
}

#[tokio::test]
async fn test_rejected_item_is_not_retried_unchanged() {
    let registry = ScriptedRegistry::new();
    registry.reject("Condition", RejectionKind::InvalidValue, "code not found");
    let engine = engine(registry.clone());
    for e in lifecycle("REG-17") {
        engine.handle_encounter_event(&e).await.unwrap();
    }

    let report = engine
        .handle_item_batch(batch("REG-17", ItemKind::Condition, vec![condition("D-9", "XXX")]))
        .await
        .unwrap();
    assert_eq!(report.submit.unwrap().rejected, 1);

    registry.heal();
    let sweep = engine.reconcile(SweepKind::Items).await.unwrap();
    assert_eq!(sweep.items.accepted, 0);
    assert_eq!(registry.count("create", "Condition"), 1);
}

#[tokio::test]
async fn test_unclassified_rejection_is_retried_by_sweep() {
    let registry = ScriptedRegistry::new();
    registry.reject("Condition", RejectionKind::Other, "temporarily refused");
    registry.reject("ServiceRequest", RejectionKind::Other, "temporarily refused");
    let engine = engine(registry.clone());
    for e in lifecycle("REG-19") {
        engine.handle_encounter_event(&e).await.unwrap();
    }

    engine
        .handle_item_batch(batch("REG-19", ItemKind::Condition, vec![condition("D-10", "A09")]))
        .await
        .unwrap();
    engine
        .handle_item_batch(batch("REG-19", ItemKind::Lab, vec![lab("LAB-9")]))
        .await
        .unwrap();

    let hospital = common::hospital();
    let registration = common::registration("REG-19");
    let conditions = engine
        .list_items(&hospital, &registration, ItemKind::Condition)
        .await
        .unwrap();
    assert!(!conditions[0].sync.needs_upstream_fix);
    let labs = engine.list_items(&hospital, &registration, ItemKind::Lab).await.unwrap();
    assert!(!labs[0].sync.needs_upstream_fix);
    assert!(!labs[0].sync.is_synced());

    registry.heal();
    registry.clear_calls();
    let sweep = engine.reconcile(SweepKind::Items).await.unwrap();
    assert_eq!(sweep.items.accepted, 2);
    assert_eq!(registry.count("create", "Condition"), 1);
    for stage in LAB_CHAIN {
        assert_eq!(registry.count("create", stage), 1, "{stage}");
    }

    let status = engine.status().await.unwrap();
    assert!(status.pending_items.is_empty());
}

#[tokio::test]
async fn test_concurrent_item_submissions_create_once() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-40") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.fail("Condition");
    let conditions = vec![condition("D-40", "A09")];
    engine
        .handle_item_batch(batch("REG-40", ItemKind::Condition, conditions.clone()))
        .await
        .unwrap();

    registry.heal();
    registry.set_delay(Duration::from_millis(50));
    registry.clear_calls();
    let (sweep, resent) = tokio::join!(
        engine.reconcile(SweepKind::Items),
        engine.handle_item_batch(batch("REG-40", ItemKind::Condition, conditions))
    );
    sweep.unwrap();
    resent.unwrap();
    assert_eq!(registry.count("create", "Condition"), 1);

    let items = engine
        .list_items(&common::hospital(), &common::registration("REG-40"), ItemKind::Condition)
        .await
        .unwrap();
    assert!(items[0].sync.is_synced());
}

#[tokio::test]
async fn test_concurrent_chain_submissions_create_once() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-41") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.fail("ServiceRequest");
    engine
        .handle_item_batch(batch("REG-41", ItemKind::Lab, vec![lab("LAB-41")]))
        .await
        .unwrap();

    registry.heal();
    registry.set_delay(Duration::from_millis(50));
    registry.clear_calls();
    let (sweep, resent) = tokio::join!(
        engine.reconcile(SweepKind::Items),
        engine.handle_item_batch(batch("REG-41", ItemKind::Lab, vec![lab("LAB-41")]))
    );
    sweep.unwrap();
    resent.unwrap();
    for stage in LAB_CHAIN {
        assert_eq!(registry.count("create", stage), 1, "{stage}");
    }
}

#[tokio::test]
async fn test_record_changed_during_submission_is_resent() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-42") {
        engine.handle_encounter_event(&e).await.unwrap();
    }
    registry.fail("Condition");
    engine
        .handle_item_batch(batch("REG-42", ItemKind::Condition, vec![condition("D-42", "A09")]))
        .await
        .unwrap();

    registry.heal();
    registry.set_delay(Duration::from_millis(50));
    registry.clear_calls();
    let (sweep, corrected) = tokio::join!(
        engine.reconcile(SweepKind::Items),
        engine.handle_item_batch(batch("REG-42", ItemKind::Condition, vec![condition("D-42", "A08")]))
    );
    assert_eq!(sweep.unwrap().items.accepted, 1);
    assert_eq!(corrected.unwrap().ingest.updated, 1);

    let hospital = common::hospital();
    let registration = common::registration("REG-42");
    let items = engine
        .list_items(&hospital, &registration, ItemKind::Condition)
        .await
        .unwrap();
    let external_id = items[0].sync.external_id.clone();
    assert!(external_id.is_some());
    assert_eq!(items[0].record, condition("D-42", "A08"));
    assert!(items[0].sync.pending_update);

    engine.reconcile(SweepKind::Items).await.unwrap();
    assert_eq!(registry.count("create", "Condition"), 1);
    assert_eq!(registry.count("update", "Condition"), 1);
    let items = engine
        .list_items(&hospital, &registration, ItemKind::Condition)
        .await
        .unwrap();
    assert_eq!(items[0].sync.external_id, external_id);
    assert!(!items[0].sync.pending_update);
}

#[tokio::test]
async fn test_batch_for_unknown_encounter_fails() {
    let engine = engine(ScriptedRegistry::new());
    let err = engine
        .handle_item_batch(batch("NOPE", ItemKind::Lab, vec![lab("LAB-7")]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotFound(_)));
}

#[tokio::test]
async fn test_mixed_batch_is_rejected_before_storage() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    engine
        .handle_encounter_event(&common::event("REG-18", EncounterStatus::Arrived, 0, false))
        .await
        .unwrap();

    let err = engine
        .handle_item_batch(batch(
            "REG-18",
            ItemKind::Condition,
            vec![condition("D-1", "A09"), lab("LAB-8")],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation(_)));

    let stored = engine
        .list_items(&common::hospital(), &common::registration("REG-18"), ItemKind::Condition)
        .await
        .unwrap();
    assert!(stored.is_empty());
}
