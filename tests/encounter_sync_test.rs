//! Integration tests for encounter submission
//!
//! These tests verify that:
//! - An encounter is sent once it is finished and complete
//! - A known registry id turns later submissions into updates
//! - Concurrent submissions create at most one remote encounter
//! - Rejected encounters wait for corrected data, failed ones are retried

mod common;

use common::{engine, event, lifecycle, ScriptedRegistry};
use medbridge::adapters::database::{EncounterStore, MemoryStore};
use medbridge::adapters::notify::LogSink;
use medbridge::adapters::registry::RejectionKind;
use medbridge::core::duplicate::DuplicateReconciler;
use medbridge::core::lifecycle::{EncounterOutcome, EncounterService, EncounterSubmitter};
use medbridge::core::SyncContext;
use medbridge::domain::encounter::EncounterStatus;
use medbridge::domain::events::SweepKind;
use medbridge::domain::history::Period;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_finished_encounter_is_sent_once() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());

    let mut reports = Vec::new();
    for e in lifecycle("REG-1") {
        reports.push(engine.handle_encounter_event(&e).await.unwrap());
    }

    assert!(matches!(
        reports[0].outcome,
        Some(EncounterOutcome::NotReady(_))
    ));
    assert!(matches!(
        reports[2].outcome,
        Some(EncounterOutcome::Accepted(_))
    ));
    assert_eq!(registry.count("create", "Encounter"), 1);

    let encounter = &reports[2].encounter;
    assert_eq!(encounter.sync.external_id.as_deref(), Some("encounter-1"));
    assert_eq!(
        encounter.history.finished,
        Period::closed(common::t(1), common::t(2))
    );
    assert!(encounter.notes.contains(&"Encounter sent".to_string()));
}

#[tokio::test]
async fn test_payload_carries_registration_identifier() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-ID") {
        engine.handle_encounter_event(&e).await.unwrap();
    }

    let call = registry
        .calls()
        .into_iter()
        .find(|c| c.resource_type == "Encounter")
        .unwrap();
    assert_eq!(call.payload["identifier"][0]["value"], "REG-ID");
    assert_eq!(call.payload["status"], "finished");
    assert_eq!(call.payload["subject"]["reference"], "Patient/P-1");
}

#[tokio::test]
async fn test_resent_event_does_not_create_again() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    for e in lifecycle("REG-2") {
        engine.handle_encounter_event(&e).await.unwrap();
    }

    let unchanged = engine
        .handle_encounter_event(&event("REG-2", EncounterStatus::Finished, 2, true))
        .await
        .unwrap();
    assert!(matches!(
        unchanged.outcome,
        Some(EncounterOutcome::AlreadySynced(_))
    ));

    let corrected = engine
        .handle_encounter_event(&event("REG-2", EncounterStatus::Finished, 7, true))
        .await
        .unwrap();
    assert!(matches!(
        corrected.outcome,
        Some(EncounterOutcome::Accepted(ref id)) if id == "encounter-1"
    ));
    assert!(!corrected.encounter.sync.pending_update);

    assert_eq!(registry.count("create", "Encounter"), 1);
    assert_eq!(registry.count("update", "Encounter"), 1);
    let update = registry
        .calls()
        .into_iter()
        .find(|c| c.method == "update")
        .unwrap();
    assert_eq!(update.id.as_deref(), Some("encounter-1"));
    assert_eq!(update.payload["id"], "encounter-1");
}

#[tokio::test]
async fn test_concurrent_submissions_create_once() {
    let registry = ScriptedRegistry::new();
    let store = Arc::new(MemoryStore::new());
    let ctx = SyncContext::new(
        store.clone(),
        registry.clone(),
        Arc::new(LogSink),
        common::directory(),
        Duration::from_secs(5),
    );
    let duplicates = Arc::new(DuplicateReconciler::new(ctx.clone()));
    let submitter = EncounterSubmitter::new(ctx, duplicates);

    let service = EncounterService::new(store.clone());
    let mut encounter = None;
    for e in lifecycle("REG-3") {
        encounter = Some(service.apply_event(&e).await.unwrap());
    }
    let encounter = encounter.unwrap();

    registry.set_delay(Duration::from_millis(50));
    let (first, second) = tokio::join!(submitter.submit(&encounter), submitter.submit(&encounter));
    let outcomes = [first.unwrap().outcome, second.unwrap().outcome];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, EncounterOutcome::Accepted(_)))
            .count(),
        1
    );
    assert!(outcomes
        .iter()
        .any(|o| *o == EncounterOutcome::Skipped("submission in progress elsewhere")));
    assert_eq!(registry.count("create", "Encounter"), 1);

    // A later pass sees the stored id
    let again = submitter.submit(&encounter).await.unwrap();
    assert!(matches!(again.outcome, EncounterOutcome::AlreadySynced(_)));
    assert_eq!(registry.count("create", "Encounter"), 1);
}

#[tokio::test]
async fn test_rejected_encounter_waits_for_corrected_data() {
    let registry = ScriptedRegistry::new();
    registry.reject("Encounter", RejectionKind::InvalidValue, "period.end is invalid");
    let engine = engine(registry.clone());

    let mut last = None;
    for e in lifecycle("REG-4") {
        last = Some(engine.handle_encounter_event(&e).await.unwrap());
    }
    let report = last.unwrap();
    assert!(matches!(report.outcome, Some(EncounterOutcome::Rejected(_))));
    assert!(report.encounter.sync.needs_upstream_fix);
    assert_eq!(
        report.encounter.sync.description.as_deref(),
        Some("period.end is invalid")
    );

    registry.heal();
    let sweep = engine.reconcile(SweepKind::Encounters).await.unwrap();
    assert_eq!(sweep.encounters_skipped, 1);
    assert_eq!(sweep.encounters_submitted, 0);
    assert_eq!(registry.count("create", "Encounter"), 1);

    let corrected = engine
        .handle_encounter_event(&event("REG-4", EncounterStatus::Finished, 9, true))
        .await
        .unwrap();
    assert!(matches!(corrected.outcome, Some(EncounterOutcome::Accepted(_))));
    assert_eq!(registry.count("create", "Encounter"), 2);
}

#[tokio::test]
async fn test_failed_submission_is_retried_by_sweep() {
    let registry = ScriptedRegistry::new();
    registry.fail("Encounter");
    let engine = engine(registry.clone());

    let mut last = None;
    for e in lifecycle("REG-5") {
        last = Some(engine.handle_encounter_event(&e).await.unwrap());
    }
    let report = last.unwrap();
    assert!(report.outcome.is_none());
    assert!(report.error.unwrap().contains("unreachable"));

    let stored = engine
        .store()
        .find_encounter(&report.encounter.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.sync.is_synced());
    assert!(!stored.sync.needs_upstream_fix);
    assert_eq!(stored.sync.attempts, 1);

    let failing = engine.reconcile(SweepKind::Encounters).await.unwrap();
    assert_eq!(failing.encounters_failed, 1);
    assert_eq!(failing.errors.len(), 1);

    registry.heal();
    let sweep = engine.reconcile(SweepKind::Encounters).await.unwrap();
    assert_eq!(sweep.encounters_examined, 1);
    assert_eq!(sweep.encounters_submitted, 1);

    let status = engine.status().await.unwrap();
    assert_eq!(status.pending_encounters, 0);
}

#[tokio::test]
async fn test_incomplete_encounter_stays_local() {
    let registry = ScriptedRegistry::new();
    let engine = engine(registry.clone());
    let mut e = event("REG-6", EncounterStatus::Finished, 2, true);
    e.practitioner = None;

    let report = engine.handle_encounter_event(&e).await.unwrap();
    assert!(matches!(report.outcome, Some(EncounterOutcome::NotReady(_))));

    let sweep = engine.reconcile(SweepKind::Encounters).await.unwrap();
    assert_eq!(sweep.encounters_not_ready, 1);
    assert!(registry.calls().is_empty());
}
