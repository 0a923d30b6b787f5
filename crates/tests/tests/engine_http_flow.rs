mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use common::{spawn, MockState};
use triage_backend::HttpBackend;
use triage_core::{normalize, MessageKind, ReportSection, UiHint};
use triage_engine::{ClientIdentity, EngineError, IdentityProvider, IntakeEngine};
use triage_observability::EngineMetrics;
use triage_storage::{IdentityStore, MemoryIdentityStore, StoredIdentity};

async fn engine_for(base: &str) -> IntakeEngine<HttpBackend> {
    let backend = Arc::new(HttpBackend::new(base).unwrap());
    IntakeEngine::new(
        backend,
        ClientIdentity::Temp {
            temp_user_id: "tmp-flow".to_string(),
        },
        EngineMetrics::shared(),
    )
}

#[tokio::test]
async fn full_intake_flow_reaches_a_rendered_diagnosis() {
    let state = MockState::new();
    state.queue_reply(json!({
        "message": "On a scale of 1 to 10, how severe is it?",
        "next_step": "pain_severity"
    }));
    state.queue_reply(json!({
        "message": "Based on your answers, here is the assessment.",
        "diagnosis_data": {
            "diagnosis": [{
                "disease": "Flu",
                "confidence": 82,
                "severity": "medium",
                "symptom_coverage": 70,
                "key_symptoms": ["fever", "cough"]
            }]
        },
        "next_step": null
    }));
    let base = spawn(state.clone()).await;
    let mut engine = engine_for(&base).await;

    let outcome = engine
        .process_message("I have a terrible headache and fever")
        .await
        .unwrap();
    assert_eq!(outcome.hint, UiHint::YesNo);

    let outcome = engine.process_message("yes").await.unwrap();
    assert_eq!(engine.session_id(), Some("mock-sess-1"));
    assert_eq!(outcome.hint, UiHint::Scale);
    assert_eq!(engine.remaining_daily(), Some(2));

    let outcome = engine.process_message("8").await.unwrap();
    assert!(engine.diagnosis_complete());

    let bodies = state.step_bodies.lock();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["step"], "greeting");
    assert_eq!(bodies[1]["step"], "pain_severity");
    assert_eq!(bodies[1]["data"]["severity"], 8);
    assert_eq!(bodies[1]["data"]["severity_description"], "8/10 - Severe");
    drop(bodies);

    let diagnosis = outcome
        .new_messages
        .iter()
        .find(|message| message.kind == MessageKind::Diagnosis)
        .expect("diagnosis message");
    let report = normalize(diagnosis.diagnosis.as_ref().unwrap());
    match &report.sections[0] {
        ReportSection::Conditions { cards, .. } => {
            assert_eq!(cards[0].headline, "Flu — 82% confidence, Medium severity");
        }
        other => panic!("expected conditions, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_quota_refuses_before_session_start() {
    let state = MockState::new();
    state.deny_access();
    let base = spawn(state.clone()).await;
    let mut engine = engine_for(&base).await;

    engine
        .process_message("I feel sick and nauseous")
        .await
        .unwrap();
    let error = engine.process_message("yes").await.unwrap_err();

    match error {
        EngineError::RateLimited {
            message,
            suggestion,
        } => {
            assert_eq!(message, "Daily diagnosis limit reached");
            assert_eq!(suggestion.as_deref(), Some("Quota resets at midnight UTC"));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(state.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identity_is_created_once_and_reused() {
    let state = MockState::new();
    let base = spawn(state).await;
    let backend = Arc::new(HttpBackend::new(&base).unwrap());
    let store = MemoryIdentityStore::new();

    let provider = IdentityProvider::new(backend.clone(), store.clone(), "default");
    let first = provider.ensure_identity().await.unwrap();
    let second = provider.ensure_identity().await.unwrap();

    assert_eq!(first, second);
    let stored = store.load_identity("default").await.unwrap().unwrap();
    assert_eq!(Some(stored.temp_user_id.as_str()), first.temp_user_id());
    assert!(stored.last_validated_at.is_some());
}

#[tokio::test]
async fn rejected_identity_is_recreated() {
    let state = MockState::new();
    let base = spawn(state).await;
    let backend = Arc::new(HttpBackend::new(&base).unwrap());
    let store = MemoryIdentityStore::new();

    // Seed an id the backend has never issued; validation rejects it.
    store
        .save_identity(
            "default",
            &StoredIdentity {
                temp_user_id: "stale-id".to_string(),
                created_at: Utc::now(),
                last_validated_at: None,
            },
        )
        .await
        .unwrap();

    let provider = IdentityProvider::new(backend, store.clone(), "default");
    let identity = provider.ensure_identity().await.unwrap();

    assert_ne!(identity.temp_user_id(), Some("stale-id"));
    let stored = store.load_identity("default").await.unwrap().unwrap();
    assert_ne!(stored.temp_user_id, "stale-id");
}

#[tokio::test]
async fn new_session_resets_engine_state() {
    let state = MockState::new();
    state.queue_reply(json!({
        "message": "Done.",
        "diagnosis_data": { "possible_conditions": [{ "name": "Cold", "confidence": 60 }] },
        "next_step": null
    }));
    let base = spawn(state).await;
    let mut engine = engine_for(&base).await;

    engine
        .process_message("I have a terrible headache and fever")
        .await
        .unwrap();
    engine.process_message("yes").await.unwrap();
    assert!(engine.diagnosis_complete());

    engine.start_new_session();
    assert!(!engine.diagnosis_complete());
    assert!(engine.session_id().is_none());
    assert_eq!(engine.transcript().len(), 1);
}
