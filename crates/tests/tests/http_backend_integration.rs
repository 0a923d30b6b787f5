mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{spawn, MockState, OPENING_QUESTION};
use triage_backend::{DiagnosisBackend, HttpBackend, LabUpload, StartSessionRequest, StepMessageRequest};

fn start_request(temp_user_id: &str) -> StartSessionRequest {
    StartSessionRequest {
        user_id: temp_user_id.to_string(),
        is_temp_user: true,
        email: None,
        temp_user_id: Some(temp_user_id.to_string()),
    }
}

#[tokio::test]
async fn session_start_and_step_round_trip() {
    let state = MockState::new();
    state.queue_reply(json!({ "message": "When did your symptoms start?", "next_step": "symptom_onset" }));
    let base = spawn(state.clone()).await;
    let backend = HttpBackend::new(&base).unwrap();

    let started = backend.start_session(&start_request("tmp-1")).await.unwrap();
    assert_eq!(started.session_id, "mock-sess-1");
    assert_eq!(started.message, OPENING_QUESTION);
    assert_eq!(started.remaining_daily, Some(2));

    let reply = backend
        .send_step(&StepMessageRequest {
            session_id: started.session_id,
            step: "greeting".to_string(),
            data: json!({ "message": "I feel sick" }),
            temp_user_id: Some("tmp-1".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(reply.message.as_deref(), Some("When did your symptoms start?"));
    assert!(reply.diagnosis_data.is_none());

    let bodies = state.step_bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["step"], "greeting");
    assert_eq!(bodies[0]["data"]["message"], "I feel sick");
}

#[tokio::test]
async fn denied_access_maps_to_rate_limit_info() {
    let state = MockState::new();
    state.deny_access();
    let base = spawn(state).await;
    let backend = HttpBackend::new(&base).unwrap();

    let info = backend.check_access("tmp-1").await.unwrap();
    assert!(!info.can_use);
    assert_eq!(info.remaining_daily, Some(0));
    assert_eq!(info.error.as_deref(), Some("Daily diagnosis limit reached"));
    assert_eq!(info.suggestion.as_deref(), Some("Quota resets at midnight UTC"));
}

#[tokio::test]
async fn temp_user_lifecycle_round_trip() {
    let state = MockState::new();
    let base = spawn(state.clone()).await;
    let backend = HttpBackend::new(&base).unwrap();

    let issued = backend.create_temp_user("requested-id").await.unwrap();
    assert_eq!(issued, "requested-id");
    assert!(backend.validate_temp_user(&issued).await.unwrap());
    assert!(!backend.validate_temp_user("unknown-id").await.unwrap());

    backend.activity_ping(&issued).await.unwrap();
    assert_eq!(state.ping_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let stats = backend.temp_user_stats(&issued).await.unwrap();
    assert_eq!(stats.remaining_daily, Some(2));
}

#[tokio::test]
async fn lab_report_upload_round_trip() {
    let state = MockState::new();
    let base = spawn(state).await;
    let backend = HttpBackend::new(&base).unwrap();

    let response = backend
        .analyze_lab_report(&LabUpload {
            file_name: "cbc.pdf".to_string(),
            bytes: b"%PDF-1.4 fake report".to_vec(),
            temp_user_id: Some("tmp-1".to_string()),
            account: None,
        })
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.ai_analysis.unwrap().contains("reference ranges"));
    assert_eq!(response.remaining_daily, Some(1));
}

#[tokio::test]
async fn system_status_reports_capabilities() {
    let state = MockState::new();
    let base = spawn(state).await;
    let backend = HttpBackend::new(&base).unwrap();

    let status = backend.system_status().await.unwrap();
    assert!(status.analysis_available);
    assert_eq!(status.supported_formats, ["pdf", "jpg", "png"]);
}

#[tokio::test]
async fn missing_route_surfaces_as_status_error() {
    let state = MockState::new();
    let base = spawn(state).await;
    let backend = HttpBackend::new(&format!("{base}/nowhere")).unwrap();

    let error = backend.check_access("tmp-1").await.unwrap_err();
    match error {
        triage_backend::BackendError::Status { status, .. } => assert_eq!(status, 404),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn mock_router_serves_status_directly() {
    let app = common::router(MockState::new());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/lab-reports/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
