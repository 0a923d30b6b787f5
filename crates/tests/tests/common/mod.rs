#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Scripted diagnosis backend used by the integration suites. Step replies
/// are popped off a queue; quota and known temp users are mutable knobs.
#[derive(Default)]
pub struct MockState {
    pub allow_access: AtomicBool,
    pub step_replies: Mutex<VecDeque<Value>>,
    pub start_calls: AtomicUsize,
    pub step_bodies: Mutex<Vec<Value>>,
    pub ping_calls: AtomicUsize,
    pub known_temp_users: Mutex<HashSet<String>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        state.allow_access.store(true, Ordering::SeqCst);
        Arc::new(state)
    }

    pub fn queue_reply(&self, reply: Value) {
        self.step_replies.lock().push_back(reply);
    }

    pub fn deny_access(&self) {
        self.allow_access.store(false, Ordering::SeqCst);
    }
}

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/diagnosis/session/start", post(start_session))
        .route("/api/diagnosis/session/message", post(session_message))
        .route("/api/temp-users/create", post(create_temp_user))
        .route("/api/temp-users/validate", post(validate_temp_user))
        .route("/api/temp-users/check-access", post(check_access))
        .route("/api/temp-users/:id/stats", get(temp_user_stats))
        .route("/api/temp-users/activity-ping", post(activity_ping))
        .route("/lab-reports/analyze-file", post(analyze_file))
        .route("/lab-reports/system/status", get(system_status))
        .with_state(state)
}

/// Serve the mock on an ephemeral port and return its base url.
pub async fn spawn(state: Arc<MockState>) -> String {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });

    format!("http://{addr}")
}

pub const OPENING_QUESTION: &str = "How are you feeling today?";

async fn start_session(State(state): State<Arc<MockState>>, Json(_body): Json<Value>) -> Json<Value> {
    state.start_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "session_id": "mock-sess-1",
        "message": OPENING_QUESTION,
        "remaining_daily": 2
    }))
}

async fn session_message(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.step_bodies.lock().push(body);
    let reply = state
        .step_replies
        .lock()
        .pop_front()
        .unwrap_or_else(|| json!({ "message": "Noted.", "next_step": null }));
    Json(reply)
}

async fn create_temp_user(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let id = body["temp_user_id"].as_str().unwrap_or("issued-id").to_string();
    state.known_temp_users.lock().insert(id.clone());
    Json(json!({ "temp_user_id": id }))
}

async fn validate_temp_user(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let id = body["temp_user_id"].as_str().unwrap_or_default();
    let valid = state.known_temp_users.lock().contains(id);
    Json(json!({ "valid": valid }))
}

async fn check_access(State(state): State<Arc<MockState>>, Json(_body): Json<Value>) -> Json<Value> {
    if state.allow_access.load(Ordering::SeqCst) {
        Json(json!({ "allowed": true, "remaining_daily": 2 }))
    } else {
        Json(json!({
            "allowed": false,
            "remaining_daily": 0,
            "error": "Daily diagnosis limit reached",
            "suggestion": "Quota resets at midnight UTC"
        }))
    }
}

async fn temp_user_stats(
    State(state): State<Arc<MockState>>,
    Path(_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "sessions_started": state.start_calls.load(Ordering::SeqCst),
        "analyses_run": 0,
        "remaining_daily": 2
    }))
}

async fn activity_ping(State(state): State<Arc<MockState>>, Json(_body): Json<Value>) -> Json<Value> {
    state.ping_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "ok": true }))
}

// The real endpoint takes a multipart file; the mock ignores the body.
async fn analyze_file(State(state): State<Arc<MockState>>) -> Json<Value> {
    if state.allow_access.load(Ordering::SeqCst) {
        Json(json!({
            "success": true,
            "ai_analysis": "Hemoglobin and glucose are within the reference ranges.",
            "remaining_daily": 1
        }))
    } else {
        Json(json!({ "success": false, "error": "limit reached" }))
    }
}

async fn system_status() -> Json<Value> {
    Json(json!({
        "analysis_available": true,
        "supported_formats": ["pdf", "jpg", "png"]
    }))
}
