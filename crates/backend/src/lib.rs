pub mod wire;

mod http;

use thiserror::Error;
use triage_core::RateLimitInfo;

pub use http::HttpBackend;
pub use wire::{
    AccessCheckRequest, AccessCheckResponse, LabAnalysisResponse, StartSessionRequest,
    StartSessionResponse, StepMessageRequest, StepMessageResponse, SystemStatusResponse,
    TempUserStatsResponse,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
    /// Application-level refusal carried in a 2xx body.
    #[error("{0}")]
    Rejected(String),
}

/// A lab-report file plus the identity it is metered against. Exactly one
/// of `temp_user_id` or `account` is expected.
#[derive(Debug, Clone)]
pub struct LabUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub temp_user_id: Option<String>,
    pub account: Option<(String, String)>,
}

/// The remote diagnosis service. Everything the engine sends or receives
/// goes through this seam, so tests can script the whole dialogue.
pub trait DiagnosisBackend: Send + Sync {
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, BackendError>;

    async fn send_step(
        &self,
        request: &StepMessageRequest,
    ) -> Result<StepMessageResponse, BackendError>;

    /// Re-checked immediately before every rate-limited action.
    async fn check_access(&self, temp_user_id: &str) -> Result<RateLimitInfo, BackendError>;

    async fn analyze_lab_report(
        &self,
        upload: &LabUpload,
    ) -> Result<LabAnalysisResponse, BackendError>;

    async fn system_status(&self) -> Result<SystemStatusResponse, BackendError>;

    async fn create_temp_user(&self, requested_id: &str) -> Result<String, BackendError>;

    async fn validate_temp_user(&self, temp_user_id: &str) -> Result<bool, BackendError>;

    async fn temp_user_stats(
        &self,
        temp_user_id: &str,
    ) -> Result<TempUserStatsResponse, BackendError>;

    async fn activity_ping(&self, temp_user_id: &str) -> Result<(), BackendError>;
}
