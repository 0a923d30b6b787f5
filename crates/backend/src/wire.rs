use serde::{Deserialize, Serialize};
use serde_json::Value;

use triage_core::RateLimitInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: String,
    pub is_temp_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    /// Opening question of the guided dialogue.
    pub message: String,
    #[serde(default)]
    pub remaining_daily: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMessageRequest {
    pub session_id: String,
    /// Step code, e.g. "pain_severity".
    pub step: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_user_id: Option<String>,
}

/// Either the next question (`message`) or a terminal diagnosis payload
/// (`diagnosis_data`), which may be in either backend schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMessageResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub diagnosis_data: Option<Value>,
    #[serde(default)]
    pub next_step: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheckRequest {
    pub temp_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheckResponse {
    pub allowed: bool,
    #[serde(default)]
    pub remaining_daily: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl From<AccessCheckResponse> for RateLimitInfo {
    fn from(response: AccessCheckResponse) -> Self {
        RateLimitInfo {
            can_use: response.allowed,
            remaining_daily: response.remaining_daily,
            error: response.error,
            suggestion: response.suggestion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabAnalysisResponse {
    pub success: bool,
    #[serde(default)]
    pub ai_analysis: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub remaining_daily: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusResponse {
    #[serde(default)]
    pub analysis_available: bool,
    #[serde(default)]
    pub supported_formats: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTempUserRequest {
    /// Client-generated opaque id; the server may echo or replace it.
    pub temp_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTempUserResponse {
    pub temp_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateTempUserResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempUserStatsResponse {
    #[serde(default)]
    pub sessions_started: u32,
    #[serde(default)]
    pub analyses_run: u32,
    #[serde(default)]
    pub remaining_daily: Option<u32>,
}
