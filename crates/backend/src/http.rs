use std::env;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use triage_core::RateLimitInfo;

use crate::wire::{
    AccessCheckRequest, AccessCheckResponse, CreateTempUserRequest, CreateTempUserResponse,
    LabAnalysisResponse, StartSessionRequest, StartSessionResponse, StepMessageRequest,
    StepMessageResponse, SystemStatusResponse, TempUserStatsResponse, ValidateTempUserResponse,
};
use crate::{BackendError, DiagnosisBackend, LabUpload};

const DEFAULT_TIMEOUT_SECONDS: u64 = 20;
const CONNECT_TIMEOUT_SECONDS: u64 = 6;

/// reqwest implementation of the diagnosis service contract.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let timeout = env::var("TRIAGE_HTTP_TIMEOUT_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, BackendError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        Self::decode(path, response).await
    }

    async fn get_json<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp, BackendError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        Self::decode(path, response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<Resp, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        debug!(path, status = status.as_u16(), "backend call ok");
        response
            .json()
            .await
            .map_err(|error| BackendError::Decode(error.to_string()))
    }
}

impl DiagnosisBackend for HttpBackend {
    async fn start_session(
        &self,
        request: &StartSessionRequest,
    ) -> Result<StartSessionResponse, BackendError> {
        self.post_json("/api/diagnosis/session/start", request).await
    }

    async fn send_step(
        &self,
        request: &StepMessageRequest,
    ) -> Result<StepMessageResponse, BackendError> {
        self.post_json("/api/diagnosis/session/message", request)
            .await
    }

    async fn check_access(&self, temp_user_id: &str) -> Result<RateLimitInfo, BackendError> {
        let response: AccessCheckResponse = self
            .post_json(
                "/api/temp-users/check-access",
                &AccessCheckRequest {
                    temp_user_id: temp_user_id.to_string(),
                },
            )
            .await?;
        Ok(response.into())
    }

    async fn analyze_lab_report(
        &self,
        upload: &LabUpload,
    ) -> Result<LabAnalysisResponse, BackendError> {
        let mut form = Form::new().part(
            "file",
            Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()),
        );
        if let Some(temp_user_id) = &upload.temp_user_id {
            form = form.text("temp_user_id", temp_user_id.clone());
        }
        if let Some((user_id, email)) = &upload.account {
            form = form
                .text("user_id", user_id.clone())
                .text("email", email.clone());
        }

        let response = self
            .client
            .post(self.url("/lab-reports/analyze-file"))
            .multipart(form)
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        Self::decode("/lab-reports/analyze-file", response).await
    }

    async fn system_status(&self) -> Result<SystemStatusResponse, BackendError> {
        self.get_json("/lab-reports/system/status").await
    }

    async fn create_temp_user(&self, requested_id: &str) -> Result<String, BackendError> {
        let response: CreateTempUserResponse = self
            .post_json(
                "/api/temp-users/create",
                &CreateTempUserRequest {
                    temp_user_id: requested_id.to_string(),
                },
            )
            .await?;
        Ok(response.temp_user_id)
    }

    async fn validate_temp_user(&self, temp_user_id: &str) -> Result<bool, BackendError> {
        let response: ValidateTempUserResponse = self
            .post_json(
                "/api/temp-users/validate",
                &AccessCheckRequest {
                    temp_user_id: temp_user_id.to_string(),
                },
            )
            .await?;
        Ok(response.valid)
    }

    async fn temp_user_stats(
        &self,
        temp_user_id: &str,
    ) -> Result<TempUserStatsResponse, BackendError> {
        self.get_json(&format!("/api/temp-users/{temp_user_id}/stats"))
            .await
    }

    async fn activity_ping(&self, temp_user_id: &str) -> Result<(), BackendError> {
        let _: serde_json::Value = self
            .post_json(
                "/api/temp-users/activity-ping",
                &AccessCheckRequest {
                    temp_user_id: temp_user_id.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}
