use std::sync::Arc;

use tracing::{info, instrument};

use triage_backend::{BackendError, DiagnosisBackend, LabUpload};
use triage_observability::EngineMetrics;

use crate::identity::ClientIdentity;
use crate::EngineError;

/// Sibling flow to the intake dialogue: upload a lab-report file and get
/// the analysis text back. Quota is re-checked immediately before the
/// upload, same as session start.
pub struct LabAnalyzer<B> {
    backend: Arc<B>,
    metrics: Arc<EngineMetrics>,
}

#[derive(Debug, Clone)]
pub struct LabAnalysis {
    pub summary: String,
    pub remaining_daily: Option<u32>,
}

impl<B: DiagnosisBackend> LabAnalyzer<B> {
    pub fn new(backend: Arc<B>, metrics: Arc<EngineMetrics>) -> Self {
        Self { backend, metrics }
    }

    #[instrument(skip(self, identity, bytes))]
    pub async fn analyze(
        &self,
        identity: &ClientIdentity,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<LabAnalysis, EngineError> {
        let access = self.backend.check_access(identity.rate_key()).await?;
        if !access.can_use {
            self.metrics.inc_rate_limited();
            return Err(EngineError::RateLimited {
                message: access
                    .error
                    .unwrap_or_else(|| "Daily analysis limit reached.".to_string()),
                suggestion: access.suggestion,
            });
        }

        let upload = LabUpload {
            file_name: file_name.to_string(),
            bytes,
            temp_user_id: identity.temp_user_id().map(str::to_string),
            account: match identity {
                ClientIdentity::Account { user_id, email } => {
                    Some((user_id.clone(), email.clone()))
                }
                ClientIdentity::Temp { .. } => None,
            },
        };

        let response = self.backend.analyze_lab_report(&upload).await?;
        if !response.success {
            return Err(EngineError::Backend(BackendError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "analysis failed".to_string()),
            )));
        }

        self.metrics.inc_lab_analysis();
        info!("lab report analyzed");

        Ok(LabAnalysis {
            summary: response.ai_analysis.unwrap_or_default(),
            remaining_daily: response.remaining_daily,
        })
    }
}
