use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use triage_backend::{DiagnosisBackend, StartSessionRequest};
use triage_storage::{IdentityStore, StoredIdentity};

/// Who the engine is acting for: a signed-in account handed over by the
/// auth collaborator, or the device-persisted anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    Account { user_id: String, email: String },
    Temp { temp_user_id: String },
}

impl ClientIdentity {
    pub fn temp_user_id(&self) -> Option<&str> {
        match self {
            Self::Account { .. } => None,
            Self::Temp { temp_user_id } => Some(temp_user_id),
        }
    }

    /// Key the backend meters quota against.
    pub fn rate_key(&self) -> &str {
        match self {
            Self::Account { user_id, .. } => user_id,
            Self::Temp { temp_user_id } => temp_user_id,
        }
    }

    pub fn start_session_request(&self) -> StartSessionRequest {
        match self {
            Self::Account { user_id, email } => StartSessionRequest {
                user_id: user_id.clone(),
                is_temp_user: false,
                email: Some(email.clone()),
                temp_user_id: None,
            },
            Self::Temp { temp_user_id } => StartSessionRequest {
                user_id: temp_user_id.clone(),
                is_temp_user: true,
                email: None,
                temp_user_id: Some(temp_user_id.clone()),
            },
        }
    }
}

/// Resolves the durable anonymous identity: load, validate against the
/// backend, and recreate on rejection. Constructed explicitly over the two
/// seams so tests can run it against the in-memory store.
pub struct IdentityProvider<B, S> {
    backend: Arc<B>,
    store: S,
    profile: String,
}

impl<B: DiagnosisBackend, S: IdentityStore> IdentityProvider<B, S> {
    pub fn new(backend: Arc<B>, store: S, profile: impl Into<String>) -> Self {
        Self {
            backend,
            store,
            profile: profile.into(),
        }
    }

    #[instrument(skip(self), fields(profile = %self.profile))]
    pub async fn ensure_identity(&self) -> Result<ClientIdentity> {
        if let Some(stored) = self.store.load_identity(&self.profile).await? {
            match self.backend.validate_temp_user(&stored.temp_user_id).await {
                Ok(true) => {
                    let refreshed = StoredIdentity {
                        last_validated_at: Some(Utc::now()),
                        ..stored
                    };
                    self.store.save_identity(&self.profile, &refreshed).await?;
                    return Ok(ClientIdentity::Temp {
                        temp_user_id: refreshed.temp_user_id,
                    });
                }
                Ok(false) => {
                    warn!("stored temp user rejected by backend; recreating");
                    self.store.clear_identity(&self.profile).await?;
                }
                Err(error) => {
                    // Unreachable backend is not a rejection; reuse rather
                    // than minting a new identity per outage.
                    warn!(%error, "temp user validation unreachable; reusing stored id");
                    return Ok(ClientIdentity::Temp {
                        temp_user_id: stored.temp_user_id,
                    });
                }
            }
        }

        let requested = Uuid::new_v4().to_string();
        let issued = self.backend.create_temp_user(&requested).await?;
        let identity = StoredIdentity {
            temp_user_id: issued.clone(),
            created_at: Utc::now(),
            last_validated_at: Some(Utc::now()),
        };
        self.store.save_identity(&self.profile, &identity).await?;
        info!("created temp user identity");

        Ok(ClientIdentity::Temp {
            temp_user_id: issued,
        })
    }
}
