//! Remote persistence API client.
//!
//! Optional collaborator mirroring sessions to a server. Every
//! response wraps its payload in `{success, data|error, message?}`;
//! `success = false` or a non-2xx status surfaces as a typed
//! [`ApiError`] so the driver can downgrade it to an advisory warning.
//! Local state never depends on these calls succeeding.

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::restore::SessionResumeState;
use crate::session::SessionConfig;
use crate::storage::{HistoryEntryNew, SessionPatch};

/// Standard response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Response payload of session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: i64,
    pub subject_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryAppended {
    entry_id: i64,
}

/// HTTP client for the remote persistence endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        // Joins are relative to the last path segment; a trailing
        // slash keeps the configured prefix.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    pub async fn create_session(&self, config: &SessionConfig) -> Result<SessionCreated, ApiError> {
        let url = self.endpoint("sessions")?;
        self.execute(self.http.post(url).json(config)).await
    }

    pub async fn update_session(&self, session_id: i64, patch: &SessionPatch) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("sessions/{session_id}"))?;
        self.execute_unit(self.http.put(url).json(patch)).await
    }

    pub async fn append_history(&self, entry: &HistoryEntryNew) -> Result<i64, ApiError> {
        let url = self.endpoint(&format!("sessions/{}/history", entry.session_id))?;
        let appended: HistoryAppended = self.execute(self.http.post(url).json(entry)).await?;
        Ok(appended.entry_id)
    }

    pub async fn fetch_resume_state(&self, session_id: i64) -> Result<SessionResumeState, ApiError> {
        let url = self.endpoint(&format!("sessions/{session_id}/state"))?;
        self.execute(self.http.get(url)).await
    }

    pub async fn delete_session(&self, session_id: i64) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("sessions/{session_id}"))?;
        self.execute_unit(self.http.delete(url)).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let envelope = self.exchange::<T>(request).await?;
        envelope
            .data
            .ok_or_else(|| ApiError::MalformedResponse("missing data field".into()))
    }

    /// Variant for endpoints that answer success with no payload.
    async fn execute_unit(&self, request: reqwest::RequestBuilder) -> Result<(), ApiError> {
        self.exchange::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Error responses carry the envelope too; fall back to the
        // bare status when the body isn't one.
        let envelope: ApiEnvelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) if status.is_success() => {
                return Err(ApiError::MalformedResponse(e.to_string()));
            }
            Err(_) => return Err(ApiError::Rejected(format!("HTTP {status}"))),
        };

        if !status.is_success() || !envelope.success {
            let reason = envelope
                .error
                .or(envelope.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ApiError::Rejected(reason));
        }
        Ok(envelope)
    }
}
