use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repositories::UserDirectory;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("refresh credential rejected; the user must reconnect their channel")]
    Revoked,

    #[error("token endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("token refresh request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Receives refreshed access credentials so they survive a restart.
#[async_trait]
pub trait TokenPersist: Send + Sync {
    async fn persist(
        &self,
        user_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Writes refreshed credentials back through the user directory.
pub struct DirectoryTokenSink {
    directory: Arc<dyn UserDirectory>,
}

impl DirectoryTokenSink {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl TokenPersist for DirectoryTokenSink {
    async fn persist(
        &self,
        user_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.directory
            .update_tokens(user_id, access_token, expires_at)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3599
}

struct CredentialState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Owns one user's platform credentials and refreshes them on demand.
///
/// Refreshes coalesce: callers pass the token they saw fail, and whoever
/// reaches the mutex first performs the exchange while later callers
/// simply pick up the already-renewed token.
#[derive(Clone)]
pub struct CredentialHolder {
    user_id: Uuid,
    state: Arc<Mutex<CredentialState>>,
    http: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    persist: Arc<dyn TokenPersist>,
}

impl CredentialHolder {
    pub fn new(
        user_id: Uuid,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        client_id: String,
        client_secret: String,
        persist: Arc<dyn TokenPersist>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            user_id,
            state: Arc::new(Mutex::new(CredentialState {
                access_token,
                refresh_token,
                expires_at,
            })),
            http,
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            client_id,
            client_secret,
            persist,
        }
    }

    /// Point the holder at a different identity provider endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub async fn current(&self) -> String {
        self.state.lock().await.access_token.clone()
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.expires_at
    }

    /// Exchange the refresh credential for a new access credential.
    ///
    /// `seen_token` is the access token the caller just watched fail; if
    /// the held token has already moved past it, another caller refreshed
    /// first and the current token is returned as-is.
    pub async fn refresh(&self, seen_token: &str) -> Result<String, CredentialError> {
        let mut state = self.state.lock().await;

        if state.access_token != seen_token {
            return Ok(state.access_token.clone());
        }

        let refresh_token = state.refresh_token.clone().ok_or(CredentialError::Revoked)?;

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("❌ Refresh rejected for user {}: {} {}", self.user_id, status, body);
            return Err(CredentialError::Revoked);
        }
        if !status.is_success() {
            return Err(CredentialError::Endpoint {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: TokenEndpointResponse = response.json().await?;
        let expires_at = Utc::now() + chrono::Duration::seconds(token.expires_in);

        state.access_token = token.access_token.clone();
        state.expires_at = Some(expires_at);

        tracing::info!(
            "✅ Token refreshed for user {}, expires in {}s",
            self.user_id,
            token.expires_in
        );

        if let Err(e) = self
            .persist
            .persist(self.user_id, &token.access_token, expires_at)
            .await
        {
            tracing::warn!("Failed to persist refreshed token for user {}: {}", self.user_id, e);
        }

        Ok(token.access_token)
    }
}
