use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One creator account: identity, platform credentials, and the daily
/// quota counters keyed by `last_quota_reset`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub google_id: String,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub channel_thumbnail: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub daily_quota_used: i64,
    pub last_quota_reset: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile handed over by the identity layer on first sync.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProfile {
    pub email: String,
    pub google_id: String,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub channel_thumbnail: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
}
