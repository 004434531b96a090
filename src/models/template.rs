use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A saved reply template. UI convenience only; the engine receives its
/// templates through the per-video settings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReplyTemplate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, message = "Template text cannot be empty"))]
    pub template_text: String,
}
