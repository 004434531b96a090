use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::ReplyTemplate;

/// Saved reply templates. Plays no role in the reply hot path.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReplyTemplate>>;

    async fn create(&self, user_id: Uuid, template_text: &str) -> Result<ReplyTemplate>;

    /// Returns false when the template does not exist or belongs to
    /// someone else.
    async fn delete(&self, user_id: Uuid, template_id: Uuid) -> Result<bool>;
}

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReplyTemplate>> {
        let templates = sqlx::query_as::<_, ReplyTemplate>(
            "SELECT * FROM user_templates WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(templates)
    }

    async fn create(&self, user_id: Uuid, template_text: &str) -> Result<ReplyTemplate> {
        let template = sqlx::query_as::<_, ReplyTemplate>(
            r#"
            INSERT INTO user_templates (user_id, template_text)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(template_text)
        .fetch_one(&self.pool)
        .await?;
        Ok(template)
    }

    async fn delete(&self, user_id: Uuid, template_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_templates WHERE id = $1 AND user_id = $2")
            .bind(template_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-memory template store for local runs and hermetic tests.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: DashMap<Uuid, ReplyTemplate>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ReplyTemplate>> {
        let mut templates: Vec<ReplyTemplate> = self
            .templates
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.clone())
            .collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn create(&self, user_id: Uuid, template_text: &str) -> Result<ReplyTemplate> {
        let template = ReplyTemplate {
            id: Uuid::new_v4(),
            user_id,
            template_text: template_text.to_string(),
            created_at: Utc::now(),
        };
        self.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn delete(&self, user_id: Uuid, template_id: Uuid) -> Result<bool> {
        let owned = self
            .templates
            .get(&template_id)
            .map(|t| t.user_id == user_id)
            .unwrap_or(false);
        if owned {
            self.templates.remove(&template_id);
        }
        Ok(owned)
    }
}
