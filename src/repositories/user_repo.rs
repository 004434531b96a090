use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::{IdentityProfile, User};

/// Lookup and mutation surface for creator accounts. The engine only
/// needs `get_by_id` and `update_tokens`; the rest serves identity sync
/// and account deletion.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    /// Create the user on first identity sync, or refresh identity
    /// fields and credentials on subsequent syncs.
    async fn upsert_from_identity(&self, profile: &IdentityProfile) -> Result<User>;

    /// Persist a refreshed access credential. Target of the credential
    /// holder's persistence callback.
    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        token_expiry: DateTime<Utc>,
    ) -> Result<()>;

    /// Explicit account deletion; owned rows cascade.
    async fn delete(&self, user_id: Uuid) -> Result<()>;
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = $1")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn upsert_from_identity(&self, profile: &IdentityProfile) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                email, google_id, channel_id, channel_name, channel_thumbnail,
                access_token, refresh_token, token_expiry
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (google_id) DO UPDATE SET
                email = EXCLUDED.email,
                channel_id = COALESCE(EXCLUDED.channel_id, users.channel_id),
                channel_name = COALESCE(EXCLUDED.channel_name, users.channel_name),
                channel_thumbnail = COALESCE(EXCLUDED.channel_thumbnail, users.channel_thumbnail),
                access_token = COALESCE(EXCLUDED.access_token, users.access_token),
                refresh_token = COALESCE(EXCLUDED.refresh_token, users.refresh_token),
                token_expiry = COALESCE(EXCLUDED.token_expiry, users.token_expiry),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&profile.email)
        .bind(&profile.google_id)
        .bind(&profile.channel_id)
        .bind(&profile.channel_name)
        .bind(&profile.channel_thumbnail)
        .bind(&profile.access_token)
        .bind(&profile.refresh_token)
        .bind(profile.token_expiry)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        token_expiry: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET access_token = $2, token_expiry = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(token_expiry)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory directory for local runs and hermetic tests.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<Uuid, User>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.google_id == google_id)
            .map(|entry| entry.clone()))
    }

    async fn upsert_from_identity(&self, profile: &IdentityProfile) -> Result<User> {
        if let Some(existing) = self.get_by_google_id(&profile.google_id).await? {
            let mut updated = existing;
            updated.email = profile.email.clone();
            if profile.channel_id.is_some() {
                updated.channel_id = profile.channel_id.clone();
            }
            if profile.access_token.is_some() {
                updated.access_token = profile.access_token.clone();
            }
            if profile.refresh_token.is_some() {
                updated.refresh_token = profile.refresh_token.clone();
            }
            if profile.token_expiry.is_some() {
                updated.token_expiry = profile.token_expiry;
            }
            updated.updated_at = Utc::now();
            self.users.insert(updated.id, updated.clone());
            return Ok(updated);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: profile.email.clone(),
            google_id: profile.google_id.clone(),
            channel_id: profile.channel_id.clone(),
            channel_name: profile.channel_name.clone(),
            channel_thumbnail: profile.channel_thumbnail.clone(),
            access_token: profile.access_token.clone(),
            refresh_token: profile.refresh_token.clone(),
            token_expiry: profile.token_expiry,
            daily_quota_used: 0,
            last_quota_reset: now.date_naive(),
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        token_expiry: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.access_token = Some(access_token.to_string());
            user.token_expiry = Some(token_expiry);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<()> {
        self.users.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(google_id: &str, access: Option<&str>) -> IdentityProfile {
        IdentityProfile {
            email: "creator@example.com".to_string(),
            google_id: google_id.to_string(),
            channel_id: Some("channel-1".to_string()),
            channel_name: Some("Creator".to_string()),
            channel_thumbnail: None,
            access_token: access.map(str::to_string),
            refresh_token: Some("refresh-1".to_string()),
            token_expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn first_identity_sync_creates_the_user() {
        let directory = MemoryUserDirectory::new();

        let user = directory
            .upsert_from_identity(&profile("google-1", Some("tok-a")))
            .await
            .unwrap();

        assert_eq!(user.google_id, "google-1");
        assert_eq!(user.access_token.as_deref(), Some("tok-a"));
        assert_eq!(directory.get_by_id(user.id).await.unwrap().unwrap().id, user.id);
    }

    #[tokio::test]
    async fn repeat_sync_updates_in_place_without_duplicating() {
        let directory = MemoryUserDirectory::new();

        let first = directory
            .upsert_from_identity(&profile("google-1", Some("tok-a")))
            .await
            .unwrap();
        let second = directory
            .upsert_from_identity(&profile("google-1", Some("tok-b")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.access_token.as_deref(), Some("tok-b"));
    }

    #[tokio::test]
    async fn update_tokens_persists_the_refreshed_credential() {
        let directory = MemoryUserDirectory::new();
        let user = directory
            .upsert_from_identity(&profile("google-1", Some("tok-a")))
            .await
            .unwrap();

        let expiry = Utc::now() + chrono::Duration::hours(1);
        directory.update_tokens(user.id, "tok-fresh", expiry).await.unwrap();

        let stored = directory.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("tok-fresh"));
        assert_eq!(stored.token_expiry, Some(expiry));
    }

    #[tokio::test]
    async fn delete_removes_the_account() {
        let directory = MemoryUserDirectory::new();
        let user = directory
            .upsert_from_identity(&profile("google-1", None))
            .await
            .unwrap();

        directory.delete(user.id).await.unwrap();
        assert!(directory.get_by_id(user.id).await.unwrap().is_none());
    }
}
