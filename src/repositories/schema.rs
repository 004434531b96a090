use sqlx::PgPool;

use crate::middleware::error_handling::Result;

/// Create tables and indexes if they do not exist yet.
///
/// Runs at startup; every statement is idempotent so repeated boots and
/// concurrent workers are safe.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    let statements: &[&str] = &[
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            email VARCHAR(255) UNIQUE NOT NULL,
            google_id VARCHAR(255) UNIQUE NOT NULL,
            channel_id VARCHAR(255),
            channel_name VARCHAR(255),
            channel_thumbnail TEXT,
            access_token TEXT,
            refresh_token TEXT,
            token_expiry TIMESTAMPTZ,
            daily_quota_used BIGINT NOT NULL DEFAULT 0,
            last_quota_reset DATE NOT NULL DEFAULT CURRENT_DATE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            video_id VARCHAR(255) UNIQUE NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            thumbnail_url TEXT,
            published_at TIMESTAMPTZ,
            view_count BIGINT NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            auto_reply_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            keywords JSONB NOT NULL DEFAULT '[]'::jsonb,
            reply_templates JSONB NOT NULL DEFAULT '[]'::jsonb,
            check_interval_minutes INTEGER NOT NULL DEFAULT 60
                CHECK (check_interval_minutes BETWEEN 1 AND 1440),
            last_checked_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS replied_comments (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            comment_id VARCHAR(255) UNIQUE NOT NULL,
            video_id VARCHAR(255) NOT NULL,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            comment_text TEXT,
            comment_author VARCHAR(255),
            keyword_matched VARCHAR(100),
            reply_text TEXT NOT NULL,
            replied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_templates (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            template_text TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_videos_user_id ON videos(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_videos_auto_reply ON videos(auto_reply_enabled) WHERE auto_reply_enabled",
        "CREATE INDEX IF NOT EXISTS idx_replied_video_id ON replied_comments(video_id)",
        "CREATE INDEX IF NOT EXISTS idx_replied_user_id ON replied_comments(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_replied_at ON replied_comments(replied_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_user_templates_user_id ON user_templates(user_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("✓ Database schema initialized");

    Ok(())
}
