use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::{Video, VideoSettings, VideoUpsert};

/// Registry of enrolled videos. `due_videos_and_stamp` is the scheduler's
/// only entry point; everything else backs the HTTP surface and the
/// video-sync job.
#[async_trait]
pub trait VideoIndex: Send + Sync {
    /// Return every enabled video whose check interval has elapsed, and
    /// stamp `last_checked_at = now` on each in the same operation.
    ///
    /// Selection and stamping are one atomic step: a second pass (or a
    /// concurrent tick) cannot pick up a video this pass already claimed,
    /// and a video whose processing later fails still keeps its stamp so
    /// it cannot starve the rest of the queue.
    async fn due_videos_and_stamp(&self, now: DateTime<Utc>) -> Result<Vec<Video>>;

    async fn get_settings(&self, video_id: &str, user_id: Uuid) -> Result<Option<VideoSettings>>;

    async fn get_for_user(&self, video_id: &str, user_id: Uuid) -> Result<Option<Video>>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Video>>;

    /// Save automation settings, creating a minimal video row first if
    /// the video has not been synced yet.
    async fn update_settings(
        &self,
        video_id: &str,
        user_id: Uuid,
        settings: &VideoSettings,
    ) -> Result<()>;

    /// Refresh descriptive metadata from the platform. Returns the number
    /// of rows written.
    async fn upsert_batch(&self, user_id: Uuid, videos: &[VideoUpsert]) -> Result<u64>;
}

pub struct PgVideoIndex {
    pool: PgPool,
}

impl PgVideoIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoIndex for PgVideoIndex {
    async fn due_videos_and_stamp(&self, now: DateTime<Utc>) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(
            r#"
            UPDATE videos
            SET last_checked_at = $1
            WHERE auto_reply_enabled
              AND (last_checked_at IS NULL
                   OR last_checked_at <= $1 - make_interval(mins => check_interval_minutes))
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(videos)
    }

    async fn get_settings(&self, video_id: &str, user_id: Uuid) -> Result<Option<VideoSettings>> {
        Ok(self
            .get_for_user(video_id, user_id)
            .await?
            .map(|video| video.settings()))
    }

    async fn get_for_user(&self, video_id: &str, user_id: Uuid) -> Result<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(
            "SELECT * FROM videos WHERE video_id = $1 AND user_id = $2",
        )
        .bind(video_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Video>> {
        let videos = sqlx::query_as::<_, Video>(
            "SELECT * FROM videos WHERE user_id = $1 ORDER BY published_at DESC NULLS LAST",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(videos)
    }

    async fn update_settings(
        &self,
        video_id: &str,
        user_id: Uuid,
        settings: &VideoSettings,
    ) -> Result<()> {
        // Settings can be saved before the video has ever been synced;
        // create a placeholder row so the update has a target.
        sqlx::query(
            r#"
            INSERT INTO videos (user_id, video_id, title, published_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (video_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(video_id)
        .bind(format!("Video {}", video_id))
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE videos
            SET auto_reply_enabled = $3,
                keywords = $4,
                reply_templates = $5,
                check_interval_minutes = $6,
                updated_at = NOW()
            WHERE video_id = $1 AND user_id = $2
            "#,
        )
        .bind(video_id)
        .bind(user_id)
        .bind(settings.auto_reply_enabled)
        .bind(serde_json::json!(settings.keywords))
        .bind(serde_json::json!(settings.reply_templates))
        .bind(settings.check_interval_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_batch(&self, user_id: Uuid, videos: &[VideoUpsert]) -> Result<u64> {
        let mut written = 0;

        for video in videos {
            let result = sqlx::query(
                r#"
                INSERT INTO videos (
                    user_id, video_id, title, description, thumbnail_url,
                    published_at, view_count, comment_count
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (video_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    thumbnail_url = EXCLUDED.thumbnail_url,
                    published_at = EXCLUDED.published_at,
                    view_count = EXCLUDED.view_count,
                    comment_count = EXCLUDED.comment_count,
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(&video.video_id)
            .bind(&video.title)
            .bind(&video.description)
            .bind(&video.thumbnail_url)
            .bind(video.published_at)
            .bind(video.view_count)
            .bind(video.comment_count)
            .execute(&self.pool)
            .await?;

            written += result.rows_affected();
        }

        Ok(written)
    }
}

/// In-memory index for local runs and hermetic tests. Stamping happens
/// under the per-entry lock, so concurrent due-selection passes still
/// return disjoint sets.
#[derive(Default)]
pub struct MemoryVideoIndex {
    videos: DashMap<String, Video>,
}

impl MemoryVideoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, video: Video) {
        self.videos.insert(video.video_id.clone(), video);
    }

    pub fn get(&self, video_id: &str) -> Option<Video> {
        self.videos.get(video_id).map(|v| v.clone())
    }
}

#[async_trait]
impl VideoIndex for MemoryVideoIndex {
    async fn due_videos_and_stamp(&self, now: DateTime<Utc>) -> Result<Vec<Video>> {
        let mut due = Vec::new();

        for mut entry in self.videos.iter_mut() {
            if !entry.auto_reply_enabled {
                continue;
            }
            let interval = Duration::minutes(entry.check_interval_minutes as i64);
            let is_due = match entry.last_checked_at {
                None => true,
                Some(checked) => now - checked >= interval,
            };
            if is_due {
                entry.last_checked_at = Some(now);
                due.push(entry.clone());
            }
        }

        Ok(due)
    }

    async fn get_settings(&self, video_id: &str, user_id: Uuid) -> Result<Option<VideoSettings>> {
        Ok(self
            .get_for_user(video_id, user_id)
            .await?
            .map(|video| video.settings()))
    }

    async fn get_for_user(&self, video_id: &str, user_id: Uuid) -> Result<Option<Video>> {
        Ok(self
            .videos
            .get(video_id)
            .filter(|v| v.user_id == user_id)
            .map(|v| v.clone()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Video>> {
        let mut videos: Vec<Video> = self
            .videos
            .iter()
            .filter(|v| v.user_id == user_id)
            .map(|v| v.clone())
            .collect();
        videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(videos)
    }

    async fn update_settings(
        &self,
        video_id: &str,
        user_id: Uuid,
        settings: &VideoSettings,
    ) -> Result<()> {
        let now = Utc::now();
        let mut video = self.videos.entry(video_id.to_string()).or_insert_with(|| Video {
            id: Uuid::new_v4(),
            user_id,
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            description: None,
            thumbnail_url: None,
            published_at: Some(now),
            view_count: 0,
            comment_count: 0,
            auto_reply_enabled: false,
            keywords: serde_json::json!([]),
            reply_templates: serde_json::json!([]),
            check_interval_minutes: 60,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        });

        video.auto_reply_enabled = settings.auto_reply_enabled;
        video.keywords = serde_json::json!(settings.keywords);
        video.reply_templates = serde_json::json!(settings.reply_templates);
        video.check_interval_minutes = settings.check_interval_minutes;
        video.updated_at = now;

        Ok(())
    }

    async fn upsert_batch(&self, user_id: Uuid, videos: &[VideoUpsert]) -> Result<u64> {
        let now = Utc::now();
        for upsert in videos {
            self.videos
                .entry(upsert.video_id.clone())
                .and_modify(|video| {
                    video.title = upsert.title.clone();
                    video.description = upsert.description.clone();
                    video.thumbnail_url = upsert.thumbnail_url.clone();
                    video.published_at = upsert.published_at;
                    video.view_count = upsert.view_count;
                    video.comment_count = upsert.comment_count;
                    video.updated_at = now;
                })
                .or_insert_with(|| Video {
                    id: Uuid::new_v4(),
                    user_id,
                    video_id: upsert.video_id.clone(),
                    title: upsert.title.clone(),
                    description: upsert.description.clone(),
                    thumbnail_url: upsert.thumbnail_url.clone(),
                    published_at: upsert.published_at,
                    view_count: upsert.view_count,
                    comment_count: upsert.comment_count,
                    auto_reply_enabled: false,
                    keywords: serde_json::json!([]),
                    reply_templates: serde_json::json!([]),
                    check_interval_minutes: 60,
                    last_checked_at: None,
                    created_at: now,
                    updated_at: now,
                });
        }
        Ok(videos.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrolled_video(video_id: &str, interval_minutes: i32, last_checked: Option<DateTime<Utc>>) -> Video {
        let now = Utc::now();
        Video {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            description: None,
            thumbnail_url: None,
            published_at: Some(now),
            view_count: 0,
            comment_count: 0,
            auto_reply_enabled: true,
            keywords: serde_json::json!(["price"]),
            reply_templates: serde_json::json!(["Thanks {name}!"]),
            check_interval_minutes: interval_minutes,
            last_checked_at: last_checked,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn due_selection_stamps_and_excludes_on_second_pass() {
        let index = MemoryVideoIndex::new();
        let now = Utc::now();
        index.insert(enrolled_video("v1", 15, Some(now - Duration::minutes(20))));

        let first = index.due_videos_and_stamp(now).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = index.due_videos_and_stamp(now).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn video_becomes_due_again_after_interval_elapses() {
        let index = MemoryVideoIndex::new();
        let now = Utc::now();
        index.insert(enrolled_video("v1", 1, None));

        assert_eq!(index.due_videos_and_stamp(now).await.unwrap().len(), 1);
        assert!(index.due_videos_and_stamp(now).await.unwrap().is_empty());

        let later = now + Duration::seconds(61);
        assert_eq!(index.due_videos_and_stamp(later).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_videos_are_never_selected() {
        let index = MemoryVideoIndex::new();
        let mut video = enrolled_video("v1", 1, None);
        video.auto_reply_enabled = false;
        index.insert(video);

        assert!(index.due_videos_and_stamp(Utc::now()).await.unwrap().is_empty());
    }
}
