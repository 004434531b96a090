use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// An enrolled video: platform metadata plus the automation settings the
/// scheduler reads. `last_checked_at` is the only field the engine hot
/// path mutates, and only through the due-selection stamp.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub user_id: Uuid,
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub comment_count: i32,
    pub auto_reply_enabled: bool,
    pub keywords: serde_json::Value,
    pub reply_templates: serde_json::Value,
    pub check_interval_minutes: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn keyword_list(&self) -> Vec<String> {
        json_string_list(&self.keywords)
    }

    pub fn template_list(&self) -> Vec<String> {
        json_string_list(&self.reply_templates)
    }

    pub fn settings(&self) -> VideoSettings {
        VideoSettings {
            auto_reply_enabled: self.auto_reply_enabled,
            keywords: self.keyword_list(),
            reply_templates: self.template_list(),
            check_interval_minutes: self.check_interval_minutes,
        }
    }
}

fn json_string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Automation settings as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VideoSettings {
    pub auto_reply_enabled: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub reply_templates: Vec<String>,
    #[serde(default = "default_check_interval")]
    #[validate(range(min = 1, max = 1440, message = "Check interval must be between 1 minute and 24 hours"))]
    pub check_interval_minutes: i32,
}

fn default_check_interval() -> i32 {
    60
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            auto_reply_enabled: false,
            keywords: Vec::new(),
            reply_templates: Vec::new(),
            check_interval_minutes: default_check_interval(),
        }
    }
}

/// Descriptive metadata refreshed from the platform during a video sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoUpsert {
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub comment_count: i32,
}

/// Video as returned by the list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct VideoResponse {
    pub video_id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub comment_count: i32,
    pub auto_reply_enabled: bool,
    pub keywords: Vec<String>,
    pub reply_templates: Vec<String>,
    pub check_interval_minutes: i32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        let keywords = video.keyword_list();
        let reply_templates = video.template_list();
        Self {
            video_id: video.video_id,
            title: video.title,
            description: video.description,
            thumbnail_url: video.thumbnail_url,
            published_at: video.published_at,
            view_count: video.view_count,
            comment_count: video.comment_count,
            auto_reply_enabled: video.auto_reply_enabled,
            keywords,
            reply_templates,
            check_interval_minutes: video.check_interval_minutes,
            last_checked_at: video.last_checked_at,
        }
    }
}
