use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable audit record of one posted reply. The unique `comment_id`
/// makes this table the dedup oracle: presence of an external comment ID
/// here is authoritative proof that a reply was already issued.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepliedComment {
    pub id: Uuid,
    pub comment_id: String,
    pub video_id: String,
    pub user_id: Uuid,
    pub comment_text: Option<String>,
    pub comment_author: Option<String>,
    pub keyword_matched: Option<String>,
    pub reply_text: String,
    pub replied_at: DateTime<Utc>,
}

/// Insert payload for the dedup store.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub comment_id: String,
    pub video_id: String,
    pub user_id: Uuid,
    pub comment_text: Option<String>,
    pub comment_author: Option<String>,
    pub keyword_matched: Option<String>,
    pub reply_text: String,
}

impl NewReply {
    pub fn into_record(self) -> RepliedComment {
        RepliedComment {
            id: Uuid::new_v4(),
            comment_id: self.comment_id,
            video_id: self.video_id,
            user_id: self.user_id,
            comment_text: self.comment_text,
            comment_author: self.comment_author,
            keyword_matched: self.keyword_matched,
            reply_text: self.reply_text,
            replied_at: Utc::now(),
        }
    }
}

/// Aggregate counts over a trailing window, for the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplyStats {
    pub total_replies: i64,
    pub window_days: i64,
}

/// One day's reply count, for the analytics chart.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyReplyCount {
    pub date: NaiveDate,
    pub count: i64,
}
