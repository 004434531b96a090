//! Background task handlers wired into the task runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::services::reply_engine::ReplyJobSpec;
use crate::services::scheduler_service::{AutoReplyScheduler, ReplyContext};
use crate::services::task_runner::TaskHandler;

pub const TASK_PROCESS_VIDEO_REPLIES: &str = "process_video_replies";
pub const TASK_SYNC_USER_VIDEOS: &str = "sync_user_videos";
pub const TASK_AUTO_REPLY_TICK: &str = "auto_reply_tick";

const MANUAL_COMMENT_CAP: usize = 1000;
const SYNC_VIDEO_CAP: usize = 100;

fn default_manual_cap() -> usize {
    MANUAL_COMMENT_CAP
}

#[derive(Debug, Deserialize)]
struct ProcessVideoRepliesArgs {
    video_id: String,
    user_id: Uuid,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    templates: Vec<String>,
    #[serde(default = "default_manual_cap")]
    max_comments: usize,
}

/// Manually-triggered reply run over a single video.
pub struct ProcessVideoRepliesHandler {
    context: ReplyContext,
    soft_limit: Duration,
}

impl ProcessVideoRepliesHandler {
    pub fn new(context: ReplyContext) -> Self {
        Self {
            context,
            soft_limit: Duration::from_secs(9 * 60),
        }
    }
}

#[async_trait]
impl TaskHandler for ProcessVideoRepliesHandler {
    async fn run(&self, args: Value) -> anyhow::Result<Value> {
        let args: ProcessVideoRepliesArgs = serde_json::from_value(args)?;

        let user = self
            .context
            .users
            .get_by_id(args.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} not found", args.user_id))?;

        let engine = self
            .context
            .engine_for(&user)
            .ok_or_else(|| anyhow::anyhow!("user {} has no platform tokens", args.user_id))?;

        let outcome = engine
            .process_video(ReplyJobSpec {
                video_id: args.video_id,
                user_id: args.user_id,
                keywords: args.keywords,
                templates: args.templates,
                max_comments: args.max_comments,
                reply_cap: None,
                deadline: Some(Instant::now() + self.soft_limit),
            })
            .await?;

        Ok(serde_json::to_value(outcome)?)
    }
}

#[derive(Debug, Deserialize)]
struct SyncUserVideosArgs {
    user_id: Uuid,
}

/// Pull a user's uploads from the platform into the video index.
pub struct SyncUserVideosHandler {
    context: ReplyContext,
}

impl SyncUserVideosHandler {
    pub fn new(context: ReplyContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TaskHandler for SyncUserVideosHandler {
    async fn run(&self, args: Value) -> anyhow::Result<Value> {
        let args: SyncUserVideosArgs = serde_json::from_value(args)?;

        let user = self
            .context
            .users
            .get_by_id(args.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} not found", args.user_id))?;

        let channel_id = user
            .channel_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("user {} has no linked channel", args.user_id))?;

        let client = self
            .context
            .platform_client(&user)
            .ok_or_else(|| anyhow::anyhow!("user {} has no platform tokens", args.user_id))?;

        let videos = client
            .list_channel_videos(&channel_id, SYNC_VIDEO_CAP)
            .await
            .map_err(|e| anyhow::anyhow!("video sync failed: {e}"))?;

        let synced = self.context.videos.upsert_batch(args.user_id, &videos).await?;

        tracing::info!("📺 Synced {} videos for user {}", synced, args.user_id);

        Ok(serde_json::json!({
            "synced": synced,
            "total_videos": videos.len(),
        }))
    }
}

/// Periodic scheduler tick.
pub struct AutoReplyTickHandler {
    scheduler: Arc<AutoReplyScheduler>,
}

impl AutoReplyTickHandler {
    pub fn new(scheduler: Arc<AutoReplyScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl TaskHandler for AutoReplyTickHandler {
    async fn run(&self, _args: Value) -> anyhow::Result<Value> {
        let stats = self.scheduler.run_tick().await?;
        Ok(serde_json::to_value(stats)?)
    }
}
