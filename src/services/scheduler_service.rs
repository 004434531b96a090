// ============================================================================
// Auto-Reply Scheduler - Periodic Driver
// ============================================================================
//
// Runs once per tick. Pulls the due set from the video index (which
// stamps `last_checked_at` atomically with selection), then walks the
// videos in selection order, one reply-engine invocation each, with a
// randomized pause between videos. A tick never drains a video's whole
// backlog: each invocation is capped at one randomized batch, and the
// remainder waits for the next interval expiry.
//
// Per-video errors never abort the tick; only the first five are kept.
//
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::config::AppConfig;
use crate::config::QuotaConfig;
use crate::middleware::error_handling::{AppError, Result};
use crate::models::{User, Video};
use crate::repositories::{DedupStore, UserDirectory, VideoIndex};
use crate::services::credential_service::{
    CredentialHolder, DirectoryTokenSink, GOOGLE_TOKEN_ENDPOINT,
};
use crate::services::platform_client::{PlatformClient, YOUTUBE_API_BASE};
use crate::services::quota_service::QuotaTracker;
use crate::services::reply_engine::{
    EngineOutcome, ReplyEngine, ReplyJobSpec, SCHEDULED_COMMENT_CAP,
};
use crate::utils::{DelayPacer, PacingProfile};

const MAX_REPORTED_ERRORS: usize = 5;

/// Everything needed to stand up a reply engine for one user: the shared
/// stores plus platform and identity-provider endpoints.
#[derive(Clone)]
pub struct ReplyContext {
    pub users: Arc<dyn UserDirectory>,
    pub videos: Arc<dyn VideoIndex>,
    pub dedup: Arc<dyn DedupStore>,
    pub quota: Arc<dyn QuotaTracker>,
    pub quota_config: QuotaConfig,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub token_endpoint: String,
    pub platform_base_url: String,
    pub worker_concurrency: usize,
    pub pacing: PacingProfile,
}

impl ReplyContext {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        videos: Arc<dyn VideoIndex>,
        dedup: Arc<dyn DedupStore>,
        quota: Arc<dyn QuotaTracker>,
        config: &AppConfig,
    ) -> Self {
        Self {
            users,
            videos,
            dedup,
            quota,
            quota_config: config.quota.clone(),
            google_client_id: config.google_client_id.clone(),
            google_client_secret: config.google_client_secret.clone(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            platform_base_url: YOUTUBE_API_BASE.to_string(),
            worker_concurrency: config.worker_concurrency,
            pacing: PacingProfile::human(),
        }
    }

    pub fn with_platform_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.platform_base_url = base_url.into();
        self
    }

    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn with_pacing(mut self, pacing: PacingProfile) -> Self {
        self.pacing = pacing;
        self
    }

    /// Credential holder for a user, or None when the user has never
    /// connected their channel.
    pub fn credential_holder(&self, user: &User) -> Option<CredentialHolder> {
        let access_token = user.access_token.clone()?;

        Some(
            CredentialHolder::new(
                user.id,
                access_token,
                user.refresh_token.clone(),
                user.token_expiry,
                self.google_client_id.clone(),
                self.google_client_secret.clone(),
                Arc::new(DirectoryTokenSink::new(self.users.clone())),
            )
            .with_token_endpoint(self.token_endpoint.clone()),
        )
    }

    pub fn platform_client(&self, user: &User) -> Option<PlatformClient> {
        Some(
            PlatformClient::new(self.credential_holder(user)?)
                .with_base_url(self.platform_base_url.clone()),
        )
    }

    pub fn engine_for(&self, user: &User) -> Option<ReplyEngine> {
        Some(ReplyEngine::new(
            self.platform_client(user)?,
            self.dedup.clone(),
            self.quota.clone(),
            DelayPacer::new(self.pacing.clone()),
            &self.quota_config,
            self.worker_concurrency,
        ))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickStats {
    pub due_videos: usize,
    pub processed_videos: usize,
    pub total_replied: usize,
    pub errors_encountered: usize,
    /// First few error messages only, to bound log and payload volume.
    pub errors: Vec<String>,
}

pub struct AutoReplyScheduler {
    context: ReplyContext,
}

impl AutoReplyScheduler {
    pub fn new(context: ReplyContext) -> Self {
        Self { context }
    }

    /// One tick: select due videos, reply to one batch each.
    pub async fn run_tick(&self) -> Result<TickStats> {
        let now = Utc::now();
        let due = self.context.videos.due_videos_and_stamp(now).await?;

        tracing::info!("🤖 Auto-reply tick: {} videos due", due.len());

        let mut stats = TickStats {
            due_videos: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(stats);
        }

        let pacer = DelayPacer::new(self.context.pacing.clone());

        for (position, video) in due.iter().enumerate() {
            match self.process_due_video(video).await {
                Ok(Some(replied)) => {
                    stats.processed_videos += 1;
                    stats.total_replied += replied;
                }
                Ok(None) => {}
                Err(e) => {
                    let message = format!("video {}: {}", video.video_id, e);
                    tracing::error!("❌ {}", message);
                    stats.errors_encountered += 1;
                    if stats.errors.len() < MAX_REPORTED_ERRORS {
                        stats.errors.push(message);
                    }
                }
            }

            if position + 1 < due.len() {
                pacer.pause_between_videos().await;
            }
        }

        tracing::info!(
            "🎉 Auto-reply tick complete: {} videos processed, {} replies, {} errors",
            stats.processed_videos,
            stats.total_replied,
            stats.errors_encountered
        );

        Ok(stats)
    }

    /// Returns `Ok(Some(reply_count))` when the video was run through the
    /// engine, `Ok(None)` when it was skipped (missing user, tokens, or
    /// configuration).
    async fn process_due_video(&self, video: &Video) -> Result<Option<usize>> {
        let Some(user) = self.context.users.get_by_id(video.user_id).await? else {
            tracing::debug!("Video {} has no owner; skipping", video.video_id);
            return Ok(None);
        };

        let Some(engine) = self.context.engine_for(&user) else {
            tracing::debug!("User {} has no platform tokens; skipping {}", user.id, video.video_id);
            return Ok(None);
        };

        let keywords = video.keyword_list();
        let templates = video.template_list();
        if keywords.is_empty() || templates.is_empty() {
            tracing::debug!("Video {} has no keywords or templates; skipping", video.video_id);
            return Ok(None);
        }

        let pacer = DelayPacer::new(self.context.pacing.clone());
        let job = ReplyJobSpec {
            video_id: video.video_id.clone(),
            user_id: video.user_id,
            keywords,
            templates,
            max_comments: SCHEDULED_COMMENT_CAP,
            reply_cap: Some(pacer.batch_size()),
            deadline: None,
        };

        match engine.process_video(job).await {
            Ok(EngineOutcome::Completed(run)) => {
                tracing::info!(
                    "✅ Replied to {} comments on {} ({} failed)",
                    run.succeeded,
                    video.video_id,
                    run.failed
                );
                Ok(Some(run.succeeded))
            }
            Ok(EngineOutcome::SkippedQuota {
                remaining_global, ..
            }) => {
                tracing::info!(
                    "Low quota for user {} (global remaining {}); skipping {}",
                    video.user_id,
                    remaining_global,
                    video.video_id
                );
                Ok(None)
            }
            Ok(EngineOutcome::SkippedConfiguration { reason }) => {
                tracing::debug!("Skipping {}: {}", video.video_id, reason);
                Ok(None)
            }
            Err(AppError::CredentialRevoked) => {
                tracing::error!(
                    "🚫 Credential revoked for user {}; flagging for operator attention",
                    video.user_id
                );
                Err(AppError::CredentialRevoked)
            }
            Err(e) => Err(e),
        }
    }
}
