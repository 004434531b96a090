// ============================================================================
// Reply Engine - Per-Video Auto-Reply Pipeline
// ============================================================================
//
// One invocation handles one (video, user) pair:
//
//   quota preflight -> fetch -> keyword filter -> dedup filter ->
//   bounded-concurrency reply loop
//
// The reply loop claims each comment through the dedup store's idempotent
// insert BEFORE posting. The unique comment ID makes that insert a
// distributed reservation: across any number of concurrent invocations,
// exactly one worker wins each comment and every loser backs off without
// posting. A crash after the claim but before the post forfeits that one
// reply; the system promises at-most-once, never exactly-once.
//
// Per-comment failures never abort the invocation. Quota exhaustion stops
// further submissions cleanly; a revoked refresh credential is fatal for
// the whole invocation and is surfaced to the caller.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::middleware::error_handling::{AppError, Result};
use crate::models::NewReply;
use crate::repositories::{DedupStore, InsertOutcome};
use crate::services::platform_client::{CommentThread, PlatformClient, PlatformError};
use crate::services::quota_service::QuotaTracker;
use crate::utils::{DelayPacer, TemplateRenderer};

/// Below this many remaining global units a run is not worth starting.
pub const MIN_GLOBAL_HEADROOM: i64 = 100;

/// Comment cap for scheduled runs; manual triggers pass 1000.
pub const SCHEDULED_COMMENT_CAP: usize = 100;

/// A comment that passed the keyword filter, annotated with the first
/// keyword that matched.
#[derive(Debug, Clone)]
pub struct MatchedComment {
    pub thread: CommentThread,
    pub keyword: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Reply posted and recorded.
    Replied,
    /// Another worker already handled this comment; success-equivalent.
    AlreadyReplied,
    /// A budget ran out before this comment's turn.
    QuotaExhausted,
    /// The invocation deadline passed before this comment was submitted.
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentReplyResult {
    pub comment_id: String,
    pub status: ReplyStatus,
    pub reply_text: Option<String>,
    pub error: Option<String>,
}

impl CommentReplyResult {
    fn replied(comment_id: String, reply_text: String) -> Self {
        Self {
            comment_id,
            status: ReplyStatus::Replied,
            reply_text: Some(reply_text),
            error: None,
        }
    }

    fn already_replied(comment_id: String) -> Self {
        Self {
            comment_id,
            status: ReplyStatus::AlreadyReplied,
            reply_text: None,
            error: None,
        }
    }

    fn quota_exhausted(comment_id: String) -> Self {
        Self {
            comment_id,
            status: ReplyStatus::QuotaExhausted,
            reply_text: None,
            error: Some("Quota exhausted".to_string()),
        }
    }

    fn cancelled(comment_id: String) -> Self {
        Self {
            comment_id,
            status: ReplyStatus::Cancelled,
            reply_text: None,
            error: Some("Invocation deadline reached".to_string()),
        }
    }

    fn failed(comment_id: String, error: impl Into<String>) -> Self {
        Self {
            comment_id,
            status: ReplyStatus::Failed,
            reply_text: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplyRunStats {
    pub total_comments: usize,
    pub matched: usize,
    pub new_comments: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub already_replied: usize,
    pub quota_exhausted: usize,
    pub cancelled: usize,
    pub results: Vec<CommentReplyResult>,
}

impl ReplyRunStats {
    fn from_results(
        total_comments: usize,
        matched: usize,
        new_comments: usize,
        results: Vec<CommentReplyResult>,
    ) -> Self {
        let mut stats = Self {
            total_comments,
            matched,
            new_comments,
            ..Default::default()
        };
        for result in &results {
            match result.status {
                ReplyStatus::Replied => stats.succeeded += 1,
                ReplyStatus::Failed => stats.failed += 1,
                ReplyStatus::AlreadyReplied => stats.already_replied += 1,
                ReplyStatus::QuotaExhausted => stats.quota_exhausted += 1,
                ReplyStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats.results = results;
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EngineOutcome {
    Completed(ReplyRunStats),
    SkippedConfiguration { reason: String },
    SkippedQuota { remaining_global: i64, remaining_for_user: i64 },
}

/// One reply-engine invocation's parameters.
#[derive(Debug, Clone)]
pub struct ReplyJobSpec {
    pub video_id: String,
    pub user_id: Uuid,
    pub keywords: Vec<String>,
    pub templates: Vec<String>,
    pub max_comments: usize,
    /// Cap on replies this invocation may post; the scheduler passes a
    /// randomized batch size so long backlogs spread across ticks.
    pub reply_cap: Option<usize>,
    /// No new posts are submitted past this point; in-flight posts
    /// finish so their dedup records still land.
    pub deadline: Option<Instant>,
}

pub struct ReplyEngine {
    platform: PlatformClient,
    dedup: Arc<dyn DedupStore>,
    quota: Arc<dyn QuotaTracker>,
    pacer: DelayPacer,
    reply_cost: i64,
    fetch_cost: i64,
    max_concurrent: usize,
}

impl ReplyEngine {
    pub fn new(
        platform: PlatformClient,
        dedup: Arc<dyn DedupStore>,
        quota: Arc<dyn QuotaTracker>,
        pacer: DelayPacer,
        quota_config: &QuotaConfig,
        max_concurrent: usize,
    ) -> Self {
        Self {
            platform,
            dedup,
            quota,
            pacer,
            reply_cost: quota_config.reply_cost,
            fetch_cost: quota_config.fetch_cost,
            max_concurrent,
        }
    }

    /// Full pipeline for one video.
    pub async fn process_video(&self, job: ReplyJobSpec) -> Result<EngineOutcome> {
        if job.keywords.is_empty() {
            return Ok(EngineOutcome::SkippedConfiguration {
                reason: "No keywords configured".to_string(),
            });
        }
        if job.templates.is_empty() {
            return Ok(EngineOutcome::SkippedConfiguration {
                reason: "No reply templates configured".to_string(),
            });
        }

        let remaining_global = self.quota.remaining_global().await?;
        let remaining_for_user = self.quota.remaining_for_user(job.user_id).await?;
        if remaining_global < MIN_GLOBAL_HEADROOM || remaining_for_user <= 0 {
            tracing::info!(
                "Skipping video {}: low quota (global={}, user={})",
                job.video_id,
                remaining_global,
                remaining_for_user
            );
            return Ok(EngineOutcome::SkippedQuota {
                remaining_global,
                remaining_for_user,
            });
        }

        tracing::info!("📥 Fetching comments for video {}...", job.video_id);
        let comments = self
            .platform
            .list_video_comments(&job.video_id, job.max_comments)
            .await
            .map_err(AppError::from)?;
        if let Err(e) = self.quota.reserve(self.fetch_cost, job.user_id).await {
            tracing::warn!("Failed to record fetch spend for user {}: {}", job.user_id, e);
        }

        let matched = Self::filter_comments_by_keywords(&comments, &job.keywords);
        tracing::info!("🎯 {} of {} comments matched keywords", matched.len(), comments.len());

        let mut to_reply = self.filter_unreplied(matched.clone()).await?;
        let new_comments = to_reply.len();
        tracing::info!("✨ {} new comments to reply to", new_comments);

        if let Some(cap) = job.reply_cap {
            to_reply.truncate(cap);
        }

        let results = self
            .reply_to_comments(to_reply, &job.video_id, job.user_id, &job.templates, job.deadline)
            .await?;

        Ok(EngineOutcome::Completed(ReplyRunStats::from_results(
            comments.len(),
            matched.len(),
            new_comments,
            results,
        )))
    }

    /// Case-fold substring match; first configured keyword wins, at most
    /// one match per comment.
    pub fn filter_comments_by_keywords(
        comments: &[CommentThread],
        keywords: &[String],
    ) -> Vec<MatchedComment> {
        if keywords.is_empty() {
            return Vec::new();
        }

        let folded: Vec<(String, &String)> =
            keywords.iter().map(|k| (k.to_lowercase(), k)).collect();

        comments
            .iter()
            .filter_map(|thread| {
                let text = thread.text().to_lowercase();
                folded
                    .iter()
                    .find(|(needle, _)| text.contains(needle.as_str()))
                    .map(|(_, keyword)| MatchedComment {
                        thread: thread.clone(),
                        keyword: (*keyword).clone(),
                    })
            })
            .collect()
    }

    /// Drop comments the dedup oracle already knows. One batched
    /// round trip regardless of input size.
    pub async fn filter_unreplied(
        &self,
        comments: Vec<MatchedComment>,
    ) -> Result<Vec<MatchedComment>> {
        if comments.is_empty() {
            return Ok(comments);
        }

        let ids: Vec<String> = comments.iter().map(|c| c.thread.id.clone()).collect();
        let replied = self.dedup.contains_any(&ids).await?;

        Ok(comments
            .into_iter()
            .filter(|c| !replied.contains(&c.thread.id))
            .collect())
    }

    /// Reply to comments under the concurrency cap. Submission order is
    /// the platform's delivery order; completion order is arbitrary.
    pub async fn reply_to_comments(
        &self,
        comments: Vec<MatchedComment>,
        video_id: &str,
        user_id: Uuid,
        templates: &[String],
        deadline: Option<Instant>,
    ) -> Result<Vec<CommentReplyResult>> {
        if comments.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Semaphore::new(self.max_concurrent);
        let semaphore = &semaphore;
        let quota_stop = AtomicBool::new(false);
        let quota_stop = &quota_stop;
        let revoked = AtomicBool::new(false);
        let revoked = &revoked;

        let tasks = comments.into_iter().map(|comment| async move {
            let comment_id = comment.thread.id.clone();

            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return CommentReplyResult::failed(comment_id, "worker pool closed"),
            };

            if revoked.load(Ordering::SeqCst) {
                return CommentReplyResult::failed(comment_id, "credential revoked");
            }
            if quota_stop.load(Ordering::SeqCst) {
                return CommentReplyResult::quota_exhausted(comment_id);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return CommentReplyResult::cancelled(comment_id);
                }
            }

            match self.quota.can_reserve(self.reply_cost, user_id).await {
                Ok(true) => {}
                Ok(false) => {
                    quota_stop.store(true, Ordering::SeqCst);
                    return CommentReplyResult::quota_exhausted(comment_id);
                }
                Err(e) => return CommentReplyResult::failed(comment_id, e.to_string()),
            }

            let reply_text = Self::varied_reply(templates, &comment);

            // Claim the comment. Winning this insert is the reservation
            // that makes the upcoming post safe against every concurrent
            // worker looking at the same comment.
            let record = NewReply {
                comment_id: comment_id.clone(),
                video_id: video_id.to_string(),
                user_id,
                comment_text: Some(comment.thread.text().to_string()),
                comment_author: Some(comment.thread.author().to_string()),
                keyword_matched: Some(comment.keyword.clone()),
                reply_text: reply_text.clone(),
            };
            match self.dedup.insert(&record).await {
                Ok(InsertOutcome::Inserted) => {}
                Ok(InsertOutcome::AlreadyReplied) => {
                    return CommentReplyResult::already_replied(comment_id);
                }
                Err(e) => return CommentReplyResult::failed(comment_id, e.to_string()),
            }

            self.pacer.pause_before_reply().await;

            match self.platform.post_reply(&comment_id, &reply_text).await {
                Ok(_) => {
                    if let Err(e) = self.quota.reserve(self.reply_cost, user_id).await {
                        tracing::warn!("Failed to record reply spend for user {}: {}", user_id, e);
                    }
                    self.pacer.pause_after_reply().await;
                    CommentReplyResult::replied(comment_id, reply_text)
                }
                Err(PlatformError::CredentialRevoked) => {
                    revoked.store(true, Ordering::SeqCst);
                    CommentReplyResult::failed(comment_id, "credential revoked")
                }
                Err(e) => {
                    tracing::error!("Error replying to {}: {}", comment_id, e);
                    CommentReplyResult::failed(comment_id, e.to_string())
                }
            }
        });

        let results = join_all(tasks).await;

        if revoked.load(Ordering::SeqCst) {
            return Err(AppError::CredentialRevoked);
        }

        Ok(results)
    }

    fn varied_reply(templates: &[String], comment: &MatchedComment) -> String {
        let template = templates
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Thanks for your comment!".to_string());

        let author = comment.thread.author();
        let mut vars = HashMap::new();
        vars.insert(
            "name".to_string(),
            if author.is_empty() { "there".to_string() } else { author.to_string() },
        );

        TemplateRenderer::render(&template, &vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::platform_client::{Comment, CommentSnippet, CommentThreadSnippet};

    fn thread(id: &str, text: &str, author: &str) -> CommentThread {
        CommentThread {
            id: id.to_string(),
            snippet: CommentThreadSnippet {
                top_level_comment: Comment {
                    id: id.to_string(),
                    snippet: CommentSnippet {
                        text_display: text.to_string(),
                        author_display_name: author.to_string(),
                    },
                },
                total_reply_count: 0,
            },
        }
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn keyword_filter_is_case_insensitive() {
        let comments = vec![
            thread("c1", "How much is the price?", "Ana"),
            thread("c2", "Nice vid", "Bo"),
            thread("c3", "PRICE?", "Cy"),
        ];

        let matched =
            ReplyEngine::filter_comments_by_keywords(&comments, &keywords(&["price"]));
        let ids: Vec<&str> = matched.iter().map(|m| m.thread.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
    }

    #[test]
    fn keyword_filter_folds_unicode() {
        let comments = vec![
            thread("c1", "Merci pour la Réponse !", "Éle"),
            thread("c2", "j'attends une réponse", "Fleur"),
        ];

        assert_eq!(
            ReplyEngine::filter_comments_by_keywords(&comments, &keywords(&["réponse"])).len(),
            2
        );
        assert_eq!(
            ReplyEngine::filter_comments_by_keywords(&comments, &keywords(&["RÉPONSE"])).len(),
            2
        );
    }

    #[test]
    fn first_configured_keyword_wins() {
        let comments = vec![thread("c1", "what's the price and the cost?", "Ana")];

        let matched = ReplyEngine::filter_comments_by_keywords(
            &comments,
            &keywords(&["cost", "price"]),
        );
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].keyword, "cost");
    }

    #[test]
    fn empty_keywords_match_nothing() {
        let comments = vec![thread("c1", "anything", "Ana")];
        assert!(ReplyEngine::filter_comments_by_keywords(&comments, &[]).is_empty());
    }

    #[test]
    fn filter_preserves_platform_delivery_order() {
        let comments: Vec<CommentThread> = (0..10)
            .map(|i| thread(&format!("c{i}"), "price", "Ana"))
            .collect();

        let matched =
            ReplyEngine::filter_comments_by_keywords(&comments, &keywords(&["price"]));
        let ids: Vec<String> = matched.iter().map(|m| m.thread.id.clone()).collect();
        let expected: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        assert_eq!(ids, expected);
    }
}
