// Periodic driver tests over in-memory stores and the mock platform.
// Run with: cargo test --test scheduler_tests

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{
    platform_state, quota_config, start_mock_platform, test_app_config, test_user, MockComment,
    SharedPlatform,
};
use tubereply::models::{User, Video};
use tubereply::repositories::{
    DedupStore, MemoryDedupStore, MemoryUserDirectory, MemoryVideoIndex, UserDirectory, VideoIndex,
};
use tubereply::services::{AutoReplyScheduler, MemoryQuotaTracker, QuotaTracker, ReplyContext};
use tubereply::utils::PacingProfile;
use uuid::Uuid;

fn enrolled_video(
    user_id: Uuid,
    video_id: &str,
    interval_minutes: i32,
    last_checked: Option<DateTime<Utc>>,
) -> Video {
    let now = Utc::now();
    Video {
        id: Uuid::new_v4(),
        user_id,
        video_id: video_id.to_string(),
        title: format!("Video {}", video_id),
        description: None,
        thumbnail_url: None,
        published_at: Some(now),
        view_count: 100,
        comment_count: 5,
        auto_reply_enabled: true,
        keywords: serde_json::json!(["price"]),
        reply_templates: serde_json::json!(["Thanks {name}!"]),
        check_interval_minutes: interval_minutes,
        last_checked_at: last_checked,
        created_at: now,
        updated_at: now,
    }
}

struct SchedulerHarness {
    platform: SharedPlatform,
    users: Arc<MemoryUserDirectory>,
    videos: Arc<MemoryVideoIndex>,
    dedup: Arc<MemoryDedupStore>,
    scheduler: AutoReplyScheduler,
    user: User,
}

async fn scheduler_harness(comments: Vec<MockComment>) -> SchedulerHarness {
    let platform = platform_state();
    platform.write().await.comments = comments;
    let (base, token_url) = start_mock_platform(platform.clone()).await;

    let config = test_app_config(quota_config(10_000, 200));

    let users = Arc::new(MemoryUserDirectory::new());
    let user = test_user("tok-valid");
    users.insert(user.clone());

    let videos = Arc::new(MemoryVideoIndex::new());
    let dedup = Arc::new(MemoryDedupStore::new());
    let quota = Arc::new(MemoryQuotaTracker::new(config.quota.clone(), dedup.clone()));

    let context = ReplyContext::new(
        users.clone() as Arc<dyn UserDirectory>,
        videos.clone() as Arc<dyn VideoIndex>,
        dedup.clone() as Arc<dyn DedupStore>,
        quota as Arc<dyn QuotaTracker>,
        &config,
    )
    .with_platform_base_url(&base)
    .with_token_endpoint(&token_url)
    .with_pacing(PacingProfile::immediate());

    SchedulerHarness {
        platform,
        users,
        videos,
        dedup,
        scheduler: AutoReplyScheduler::new(context),
        user,
    }
}

#[tokio::test]
async fn a_tick_processes_only_due_videos_and_stamps_them() {
    let h = scheduler_harness(Vec::new()).await;
    let now = Utc::now();

    // v1 is overdue; v2 was checked five minutes ago on a 15-minute interval.
    let v2_checked = now - Duration::minutes(5);
    h.videos.insert(enrolled_video(h.user.id, "v1", 15, Some(now - Duration::minutes(20))));
    h.videos.insert(enrolled_video(h.user.id, "v2", 15, Some(v2_checked)));

    let stats = h.scheduler.run_tick().await.unwrap();
    assert_eq!(stats.due_videos, 1);
    assert_eq!(stats.processed_videos, 1);
    assert_eq!(stats.errors_encountered, 0);

    let v1 = h.videos.get("v1").unwrap();
    let stamped = v1.last_checked_at.unwrap();
    assert!((Utc::now() - stamped).num_seconds().abs() < 2);

    let v2 = h.videos.get("v2").unwrap();
    assert_eq!(v2.last_checked_at.unwrap(), v2_checked);

    // v2 never reached the platform.
    let s = h.platform.read().await;
    assert_eq!(s.comment_fetches.get("v1"), Some(&1));
    assert!(!s.comment_fetches.contains_key("v2"));
}

#[tokio::test]
async fn back_to_back_ticks_select_disjoint_sets() {
    let h = scheduler_harness(Vec::new()).await;
    h.videos.insert(enrolled_video(h.user.id, "v1", 15, None));
    h.videos.insert(enrolled_video(h.user.id, "v2", 15, None));

    let first = h.scheduler.run_tick().await.unwrap();
    assert_eq!(first.due_videos, 2);

    let second = h.scheduler.run_tick().await.unwrap();
    assert_eq!(second.due_videos, 0);
}

#[tokio::test]
async fn a_tick_replies_and_records_through_the_whole_stack() {
    let h = scheduler_harness(vec![
        MockComment::new("c1", "How much is the price?", "Ana"),
        MockComment::new("c2", "Nice vid", "Bo"),
    ])
    .await;
    h.videos.insert(enrolled_video(h.user.id, "v1", 15, None));

    let stats = h.scheduler.run_tick().await.unwrap();
    assert_eq!(stats.processed_videos, 1);
    assert_eq!(stats.total_replied, 1);

    assert_eq!(h.dedup.len(), 1);
    assert!(h.dedup.get("c1").is_some());
    assert_eq!(h.platform.read().await.posted.len(), 1);
}

#[tokio::test]
async fn videos_without_configuration_are_skipped_not_errored() {
    let h = scheduler_harness(Vec::new()).await;
    let mut video = enrolled_video(h.user.id, "v1", 15, None);
    video.keywords = serde_json::json!([]);
    h.videos.insert(video);

    let stats = h.scheduler.run_tick().await.unwrap();
    assert_eq!(stats.due_videos, 1);
    assert_eq!(stats.processed_videos, 0);
    assert_eq!(stats.errors_encountered, 0);

    // Stamped anyway, so a misconfigured video cannot wedge the queue.
    assert!(h.videos.get("v1").unwrap().last_checked_at.is_some());
}

#[tokio::test]
async fn users_without_tokens_are_skipped() {
    let h = scheduler_harness(Vec::new()).await;

    let mut user = test_user("tok-valid");
    user.access_token = None;
    h.users.insert(user.clone());
    h.videos.insert(enrolled_video(user.id, "v9", 15, None));

    let stats = h.scheduler.run_tick().await.unwrap();
    assert_eq!(stats.due_videos, 1);
    assert_eq!(stats.processed_videos, 0);
    assert_eq!(stats.errors_encountered, 0);
}

#[tokio::test]
async fn a_revoked_credential_is_reported_but_does_not_abort_the_tick() {
    let h = scheduler_harness(vec![MockComment::new("c1", "price?", "Ana")]).await;
    h.platform.write().await.refresh_rejects = true;

    // This user's token is expired, and the provider refuses to refresh it.
    let mut revoked_user = test_user("tok-expired");
    revoked_user.email = "revoked@example.com".to_string();
    revoked_user.google_id = "google-revoked".to_string();
    h.users.insert(revoked_user.clone());

    h.videos.insert(enrolled_video(revoked_user.id, "v-revoked", 15, None));
    h.videos.insert(enrolled_video(h.user.id, "v-good", 15, None));

    let stats = h.scheduler.run_tick().await.unwrap();
    assert_eq!(stats.due_videos, 2);
    assert_eq!(stats.errors_encountered, 1);
    assert_eq!(stats.processed_videos, 1);
    assert!(stats.errors[0].contains("revoked"));
}
