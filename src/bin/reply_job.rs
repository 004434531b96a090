//! One-shot auto-reply run for external schedulers (cron, Heroku
//! Scheduler). Selects due videos, replies to one batch each, exits.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubereply::config::AppConfig;
use tubereply::repositories::{
    init_schema, DedupStore, PgDedupStore, PgUserDirectory, PgVideoIndex, UserDirectory,
    VideoIndex, WarmDedupCache,
};
use tubereply::services::{AutoReplyScheduler, PgQuotaTracker, QuotaTracker, ReplyContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tubereply=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting auto-reply job...");

    let config = AppConfig::from_env()?;
    let pool = config.database.connect_worker_pool().await?;
    init_schema(&pool).await?;

    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pool.clone()));
    let videos: Arc<dyn VideoIndex> = Arc::new(PgVideoIndex::new(pool.clone()));
    let dedup: Arc<dyn DedupStore> =
        Arc::new(WarmDedupCache::new(Arc::new(PgDedupStore::new(pool.clone()))));
    let quota: Arc<dyn QuotaTracker> = Arc::new(PgQuotaTracker::new(pool, config.quota.clone()));

    let context = ReplyContext::new(users, videos, dedup, quota, &config);
    let scheduler = AutoReplyScheduler::new(context);

    let stats = scheduler.run_tick().await?;

    tracing::info!(
        "✅ Job complete: {} due, {} processed, {} replies, {} errors",
        stats.due_videos,
        stats.processed_videos,
        stats.total_replied,
        stats.errors_encountered
    );

    Ok(())
}
