use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubereply::config::AppConfig;
use tubereply::create_app;
use tubereply::repositories::{
    init_schema, DedupStore, PgDedupStore, PgTemplateStore, PgUserDirectory, PgVideoIndex,
    TemplateStore, UserDirectory, VideoIndex, WarmDedupCache,
};
use tubereply::services::{
    AutoReplyScheduler, AutoReplyTickHandler, PgQuotaTracker, ProcessVideoRepliesHandler,
    QueuePolicy, QuotaTracker, ReplyContext, SyncUserVideosHandler, TaskRunner,
    TASK_AUTO_REPLY_TICK, TASK_PROCESS_VIDEO_REPLIES, TASK_SYNC_USER_VIDEOS,
};
use tubereply::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Default to INFO; override with RUST_LOG for debugging.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tubereply=info,tower_http=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_pool = config.database.connect_api_pool().await?;
    let worker_pool = config.database.connect_worker_pool().await?;
    init_schema(&api_pool).await?;

    // Stores behind the HTTP surface, on the API pool.
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(api_pool.clone()));
    let videos: Arc<dyn VideoIndex> = Arc::new(PgVideoIndex::new(api_pool.clone()));
    let replies: Arc<dyn DedupStore> = Arc::new(PgDedupStore::new(api_pool.clone()));
    let templates: Arc<dyn TemplateStore> = Arc::new(PgTemplateStore::new(api_pool.clone()));
    let quota: Arc<dyn QuotaTracker> =
        Arc::new(PgQuotaTracker::new(api_pool.clone(), config.quota.clone()));

    // Worker stores on their own small pool. The dedup store is fronted
    // by a self-warming mirror so steady-state membership tests stay off
    // the wire; the store underneath remains authoritative.
    let worker_users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(worker_pool.clone()));
    let worker_videos: Arc<dyn VideoIndex> = Arc::new(PgVideoIndex::new(worker_pool.clone()));
    let worker_dedup: Arc<dyn DedupStore> = Arc::new(WarmDedupCache::new(Arc::new(
        PgDedupStore::new(worker_pool.clone()),
    )));
    let worker_quota: Arc<dyn QuotaTracker> =
        Arc::new(PgQuotaTracker::new(worker_pool.clone(), config.quota.clone()));

    let context = ReplyContext::new(worker_users, worker_videos, worker_dedup, worker_quota, &config);
    let scheduler = Arc::new(AutoReplyScheduler::new(context.clone()));

    let runner = Arc::new(TaskRunner::new());
    runner.declare_queue("default", QueuePolicy::default());
    runner.declare_queue("replies", QueuePolicy::batch_replies());
    runner.register(
        TASK_PROCESS_VIDEO_REPLIES,
        "replies",
        Arc::new(ProcessVideoRepliesHandler::new(context.clone())),
    );
    runner.register(
        TASK_SYNC_USER_VIDEOS,
        "default",
        Arc::new(SyncUserVideosHandler::new(context.clone())),
    );
    runner.register(
        TASK_AUTO_REPLY_TICK,
        "default",
        Arc::new(AutoReplyTickHandler::new(scheduler)),
    );
    runner.clone().schedule_periodic(
        TASK_AUTO_REPLY_TICK,
        json!({}),
        Duration::from_secs(config.tick_interval_seconds),
    );

    tracing::info!(
        "🔔 Auto-reply scheduler registered: every {}s",
        config.tick_interval_seconds
    );

    let state = AppState {
        config: config.clone(),
        users,
        videos,
        replies,
        templates,
        quota,
        tasks: runner,
    };
    let app = create_app(state);

    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("🚀 Starting TubeReply server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
