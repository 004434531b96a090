// Mock video-platform server for integration tests.
// Simulates the comment-thread, reply, channel, and token-refresh
// endpoints the client consumes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use tubereply::config::{AppConfig, DatabaseConfig, QuotaConfig};
use tubereply::models::User;
use tubereply::services::credential_service::{CredentialHolder, TokenPersist};
use tubereply::services::platform_client::PlatformClient;

// ============================================================================
// Mock Data Structures
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockComment {
    pub id: String,
    pub text: String,
    pub author: String,
}

impl MockComment {
    pub fn new(id: &str, text: &str, author: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            author: author.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockVideo {
    pub id: String,
    pub title: String,
    pub view_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Default)]
pub struct MockPlatformState {
    /// Comment threads served for every video.
    pub comments: Vec<MockComment>,
    /// Uploads listed for the mock channel.
    pub channel_videos: Vec<MockVideo>,
    /// Access tokens the API accepts.
    pub valid_tokens: Vec<String>,
    /// (parent_comment_id, text) pairs that were posted.
    pub posted: Vec<(String, String)>,
    /// Fetch count per video id.
    pub comment_fetches: HashMap<String, u32>,
    pub refresh_calls: u32,
    /// Token endpoint rejects the refresh credential.
    pub refresh_rejects: bool,
    /// Token endpoint mints tokens the API will NOT accept.
    pub grant_invalid_tokens: bool,
}

pub type SharedPlatform = Arc<RwLock<MockPlatformState>>;

pub fn platform_state() -> SharedPlatform {
    Arc::new(RwLock::new(MockPlatformState {
        valid_tokens: vec!["tok-valid".to_string()],
        ..Default::default()
    }))
}

// ============================================================================
// Endpoints
// ============================================================================

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": 401, "message": "Invalid Credentials"}})),
    )
}

async fn list_comment_threads(
    State(state): State<SharedPlatform>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = state.write().await;

    let token = params.get("access_token").cloned().unwrap_or_default();
    if !state.valid_tokens.contains(&token) {
        return Err(unauthorized());
    }

    let video_id = params.get("videoId").cloned().unwrap_or_default();
    *state.comment_fetches.entry(video_id).or_insert(0) += 1;

    let page_size: usize = params
        .get("maxResults")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    let start: usize = params
        .get("pageToken")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let items: Vec<Value> = state
        .comments
        .iter()
        .skip(start)
        .take(page_size)
        .map(|comment| {
            json!({
                "id": comment.id,
                "snippet": {
                    "topLevelComment": {
                        "id": comment.id,
                        "snippet": {
                            "textDisplay": comment.text,
                            "authorDisplayName": comment.author,
                        }
                    },
                    "totalReplyCount": 0,
                }
            })
        })
        .collect();

    let next_start = start + items.len();
    let mut body = json!({ "items": items });
    if next_start < state.comments.len() {
        body["nextPageToken"] = json!(next_start.to_string());
    }

    Ok(Json(body))
}

async fn post_comment(
    State(state): State<SharedPlatform>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = state.write().await;

    let token = params.get("access_token").cloned().unwrap_or_default();
    if !state.valid_tokens.contains(&token) {
        return Err(unauthorized());
    }

    let parent_id = body["snippet"]["parentId"].as_str().unwrap_or_default().to_string();
    let text = body["snippet"]["textOriginal"].as_str().unwrap_or_default().to_string();
    state.posted.push((parent_id.clone(), text));

    Ok(Json(json!({
        "id": format!("{}.reply{}", parent_id, state.posted.len()),
        "snippet": { "parentId": parent_id }
    })))
}

async fn list_channels(
    State(state): State<SharedPlatform>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let state = state.read().await;

    let token = params.get("access_token").cloned().unwrap_or_default();
    if !state.valid_tokens.contains(&token) {
        return Err(unauthorized());
    }

    Ok(Json(json!({
        "items": [{
            "id": params.get("id").cloned().unwrap_or_default(),
            "contentDetails": {
                "relatedPlaylists": { "uploads": "uploads-playlist-1" }
            }
        }]
    })))
}

async fn list_playlist_items(
    State(state): State<SharedPlatform>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let state = state.read().await;

    let token = params.get("access_token").cloned().unwrap_or_default();
    if !state.valid_tokens.contains(&token) {
        return Err(unauthorized());
    }

    let items: Vec<Value> = state
        .channel_videos
        .iter()
        .map(|video| {
            json!({
                "snippet": {
                    "title": video.title,
                    "description": format!("Description of {}", video.title),
                    "publishedAt": "2026-01-15T12:00:00Z",
                    "thumbnails": { "high": { "url": format!("https://img.example/{}.jpg", video.id) } }
                },
                "contentDetails": { "videoId": video.id }
            })
        })
        .collect();

    Ok(Json(json!({ "items": items })))
}

async fn list_videos(
    State(state): State<SharedPlatform>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let state = state.read().await;

    let token = params.get("access_token").cloned().unwrap_or_default();
    if !state.valid_tokens.contains(&token) {
        return Err(unauthorized());
    }

    let requested: Vec<&str> = params
        .get("id")
        .map(|ids| ids.split(',').collect())
        .unwrap_or_default();

    let items: Vec<Value> = state
        .channel_videos
        .iter()
        .filter(|video| requested.contains(&video.id.as_str()))
        .map(|video| {
            json!({
                "id": video.id,
                "statistics": {
                    "viewCount": video.view_count.to_string(),
                    "commentCount": video.comment_count.to_string(),
                }
            })
        })
        .collect();

    Ok(Json(json!({ "items": items })))
}

async fn token_endpoint(
    State(state): State<SharedPlatform>,
    Form(_params): Form<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = state.write().await;

    if state.refresh_rejects {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Token has been revoked."})),
        ));
    }

    state.refresh_calls += 1;
    let token = format!("tok-refreshed-{}", state.refresh_calls);
    if !state.grant_invalid_tokens {
        state.valid_tokens.push(token.clone());
    }

    Ok(Json(json!({
        "access_token": token,
        "expires_in": 3599,
        "token_type": "Bearer",
    })))
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn mock_platform_router(state: SharedPlatform) -> Router {
    Router::new()
        .route("/commentThreads", get(list_comment_threads))
        .route("/comments", post(post_comment))
        .route("/channels", get(list_channels))
        .route("/playlistItems", get(list_playlist_items))
        .route("/videos", get(list_videos))
        .route("/token", post(token_endpoint))
        .with_state(state)
}

/// Start the mock platform; returns (api_base_url, token_endpoint_url).
pub async fn start_mock_platform(state: SharedPlatform) -> (String, String) {
    let app = mock_platform_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    (format!("http://{}", addr), format!("http://{}/token", addr))
}

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Records every persistence callback it receives.
#[derive(Default)]
pub struct RecordingTokenSink {
    pub calls: Mutex<Vec<(Uuid, String, DateTime<Utc>)>>,
}

#[async_trait::async_trait]
impl TokenPersist for RecordingTokenSink {
    async fn persist(
        &self,
        user_id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .await
            .push((user_id, access_token.to_string(), expires_at));
        Ok(())
    }
}

pub fn test_app_config(quota: QuotaConfig) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "tubereply_test".to_string(),
            ssl_mode: "disable".to_string(),
            api_pool_size: 1,
            worker_pool_size: 1,
        },
        jwt_secret: "test-secret".to_string(),
        google_client_id: "client-id".to_string(),
        google_client_secret: "client-secret".to_string(),
        quota,
        tick_interval_seconds: 60,
        worker_concurrency: 5,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
    }
}

pub fn quota_config(daily_limit: i64, user_limit: i64) -> QuotaConfig {
    QuotaConfig {
        daily_quota_limit: daily_limit,
        user_daily_reply_limit: user_limit,
        reply_cost: 50,
        fetch_cost: 1,
    }
}

pub fn test_user(access_token: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        email: "creator@example.com".to_string(),
        google_id: "google-123".to_string(),
        channel_id: Some("channel-1".to_string()),
        channel_name: Some("Creator".to_string()),
        channel_thumbnail: None,
        access_token: Some(access_token.to_string()),
        refresh_token: Some("refresh-1".to_string()),
        token_expiry: Some(now + chrono::Duration::hours(1)),
        daily_quota_used: 0,
        last_quota_reset: now.date_naive(),
        created_at: now,
        updated_at: now,
    }
}

pub fn credential_holder(
    user_id: Uuid,
    access_token: &str,
    token_url: &str,
    sink: Arc<dyn TokenPersist>,
) -> CredentialHolder {
    CredentialHolder::new(
        user_id,
        access_token.to_string(),
        Some("refresh-1".to_string()),
        None,
        "client-id".to_string(),
        "client-secret".to_string(),
        sink,
    )
    .with_token_endpoint(token_url)
}

pub fn platform_client(
    user_id: Uuid,
    access_token: &str,
    base_url: &str,
    token_url: &str,
    sink: Arc<dyn TokenPersist>,
) -> PlatformClient {
    PlatformClient::new(credential_holder(user_id, access_token, token_url, sink))
        .with_base_url(base_url)
}
