// ============================================================================
// Platform Client - YouTube Data API v3
// ============================================================================
//
// Thin typed wrapper over the platform REST surface. Every call funnels
// through one request path that attaches the access credential, refreshes
// it exactly once on a 401, and retries the original request. Pagination
// loops keep a 200ms spacer between pages.
//
// ============================================================================

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::middleware::error_handling::AppError;
use crate::models::VideoUpsert;
use crate::services::credential_service::{CredentialError, CredentialHolder};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const PAGE_SPACER: Duration = Duration::from_millis(200);
const STATS_BATCH_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("rate limited by the platform")]
    RateLimited,

    #[error("unauthorized after credential refresh")]
    Unauthorized,

    #[error("refresh credential rejected; the user must reconnect their channel")]
    CredentialRevoked,

    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<CredentialError> for PlatformError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Revoked => PlatformError::CredentialRevoked,
            CredentialError::Endpoint { status, body } => PlatformError::Api { status, body },
            CredentialError::Http(e) => PlatformError::Http(e),
        }
    }
}

impl From<PlatformError> for AppError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Unauthorized => AppError::Unauthorized,
            PlatformError::CredentialRevoked => AppError::CredentialRevoked,
            PlatformError::RateLimited => {
                AppError::TooManyRequests("Platform rate limit reached".to_string())
            }
            PlatformError::Api { status, body } => AppError::Platform { status, body },
            PlatformError::Http(e) => AppError::Internal(anyhow::anyhow!(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CommentThread {
    pub id: String,
    pub snippet: CommentThreadSnippet,
}

impl CommentThread {
    /// Displayed text of the top-level comment.
    pub fn text(&self) -> &str {
        &self.snippet.top_level_comment.snippet.text_display
    }

    pub fn author(&self) -> &str {
        &self.snippet.top_level_comment.snippet.author_display_name
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadSnippet {
    pub top_level_comment: Comment,
    #[serde(default)]
    pub total_reply_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub id: String,
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    #[serde(default)]
    pub text_display: String,
    #[serde(default)]
    pub author_display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostedReply {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagedResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default = "Vec::new")]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
    content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

impl Thumbnails {
    fn best_url(&self) -> Option<String> {
        self.high
            .as_ref()
            .or(self.default.as_ref())
            .map(|t| t.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoStatsResponse {
    #[serde(default = "Vec::new")]
    items: Vec<VideoStatsItem>,
}

#[derive(Debug, Deserialize)]
struct VideoStatsItem {
    id: String,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    comment_count: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PlatformClient {
    credentials: CredentialHolder,
    http: reqwest::Client,
    base_url: String,
}

impl PlatformClient {
    pub fn new(credentials: CredentialHolder) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            credentials,
            http,
            base_url: YOUTUBE_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn credentials(&self) -> &CredentialHolder {
        &self.credentials
    }

    /// Newest-first top-level comment threads for a video, up to
    /// `max_results`, fetched in pages of 100.
    pub async fn list_video_comments(
        &self,
        video_id: &str,
        max_results: usize,
    ) -> Result<Vec<CommentThread>, PlatformError> {
        let mut comments: Vec<CommentThread> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "snippet,replies".to_string()),
                ("videoId", video_id.to_string()),
                ("maxResults", max_results.min(100).to_string()),
                ("textFormat", "plainText".to_string()),
                ("order", "time".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: PagedResponse<CommentThread> = self
                .request(Method::GET, "/commentThreads", &params, None)
                .await?;

            comments.extend(page.items);
            page_token = page.next_page_token;

            if page_token.is_none() || comments.len() >= max_results {
                break;
            }
            tokio::time::sleep(PAGE_SPACER).await;
        }

        comments.truncate(max_results);
        Ok(comments)
    }

    /// All uploads of a channel with statistics merged in, up to
    /// `max_results` videos.
    pub async fn list_channel_videos(
        &self,
        channel_id: &str,
        max_results: usize,
    ) -> Result<Vec<VideoUpsert>, PlatformError> {
        let channels: ChannelListResponse = self
            .request(
                Method::GET,
                "/channels",
                &[
                    ("part", "contentDetails,snippet,statistics".to_string()),
                    ("id", channel_id.to_string()),
                ],
                None,
            )
            .await?;

        let uploads_playlist = channels
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| PlatformError::Api {
                status: 404,
                body: format!("channel {} not found", channel_id),
            })?;

        let mut items: Vec<PlaylistItem> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "snippet,contentDetails".to_string()),
                ("playlistId", uploads_playlist.clone()),
                ("maxResults", max_results.min(50).to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: PagedResponse<PlaylistItem> = self
                .request(Method::GET, "/playlistItems", &params, None)
                .await?;

            items.extend(page.items);
            page_token = page.next_page_token;

            if page_token.is_none() || items.len() >= max_results {
                break;
            }
            tokio::time::sleep(PAGE_SPACER).await;
        }

        items.truncate(max_results);

        let video_ids: Vec<String> = items
            .iter()
            .map(|item| item.content_details.video_id.clone())
            .collect();
        let stats = self.video_statistics(&video_ids).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let video_id = item.content_details.video_id;
                let (view_count, comment_count) = stats
                    .iter()
                    .find(|s| s.id == video_id)
                    .map(|s| {
                        (
                            parse_count(&s.statistics.view_count),
                            parse_count(&s.statistics.comment_count) as i32,
                        )
                    })
                    .unwrap_or((0, 0));

                VideoUpsert {
                    video_id,
                    title: item.snippet.title,
                    description: Some(item.snippet.description),
                    thumbnail_url: item.snippet.thumbnails.best_url(),
                    published_at: item.snippet.published_at,
                    view_count,
                    comment_count,
                }
            })
            .collect())
    }

    /// Statistics for up to 50 video IDs per request.
    async fn video_statistics(
        &self,
        video_ids: &[String],
    ) -> Result<Vec<VideoStatsItem>, PlatformError> {
        let mut stats = Vec::new();

        for batch in video_ids.chunks(STATS_BATCH_SIZE) {
            let response: VideoStatsResponse = self
                .request(
                    Method::GET,
                    "/videos",
                    &[
                        ("part", "statistics".to_string()),
                        ("id", batch.join(",")),
                    ],
                    None,
                )
                .await?;
            stats.extend(response.items);
            tokio::time::sleep(PAGE_SPACER).await;
        }

        Ok(stats)
    }

    /// Post a reply under a top-level comment.
    pub async fn post_reply(
        &self,
        parent_comment_id: &str,
        text: &str,
    ) -> Result<PostedReply, PlatformError> {
        let body = serde_json::json!({
            "snippet": {
                "parentId": parent_comment_id,
                "textOriginal": text,
            }
        });

        self.request(
            Method::POST,
            "/comments",
            &[("part", "snippet".to_string())],
            Some(&body),
        )
        .await
    }

    /// Single request path: attach credential, refresh once on 401,
    /// classify everything else.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, PlatformError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.credentials.current().await;

        let mut response = self.send(method.clone(), &url, params, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                "⚠️ 401 from platform for user {}; attempting credential refresh",
                self.credentials.user_id()
            );
            let refreshed = self.credentials.refresh(&token).await?;
            response = self.send(method, &url, params, body, &refreshed).await?;
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(PlatformError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(PlatformError::RateLimited),
            _ => Err(PlatformError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(&str, String)],
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http
            .request(method, url)
            .query(params)
            .query(&[("access_token", token)]);

        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await
    }
}

fn parse_count(value: &Option<String>) -> i64 {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
