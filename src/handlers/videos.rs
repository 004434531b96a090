use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::Claims;
use crate::models::{VideoResponse, VideoSettings};
use crate::services::jobs::{TASK_PROCESS_VIDEO_REPLIES, TASK_SYNC_USER_VIDEOS};
use crate::services::TaskStatus;
use crate::AppState;

pub async fn list_videos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<VideoResponse>>> {
    let videos = state.videos.list_for_user(claims.user_id).await?;
    Ok(Json(videos.into_iter().map(VideoResponse::from).collect()))
}

pub async fn sync_videos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    let user = state
        .users
        .get_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.access_token.is_none() {
        return Err(AppError::BadRequest(
            "YouTube tokens not synced. Please reconnect your YouTube account.".to_string(),
        ));
    }
    if user.channel_id.is_none() {
        return Err(AppError::BadRequest(
            "No YouTube channel linked. Please reconnect your YouTube account.".to_string(),
        ));
    }

    let task_id = state
        .tasks
        .submit(TASK_SYNC_USER_VIDEOS, json!({ "user_id": claims.user_id }))?;

    Ok(Json(json!({
        "status": "processing",
        "task_id": task_id,
        "message": "Video sync started in background. Check task status.",
    })))
}

pub async fn get_video_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<VideoSettings>> {
    // Videos that exist on the platform but were never synced here get
    // default settings rather than a 404.
    let settings = state
        .videos
        .get_settings(&video_id, claims.user_id)
        .await?
        .unwrap_or_default();

    Ok(Json(settings))
}

pub async fn update_video_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
    Json(settings): Json<VideoSettings>,
) -> Result<Json<serde_json::Value>> {
    settings.validate()?;

    state
        .videos
        .update_settings(&video_id, claims.user_id, &settings)
        .await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn trigger_reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(video_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let user = state
        .users
        .get_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.access_token.is_none() {
        return Err(AppError::BadRequest(
            "YouTube tokens not synced. Please reconnect your YouTube account.".to_string(),
        ));
    }

    let video = state
        .videos
        .get_for_user(&video_id, claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    let keywords = video.keyword_list();
    if keywords.is_empty() {
        return Err(AppError::BadRequest("No keywords configured".to_string()));
    }

    let templates = video.template_list();
    if templates.is_empty() {
        return Err(AppError::BadRequest("No reply templates configured".to_string()));
    }

    let task_id = state.tasks.submit(
        TASK_PROCESS_VIDEO_REPLIES,
        json!({
            "video_id": video_id,
            "user_id": claims.user_id,
            "keywords": keywords,
            "templates": templates,
            "max_comments": 1000,
        }),
    )?;

    Ok(Json(json!({
        "status": "processing",
        "task_id": task_id,
        "message": "Reply processing started in background. Check task status.",
    })))
}

pub async fn task_status(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatus>> {
    let status = state
        .tasks
        .status(task_id)
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;

    Ok(Json(status))
}
