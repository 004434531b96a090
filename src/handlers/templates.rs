use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::Claims;
use crate::models::{CreateTemplateRequest, ReplyTemplate};
use crate::AppState;

pub async fn list_templates(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ReplyTemplate>>> {
    let templates = state.templates.list_for_user(claims.user_id).await?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateTemplateRequest>,
) -> Result<Json<ReplyTemplate>> {
    request.validate()?;

    let text = request.template_text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Template text cannot be empty".to_string()));
    }

    let template = state.templates.create(claims.user_id, text).await?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(template_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let deleted = state.templates.delete(claims.user_id, template_id).await?;
    if !deleted {
        return Err(AppError::NotFound("Template not found".to_string()));
    }

    Ok(Json(json!({ "status": "success", "message": "Template deleted" })))
}
