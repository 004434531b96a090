pub mod config;
pub mod models;
pub mod repositories;
pub mod services;
pub mod handlers;
pub mod middleware;
pub mod utils;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::middleware::auth_middleware;
use crate::repositories::{DedupStore, TemplateStore, UserDirectory, VideoIndex};
use crate::services::{QuotaTracker, TaskRunner};

/// Shared application state handed to every handler.
///
/// Stores are trait objects so the HTTP surface works against either the
/// Postgres-backed implementations or the in-memory ones.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<dyn UserDirectory>,
    pub videos: Arc<dyn VideoIndex>,
    pub replies: Arc<dyn DedupStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub quota: Arc<dyn QuotaTracker>,
    pub tasks: Arc<TaskRunner>,
}

pub fn create_app(state: AppState) -> Router {
    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(header_val) => Some(header_val),
            Err(e) => {
                tracing::error!("❌ Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(
            "/api/videos",
            Router::new()
                .route("/", get(handlers::videos::list_videos))
                .route("/sync", get(handlers::videos::sync_videos))
                .route("/:video_id/settings", get(handlers::videos::get_video_settings))
                .route("/:video_id/settings", put(handlers::videos::update_video_settings))
                .route("/:video_id/trigger-reply", post(handlers::videos::trigger_reply))
                .route("/tasks/:task_id/status", get(handlers::videos::task_status))
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .nest(
            "/api/analytics",
            Router::new()
                .route("/", get(handlers::analytics::get_analytics))
                .route("/chart", get(handlers::analytics::get_chart_data))
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .nest(
            "/api/templates",
            Router::new()
                .route("/", get(handlers::templates::list_templates))
                .route("/", post(handlers::templates::create_template))
                .route("/:template_id", delete(handlers::templates::delete_template))
                .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
        .layer(axum::middleware::from_fn(
            |req: Request<Body>, next: Next| async move {
                tracing::debug!("{} {}", req.method(), req.uri());
                let response = next.run(req).await;
                tracing::debug!("Response status: {}", response.status());
                response
            },
        ))
}
