pub mod analytics;
pub mod templates;
pub mod videos;

use axum::Json;
use serde_json::json;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "tubereply",
    }))
}
