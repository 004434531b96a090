use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::error_handling::Result;
use crate::middleware::Claims;
use crate::models::DailyReplyCount;
use crate::AppState;

const RECENT_REPLIES_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    #[serde(default = "default_chart_days")]
    pub days: i64,
}

fn default_chart_days() -> i64 {
    7
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    let user_id = claims.user_id;

    let stats_7d = state.replies.stats_for_user(user_id, 7).await?;
    let replies_today = state.quota.user_reply_count(user_id).await?;
    let user_remaining = state.quota.remaining_for_user(user_id).await?;
    let user_daily_limit = state.quota.user_daily_limit();

    let quota_percent = if user_daily_limit > 0 {
        (replies_today * 100 / user_daily_limit).min(100)
    } else {
        0
    };

    let recent_replies = state
        .replies
        .recent_for_user(user_id, RECENT_REPLIES_LIMIT)
        .await?;

    Ok(Json(json!({
        "total_replies": stats_7d.total_replies,
        "replies_today": replies_today,
        "replies_this_week": stats_7d.total_replies,
        "quota_used": quota_percent,
        "user_daily_limit": user_daily_limit,
        "user_remaining": user_remaining,
        "recent_replies": recent_replies,
    })))
}

pub async fn get_chart_data(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<Vec<DailyReplyCount>>> {
    let days = query.days.clamp(1, 90);
    let chart = state.replies.chart_for_user(claims.user_id, days).await?;
    Ok(Json(chart))
}
