//! Per-course analytics endpoints (reporting read surface)

use axum::extract::{Path, State};
use axum::Json;
use questline_common::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::db::analytics;
use crate::AppState;

/// GET /api/v1/analytics/quests/:course_id
pub async fn quest_analytics(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<analytics::QuestAnalytics>> {
    Ok(Json(analytics::quest_analytics(&state.db, course_id).await?))
}

/// Daily series plus hour-of-day histogram in one response
#[derive(Debug, Serialize)]
pub struct ActivityReport {
    pub daily: Vec<analytics::DailyActivity>,
    pub by_hour: Vec<i64>,
}

/// GET /api/v1/analytics/activity/:course_id
pub async fn activity_report(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<ActivityReport>> {
    let daily = analytics::daily_activity(&state.db, course_id).await?;
    let by_hour = analytics::hourly_histogram(&state.db, course_id).await?;
    Ok(Json(ActivityReport { daily, by_hour: by_hour.to_vec() }))
}

/// GET /api/v1/analytics/engagement/:course_id
pub async fn engagement_tiers(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<analytics::EngagementTiers>> {
    Ok(Json(analytics::engagement_tiers(&state.db, course_id).await?))
}
