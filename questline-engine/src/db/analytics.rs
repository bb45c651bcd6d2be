//! Per-course analytics read surface
//!
//! Consumed by reporting; computed directly from stored progress and
//! event rows, never cached.

use questline_common::Result;
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Quest-level aggregate for one course
#[derive(Debug, Clone, Serialize)]
pub struct QuestAnalytics {
    pub total_records: i64,
    /// Progress-record counts keyed by engagement stage
    pub by_stage: BTreeMap<String, i64>,
    /// Share of records that moved past not_started
    pub start_rate: f64,
    /// Share of records that reached completed
    pub completion_rate: f64,
    pub mean_engagement_score: f64,
}

/// One day of activity
#[derive(Debug, Clone, Serialize)]
pub struct DailyActivity {
    pub day: String,
    pub active_participants: i64,
    pub completions: i64,
}

/// Engagement tier split (high ≥70, medium 30–69, low <30)
#[derive(Debug, Clone, Serialize)]
pub struct EngagementTiers {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

pub async fn quest_analytics(db: &Pool<Sqlite>, course_id: Uuid) -> Result<QuestAnalytics> {
    let rows = sqlx::query(
        r#"
        SELECT qp.stage AS stage, COUNT(*) AS n, AVG(qp.engagement_score) AS mean_score
        FROM quest_progress qp
        JOIN quests q ON q.id = qp.quest_id
        WHERE q.course_id = ?
        GROUP BY qp.stage
        "#,
    )
    .bind(course_id.to_string())
    .fetch_all(db)
    .await?;

    let mut by_stage = BTreeMap::new();
    let mut total = 0i64;
    let mut score_sum = 0.0f64;
    for row in &rows {
        let stage: String = row.get("stage");
        let n: i64 = row.get("n");
        let mean: Option<f64> = row.get("mean_score");
        score_sum += mean.unwrap_or(0.0) * n as f64;
        total += n;
        by_stage.insert(stage, n);
    }

    let not_started = by_stage.get("not_started").copied().unwrap_or(0);
    let completed = by_stage.get("completed").copied().unwrap_or(0);

    let rate = |n: i64| if total > 0 { n as f64 / total as f64 } else { 0.0 };

    Ok(QuestAnalytics {
        total_records: total,
        start_rate: rate(total - not_started),
        completion_rate: rate(completed),
        mean_engagement_score: if total > 0 { score_sum / total as f64 } else { 0.0 },
        by_stage,
    })
}

/// Per-day active participants and completions, ascending by day
pub async fn daily_activity(db: &Pool<Sqlite>, course_id: Uuid) -> Result<Vec<DailyActivity>> {
    let mut days: BTreeMap<String, DailyActivity> = BTreeMap::new();

    let active_rows = sqlx::query(
        r#"
        SELECT date(e.occurred_at) AS day, COUNT(DISTINCT qp.user_id) AS participants
        FROM quest_engagement_events e
        JOIN quest_progress qp ON qp.id = e.progress_id
        JOIN quests q ON q.id = qp.quest_id
        WHERE q.course_id = ?
        GROUP BY date(e.occurred_at)
        "#,
    )
    .bind(course_id.to_string())
    .fetch_all(db)
    .await?;

    for row in &active_rows {
        let day: String = row.get("day");
        days.insert(
            day.clone(),
            DailyActivity { day, active_participants: row.get("participants"), completions: 0 },
        );
    }

    let completion_rows = sqlx::query(
        r#"
        SELECT date(qp.completed_at) AS day, COUNT(*) AS completions
        FROM quest_progress qp
        JOIN quests q ON q.id = qp.quest_id
        WHERE q.course_id = ? AND qp.completed_at IS NOT NULL
        GROUP BY date(qp.completed_at)
        "#,
    )
    .bind(course_id.to_string())
    .fetch_all(db)
    .await?;

    for row in &completion_rows {
        let day: String = row.get("day");
        let completions: i64 = row.get("completions");
        days.entry(day.clone())
            .or_insert_with(|| DailyActivity { day, active_participants: 0, completions: 0 })
            .completions = completions;
    }

    Ok(days.into_values().collect())
}

/// Hour-of-day histogram of engagement events (index 0 = midnight UTC)
pub async fn hourly_histogram(db: &Pool<Sqlite>, course_id: Uuid) -> Result<[i64; 24]> {
    let rows = sqlx::query(
        r#"
        SELECT strftime('%H', e.occurred_at) AS hour, COUNT(*) AS n
        FROM quest_engagement_events e
        JOIN quest_progress qp ON qp.id = e.progress_id
        JOIN quests q ON q.id = qp.quest_id
        WHERE q.course_id = ?
        GROUP BY hour
        "#,
    )
    .bind(course_id.to_string())
    .fetch_all(db)
    .await?;

    let mut histogram = [0i64; 24];
    for row in &rows {
        let hour: Option<String> = row.get("hour");
        if let Some(index) = hour.and_then(|h| h.parse::<usize>().ok()) {
            if index < 24 {
                histogram[index] = row.get("n");
            }
        }
    }

    Ok(histogram)
}

pub async fn engagement_tiers(db: &Pool<Sqlite>, course_id: Uuid) -> Result<EngagementTiers> {
    let row = sqlx::query(
        r#"
        SELECT
            SUM(CASE WHEN qp.engagement_score >= 70 THEN 1 ELSE 0 END) AS high,
            SUM(CASE WHEN qp.engagement_score >= 30 AND qp.engagement_score < 70 THEN 1 ELSE 0 END) AS medium,
            SUM(CASE WHEN qp.engagement_score < 30 THEN 1 ELSE 0 END) AS low
        FROM quest_progress qp
        JOIN quests q ON q.id = qp.quest_id
        WHERE q.course_id = ?
        "#,
    )
    .bind(course_id.to_string())
    .fetch_one(db)
    .await?;

    Ok(EngagementTiers {
        high: row.get::<Option<i64>, _>("high").unwrap_or(0),
        medium: row.get::<Option<i64>, _>("medium").unwrap_or(0),
        low: row.get::<Option<i64>, _>("low").unwrap_or(0),
    })
}
