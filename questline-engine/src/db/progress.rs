//! Quest progress and engagement-event queries
//!
//! Write functions take a `&mut SqliteConnection` so the state machine
//! can group the progress update and its log row into one transaction —
//! the serialization point that keeps per-(user, quest) updates
//! monotonic under concurrent delivery.

use chrono::{DateTime, Utc};
use questline_common::db::models::{EngagementStage, QuestProgress, QuestStatus};
use questline_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::parse_uuid;

/// Load the progress record for (user, quest), creating it lazily on
/// first contact
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    quest_id: Uuid,
) -> Result<QuestProgress> {
    let row = sqlx::query("SELECT * FROM quest_progress WHERE user_id = ? AND quest_id = ?")
        .bind(user_id.to_string())
        .bind(quest_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(row) = row {
        return progress_from_row(&row);
    }

    let progress = QuestProgress::new(user_id, quest_id);
    sqlx::query(
        r#"
        INSERT INTO quest_progress (id, user_id, quest_id, status, stage)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(progress.id.to_string())
    .bind(user_id.to_string())
    .bind(quest_id.to_string())
    .bind(progress.status.as_str())
    .bind(progress.stage.as_str())
    .execute(conn)
    .await?;

    Ok(progress)
}

/// Persist every mutable field of a progress record
pub async fn update(conn: &mut SqliteConnection, progress: &QuestProgress) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE quest_progress SET
            status = ?, stage = ?, progress_percent = ?,
            interaction_count = ?, engagement_score = ?,
            first_interaction_at = ?, last_interaction_at = ?,
            started_at = ?, completed_at = ?, validated_at = ?,
            validation_notes = ?
        WHERE id = ?
        "#,
    )
    .bind(progress.status.as_str())
    .bind(progress.stage.as_str())
    .bind(progress.progress_percent)
    .bind(progress.interaction_count)
    .bind(progress.engagement_score)
    .bind(progress.first_interaction_at)
    .bind(progress.last_interaction_at)
    .bind(progress.started_at)
    .bind(progress.completed_at)
    .bind(progress.validated_at)
    .bind(&progress.validation_notes)
    .bind(progress.id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

/// Append one engagement log row
pub async fn insert_event(
    conn: &mut SqliteConnection,
    progress_id: Uuid,
    event_type: &str,
    payload: &serde_json::Value,
    points_awarded: i64,
    occurred_at: DateTime<Utc>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO quest_engagement_events
            (id, progress_id, event_type, payload, points_awarded, occurred_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(progress_id.to_string())
    .bind(event_type)
    .bind(payload.to_string())
    .bind(points_awarded)
    .bind(occurred_at)
    .execute(conn)
    .await?;

    Ok(id)
}

/// Whether any event of this exact type was ever logged for the record
/// (start-tier dedup: credit at most once per progress record)
pub async fn has_event_of_type(
    conn: &mut SqliteConnection,
    progress_id: Uuid,
    event_type: &str,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM quest_engagement_events
         WHERE progress_id = ? AND event_type = ?)",
    )
    .bind(progress_id.to_string())
    .bind(event_type)
    .fetch_one(conn)
    .await?;

    Ok(exists)
}

/// Timestamp of the most recent logged event of this type
/// (non-start-tier dedup lookback)
pub async fn last_event_at(
    conn: &mut SqliteConnection,
    progress_id: Uuid,
    event_type: &str,
) -> Result<Option<DateTime<Utc>>> {
    let occurred_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT occurred_at FROM quest_engagement_events
         WHERE progress_id = ? AND event_type = ?
         ORDER BY occurred_at DESC LIMIT 1",
    )
    .bind(progress_id.to_string())
    .bind(event_type)
    .fetch_optional(conn)
    .await?;

    Ok(occurred_at)
}

/// Read-only progress fetch (API surface, tests)
pub async fn get_progress(
    db: &Pool<Sqlite>,
    user_id: Uuid,
    quest_id: Uuid,
) -> Result<Option<QuestProgress>> {
    let row = sqlx::query("SELECT * FROM quest_progress WHERE user_id = ? AND quest_id = ?")
        .bind(user_id.to_string())
        .bind(quest_id.to_string())
        .fetch_optional(db)
        .await?;

    row.map(|r| progress_from_row(&r)).transpose()
}

fn progress_from_row(row: &SqliteRow) -> Result<QuestProgress> {
    Ok(QuestProgress {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        quest_id: parse_uuid(&row.get::<String, _>("quest_id"))?,
        status: QuestStatus::from_str(&row.get::<String, _>("status"))
            .unwrap_or(QuestStatus::NotStarted),
        stage: EngagementStage::from_str(&row.get::<String, _>("stage"))
            .unwrap_or(EngagementStage::NotStarted),
        progress_percent: row.get("progress_percent"),
        interaction_count: row.get("interaction_count"),
        engagement_score: row.get("engagement_score"),
        first_interaction_at: row.get("first_interaction_at"),
        last_interaction_at: row.get("last_interaction_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        validated_at: row.get("validated_at"),
        validation_notes: row.get("validation_notes"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::{upsert_course, upsert_user};
    use crate::db::quests::{create_quest, NewQuest};
    use questline_common::db::{connect_memory, run_migrations};

    async fn fixture() -> (sqlx::Pool<Sqlite>, Uuid, Uuid) {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "ext-c", "Course").await.unwrap();
        let user_id = upsert_user(&pool, "ext-u", "Learner").await.unwrap();
        let quest = create_quest(&pool, NewQuest::bound(course_id, "act", "Quest", 50))
            .await
            .unwrap();
        (pool, user_id, quest.id)
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_unique() {
        let (pool, user_id, quest_id) = fixture().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = get_or_create(&mut conn, user_id, quest_id).await.unwrap();
        assert_eq!(first.stage, EngagementStage::NotStarted);
        assert_eq!(first.interaction_count, 0);

        let second = get_or_create(&mut conn, user_id, quest_id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_event_lookback() {
        let (pool, user_id, quest_id) = fixture().await;
        let mut conn = pool.acquire().await.unwrap();
        let progress = get_or_create(&mut conn, user_id, quest_id).await.unwrap();

        assert!(!has_event_of_type(&mut conn, progress.id, "quiz_viewed").await.unwrap());
        assert!(last_event_at(&mut conn, progress.id, "quiz_viewed").await.unwrap().is_none());

        let now = Utc::now();
        insert_event(&mut conn, progress.id, "quiz_viewed", &serde_json::json!({}), 3, now)
            .await
            .unwrap();

        assert!(has_event_of_type(&mut conn, progress.id, "quiz_viewed").await.unwrap());
        let seen = last_event_at(&mut conn, progress.id, "quiz_viewed").await.unwrap();
        assert_eq!(seen.expect("logged").timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let (pool, user_id, quest_id) = fixture().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut progress = get_or_create(&mut conn, user_id, quest_id).await.unwrap();

        progress.stage = EngagementStage::InProgress;
        progress.status = QuestStatus::Started;
        progress.progress_percent = 60;
        progress.engagement_score = 13;
        progress.interaction_count = 2;
        update(&mut conn, &progress).await.unwrap();
        drop(conn);

        let reloaded = get_progress(&pool, user_id, quest_id).await.unwrap().unwrap();
        assert_eq!(reloaded.stage, EngagementStage::InProgress);
        assert_eq!(reloaded.progress_percent, 60);
        assert_eq!(reloaded.engagement_score, 13);
    }
}
