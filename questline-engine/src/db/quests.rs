//! Quest queries

use chrono::{DateTime, Utc};
use questline_common::db::models::{Quest, ValidationMode};
use questline_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use super::parse_uuid;

/// Fields needed to create a quest (administrative path, also used by
/// test fixtures)
#[derive(Debug, Clone)]
pub struct NewQuest {
    pub course_id: Uuid,
    pub external_activity_id: Option<String>,
    pub title: String,
    pub description: String,
    pub xp_reward: i64,
    pub validation_mode: ValidationMode,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl NewQuest {
    /// Always-active quest bound to one activity, auto-validated
    pub fn bound(course_id: Uuid, external_activity_id: &str, title: &str, xp_reward: i64) -> Self {
        Self {
            course_id,
            external_activity_id: Some(external_activity_id.to_string()),
            title: title.to_string(),
            description: String::new(),
            xp_reward,
            validation_mode: ValidationMode::Auto,
            starts_at: None,
            ends_at: None,
            active: true,
        }
    }
}

pub async fn create_quest(db: &Pool<Sqlite>, new: NewQuest) -> Result<Quest> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO quests
            (id, course_id, external_activity_id, title, description,
             xp_reward, validation_mode, starts_at, ends_at, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.course_id.to_string())
    .bind(&new.external_activity_id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.xp_reward)
    .bind(new.validation_mode.as_str())
    .bind(new.starts_at)
    .bind(new.ends_at)
    .bind(new.active)
    .bind(created_at)
    .execute(db)
    .await?;

    Ok(Quest {
        id,
        course_id: new.course_id,
        external_activity_id: new.external_activity_id,
        title: new.title,
        description: new.description,
        xp_reward: new.xp_reward,
        validation_mode: new.validation_mode,
        starts_at: new.starts_at,
        ends_at: new.ends_at,
        active: new.active,
        created_at,
    })
}

pub async fn get_quest(db: &Pool<Sqlite>, quest_id: Uuid) -> Result<Option<Quest>> {
    let row = sqlx::query("SELECT * FROM quests WHERE id = ?")
        .bind(quest_id.to_string())
        .fetch_optional(db)
        .await?;

    row.map(|r| quest_from_row(&r)).transpose()
}

/// Active-flagged quests bound to an activity, in stable resolution
/// order `(created_at, id)`
///
/// Window filtering happens in the resolver so the inclusive-bound
/// semantics live in one place (`Quest::is_active_at`).
pub async fn candidates_for_activity(
    db: &Pool<Sqlite>,
    course_id: Uuid,
    external_activity_id: &str,
) -> Result<Vec<Quest>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM quests
        WHERE course_id = ? AND external_activity_id = ? AND active = 1
        ORDER BY created_at, id
        "#,
    )
    .bind(course_id.to_string())
    .bind(external_activity_id)
    .fetch_all(db)
    .await?;

    rows.iter().map(quest_from_row).collect()
}

fn quest_from_row(row: &SqliteRow) -> Result<Quest> {
    Ok(Quest {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        course_id: parse_uuid(&row.get::<String, _>("course_id"))?,
        external_activity_id: row.get("external_activity_id"),
        title: row.get("title"),
        description: row.get("description"),
        xp_reward: row.get("xp_reward"),
        validation_mode: ValidationMode::from_str(&row.get::<String, _>("validation_mode"))
            .unwrap_or(ValidationMode::Auto),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::upsert_course;
    use questline_common::db::{connect_memory, run_migrations};

    #[tokio::test]
    async fn test_create_and_fetch_round_trip() {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "ext-c1", "Course").await.unwrap();

        let created =
            create_quest(&pool, NewQuest::bound(course_id, "act-9", "Submit essay", 50))
                .await
                .unwrap();

        let fetched = get_quest(&pool, created.id).await.unwrap().expect("exists");
        assert_eq!(fetched.title, "Submit essay");
        assert_eq!(fetched.xp_reward, 50);
        assert_eq!(fetched.external_activity_id.as_deref(), Some("act-9"));
        assert!(fetched.active);
    }

    #[tokio::test]
    async fn test_candidates_ordered_by_creation() {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "ext-c1", "Course").await.unwrap();

        let mut older = NewQuest::bound(course_id, "act-9", "First", 10);
        older.starts_at = None;
        let first = create_quest(&pool, older).await.unwrap();
        let _second = create_quest(&pool, NewQuest::bound(course_id, "act-9", "Second", 20))
            .await
            .unwrap();

        let candidates = candidates_for_activity(&pool, course_id, "act-9").await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, first.id);
    }
}
