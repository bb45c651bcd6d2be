//! Experience-point ledger and aggregate queries

use chrono::{DateTime, Utc};
use questline_common::db::models::XpEntry;
use questline_common::Result;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

/// Timestamp of the most recent ledger row matching the dedup key
///
/// `course_id IS ?` so a NULL course (global activity) matches NULL.
pub async fn last_award_at(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    course_id: Option<Uuid>,
    source_type: &str,
    source_id: &str,
) -> Result<Option<DateTime<Utc>>> {
    let awarded_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        SELECT awarded_at FROM experience_points
        WHERE user_id = ? AND course_id IS ? AND source_type = ? AND source_id = ?
        ORDER BY awarded_at DESC LIMIT 1
        "#,
    )
    .bind(user_id.to_string())
    .bind(course_id.map(|id| id.to_string()))
    .bind(source_type)
    .bind(source_id)
    .fetch_optional(conn)
    .await?;

    Ok(awarded_at)
}

/// Append one ledger row
pub async fn insert_entry(conn: &mut SqliteConnection, entry: &XpEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO experience_points
            (id, user_id, course_id, amount, source_type, source_id, note, awarded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.user_id.to_string())
    .bind(entry.course_id.map(|id| id.to_string()))
    .bind(entry.amount)
    .bind(&entry.source_type)
    .bind(&entry.source_id)
    .bind(&entry.note)
    .bind(entry.awarded_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Fold a grant into the per-(user, course) aggregate, creating the row
/// on first contact; returns the new XP total
pub async fn apply_to_aggregate(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    course_id: Uuid,
    amount: i64,
    quest_completed: bool,
    now: DateTime<Utc>,
) -> Result<i64> {
    let existing = sqlx::query(
        "SELECT id, total_xp FROM student_progress WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id.to_string())
    .bind(course_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let completed_delta = if quest_completed { 1 } else { 0 };

    match existing {
        Some(row) => {
            let id: String = row.get("id");
            let total: i64 = row.get::<i64, _>("total_xp") + amount;
            sqlx::query(
                r#"
                UPDATE student_progress SET
                    total_xp = ?,
                    quests_completed = quests_completed + ?,
                    last_activity_at = ?
                WHERE id = ?
                "#,
            )
            .bind(total)
            .bind(completed_delta)
            .bind(now)
            .bind(id)
            .execute(conn)
            .await?;
            Ok(total)
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO student_progress
                    (id, user_id, course_id, total_xp, quests_completed, last_activity_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(course_id.to_string())
            .bind(amount)
            .bind(completed_delta)
            .bind(now)
            .execute(conn)
            .await?;
            Ok(amount)
        }
    }
}

/// Current XP total for a (user, course) pair, zero when no aggregate
/// row exists yet
pub async fn xp_total(db: &Pool<Sqlite>, user_id: Uuid, course_id: Uuid) -> Result<i64> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT total_xp FROM student_progress WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id.to_string())
    .bind(course_id.to_string())
    .fetch_optional(db)
    .await?;

    Ok(total.unwrap_or(0))
}

/// All ledger rows for a user in insertion order (tests, audit reads)
pub async fn entries_for_user(db: &Pool<Sqlite>, user_id: Uuid) -> Result<Vec<XpEntry>> {
    let rows = sqlx::query(
        "SELECT * FROM experience_points WHERE user_id = ? ORDER BY awarded_at, id",
    )
    .bind(user_id.to_string())
    .fetch_all(db)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(XpEntry {
                id: super::parse_uuid(&row.get::<String, _>("id"))?,
                user_id: super::parse_uuid(&row.get::<String, _>("user_id"))?,
                course_id: row
                    .get::<Option<String>, _>("course_id")
                    .map(|s| super::parse_uuid(&s))
                    .transpose()?,
                amount: row.get("amount"),
                source_type: row.get("source_type"),
                source_id: row.get("source_id"),
                note: row.get("note"),
                awarded_at: row.get("awarded_at"),
            })
        })
        .collect()
}
