//! Externally-synchronized entity lookups
//!
//! Courses and users are owned by the LMS sync process; the engine only
//! maps external LMS identifiers to internal ids. A missing row means
//! the LMS is ahead of local sync, which the router treats as a no-op.

use questline_common::Result;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use super::parse_uuid;

/// Find the internal course id for an external LMS course id
pub async fn find_course_by_external(db: &Pool<Sqlite>, external_id: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM courses WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => Ok(Some(parse_uuid(&row.get::<String, _>("id"))?)),
        None => Ok(None),
    }
}

/// Find the internal user id for an external LMS user id
pub async fn find_user_by_external(db: &Pool<Sqlite>, external_id: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM users WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => Ok(Some(parse_uuid(&row.get::<String, _>("id"))?)),
        None => Ok(None),
    }
}

/// Register (or refresh) a synchronized course
///
/// Called by the sync collaborator, and by tests to seed fixtures.
pub async fn upsert_course(db: &Pool<Sqlite>, external_id: &str, title: &str) -> Result<Uuid> {
    if let Some(id) = find_course_by_external(db, external_id).await? {
        sqlx::query("UPDATE courses SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id.to_string())
            .execute(db)
            .await?;
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO courses (id, external_id, title) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(external_id)
        .bind(title)
        .execute(db)
        .await?;

    Ok(id)
}

/// Register (or refresh) a synchronized user
pub async fn upsert_user(db: &Pool<Sqlite>, external_id: &str, display_name: &str) -> Result<Uuid> {
    if let Some(id) = find_user_by_external(db, external_id).await? {
        sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
            .bind(display_name)
            .bind(id.to_string())
            .execute(db)
            .await?;
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, external_id, display_name) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(external_id)
        .bind(display_name)
        .execute(db)
        .await?;

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_common::db::{connect_memory, run_migrations};

    #[tokio::test]
    async fn test_lookup_unknown_is_none() {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert!(find_course_by_external(&pool, "moodle-42").await.unwrap().is_none());
        assert!(find_user_by_external(&pool, "moodle-7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_stable() {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let first = upsert_course(&pool, "moodle-42", "Rust 101").await.unwrap();
        let second = upsert_course(&pool, "moodle-42", "Rust 101 (renamed)").await.unwrap();
        assert_eq!(first, second);

        let found = find_course_by_external(&pool, "moodle-42").await.unwrap();
        assert_eq!(found, Some(first));
    }
}
