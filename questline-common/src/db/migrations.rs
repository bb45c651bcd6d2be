//! Database schema migrations
//!
//! Versioned schema migrations tracked in a `schema_version` table so
//! existing databases upgrade in place. Migrations are idempotent and
//! must never be edited once released; schema changes get a new version.

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;

    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

/// Migration v1: Core gamification schema
///
/// Courses and users hold only the external-id mapping; the LMS is the
/// system of record for everything else about them.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: core schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quests (
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL REFERENCES courses(id),
            external_activity_id TEXT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            xp_reward INTEGER NOT NULL DEFAULT 0,
            validation_mode TEXT NOT NULL DEFAULT 'auto',
            starts_at TIMESTAMP,
            ends_at TIMESTAMP,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_quests_activity
         ON quests (course_id, external_activity_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quest_progress (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            quest_id TEXT NOT NULL REFERENCES quests(id),
            status TEXT NOT NULL DEFAULT 'not_started',
            stage TEXT NOT NULL DEFAULT 'not_started',
            progress_percent INTEGER NOT NULL DEFAULT 0,
            interaction_count INTEGER NOT NULL DEFAULT 0,
            engagement_score INTEGER NOT NULL DEFAULT 0,
            first_interaction_at TIMESTAMP,
            last_interaction_at TIMESTAMP,
            started_at TIMESTAMP,
            completed_at TIMESTAMP,
            validated_at TIMESTAMP,
            validation_notes TEXT,
            UNIQUE (user_id, quest_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quest_engagement_events (
            id TEXT PRIMARY KEY,
            progress_id TEXT NOT NULL REFERENCES quest_progress(id) ON DELETE CASCADE,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            points_awarded INTEGER NOT NULL DEFAULT 0,
            occurred_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dedup lookback scans most-recent-first for one (progress, type)
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_engagement_events_lookback
         ON quest_engagement_events (progress_id, event_type, occurred_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS experience_points (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            course_id TEXT REFERENCES courses(id),
            amount INTEGER NOT NULL,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            awarded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Duplicate-prevention lookup; not UNIQUE because view-type sources
    // legitimately re-award after the rolling window
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_xp_dedup
         ON experience_points (user_id, course_id, source_type, source_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_progress (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            course_id TEXT NOT NULL REFERENCES courses(id),
            total_xp INTEGER NOT NULL DEFAULT 0,
            quests_completed INTEGER NOT NULL DEFAULT 0,
            badges_earned INTEGER NOT NULL DEFAULT 0,
            last_activity_at TIMESTAMP,
            UNIQUE (user_id, course_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Migration v2: study-time columns on student_progress
///
/// Added for the reporting surface; maintained by collaborators outside
/// the engagement pipeline.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: study-time tracking columns");

    for column in ["study_hours REAL NOT NULL DEFAULT 0", "streak_days INTEGER NOT NULL DEFAULT 0"] {
        let name = column.split_whitespace().next().unwrap_or_default();
        let has_column: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('student_progress') WHERE name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;

        if has_column == 0 {
            sqlx::query(&format!("ALTER TABLE student_progress ADD COLUMN {}", column))
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}
