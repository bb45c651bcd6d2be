//! Quest resolution
//!
//! Maps an (internal course, external activity) pair to the unique
//! active quest bound to that activity, or `None` for generic-credit
//! handling.

use chrono::{DateTime, Utc};
use questline_common::db::models::Quest;
use questline_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::warn;
use uuid::Uuid;

use crate::db::quests;

/// Resolve the active quest bound to an activity at `at`
///
/// Multiple syntactically-matching quests are not expected; when it
/// happens the first by `(created_at, id)` wins so resolution stays
/// deterministic instead of racing.
pub async fn resolve(
    db: &Pool<Sqlite>,
    course_id: Uuid,
    external_activity_id: &str,
    at: DateTime<Utc>,
) -> Result<Option<Quest>> {
    let candidates = quests::candidates_for_activity(db, course_id, external_activity_id).await?;

    let mut matching = candidates.into_iter().filter(|quest| quest.is_active_at(at));
    let resolved = matching.next();

    if resolved.is_some() && matching.next().is_some() {
        warn!(
            "Multiple active quests bound to activity {} in course {}; using first by creation order",
            external_activity_id, course_id
        );
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::upsert_course;
    use crate::db::quests::{create_quest, NewQuest};
    use chrono::Duration;
    use questline_common::db::{connect_memory, run_migrations};

    async fn fixture() -> (Pool<Sqlite>, Uuid) {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "ext-c", "Course").await.unwrap();
        (pool, course_id)
    }

    #[tokio::test]
    async fn test_resolves_bound_quest() {
        let (pool, course_id) = fixture().await;
        let quest = create_quest(&pool, NewQuest::bound(course_id, "act-1", "Quest", 50))
            .await
            .unwrap();

        let resolved = resolve(&pool, course_id, "act-1", Utc::now()).await.unwrap();
        assert_eq!(resolved.map(|q| q.id), Some(quest.id));
    }

    #[tokio::test]
    async fn test_no_quest_for_unbound_activity() {
        let (pool, course_id) = fixture().await;
        create_quest(&pool, NewQuest::bound(course_id, "act-1", "Quest", 50))
            .await
            .unwrap();

        let resolved = resolve(&pool, course_id, "act-2", Utc::now()).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_window_and_active_flag_filter() {
        let (pool, course_id) = fixture().await;

        let mut expired = NewQuest::bound(course_id, "act-1", "Expired", 50);
        expired.ends_at = Some(Utc::now() - Duration::days(1));
        create_quest(&pool, expired).await.unwrap();

        let mut inactive = NewQuest::bound(course_id, "act-1", "Inactive", 50);
        inactive.active = false;
        create_quest(&pool, inactive).await.unwrap();

        let resolved = resolve(&pool, course_id, "act-1", Utc::now()).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_first_by_creation_order_wins() {
        let (pool, course_id) = fixture().await;
        let first = create_quest(&pool, NewQuest::bound(course_id, "act-1", "First", 10))
            .await
            .unwrap();
        create_quest(&pool, NewQuest::bound(course_id, "act-1", "Second", 20))
            .await
            .unwrap();

        let resolved = resolve(&pool, course_id, "act-1", Utc::now()).await.unwrap();
        assert_eq!(resolved.map(|q| q.id), Some(first.id));
    }
}
