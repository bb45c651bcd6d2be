//! Experience-point ledger
//!
//! The only writer of the experience_points table and its
//! student_progress aggregate. Grants are appended with
//! duplicate-prevention so redelivered webhooks cannot farm XP;
//! the aggregate is a cache the ledger keeps in step.

use chrono::Utc;
use futures::future::BoxFuture;
use questline_common::config::EngineTuning;
use questline_common::db::models::XpEntry;
use questline_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::ledger as db;

/// Duplicate-prevention applied to a credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Always insert; the caller guarantees single delivery (quest
    /// completions are guarded by the terminal stage, grade bonuses are
    /// explicitly re-awardable)
    None,
    /// At most one grant per (user, course, source_type, source_id)
    OneTime,
    /// Re-award only after the rolling view window elapses
    RollingWindow,
}

/// Result of a credit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Granted { amount: i64, new_total: i64 },
    Duplicate,
}

/// One credit request
#[derive(Debug, Clone)]
pub struct CreditRequest {
    pub user_id: Uuid,
    pub course_id: Option<Uuid>,
    pub amount: i64,
    pub source_type: String,
    pub source_id: String,
    pub note: String,
    pub policy: DedupPolicy,
    /// Bumps the quests-completed counter on the aggregate
    pub quest_completed: bool,
}

/// Secondary XP sink (periodic-quest system, external collaborator)
///
/// Forwarding failures are logged and never roll back the primary grant.
pub trait XpForwarder: Send + Sync {
    fn forward(&self, user_id: Uuid, amount: i64) -> BoxFuture<'_, Result<()>>;
}

/// Default forwarder: nothing listens, forwarding trivially succeeds
pub struct NullXpForwarder;

impl XpForwarder for NullXpForwarder {
    fn forward(&self, user_id: Uuid, amount: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!("No periodic-quest sink configured; dropping forward of {} XP for {}", amount, user_id);
            Ok(())
        })
    }
}

/// Append-only XP ledger with duplicate prevention
#[derive(Clone)]
pub struct ExperienceLedger {
    db: Pool<Sqlite>,
    tuning: EngineTuning,
    forwarder: Arc<dyn XpForwarder>,
}

impl ExperienceLedger {
    pub fn new(db: Pool<Sqlite>, tuning: EngineTuning, forwarder: Arc<dyn XpForwarder>) -> Self {
        Self { db, tuning, forwarder }
    }

    /// Credit XP, returning whether the grant landed or matched a
    /// previous one
    pub async fn credit(&self, request: CreditRequest) -> Result<CreditOutcome> {
        let mut conn = self.db.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = self.apply(&mut conn, &request).await;

        let outcome = match result {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                outcome
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    warn!("Rollback after failed credit also failed: {}", rollback);
                }
                return Err(e);
            }
        };
        drop(conn);

        if let CreditOutcome::Granted { amount, .. } = outcome {
            // Secondary counter is best-effort; a failure here must not
            // undo the grant that already committed
            if let Err(e) = self.forwarder.forward(request.user_id, amount).await {
                warn!("Periodic-quest XP forward failed for {}: {}", request.user_id, e);
            }
        }

        Ok(outcome)
    }

    async fn apply(
        &self,
        conn: &mut sqlx::SqliteConnection,
        request: &CreditRequest,
    ) -> Result<CreditOutcome> {
        if request.amount <= 0 {
            return Err(Error::InvalidInput(format!(
                "XP amount must be positive, got {}",
                request.amount
            )));
        }

        let now = Utc::now();

        let last_award = match request.policy {
            DedupPolicy::None => None,
            DedupPolicy::OneTime | DedupPolicy::RollingWindow => {
                db::last_award_at(
                    conn,
                    request.user_id,
                    request.course_id,
                    &request.source_type,
                    &request.source_id,
                )
                .await?
            }
        };

        if let Some(last) = last_award {
            let blocked = match request.policy {
                DedupPolicy::OneTime => true,
                DedupPolicy::RollingWindow => {
                    let window = chrono::Duration::from_std(self.tuning.view_reaward_window)
                        .map_err(|e| Error::Config(format!("re-award window out of range: {}", e)))?;
                    now - last < window
                }
                DedupPolicy::None => false,
            };
            if blocked {
                debug!(
                    "Duplicate XP grant blocked: user {} {}:{}",
                    request.user_id, request.source_type, request.source_id
                );
                return Ok(CreditOutcome::Duplicate);
            }
        }

        let entry = XpEntry {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            course_id: request.course_id,
            amount: request.amount,
            source_type: request.source_type.clone(),
            source_id: request.source_id.clone(),
            note: request.note.clone(),
            awarded_at: now,
        };
        db::insert_entry(conn, &entry).await?;

        let new_total = match request.course_id {
            Some(course_id) => {
                db::apply_to_aggregate(
                    conn,
                    request.user_id,
                    course_id,
                    request.amount,
                    request.quest_completed,
                    now,
                )
                .await?
            }
            // Global (course-less) activity has no per-course aggregate
            None => request.amount,
        };

        info!(
            "Granted {} XP to user {} ({}:{})",
            request.amount, request.user_id, request.source_type, request.source_id
        );

        Ok(CreditOutcome::Granted { amount: request.amount, new_total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::{upsert_course, upsert_user};
    use questline_common::db::{connect_memory, run_migrations};

    async fn fixture() -> (ExperienceLedger, Pool<Sqlite>, Uuid, Uuid) {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "c", "Course").await.unwrap();
        let user_id = upsert_user(&pool, "u", "Learner").await.unwrap();
        let ledger = ExperienceLedger::new(
            pool.clone(),
            EngineTuning::default(),
            Arc::new(NullXpForwarder),
        );
        (ledger, pool, user_id, course_id)
    }

    fn request(user_id: Uuid, course_id: Uuid, policy: DedupPolicy) -> CreditRequest {
        CreditRequest {
            user_id,
            course_id: Some(course_id),
            amount: 10,
            source_type: "forum_post".to_string(),
            source_id: "post-1".to_string(),
            note: String::new(),
            policy,
            quest_completed: false,
        }
    }

    #[tokio::test]
    async fn test_one_time_dedup() {
        let (ledger, pool, user_id, course_id) = fixture().await;

        let first = ledger.credit(request(user_id, course_id, DedupPolicy::OneTime)).await.unwrap();
        assert_eq!(first, CreditOutcome::Granted { amount: 10, new_total: 10 });

        let second = ledger.credit(request(user_id, course_id, DedupPolicy::OneTime)).await.unwrap();
        assert_eq!(second, CreditOutcome::Duplicate);

        // Aggregate untouched by the duplicate
        assert_eq!(db::xp_total(&pool, user_id, course_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_rolling_window_blocks_inside_window() {
        let (ledger, _pool, user_id, course_id) = fixture().await;

        let mut view = request(user_id, course_id, DedupPolicy::RollingWindow);
        view.source_type = "lesson_view".to_string();

        let first = ledger.credit(view.clone()).await.unwrap();
        assert!(matches!(first, CreditOutcome::Granted { .. }));

        let second = ledger.credit(view).await.unwrap();
        assert_eq!(second, CreditOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_rolling_window_reawards_after_window() {
        let (ledger, pool, user_id, course_id) = fixture().await;

        let mut view = request(user_id, course_id, DedupPolicy::RollingWindow);
        view.source_type = "lesson_view".to_string();
        ledger.credit(view.clone()).await.unwrap();

        // Age the existing row past the window
        sqlx::query("UPDATE experience_points SET awarded_at = datetime('now', '-2 hours')")
            .execute(&pool)
            .await
            .unwrap();

        let again = ledger.credit(view).await.unwrap();
        assert!(matches!(again, CreditOutcome::Granted { .. }));
        assert_eq!(db::xp_total(&pool, user_id, course_id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_no_dedup_policy_always_inserts() {
        let (ledger, pool, user_id, course_id) = fixture().await;

        let mut bonus = request(user_id, course_id, DedupPolicy::None);
        bonus.source_type = "grade_bonus".to_string();

        ledger.credit(bonus.clone()).await.unwrap();
        let second = ledger.credit(bonus).await.unwrap();
        assert!(matches!(second, CreditOutcome::Granted { .. }));
        assert_eq!(db::xp_total(&pool, user_id, course_id).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_quest_completion_bumps_counter() {
        let (ledger, pool, user_id, course_id) = fixture().await;

        let mut completion = request(user_id, course_id, DedupPolicy::None);
        completion.source_type = "quest".to_string();
        completion.amount = 50;
        completion.quest_completed = true;
        ledger.credit(completion).await.unwrap();

        let completed: i64 =
            sqlx::query_scalar("SELECT quests_completed FROM student_progress WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn test_forwarder_failure_keeps_grant() {
        struct FailingForwarder;
        impl XpForwarder for FailingForwarder {
            fn forward(&self, _user_id: Uuid, _amount: i64) -> BoxFuture<'_, Result<()>> {
                Box::pin(async { Err(Error::Internal("sink offline".to_string())) })
            }
        }

        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let course_id = upsert_course(&pool, "c", "Course").await.unwrap();
        let user_id = upsert_user(&pool, "u", "Learner").await.unwrap();
        let ledger =
            ExperienceLedger::new(pool.clone(), EngineTuning::default(), Arc::new(FailingForwarder));

        let outcome = ledger.credit(request(user_id, course_id, DedupPolicy::OneTime)).await.unwrap();
        assert!(matches!(outcome, CreditOutcome::Granted { .. }));
        assert_eq!(db::xp_total(&pool, user_id, course_id).await.unwrap(), 10);
    }
}
