//! Engagement state machine
//!
//! Advances one (user, quest) progress record for one classified event.
//! All writes for an event happen in a single BEGIN IMMEDIATE
//! transaction, which is what serializes concurrent updates to the same
//! progress row — the monotonicity guarantees below only hold under
//! serialized updates.

use chrono::Utc;
use questline_common::config::EngineTuning;
use questline_common::db::models::{EngagementStage, Quest, QuestProgress, QuestStatus, ValidationMode};
use questline_common::{Error, Result};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, warn};
use uuid::Uuid;

use super::catalog::{self, EventSpec, StageTier};
use crate::db::progress;

/// What one event did to a progress record
#[derive(Debug, Clone)]
pub struct EngagementOutcome {
    pub progress: QuestProgress,
    /// Points credited to the engagement score (zero when deduplicated)
    pub points_awarded: i64,
    pub deduplicated: bool,
    /// Stage reached `completed` during this call; at most once per
    /// progress record since the stage never regresses
    pub completed_now: bool,
    /// Grading refinement demoted the status below the pass threshold
    pub needs_revision: bool,
    /// Excellence bonus XP the caller should credit, when earned
    pub bonus_xp: Option<i64>,
}

/// Process one classified event against the quest's progress record
pub async fn process_event(
    db: &Pool<Sqlite>,
    tuning: &EngineTuning,
    quest: &Quest,
    user_id: Uuid,
    spec: &EventSpec,
    payload: &serde_json::Value,
) -> Result<EngagementOutcome> {
    let mut conn = db.acquire().await?;

    // BEGIN IMMEDIATE takes the write lock up front so the
    // read-modify-write below cannot interleave with another event for
    // the same progress row.
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    match apply(&mut conn, tuning, quest, user_id, spec, payload).await {
        Ok(outcome) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!("Rollback after failed event processing also failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn apply(
    conn: &mut SqliteConnection,
    tuning: &EngineTuning,
    quest: &Quest,
    user_id: Uuid,
    spec: &EventSpec,
    payload: &serde_json::Value,
) -> Result<EngagementOutcome> {
    let now = Utc::now();
    let mut record = progress::get_or_create(conn, user_id, quest.id).await?;
    let stage_before = record.stage;
    let status_before = record.status;

    // Interaction timestamps are touched for every event, duplicates
    // included
    if record.first_interaction_at.is_none() {
        record.first_interaction_at = Some(now);
    }
    record.last_interaction_at = Some(now);

    let deduplicated = is_duplicate(conn, tuning, &record, spec).await?;

    // Events with no stage classification are logged for audit but earn
    // nothing here; their XP value only applies on the generic path
    let points_awarded = if deduplicated || spec.tier.is_none() { 0 } else { spec.points };

    if points_awarded > 0 {
        record.engagement_score += points_awarded;
        record.interaction_count += 1;
    } else if deduplicated {
        debug!(
            "Duplicate {} for progress {}; logging with zero points",
            spec.event_type, record.id
        );
    }

    // Monotonic stage transition: only strictly-later stages apply
    if let Some(tier) = spec.tier {
        let target = tier.target_stage();
        if target > record.stage {
            record.stage = target;

            if target >= EngagementStage::Started && record.started_at.is_none() {
                record.started_at = Some(now);
                if record.status == QuestStatus::NotStarted {
                    record.status = QuestStatus::Started;
                }
            }

            if target == EngagementStage::Completed {
                record.status = QuestStatus::Completed;
                record.completed_at = Some(now);
                if quest.validation_mode == ValidationMode::Auto && !spec.is_grading {
                    record.validated_at = Some(now);
                }
            }
        }
    }

    let mut needs_revision = false;
    let mut bonus_xp = None;
    if spec.is_grading {
        match grade_percent(payload) {
            Some(percent) if percent >= tuning.grade_pass_threshold => {
                record.status = QuestStatus::Completed;
                record.validated_at = Some(now);
                if percent >= tuning.grade_excellence_threshold {
                    let bonus = (quest.xp_reward as f64 * tuning.excellence_bonus_ratio).round() as i64;
                    if bonus > 0 {
                        bonus_xp = Some(bonus);
                    }
                }
            }
            Some(percent) => {
                // Below the pass threshold: back to the learner, but the
                // engagement stage never regresses
                record.status = QuestStatus::NeedsRevision;
                record.validation_notes = Some(format!(
                    "Grade {:.1}% below required {:.0}%",
                    percent, tuning.grade_pass_threshold
                ));
                needs_revision = true;
            }
            None => {
                warn!(
                    "Grading event {} for quest {} carried no usable grade; skipping validation",
                    spec.event_type, quest.id
                );
            }
        }
    }

    apply_progress_percent(&mut record, spec);

    progress::insert_event(conn, record.id, spec.event_type, payload, points_awarded, now).await?;
    progress::update(conn, &record).await?;

    let completed_now =
        stage_before != EngagementStage::Completed && record.stage == EngagementStage::Completed;

    if status_before != record.status {
        debug!(
            "Progress {} status {} -> {}",
            record.id,
            status_before.as_str(),
            record.status.as_str()
        );
    }

    Ok(EngagementOutcome {
        progress: record,
        points_awarded,
        deduplicated,
        completed_now,
        needs_revision,
        bonus_xp,
    })
}

/// Duplicate detection
///
/// Start-tier events credit at most once per progress record; every
/// other event is a duplicate only when the same type was logged less
/// than the duplicate window ago.
async fn is_duplicate(
    conn: &mut SqliteConnection,
    tuning: &EngineTuning,
    record: &QuestProgress,
    spec: &EventSpec,
) -> Result<bool> {
    if spec.tier == Some(StageTier::Start) {
        return progress::has_event_of_type(conn, record.id, spec.event_type).await;
    }

    let window = chrono::Duration::from_std(tuning.duplicate_window)
        .map_err(|e| Error::Config(format!("duplicate window out of range: {}", e)))?;

    match progress::last_event_at(conn, record.id, spec.event_type).await? {
        Some(last) => Ok(Utc::now() - last < window),
        None => Ok(false),
    }
}

/// Progress-percent derivation
///
/// Completed forces 100. Otherwise the milestone table provides a
/// guaranteed minimum for covered activity kinds; kinds with no
/// milestone rows fall back to min(100, engagement_score). Both paths
/// feed a monotonic max so the stored percent never decreases.
fn apply_progress_percent(record: &mut QuestProgress, spec: &EventSpec) {
    if record.stage == EngagementStage::Completed {
        record.progress_percent = 100;
        return;
    }

    let candidate = if catalog::kind_has_milestones(spec.kind) {
        catalog::milestone_percent(spec.kind, spec.event_type)
    } else {
        Some(record.engagement_score.min(100))
    };

    if let Some(candidate) = candidate {
        record.progress_percent = record.progress_percent.max(candidate);
    }
}

/// Grade percentage from a grading payload
///
/// Accepts numbers or numeric strings under `grade` and
/// `max_grade`/`grade_max`; a missing or zero maximum means the grade
/// is unusable.
fn grade_percent(payload: &serde_json::Value) -> Option<f64> {
    let grade = number_field(payload, &["grade"])?;
    let max = number_field(payload, &["max_grade", "grade_max"])?;
    if max <= 0.0 {
        return None;
    }
    Some(grade / max * 100.0)
}

fn number_field(payload: &serde_json::Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match payload.get(key) {
            Some(serde_json::Value::Number(n)) => return n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                if let Ok(parsed) = s.parse::<f64>() {
                    return Some(parsed);
                }
            }
            _ => continue,
        }
    }
    None
}
