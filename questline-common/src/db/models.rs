//! Domain models for the quest engagement pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quest lifecycle status as seen by course staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    NotStarted,
    Started,
    Completed,
    NeedsRevision,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::NotStarted => "not_started",
            QuestStatus::Started => "started",
            QuestStatus::Completed => "completed",
            QuestStatus::NeedsRevision => "needs_revision",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(QuestStatus::NotStarted),
            "started" => Some(QuestStatus::Started),
            "completed" => Some(QuestStatus::Completed),
            "needs_revision" => Some(QuestStatus::NeedsRevision),
            _ => None,
        }
    }
}

/// Engagement stage, monotonically advancing per progress record
///
/// Ordering is load-bearing: a transition is applied only when the new
/// stage is strictly later than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStage {
    NotStarted,
    Started,
    InProgress,
    Completed,
}

impl EngagementStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStage::NotStarted => "not_started",
            EngagementStage::Started => "started",
            EngagementStage::InProgress => "in_progress",
            EngagementStage::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(EngagementStage::NotStarted),
            "started" => Some(EngagementStage::Started),
            "in_progress" => Some(EngagementStage::InProgress),
            "completed" => Some(EngagementStage::Completed),
            _ => None,
        }
    }
}

/// Whether quest completion is accepted as-is or needs staff review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Auto,
    Manual,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Auto => "auto",
            ValidationMode::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(ValidationMode::Auto),
            "manual" => Some(ValidationMode::Manual),
            _ => None,
        }
    }
}

/// A rewardable unit of coursework, optionally bound to one LMS activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: Uuid,
    pub course_id: Uuid,
    pub external_activity_id: Option<String>,
    pub title: String,
    pub description: String,
    pub xp_reward: i64,
    pub validation_mode: ValidationMode,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Quest {
    /// Whether the quest accepts events at `instant`
    ///
    /// Active window bounds are inclusive; an absent bound is unbounded
    /// on that side.
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if let Some(starts_at) = self.starts_at {
            if instant < starts_at {
                return false;
            }
        }
        if let Some(ends_at) = self.ends_at {
            if instant > ends_at {
                return false;
            }
        }
        true
    }
}

/// The unique (user, quest) engagement state record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quest_id: Uuid,
    pub status: QuestStatus,
    pub stage: EngagementStage,
    pub progress_percent: i64,
    pub interaction_count: i64,
    pub engagement_score: i64,
    pub first_interaction_at: Option<DateTime<Utc>>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validation_notes: Option<String>,
}

impl QuestProgress {
    /// Fresh record for the first event a (user, quest) pair sees
    pub fn new(user_id: Uuid, quest_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            quest_id,
            status: QuestStatus::NotStarted,
            stage: EngagementStage::NotStarted,
            progress_percent: 0,
            interaction_count: 0,
            engagement_score: 0,
            first_interaction_at: None,
            last_interaction_at: None,
            started_at: None,
            completed_at: None,
            validated_at: None,
            validation_notes: None,
        }
    }
}

/// Append-only engagement log row, one per processed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub id: Uuid,
    pub progress_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Zero when the dedup rules matched
    pub points_awarded: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only experience-point grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XpEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Option<Uuid>,
    pub amount: i64,
    pub source_type: String,
    pub source_id: String,
    pub note: String,
    pub awarded_at: DateTime<Utc>,
}

/// Per (user, course) roll-up maintained by the ledger step
///
/// The ledger is authoritative; this is a materialized cache that can be
/// rebuilt by summation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub total_xp: i64,
    pub quests_completed: i64,
    pub badges_earned: i64,
    pub study_hours: f64,
    pub streak_days: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// A badge granted by the external badge evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeAward {
    pub badge_id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub awarded_at: DateTime<Utc>,
}
