//! Static event catalog
//!
//! Data-driven dispatch table for recognized LMS activity events. Each
//! entry carries everything the router and state machine need to know
//! about an event type: point value, stage tier, activity kind, the
//! ledger source label for generic credit, and the payload key fallback
//! chain for extracting the external activity id.
//!
//! Keeping this as pure data keeps the point/stage/milestone tables
//! testable in isolation from the dispatch mechanism.

use once_cell::sync::Lazy;
use questline_common::db::models::EngagementStage;
use std::collections::HashMap;

/// Stage tier an event classifies into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTier {
    /// First-touch events: views, attempt starts
    Start,
    /// Ongoing-work events: posts, edits, answers
    Progress,
    /// Terminal events: submissions, grading, completions
    Completion,
}

impl StageTier {
    /// Target stage this tier drives the state machine toward
    pub fn target_stage(&self) -> EngagementStage {
        match self {
            StageTier::Start => EngagementStage::Started,
            StageTier::Progress => EngagementStage::InProgress,
            StageTier::Completion => EngagementStage::Completed,
        }
    }
}

/// Activity kind inferred from the event-type name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Assignment,
    Quiz,
    Lesson,
    Forum,
    Resource,
    Feedback,
    Choice,
    Wiki,
    Chat,
    Glossary,
}

/// One recognized event type
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub event_type: &'static str,
    /// Fixed point value added to the engagement score (and granted as
    /// generic XP when no quest matches)
    pub points: i64,
    /// Stage classification; `None` means the event is logged but never
    /// applied to the stage machine
    pub tier: Option<StageTier>,
    pub kind: ActivityKind,
    /// Ledger source-type label for the generic-XP path
    pub source_type: &'static str,
    /// Payload keys tried in order for the external activity id
    pub activity_keys: &'static [&'static str],
    /// View-type events re-award on a rolling window instead of a hard
    /// one-time block
    pub is_view: bool,
    /// Grading events carry grade/max_grade and trigger the validation
    /// refinement
    pub is_grading: bool,
}

/// The full recognized-event table
///
/// Point values are product constants: view=3, forum post=10, forum
/// discussion=15, glossary=20, wiki=25, chat=5, submissions=50,
/// grading and generic completion=25.
static EVENT_TABLE: &[EventSpec] = &[
    // Start tier
    EventSpec {
        event_type: "activity_viewed",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Resource,
        source_type: "activity_view",
        activity_keys: &["activity_id"],
        is_view: true,
        is_grading: false,
    },
    EventSpec {
        event_type: "quiz_viewed",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Quiz,
        source_type: "activity_view",
        activity_keys: &["quiz_id", "activity_id"],
        is_view: true,
        is_grading: false,
    },
    EventSpec {
        event_type: "quiz_attempt_started",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Quiz,
        source_type: "quiz_attempt",
        activity_keys: &["quiz_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "assignment_viewed",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Assignment,
        source_type: "activity_view",
        activity_keys: &["assignment_id", "activity_id"],
        is_view: true,
        is_grading: false,
    },
    EventSpec {
        event_type: "lesson_viewed",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Lesson,
        source_type: "lesson_view",
        activity_keys: &["lesson_id", "activity_id"],
        is_view: true,
        is_grading: false,
    },
    EventSpec {
        event_type: "forum_viewed",
        points: 3,
        tier: Some(StageTier::Start),
        kind: ActivityKind::Forum,
        source_type: "activity_view",
        activity_keys: &["forum_id", "activity_id"],
        is_view: true,
        is_grading: false,
    },
    // Progress tier
    EventSpec {
        event_type: "forum_post_created",
        points: 10,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Forum,
        source_type: "forum_post",
        activity_keys: &["forum_id", "discussion_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "forum_discussion_created",
        points: 15,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Forum,
        source_type: "forum_discussion",
        activity_keys: &["forum_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "glossary_entry_created",
        points: 20,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Glossary,
        source_type: "glossary_entry",
        activity_keys: &["glossary_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "wiki_page_updated",
        points: 25,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Wiki,
        source_type: "wiki_edit",
        activity_keys: &["wiki_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "chat_message_sent",
        points: 5,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Chat,
        source_type: "chat_message",
        activity_keys: &["chat_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "choice_answer_submitted",
        points: 10,
        tier: Some(StageTier::Progress),
        kind: ActivityKind::Choice,
        source_type: "choice_answer",
        activity_keys: &["choice_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    // Course-level view: recognized and credited, but carries no stage
    // classification (a course is not one activity)
    EventSpec {
        event_type: "course_viewed",
        points: 3,
        tier: None,
        kind: ActivityKind::Resource,
        source_type: "course_view",
        activity_keys: &["course_id"],
        is_view: true,
        is_grading: false,
    },
    // Completion tier
    EventSpec {
        event_type: "quiz_submitted",
        points: 50,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Quiz,
        source_type: "quiz_submission",
        activity_keys: &["quiz_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "assignment_submitted",
        points: 50,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Assignment,
        source_type: "assignment_submission",
        activity_keys: &["assignment_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "lesson_completed",
        points: 50,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Lesson,
        source_type: "lesson_completion",
        activity_keys: &["lesson_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "feedback_submitted",
        points: 50,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Feedback,
        source_type: "feedback_submission",
        activity_keys: &["feedback_id", "activity_id"],
        is_view: false,
        is_grading: false,
    },
    EventSpec {
        event_type: "assign_graded",
        points: 25,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Assignment,
        source_type: "grade",
        activity_keys: &["assignment_id", "activity_id"],
        is_view: false,
        is_grading: true,
    },
    EventSpec {
        event_type: "quiz_graded",
        points: 25,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Quiz,
        source_type: "grade",
        activity_keys: &["quiz_id", "activity_id"],
        is_view: false,
        is_grading: true,
    },
    EventSpec {
        event_type: "activity_completed",
        points: 25,
        tier: Some(StageTier::Completion),
        kind: ActivityKind::Resource,
        source_type: "activity_completion",
        activity_keys: &["activity_id"],
        is_view: false,
        is_grading: false,
    },
];

static EVENT_INDEX: Lazy<HashMap<&'static str, &'static EventSpec>> =
    Lazy::new(|| EVENT_TABLE.iter().map(|spec| (spec.event_type, spec)).collect());

/// Look up the spec for an event type; `None` means unrecognized
pub fn lookup(event_type: &str) -> Option<&'static EventSpec> {
    EVENT_INDEX.get(event_type).copied()
}

/// All recognized event types (analytics, tests)
pub fn recognized_event_types() -> impl Iterator<Item = &'static str> {
    EVENT_TABLE.iter().map(|spec| spec.event_type)
}

/// Milestone table: guaranteed minimum progress percent per
/// (activity kind, event type)
///
/// Kinds without rows here (chat, glossary) fall back to the
/// engagement-score heuristic in the state machine.
static MILESTONES: &[(ActivityKind, &str, i64)] = &[
    (ActivityKind::Quiz, "quiz_viewed", 25),
    (ActivityKind::Quiz, "quiz_attempt_started", 50),
    (ActivityKind::Quiz, "quiz_submitted", 100),
    (ActivityKind::Quiz, "quiz_graded", 100),
    (ActivityKind::Assignment, "assignment_viewed", 25),
    (ActivityKind::Assignment, "assignment_submitted", 100),
    (ActivityKind::Assignment, "assign_graded", 100),
    (ActivityKind::Lesson, "lesson_viewed", 30),
    (ActivityKind::Lesson, "lesson_completed", 100),
    (ActivityKind::Forum, "forum_viewed", 20),
    (ActivityKind::Forum, "forum_post_created", 60),
    (ActivityKind::Forum, "forum_discussion_created", 80),
    (ActivityKind::Resource, "activity_viewed", 50),
    (ActivityKind::Resource, "activity_completed", 100),
    (ActivityKind::Feedback, "feedback_submitted", 100),
    (ActivityKind::Choice, "choice_answer_submitted", 100),
    (ActivityKind::Wiki, "wiki_page_updated", 70),
];

/// Whether the milestone table covers `kind` at all
pub fn kind_has_milestones(kind: ActivityKind) -> bool {
    MILESTONES.iter().any(|(k, _, _)| *k == kind)
}

/// Milestone percent for a (kind, event type) pair
pub fn milestone_percent(kind: ActivityKind, event_type: &str) -> Option<i64> {
    MILESTONES
        .iter()
        .find(|(k, e, _)| *k == kind && *e == event_type)
        .map(|(_, _, pct)| *pct)
}
