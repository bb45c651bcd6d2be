//! Event router
//!
//! Public entry point for inbound LMS activity events: validates the
//! event type against the catalog, extracts the (course, activity,
//! user) triad with per-type key fallbacks, resolves the quest, and
//! dispatches to the engagement state machine or the generic-credit
//! path. Every recognized event is acknowledged with a receipt — the
//! webhook source must never mistake a no-op for a failure.

use chrono::Utc;
use questline_common::api::{EventReceipt, ReceiptStatus};
use questline_common::config::EngineTuning;
use questline_common::db::models::Quest;
use questline_common::events::Notification;
use questline_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::badges::BadgeEvaluator;
use super::catalog::{self, EventSpec};
use super::engagement::{self, EngagementOutcome};
use super::ledger::{CreditOutcome, CreditRequest, DedupPolicy, ExperienceLedger};
use super::resolver;
use crate::db::entities;
use crate::notify::{spawn_publish, NotificationHub};

pub struct EventRouter {
    db: Pool<Sqlite>,
    tuning: EngineTuning,
    ledger: ExperienceLedger,
    badges: Arc<dyn BadgeEvaluator>,
    hub: Arc<NotificationHub>,
}

impl EventRouter {
    pub fn new(
        db: Pool<Sqlite>,
        tuning: EngineTuning,
        ledger: ExperienceLedger,
        badges: Arc<dyn BadgeEvaluator>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self { db, tuning, ledger, badges, hub }
    }

    /// Process one inbound event and produce its acknowledgment
    ///
    /// Only unrecognized event types and genuine persistence failures
    /// surface as errors; missing fields and unknown entities ack as
    /// no-ops because the LMS may be ahead of local sync.
    pub async fn process(&self, event_type: &str, payload: &serde_json::Value) -> Result<EventReceipt> {
        let spec = catalog::lookup(event_type)
            .ok_or_else(|| Error::NotFound(format!("Unrecognized event type: {}", event_type)))?;

        let Some(external_course_id) = string_field(payload, &["course_id"]) else {
            warn!("Event {} missing course id; not processed", event_type);
            return Ok(ignored(spec, "Missing course identifier"));
        };
        let Some(external_user_id) = string_field(payload, &["user_id"]) else {
            warn!("Event {} missing user id; not processed", event_type);
            return Ok(ignored(spec, "Missing user identifier"));
        };
        let Some(external_activity_id) = string_field(payload, spec.activity_keys) else {
            warn!(
                "Event {} missing activity id (tried {:?}); not processed",
                event_type, spec.activity_keys
            );
            return Ok(ignored(spec, "Missing activity identifier"));
        };

        let Some(course_id) = entities::find_course_by_external(&self.db, &external_course_id).await?
        else {
            info!("Course {} not synchronized yet; event {} skipped", external_course_id, event_type);
            return Ok(ignored(spec, "Course not known locally"));
        };
        let Some(user_id) = entities::find_user_by_external(&self.db, &external_user_id).await? else {
            info!("User {} not synchronized yet; event {} skipped", external_user_id, event_type);
            return Ok(ignored(spec, "User not known locally"));
        };

        match resolver::resolve(&self.db, course_id, &external_activity_id, Utc::now()).await? {
            Some(quest) => self.process_quest_event(spec, &quest, user_id, course_id, payload).await,
            None => {
                self.process_generic_event(spec, user_id, course_id, &external_activity_id)
                    .await
            }
        }
    }

    async fn process_quest_event(
        &self,
        spec: &EventSpec,
        quest: &Quest,
        user_id: Uuid,
        course_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<EventReceipt> {
        let outcome =
            engagement::process_event(&self.db, &self.tuning, quest, user_id, spec, payload).await?;

        if outcome.completed_now {
            self.reward_completion(quest, user_id, course_id, &outcome).await?;
            let message = if outcome.needs_revision {
                format!("Quest \"{}\" completed; grade below threshold, needs revision", quest.title)
            } else {
                format!("Quest \"{}\" completed", quest.title)
            };
            return Ok(EventReceipt::new(ReceiptStatus::Processed, spec.event_type, message));
        }

        if let Some(bonus) = outcome.bonus_xp {
            // Re-grade reached excellence on an already-completed quest
            self.grant_bonus(quest, user_id, course_id, bonus).await?;
        }

        if outcome.deduplicated {
            return Ok(EventReceipt::new(
                ReceiptStatus::Duplicate,
                spec.event_type,
                "Duplicate event; logged without points",
            ));
        }

        Ok(EventReceipt::new(
            ReceiptStatus::Processed,
            spec.event_type,
            format!("Quest progress updated ({}%)", outcome.progress.progress_percent),
        ))
    }

    /// Completion side effects: ledger, badges, notifications — in that
    /// order, so the completion notification can carry fresh badges
    async fn reward_completion(
        &self,
        quest: &Quest,
        user_id: Uuid,
        course_id: Uuid,
        outcome: &EngagementOutcome,
    ) -> Result<()> {
        // Single award per progress record: the terminal stage guards
        // redelivery, so no ledger-side dedup is needed
        let credited = self
            .ledger
            .credit(CreditRequest {
                user_id,
                course_id: Some(course_id),
                amount: quest.xp_reward,
                source_type: "quest".to_string(),
                source_id: quest.id.to_string(),
                note: format!("Completed quest: {}", quest.title),
                policy: DedupPolicy::None,
                quest_completed: true,
            })
            .await?;

        if let Some(bonus) = outcome.bonus_xp {
            self.grant_bonus(quest, user_id, course_id, bonus).await?;
        }

        let badges = match self.badges.evaluate_and_award(user_id).await {
            Ok(badges) => badges,
            Err(e) => {
                // The XP grant already committed; a badge outage cannot
                // be allowed to fail the event
                warn!("Badge evaluation failed for user {}: {}", user_id, e);
                Vec::new()
            }
        };

        let new_total = match credited {
            CreditOutcome::Granted { new_total, .. } => Some(new_total),
            CreditOutcome::Duplicate => None,
        };

        if !outcome.needs_revision {
            spawn_publish(
                self.hub.clone(),
                &self.tuning,
                Notification::quest_completion(
                    user_id,
                    quest.title.clone(),
                    quest.xp_reward,
                    serde_json::json!({
                        "quest_id": quest.id,
                        "course_id": course_id,
                        "badges": badges,
                    }),
                ),
            );
        }

        spawn_publish(
            self.hub.clone(),
            &self.tuning,
            Notification::xp_reward(
                user_id,
                quest.xp_reward,
                new_total,
                format!("Quest reward: {}", quest.title),
                serde_json::json!({"source": "quest", "quest_id": quest.id}),
            ),
        );

        Ok(())
    }

    /// Excellence bonus, explicitly exempt from duplicate prevention
    async fn grant_bonus(
        &self,
        quest: &Quest,
        user_id: Uuid,
        course_id: Uuid,
        bonus: i64,
    ) -> Result<()> {
        let credited = self
            .ledger
            .credit(CreditRequest {
                user_id,
                course_id: Some(course_id),
                amount: bonus,
                source_type: "grade_bonus".to_string(),
                source_id: quest.id.to_string(),
                note: format!("Excellence bonus: {}", quest.title),
                policy: DedupPolicy::None,
                quest_completed: false,
            })
            .await?;

        if let CreditOutcome::Granted { new_total, .. } = credited {
            spawn_publish(
                self.hub.clone(),
                &self.tuning,
                Notification::xp_reward(
                    user_id,
                    bonus,
                    Some(new_total),
                    format!("Excellence bonus: {}", quest.title),
                    serde_json::json!({"source": "grade_bonus", "quest_id": quest.id}),
                ),
            );
        }

        Ok(())
    }

    /// No quest bound to the activity: generic engagement credit
    async fn process_generic_event(
        &self,
        spec: &EventSpec,
        user_id: Uuid,
        course_id: Uuid,
        external_activity_id: &str,
    ) -> Result<EventReceipt> {
        if spec.points <= 0 {
            return Ok(ignored(spec, "No XP value for this event type"));
        }

        let policy = if spec.is_view { DedupPolicy::RollingWindow } else { DedupPolicy::OneTime };

        let credited = self
            .ledger
            .credit(CreditRequest {
                user_id,
                course_id: Some(course_id),
                amount: spec.points,
                source_type: spec.source_type.to_string(),
                source_id: external_activity_id.to_string(),
                note: format!("{} on activity {}", spec.event_type, external_activity_id),
                policy,
                quest_completed: false,
            })
            .await?;

        match credited {
            CreditOutcome::Granted { amount, new_total } => {
                spawn_publish(
                    self.hub.clone(),
                    &self.tuning,
                    Notification::xp_reward(
                        user_id,
                        amount,
                        Some(new_total),
                        engagement_message(spec),
                        serde_json::json!({
                            "source": spec.source_type,
                            "activity_id": external_activity_id,
                        }),
                    ),
                );
                Ok(EventReceipt::new(
                    ReceiptStatus::Processed,
                    spec.event_type,
                    format!("Granted {} engagement XP", amount),
                ))
            }
            CreditOutcome::Duplicate => Ok(EventReceipt::new(
                ReceiptStatus::Duplicate,
                spec.event_type,
                "Already credited for this activity",
            )),
        }
    }
}

fn ignored(spec: &EventSpec, message: &str) -> EventReceipt {
    EventReceipt::new(ReceiptStatus::Ignored, spec.event_type, message)
}

fn engagement_message(spec: &EventSpec) -> String {
    match spec.source_type {
        "forum_post" => "Forum contribution".to_string(),
        "lesson_view" => "Lesson activity".to_string(),
        _ => "Course engagement".to_string(),
    }
}

/// Pull a string identifier out of the payload, trying keys in order
///
/// LMS webhooks are inconsistent about numeric vs string ids, so both
/// are accepted.
fn string_field(payload: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match payload.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}
