//! Notification types for the Questline fanout system
//!
//! Notifications are ephemeral: they exist only in transit between the
//! engine and currently-connected SSE clients, and are never persisted.
//! A user with no live channels simply misses the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification categories delivered over the per-user stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Experience points were granted
    XpReward,
    /// A quest reached its completed stage
    QuestCompletion,
    /// Idle keep-alive synthesized by the consumer side
    Heartbeat,
    /// First message on every new subscription
    Connected,
    /// Server-side problem surfaced to the client
    Error,
}

impl NotificationKind {
    /// Stable wire name, also used as the SSE event field
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::XpReward => "xp_reward",
            NotificationKind::QuestCompletion => "quest_completion",
            NotificationKind::Heartbeat => "heartbeat",
            NotificationKind::Connected => "connected",
            NotificationKind::Error => "error",
        }
    }
}

/// A transient message addressed to one user's live sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    /// XP granted by the triggering event (reward notifications only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_amount: Option<i64>,
    /// User's total XP after the grant, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_total: Option<i64>,
    /// Arbitrary structured payload (quest id, badge list, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Derived identifier, unique enough for client-side dedup
    pub fn id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.kind.as_str(),
            self.user_id,
            self.timestamp.timestamp_millis()
        )
    }

    /// Re-address a template notification to another user
    pub fn retarget(&self, user_id: Uuid) -> Self {
        Self { user_id, ..self.clone() }
    }

    pub fn connected(user_id: Uuid) -> Self {
        Self {
            kind: NotificationKind::Connected,
            user_id,
            title: "Connected".to_string(),
            message: "Notification stream established".to_string(),
            xp_amount: None,
            xp_total: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat(user_id: Uuid) -> Self {
        Self {
            kind: NotificationKind::Heartbeat,
            user_id,
            title: "Heartbeat".to_string(),
            message: String::new(),
            xp_amount: None,
            xp_total: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn xp_reward(
        user_id: Uuid,
        amount: i64,
        total: Option<i64>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: NotificationKind::XpReward,
            user_id,
            title: format!("+{} XP", amount),
            message: message.into(),
            xp_amount: Some(amount),
            xp_total: total,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn quest_completion(
        user_id: Uuid,
        quest_title: impl Into<String>,
        xp_reward: i64,
        data: serde_json::Value,
    ) -> Self {
        let quest_title = quest_title.into();
        Self {
            kind: NotificationKind::QuestCompletion,
            user_id,
            title: "Quest complete!".to_string(),
            message: format!("You completed \"{}\"", quest_title),
            xp_amount: Some(xp_reward),
            xp_total: None,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(NotificationKind::XpReward.as_str(), "xp_reward");
        assert_eq!(NotificationKind::QuestCompletion.as_str(), "quest_completion");
        assert_eq!(NotificationKind::Connected.as_str(), "connected");
    }

    #[test]
    fn test_serialized_shape() {
        let n = Notification::xp_reward(
            Uuid::new_v4(),
            50,
            Some(1250),
            "Assignment submitted",
            serde_json::json!({"source": "quest"}),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "xp_reward");
        assert_eq!(json["xp_amount"], 50);
        assert_eq!(json["xp_total"], 1250);
        assert_eq!(json["data"]["source"], "quest");
    }

    #[test]
    fn test_heartbeat_omits_xp_fields() {
        let n = Notification::heartbeat(Uuid::new_v4());
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("xp_amount").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_retarget_changes_only_user() {
        let template = Notification::connected(Uuid::new_v4());
        let other = Uuid::new_v4();
        let copy = template.retarget(other);
        assert_eq!(copy.user_id, other);
        assert_eq!(copy.kind, template.kind);
        assert_eq!(copy.timestamp, template.timestamp);
    }
}
