//! Reliable-ish publication for high-value notifications
//!
//! Quest completions and XP rewards are worth a few retries; everything
//! runs inside a spawned task so the request that triggered the reward
//! never waits on delivery.

use questline_common::config::EngineTuning;
use questline_common::events::Notification;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::hub::NotificationHub;

/// Publish with up to `attempts` tries and exponential backoff
///
/// A user with zero live channels counts as delivered: the message is
/// intentionally dropped, not queued. Returns false only when every
/// attempt errored.
pub async fn publish_with_retry(
    hub: &NotificationHub,
    notification: &Notification,
    attempts: u32,
    initial_backoff: Duration,
) -> bool {
    let mut backoff = initial_backoff;

    for attempt in 1..=attempts.max(1) {
        match hub.publish(notification) {
            Ok(delivered) => {
                debug!(
                    "Published {} to {} channel(s) for user {}",
                    notification.kind.as_str(),
                    delivered,
                    notification.user_id
                );
                return true;
            }
            Err(e) => {
                warn!(
                    "Publish attempt {}/{} failed for user {}: {}",
                    attempt, attempts, notification.user_id, e
                );
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    warn!(
        "Giving up on {} notification for user {} after {} attempts",
        notification.kind.as_str(),
        notification.user_id,
        attempts
    );
    false
}

/// Fire-and-forget publish: schedule and return immediately
pub fn spawn_publish(hub: Arc<NotificationHub>, tuning: &EngineTuning, notification: Notification) {
    let attempts = tuning.publish_attempts;
    let backoff = tuning.publish_backoff;
    tokio::spawn(async move {
        publish_with_retry(&hub, &notification, attempts, backoff).await;
    });
}
