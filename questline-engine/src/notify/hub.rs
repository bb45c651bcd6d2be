//! Per-user notification fanout registry
//!
//! Maps user id to the set of live subscriber channels for that user
//! (one user can hold several sessions). Messages for users with no
//! live channel are dropped on the floor — this is best-effort UI
//! feedback, not a message queue.

use questline_common::events::Notification;
use questline_common::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

type Registry = HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<Notification>>>;

/// Handle owned by one draining consumer
pub struct Subscriber {
    pub user_id: Uuid,
    pub id: Uuid,
    pub rx: mpsc::UnboundedReceiver<Notification>,
}

/// Process-wide fanout registry
///
/// Registry operations take a plain RwLock (never held across await)
/// so unsubscription can also run from synchronous drop guards.
pub struct NotificationHub {
    channels: RwLock<Registry>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    /// Register a new channel for the user
    ///
    /// The `connected` notification is enqueued before the handle is
    /// returned, so it is always the first message a consumer drains.
    pub fn subscribe(&self, user_id: Uuid) -> Subscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        // Queued before the channel is discoverable by publishers
        let _ = tx.send(Notification::connected(user_id));

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.entry(user_id).or_default().insert(id, tx);
        let live = channels.get(&user_id).map(|c| c.len()).unwrap_or(0);
        debug!("User {} subscribed (channel {}, {} live)", user_id, id, live);

        Subscriber { user_id, id, rx }
    }

    /// Remove exactly one channel; the user's registry entry goes with
    /// its last channel
    pub fn unsubscribe(&self, user_id: Uuid, subscriber_id: Uuid) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(user_channels) = channels.get_mut(&user_id) {
            user_channels.remove(&subscriber_id);
            if user_channels.is_empty() {
                channels.remove(&user_id);
            }
        }
        debug!("User {} unsubscribed channel {}", user_id, subscriber_id);
    }

    /// Deliver to every live channel of the notification's target user
    ///
    /// Channels that refuse the message (consumer gone) are pruned
    /// individually; the rest still receive it. Zero live channels is a
    /// successful no-op delivery.
    pub fn publish(&self, notification: &Notification) -> Result<usize> {
        let mut failed: Vec<Uuid> = Vec::new();
        let mut delivered = 0usize;

        {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            let Some(user_channels) = channels.get(&notification.user_id) else {
                return Ok(0);
            };
            for (id, tx) in user_channels {
                if tx.send(notification.clone()).is_ok() {
                    delivered += 1;
                } else {
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            self.unsubscribe(notification.user_id, id);
        }

        Ok(delivered)
    }

    /// Publish a per-user-retargeted copy of a template to each user
    pub fn publish_broadcast(&self, template: &Notification, user_ids: &[Uuid]) -> Result<usize> {
        let mut delivered = 0usize;
        for user_id in user_ids {
            delivered += self.publish(&template.retarget(*user_id))?;
        }
        Ok(delivered)
    }

    /// Live channel count for a user
    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Drop every channel (server shutdown); consumers observe their
    /// streams ending
    pub fn shutdown(&self) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let users = channels.len();
        channels.clear();
        info!("Notification hub shut down ({} users disconnected)", users);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
