//! Per-user notification stream (Server-Sent Events)
//!
//! Each connected client session holds one hub channel. The consumer
//! loop drains that channel and synthesizes a heartbeat whenever the
//! idle interval elapses, keeping the transport-level connection alive
//! through proxies. Unsubscription is guaranteed exactly once by a drop
//! guard that also runs when the client vanishes mid-stream.

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use questline_common::events::Notification;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::notify::NotificationHub;
use crate::AppState;

/// Unsubscribes its channel when dropped — on clean return, on client
/// disconnect, and on server shutdown alike
struct UnsubscribeGuard {
    hub: Arc<NotificationHub>,
    user_id: Uuid,
    subscriber_id: Uuid,
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.user_id, self.subscriber_id);
        debug!("SSE stream for user {} closed", self.user_id);
    }
}

/// GET /api/v1/notifications/:user_id/stream
pub async fn notification_stream(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    debug!("New SSE client for user {}", user_id);

    let mut subscriber = state.hub.subscribe(user_id);
    let guard = UnsubscribeGuard {
        hub: state.hub.clone(),
        user_id,
        subscriber_id: subscriber.id,
    };
    let heartbeat_interval = state.tuning.heartbeat_interval;

    let stream = async_stream::stream! {
        // Owned by the generator: dropping the stream runs the guard
        let _guard = guard;

        loop {
            match tokio::time::timeout(heartbeat_interval, subscriber.rx.recv()).await {
                Ok(Some(notification)) => {
                    if let Some(event) = to_sse_event(&notification) {
                        yield Ok(event);
                    }
                }
                // Channel closed: hub pruned us or is shutting down
                Ok(None) => break,
                // Idle: keep the connection alive
                Err(_) => {
                    if let Some(event) = to_sse_event(&Notification::heartbeat(user_id)) {
                        yield Ok(event);
                    }
                }
            }
        }
    };

    Sse::new(stream)
}

/// Notification → SSE frame: kind as the event name, derived id for
/// client-side reconnect dedup, JSON body as data
fn to_sse_event(notification: &Notification) -> Option<Event> {
    match Event::default()
        .event(notification.kind.as_str())
        .id(notification.id())
        .json_data(notification)
    {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to serialize notification: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_common::events::NotificationKind;

    #[test]
    fn test_sse_event_conversion() {
        let notification = Notification::connected(Uuid::new_v4());
        assert!(to_sse_event(&notification).is_some());
        assert_eq!(notification.kind, NotificationKind::Connected);
    }
}
