//! Webhook intake for LMS activity events

use axum::extract::{Path, State};
use axum::Json;
use questline_common::api::EventReceipt;
use questline_common::{Error, Result};
use tracing::debug;

use crate::AppState;

/// POST /api/v1/events/:event_type
///
/// The LMS reports activity here. Recognized events always acknowledge
/// with a receipt (200) even when nothing changed; unrecognized event
/// paths are 404 so misconfigured webhooks surface loudly; only genuine
/// processing failures return 500, and those are safe to redeliver
/// because every downstream step deduplicates.
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    payload: Option<Json<serde_json::Value>>,
) -> Result<Json<EventReceipt>> {
    let Json(payload) = payload
        .ok_or_else(|| Error::InvalidInput("Event payload must be a JSON object".to_string()))?;

    debug!("Inbound event {}: {}", event_type, payload);

    let receipt = state.router.process(&event_type, &payload).await?;
    Ok(Json(receipt))
}
