//! API types shared between the engine and its clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of processing one inbound LMS event
///
/// Missing fields and unknown entities are acknowledged (`Ignored`), not
/// errored: the LMS may be ahead of local sync and must not treat a
/// transient no-op as a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// State changed: progress advanced and/or XP granted
    Processed,
    /// Recognized but produced no state change
    Ignored,
    /// Dedup rules matched; logged with zero points
    Duplicate,
}

/// Structured acknowledgment returned for every recognized event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReceipt {
    pub status: ReceiptStatus,
    pub event_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EventReceipt {
    pub fn new(status: ReceiptStatus, event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            event_type: event_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_serialization() {
        let receipt = EventReceipt::new(ReceiptStatus::Processed, "quiz_submitted", "Quest advanced");
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["status"], "processed");
        assert_eq!(json["event_type"], "quiz_submitted");
    }
}
