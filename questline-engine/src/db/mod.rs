//! Database access layer for questline-engine
//!
//! Thin query modules over the shared schema. The engagement pipeline's
//! writes go through transaction-scoped functions here; no other
//! component touches quest_progress or experience_points directly.

use questline_common::{Error, Result};
use uuid::Uuid;

pub mod analytics;
pub mod entities;
pub mod ledger;
pub mod progress;
pub mod quests;

/// Parse a stored id column back into a Uuid
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("invalid uuid in database: {}", e)))
}
