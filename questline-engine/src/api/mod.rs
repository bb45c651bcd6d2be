//! HTTP API handlers for questline-engine

pub mod analytics;
pub mod health;
pub mod sse;
pub mod webhook;

pub use analytics::{activity_report, engagement_tiers, quest_analytics};
pub use health::health_routes;
pub use sse::notification_stream;
pub use webhook::ingest_event;
