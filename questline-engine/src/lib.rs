//! questline-engine library — gamification engine for an external LMS
//!
//! Translates webhook activity events into quest progress, experience
//! points, and badge triggers, and fans resulting notifications out to
//! live client sessions over SSE.

use axum::routing::{get, post};
use axum::Router;
use questline_common::config::EngineTuning;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod engine;
pub mod notify;

use engine::{BadgeEvaluator, EventRouter, ExperienceLedger, NullBadgeEvaluator, NullXpForwarder};
use notify::NotificationHub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Engine tuning constants
    pub tuning: EngineTuning,
    /// Live subscriber registry
    pub hub: Arc<NotificationHub>,
    /// Event processing pipeline
    pub router: Arc<EventRouter>,
}

impl AppState {
    /// State with the default (null) external collaborators
    pub fn new(db: SqlitePool, tuning: EngineTuning) -> Self {
        Self::with_badge_evaluator(db, tuning, Arc::new(NullBadgeEvaluator))
    }

    /// State with a custom badge evaluator wired in
    pub fn with_badge_evaluator(
        db: SqlitePool,
        tuning: EngineTuning,
        badges: Arc<dyn BadgeEvaluator>,
    ) -> Self {
        let hub = Arc::new(NotificationHub::new());
        let ledger = ExperienceLedger::new(db.clone(), tuning.clone(), Arc::new(NullXpForwarder));
        let router = Arc::new(EventRouter::new(
            db.clone(),
            tuning.clone(),
            ledger,
            badges,
            hub.clone(),
        ));
        Self { db, tuning, hub, router }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/events/:event_type", post(api::ingest_event))
        .route("/api/v1/notifications/:user_id/stream", get(api::notification_stream))
        .route("/api/v1/analytics/quests/:course_id", get(api::quest_analytics))
        .route("/api/v1/analytics/activity/:course_id", get(api::activity_report))
        .route("/api/v1/analytics/engagement/:course_id", get(api::engagement_tiers))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
