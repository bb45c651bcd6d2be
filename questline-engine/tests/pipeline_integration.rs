//! Integration tests for the quest engagement pipeline
//!
//! Drives the full HTTP surface: webhook intake, state machine, ledger,
//! and notification fanout, using an in-memory database.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use questline_common::config::EngineTuning;
use questline_common::db::{connect_memory, run_migrations};
use questline_common::events::NotificationKind;
use questline_engine::db::entities::{upsert_course, upsert_user};
use questline_engine::db::quests::{create_quest, NewQuest};
use questline_engine::db::{ledger, progress};
use questline_engine::{build_router, AppState};

struct TestContext {
    app: axum::Router,
    state: AppState,
    course_id: Uuid,
    user_id: Uuid,
}

/// Seeded app: one synchronized course ("course-1") and user ("user-1")
async fn setup() -> TestContext {
    let pool = connect_memory().await.expect("pool");
    run_migrations(&pool).await.expect("migrations");

    let course_id = upsert_course(&pool, "course-1", "Rust Foundations").await.unwrap();
    let user_id = upsert_user(&pool, "user-1", "Learner").await.unwrap();

    let state = AppState::new(pool, EngineTuning::default());
    let app = build_router(state.clone());

    TestContext { app, state, course_id, user_id }
}

async fn post_event(app: &axum::Router, event_type: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/events/{}", event_type))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = setup().await;
    let (status, body) = get_json(&ctx.app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "questline-engine");
}

#[tokio::test]
async fn test_unrecognized_event_type_is_404() {
    let ctx = setup().await;
    let (status, _body) = post_event(&ctx.app, "calendar_updated", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_fields_ack_as_noop() {
    let ctx = setup().await;
    let (status, body) =
        post_event(&ctx.app, "quiz_submitted", json!({"course_id": "course-1"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["event_type"], "quiz_submitted");
}

#[tokio::test]
async fn test_unsynchronized_entities_ack_as_noop() {
    let ctx = setup().await;
    let (status, body) = post_event(
        &ctx.app,
        "quiz_submitted",
        json!({"course_id": "course-999", "user_id": "user-1", "quiz_id": "quiz-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ignored");
}

/// Reward-50 quest, no grade gating: one submission completes it,
/// writes exactly one quest ledger row, and notifies both ways.
#[tokio::test]
async fn test_assignment_submission_completes_quest() {
    let ctx = setup().await;
    let quest = create_quest(
        &ctx.state.db,
        NewQuest::bound(ctx.course_id, "assign-7", "Submit the essay", 50),
    )
    .await
    .unwrap();

    let mut subscriber = ctx.state.hub.subscribe(ctx.user_id);

    let (status, body) = post_event(
        &ctx.app,
        "assignment_submitted",
        json!({"course_id": "course-1", "user_id": "user-1", "assignment_id": "assign-7"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processed");
    assert!(body["message"].as_str().unwrap().contains("completed"));

    let record = progress::get_progress(&ctx.state.db, ctx.user_id, quest.id)
        .await
        .unwrap()
        .expect("progress record created");
    assert_eq!(record.progress_percent, 100);
    assert!(record.completed_at.is_some());

    let entries = ledger::entries_for_user(&ctx.state.db, ctx.user_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 50);
    assert_eq!(entries[0].source_type, "quest");
    assert_eq!(entries[0].source_id, quest.id.to_string());

    // connected preamble, then completion + reward in either order
    let connected = subscriber.rx.recv().await.unwrap();
    assert_eq!(connected.kind, NotificationKind::Connected);

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(2), subscriber.rx.recv())
            .await
            .expect("notification delivered")
            .expect("channel open");
        kinds.push(message.kind);
    }
    assert!(kinds.contains(&NotificationKind::QuestCompletion));
    assert!(kinds.contains(&NotificationKind::XpReward));
}

/// Redelivered completion webhook: the terminal stage swallows it
/// without a second ledger row.
#[tokio::test]
async fn test_completion_redelivery_is_idempotent() {
    let ctx = setup().await;
    create_quest(
        &ctx.state.db,
        NewQuest::bound(ctx.course_id, "assign-7", "Submit the essay", 50),
    )
    .await
    .unwrap();

    let payload =
        json!({"course_id": "course-1", "user_id": "user-1", "assignment_id": "assign-7"});
    post_event(&ctx.app, "assignment_submitted", payload.clone()).await;
    let (status, body) = post_event(&ctx.app, "assignment_submitted", payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");

    let entries = ledger::entries_for_user(&ctx.state.db, ctx.user_id).await.unwrap();
    assert_eq!(entries.len(), 1, "reward granted exactly once");
}

/// Unbound lesson view: generic credit of 3 XP once per hour.
#[tokio::test]
async fn test_lesson_view_generic_credit() {
    let ctx = setup().await;

    let payload = json!({"course_id": "course-1", "user_id": "user-1", "lesson_id": "lesson-3"});
    let (status, body) = post_event(&ctx.app, "lesson_viewed", payload.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processed");

    assert_eq!(
        ledger::xp_total(&ctx.state.db, ctx.user_id, ctx.course_id).await.unwrap(),
        3
    );

    // Within the 1-hour window: nothing more
    let (_, body) = post_event(&ctx.app, "lesson_viewed", payload.clone()).await;
    assert_eq!(body["status"], "duplicate");
    assert_eq!(
        ledger::xp_total(&ctx.state.db, ctx.user_id, ctx.course_id).await.unwrap(),
        3
    );

    // Past the window: legitimate repeat engagement re-awards
    sqlx::query("UPDATE experience_points SET awarded_at = datetime('now', '-2 hours')")
        .execute(&ctx.state.db)
        .await
        .unwrap();
    let (_, body) = post_event(&ctx.app, "lesson_viewed", payload).await;
    assert_eq!(body["status"], "processed");
    assert_eq!(
        ledger::xp_total(&ctx.state.db, ctx.user_id, ctx.course_id).await.unwrap(),
        6
    );
}

/// Failing grade on an already-completed quest: needs_revision, no
/// bonus row, stage untouched.
#[tokio::test]
async fn test_low_grade_flags_needs_revision() {
    let ctx = setup().await;
    let quest = create_quest(
        &ctx.state.db,
        NewQuest::bound(ctx.course_id, "assign-7", "Submit the essay", 50),
    )
    .await
    .unwrap();

    post_event(
        &ctx.app,
        "assignment_submitted",
        json!({"course_id": "course-1", "user_id": "user-1", "assignment_id": "assign-7"}),
    )
    .await;

    let (status, _body) = post_event(
        &ctx.app,
        "assign_graded",
        json!({
            "course_id": "course-1",
            "user_id": "user-1",
            "assignment_id": "assign-7",
            "grade": 65,
            "max_grade": 100,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = progress::get_progress(&ctx.state.db, ctx.user_id, quest.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status.as_str(), "needs_revision");
    assert_eq!(record.stage.as_str(), "completed");
    assert_eq!(record.progress_percent, 100);

    let entries = ledger::entries_for_user(&ctx.state.db, ctx.user_id).await.unwrap();
    assert!(
        entries.iter().all(|e| e.source_type != "grade_bonus"),
        "no bonus for a failing grade"
    );
}

/// Excellent grade straight away: completion reward plus the 20% bonus.
#[tokio::test]
async fn test_excellent_grade_earns_bonus() {
    let ctx = setup().await;
    create_quest(
        &ctx.state.db,
        NewQuest::bound(ctx.course_id, "assign-7", "Submit the essay", 50),
    )
    .await
    .unwrap();

    post_event(
        &ctx.app,
        "assign_graded",
        json!({
            "course_id": "course-1",
            "user_id": "user-1",
            "assignment_id": "assign-7",
            "grade": 95,
            "max_grade": 100,
        }),
    )
    .await;

    let entries = ledger::entries_for_user(&ctx.state.db, ctx.user_id).await.unwrap();
    let quest_rows: Vec<_> = entries.iter().filter(|e| e.source_type == "quest").collect();
    let bonus_rows: Vec<_> = entries.iter().filter(|e| e.source_type == "grade_bonus").collect();
    assert_eq!(quest_rows.len(), 1);
    assert_eq!(quest_rows[0].amount, 50);
    assert_eq!(bonus_rows.len(), 1);
    assert_eq!(bonus_rows[0].amount, 10);

    assert_eq!(
        ledger::xp_total(&ctx.state.db, ctx.user_id, ctx.course_id).await.unwrap(),
        60
    );
}

/// Analytics read surface over a little real traffic.
#[tokio::test]
async fn test_analytics_surface() {
    let ctx = setup().await;
    create_quest(
        &ctx.state.db,
        NewQuest::bound(ctx.course_id, "quiz-1", "Pass the quiz", 40),
    )
    .await
    .unwrap();

    post_event(
        &ctx.app,
        "quiz_submitted",
        json!({"course_id": "course-1", "user_id": "user-1", "quiz_id": "quiz-1"}),
    )
    .await;

    let (status, body) =
        get_json(&ctx.app, &format!("/api/v1/analytics/quests/{}", ctx.course_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_records"], 1);
    assert_eq!(body["completion_rate"], 1.0);
    assert_eq!(body["by_stage"]["completed"], 1);

    let (status, body) =
        get_json(&ctx.app, &format!("/api/v1/analytics/activity/{}", ctx.course_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["daily"].as_array().unwrap().len(), 1);
    assert_eq!(body["daily"][0]["completions"], 1);
    let hour_total: i64 =
        body["by_hour"].as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).sum();
    assert_eq!(hour_total, 1);

    let (status, body) =
        get_json(&ctx.app, &format!("/api/v1/analytics/engagement/{}", ctx.course_id)).await;
    assert_eq!(status, StatusCode::OK);
    // One record with score 50 lands in the medium tier
    assert_eq!(body["medium"], 1);
}
