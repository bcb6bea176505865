//! Integration tests for the runner-facing endpoints: due-rule polling and
//! outcome reporting.

mod common;

use autopost_core::types::new_id;
use autopost_db::repositories::{ProductRepository, RuleRepository};
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use common::{body_json, send, RUNNER_KEY};
use serde_json::json;

fn timestamp(value: &serde_json::Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

// ---------------------------------------------------------------------------
// Test: runner endpoints require the runner key when one is configured
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runner_endpoints_require_key() {
    let app = common::build_test_app();

    let response = send(app.app(), Method::GET, "/api/v1/runner/due-rules", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some("wrong-key"),
        Some(json!({"ruleId": new_id(), "success": true})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn runner_endpoints_are_open_without_configured_key() {
    let mut config = common::test_config();
    config.runner_api_key_hash = None;
    let app = common::build_test_app_with(config, common::FakeRunner::default());

    let response = send(app.app(), Method::GET, "/api/v1/runner/due-rules", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: due-rule poll returns eligible rules once, with run ids
// ---------------------------------------------------------------------------

#[tokio::test]
async fn due_rules_are_returned_and_claimed() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let no_page = common::seed_account(&app.store, false).await;
    let product = common::seed_product(&app.store, owner, "tea").await;
    let now = Utc::now();

    let due = common::seed_rule(&app.store, owner, now - Duration::hours(1), vec![product.id]).await;
    common::seed_rule(&app.store, owner, now + Duration::hours(3), vec![]).await;
    common::seed_rule(&app.store, no_page, now - Duration::hours(1), vec![]).await;

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/runner/due-rules",
        Some(RUNNER_KEY),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 1);
    assert!(json["timestamp"].is_string());
    let candidate = &json["rules"][0];
    assert_eq!(candidate["ruleId"], due.id.to_string());
    assert_eq!(candidate["userId"], owner.to_string());
    assert_eq!(candidate["pageId"], "page-1");
    assert_eq!(candidate["pageToken"], "token-1");
    assert_eq!(candidate["pageName"], "Tea House");
    assert_eq!(candidate["scheduleTime"], "09:00");
    assert_eq!(candidate["product"]["id"], product.id.to_string());
    assert_eq!(candidate["product"]["imageUrls"][0], "https://cdn/tea.png");
    assert!(candidate["runId"].is_string());

    // Claimed: a second poll inside the lease gets nothing.
    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/runner/due-rules",
        Some(RUNNER_KEY),
        None,
    )
    .await;
    assert_eq!(body_json(response).await["count"], 0);
}

#[tokio::test]
async fn inactive_rule_is_never_due() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let token = common::owner_token(owner);
    let rule = common::seed_rule(&app.store, owner, Utc::now() - Duration::days(2), vec![]).await;

    let response = send(
        app.app(),
        Method::PUT,
        &format!("/api/v1/rules/{}/status", rule.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "INACTIVE");

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/runner/due-rules",
        Some(RUNNER_KEY),
        None,
    )
    .await;
    assert_eq!(body_json(response).await["count"], 0);
}

// ---------------------------------------------------------------------------
// Test: success report creates exactly one post with the reported metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_report_records_post_and_reschedules() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let product = common::seed_product(&app.store, owner, "tea").await;
    let rule = common::seed_rule(&app.store, owner, Utc::now(), vec![]).await;
    let before = Utc::now();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(json!({
            "ruleId": rule.id,
            "success": true,
            "postId": "111_222",
            "views": 100,
            "shares": 5,
            "productId": product.id,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
    let next_run_at = timestamp(&json["nextRunAt"]);
    assert!(next_run_at > before);
    assert!(next_run_at <= before + Duration::days(2));

    let posts = app.store.posts().await;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].views, 100);
    assert_eq!(posts[0].shares, 5);
    assert_eq!(posts[0].interactions, 0);
    assert_eq!(posts[0].post_url.as_deref(), Some("https://facebook.com/111_222"));
    assert!(posts[0].last_synced_at.is_some());

    let product = ProductRepository::find_by_id(&app.store, product.id)
        .await
        .unwrap()
        .unwrap();
    assert!(product.last_posted_at.unwrap() >= before);

    let rule = RuleRepository::find_by_id(&app.store, rule.id).await.unwrap().unwrap();
    assert!(rule.last_run_at.unwrap() >= before);
    assert_eq!(rule.next_run_at, Some(next_run_at));
}

// ---------------------------------------------------------------------------
// Test: failure report backs off one hour and creates no post
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_report_retries_in_one_hour() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let rule = common::seed_rule(&app.store, owner, Utc::now(), vec![]).await;
    let before = Utc::now();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(json!({"ruleId": rule.id, "success": false, "error": "token expired"})),
    )
    .await;
    let after = Utc::now();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "token expired");
    let next_run_at = timestamp(&json["nextRunAt"]);
    assert!(next_run_at >= before + Duration::hours(1));
    assert!(next_run_at <= after + Duration::hours(1));

    assert!(app.store.posts().await.is_empty());
    let rule = RuleRepository::find_by_id(&app.store, rule.id).await.unwrap().unwrap();
    assert!(rule.last_run_at.is_some());
}

// ---------------------------------------------------------------------------
// Test: reports without a run id are applied every time they arrive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_reports_without_run_id_each_create_a_post() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let rule = common::seed_rule(&app.store, owner, Utc::now(), vec![]).await;

    for _ in 0..3 {
        let response = send(
            app.app(),
            Method::POST,
            "/api/v1/runner/report",
            Some(RUNNER_KEY),
            Some(json!({"ruleId": rule.id, "success": true})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let posts = app.store.posts().await;
    assert_eq!(posts.iter().filter(|p| p.rule_id == rule.id).count(), 3);
}

// ---------------------------------------------------------------------------
// Test: a polled run reconciles once; the duplicate is a 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn polled_run_reconciles_once() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let product = common::seed_product(&app.store, owner, "tea").await;
    let rule = common::seed_rule(&app.store, owner, Utc::now() - Duration::minutes(1), vec![]).await;

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/runner/due-rules",
        Some(RUNNER_KEY),
        None,
    )
    .await;
    let run_id = body_json(response).await["rules"][0]["runId"].clone();

    let report = json!({"ruleId": rule.id, "runId": run_id, "success": true});
    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(report.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(report),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(app.store.posts().await.len(), 1);
    // The claim is gone and the run's product advanced.
    let stored = RuleRepository::find_by_id(&app.store, rule.id).await.unwrap().unwrap();
    assert!(stored.claimed_until.is_none());
    let product = ProductRepository::find_by_id(&app.store, product.id)
        .await
        .unwrap()
        .unwrap();
    assert!(product.last_posted_at.is_some());
}

// ---------------------------------------------------------------------------
// Test: malformed and unknown reports are rejected without mutation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_without_rule_id_is_400() {
    let app = common::build_test_app();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(json!({"success": true})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "ruleId is required");
}

#[tokio::test]
async fn wrongly_typed_report_fields_are_400() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let rule = common::seed_rule(&app.store, owner, Utc::now(), vec![]).await;

    for body in [
        json!({"ruleId": 123, "success": true}),
        json!({"ruleId": rule.id, "success": "true"}),
    ] {
        let response = send(
            app.app(),
            Method::POST,
            "/api/v1/runner/report",
            Some(RUNNER_KEY),
            Some(body),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(json["error"].is_string());
    }
    assert!(app.store.posts().await.is_empty());
}

#[tokio::test]
async fn report_for_unknown_rule_is_404() {
    let app = common::build_test_app();

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(json!({"ruleId": new_id(), "success": true})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.store.posts().await.is_empty());
}

#[tokio::test]
async fn report_with_unknown_run_is_404() {
    let app = common::build_test_app();
    let owner = common::seed_account(&app.store, true).await;
    let rule = common::seed_rule(&app.store, owner, Utc::now(), vec![]).await;

    let response = send(
        app.app(),
        Method::POST,
        "/api/v1/runner/report",
        Some(RUNNER_KEY),
        Some(json!({"ruleId": rule.id, "runId": new_id(), "success": true})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let stored = RuleRepository::find_by_id(&app.store, rule.id).await.unwrap().unwrap();
    assert!(stored.last_run_at.is_none());
}

// ---------------------------------------------------------------------------
// Test: store outages surface as sanitized 500s
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_outage_is_500() {
    let app = common::build_test_app();
    app.store.set_unavailable(true);

    let response = send(
        app.app(),
        Method::GET,
        "/api/v1/runner/due-rules",
        Some(RUNNER_KEY),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "An internal error occurred");
}
