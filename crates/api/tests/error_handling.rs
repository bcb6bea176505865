//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no server needed.

use autopost_api::error::{AppError, UpstreamDebug};
use autopost_core::error::CoreError;
use autopost_core::types::new_id;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use validator::Validate;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Test: CoreError::NotFound maps to 404 with NOT_FOUND code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let id = new_id();
    let err = AppError::Core(CoreError::NotFound { entity: "Rule", id });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("Rule with id {id} not found"));
}

// ---------------------------------------------------------------------------
// Test: AppError::BadRequest maps to 400 with BAD_REQUEST code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("ruleId is required".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "ruleId is required");
}

// ---------------------------------------------------------------------------
// Test: precondition failures are 400s with their own code
// ---------------------------------------------------------------------------

#[tokio::test]
async fn precondition_error_returns_400() {
    let err = AppError::Core(CoreError::Precondition("Rule is not active".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "PRECONDITION_FAILED");
    assert_eq!(json["error"], "Rule is not active");
}

// ---------------------------------------------------------------------------
// Test: CoreError::Conflict maps to 409
// ---------------------------------------------------------------------------

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("Run has already been reconciled".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Test: Unauthorized and Forbidden map to 401 and 403
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_errors_map_to_401_and_403() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Unauthorized("no token".into()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, json) =
        error_to_response(AppError::Core(CoreError::Forbidden("not yours".into()))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

// ---------------------------------------------------------------------------
// Test: internal errors are sanitized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_errors_return_500_and_sanitize_message() {
    for err in [
        AppError::InternalError("secret database credentials leaked".into()),
        AppError::Core(CoreError::Internal("stack trace here".into())),
        AppError::Database(sqlx::Error::PoolTimedOut),
    ] {
        let (status, json) = error_to_response(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"], "An internal error occurred");
    }
}

// ---------------------------------------------------------------------------
// Test: RowNotFound maps to 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Test: upstream failures are 502 with details; debug fields only when set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upstream_error_returns_502_with_details() {
    let err = AppError::Upstream {
        message: "Runner webhook failed: Bad Gateway".into(),
        debug: Some(UpstreamDebug {
            error_type: "Rejected",
            runner_configured: true,
        }),
    };

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "UPSTREAM_ERROR");
    assert_eq!(json["error"], "Failed to trigger workflow runner");
    assert_eq!(json["details"], "Runner webhook failed: Bad Gateway");
    assert_eq!(json["errorType"], "Rejected");
    assert_eq!(json["runnerConfigured"], true);

    let (_, json) = error_to_response(AppError::Upstream {
        message: "down".into(),
        debug: None,
    })
    .await;
    assert!(json.get("errorType").is_none());
    assert!(json.get("runnerConfigured").is_none());
}

// ---------------------------------------------------------------------------
// Test: validator errors become a single sorted 400 message
// ---------------------------------------------------------------------------

#[derive(Validate)]
struct Sample {
    #[validate(length(min = 1, message = "name is required"))]
    name: String,
    #[validate(length(min = 1, message = "description is required"))]
    description: String,
}

#[tokio::test]
async fn validation_errors_are_joined() {
    let errors = Sample {
        name: String::new(),
        description: String::new(),
    }
    .validate()
    .unwrap_err();

    let (status, json) = error_to_response(AppError::from(errors)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "description is required; name is required");
}
