use autopost_core::error::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Extra context attached to upstream failures outside production.
#[derive(Debug, Clone)]
pub struct UpstreamDebug {
    pub error_type: &'static str,
    pub runner_configured: bool,
}

/// Error type returned by every handler.
///
/// Renders as `{"error": message, "code": CODE}`. Internal and unclassified
/// database failures are logged and answered with a generic message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The workflow runner could not be reached or rejected the run.
    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        debug: Option<UpstreamDebug>,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";

type Rendered = (StatusCode, &'static str, String);

fn internal() -> Rendered {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        INTERNAL_MESSAGE.to_string(),
    )
}

/// Field messages, sorted so the joined text is stable.
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| format!("{field} is invalid"), |m| m.to_string())
                })
            })
            .collect();
        messages.sort();
        AppError::Core(CoreError::Validation(messages.join("; ")))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Core(core) => render_core(core),
            AppError::Database(err) => render_sqlx(&err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Upstream { message, debug } => return render_upstream(message, debug),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

fn render_core(err: CoreError) -> Rendered {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
        CoreError::Precondition(msg) => (StatusCode::BAD_REQUEST, "PRECONDITION_FAILED", msg),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// The runner failure body. `details` carries the runner's own message.
fn render_upstream(message: String, debug: Option<UpstreamDebug>) -> Response {
    tracing::warn!(error = %message, "Workflow runner call failed");

    let mut body = json!({
        "error": "Failed to trigger workflow runner",
        "code": "UPSTREAM_ERROR",
        "details": message,
    });
    if let Some(debug) = debug {
        body["errorType"] = json!(debug.error_type);
        body["runnerConfigured"] = json!(debug.runner_configured);
    }
    (StatusCode::BAD_GATEWAY, Json(body)).into_response()
}

/// Map a sqlx error to a response.
///
/// `RowNotFound` is 404, a unique violation on a `uq_` constraint is 409 and
/// a foreign-key violation is 400. Anything else is a sanitized 500.
fn render_sqlx(err: &sqlx::Error) -> Rendered {
    if let sqlx::Error::RowNotFound = err {
        return (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        );
    }

    if let sqlx::Error::Database(db_err) = err {
        match db_err.code().as_deref() {
            Some("23505") => {
                if let Some(constraint) = db_err.constraint().filter(|c| c.starts_with("uq_")) {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            Some("23503") => {
                return (
                    StatusCode::BAD_REQUEST,
                    "BAD_REQUEST",
                    "Referenced record does not exist".to_string(),
                );
            }
            _ => {}
        }
    }

    tracing::error!(error = %err, "Database error");
    internal()
}
