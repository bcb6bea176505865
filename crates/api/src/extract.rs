//! Request body extraction with the API's own error shape.

use autopost_core::error::CoreError;
use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` whose rejections render as `{error, code}` 400s instead of
/// axum's plain-text 4xx bodies.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Well-formed JSON of the wrong shape is a validation failure; anything
/// else is a malformed request.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => AppError::Core(CoreError::Validation(e.body_text())),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}
