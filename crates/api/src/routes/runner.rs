//! Route definitions for the workflow runner's endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runner;
use crate::state::AppState;

/// Routes mounted at `/runner`.
///
/// ```text
/// GET    /due-rules     -> due_rules
/// POST   /report        -> report
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/due-rules", get(runner::due_rules))
        .route("/report", post(runner::report))
}
