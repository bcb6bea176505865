//! Route definitions for the `/rules` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{rules, trigger};
use crate::state::AppState;

/// Routes mounted at `/rules`.
///
/// ```text
/// GET    /                  -> list
/// POST   /                  -> create
/// POST   /trigger           -> trigger
/// POST   /preview-prompt    -> preview_prompt
/// GET    /{id}              -> get_by_id
/// PUT    /{id}              -> update
/// DELETE /{id}              -> delete
/// PUT    /{id}/status       -> toggle_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(rules::list).post(rules::create))
        .route("/trigger", post(trigger::trigger))
        .route("/preview-prompt", post(trigger::preview_prompt))
        .route(
            "/{id}",
            get(rules::get_by_id)
                .put(rules::update)
                .delete(rules::delete),
        )
        .route("/{id}/status", put(rules::toggle_status))
}
