pub mod health;
pub mod posts;
pub mod products;
pub mod rules;
pub mod runner;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /runner/due-rules                    claim due rules (runner key)
/// /runner/report                       report a run outcome (runner key)
///
/// /rules                               list, create (owner)
/// /rules/trigger                       dispatch a rule now (POST)
/// /rules/preview-prompt                render a prompt template (POST)
/// /rules/{id}                          get, update, delete
/// /rules/{id}/status                   toggle ACTIVE/INACTIVE (PUT)
///
/// /products                            list, create (owner)
/// /products/{id}                       get, update (PATCH), delete
///
/// /posts                               list (optional ?ruleId=)
/// /posts/{id}                          get, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/runner", runner::router())
        .nest("/rules", rules::router())
        .nest("/products", products::router())
        .nest("/posts", posts::router())
}
