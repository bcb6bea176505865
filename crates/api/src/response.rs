//! Shared response envelope types for API handlers.
//!
//! Owner-facing CRUD responses use a `{ "data": ... }` envelope. The runner
//! endpoints (`/runner/*`, `/rules/trigger`) answer with their own flat
//! camelCase bodies, which the runner and the dashboard already parse.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(DataResponse { data: items }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
