//! Handlers for the `/runner` endpoints polled and called back by the
//! workflow runner.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::engine::due::{DueBatch, DueRuleFinder};
use crate::engine::reconciler::{OutcomeReconciler, OutcomeReport, OutcomeResponse};
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::middleware::auth::RunnerAuth;
use crate::state::AppState;

/// GET /api/v1/runner/due-rules
pub async fn due_rules(_auth: RunnerAuth, State(state): State<AppState>) -> AppResult<Json<DueBatch>> {
    let batch = DueRuleFinder::from_state(&state).claim_due(Utc::now()).await?;
    Ok(Json(batch))
}

/// POST /api/v1/runner/report
pub async fn report(
    _auth: RunnerAuth,
    State(state): State<AppState>,
    AppJson(input): AppJson<OutcomeReport>,
) -> AppResult<Json<OutcomeResponse>> {
    let response = OutcomeReconciler::from_state(&state)
        .reconcile(&input, Utc::now())
        .await?;
    Ok(Json(response))
}
