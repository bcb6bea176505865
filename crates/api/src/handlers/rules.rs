//! Handlers for the `/rules` resource.

use std::collections::HashSet;

use autopost_core::content::RulePreview;
use autopost_core::error::CoreError;
use autopost_core::rule::{Frequency, Platform, RuleStatus};
use autopost_core::schedule::ScheduleTime;
use autopost_core::types::{new_id, DbId};
use autopost_db::models::rule::{CreateRule, NewRule, Rule, RuleChanges, UpdateRule};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// A rule together with its product pool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleWithProducts {
    #[serde(flatten)]
    pub rule: Rule,
    pub product_ids: Vec<DbId>,
}

/// POST /api/v1/rules
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    AppJson(input): AppJson<CreateRule>,
) -> AppResult<(StatusCode, Json<DataResponse<RuleWithProducts>>)> {
    input.validate()?;

    let platform: Platform = input.platform.parse()?;
    let schedule_time: ScheduleTime = input.schedule_time.parse()?;
    let frequency: Frequency = input.frequency.parse()?;
    let preview = checked_preview(input.preview.clone())?;
    let product_ids = owned_product_ids(&state, user.user_id, input.product_ids.as_ref()).await?;

    let rule = state
        .repos
        .rules
        .create(&NewRule {
            id: new_id(),
            owner_id: user.user_id,
            rule_name: input.rule_name.trim().to_string(),
            platform,
            schedule_time,
            frequency: frequency.as_str().to_string(),
            prompt_template: input.prompt_template,
            preview,
            next_run_at: state.scheduler.initial_run(schedule_time, Utc::now()),
            product_ids: product_ids.clone(),
        })
        .await?;

    tracing::info!(rule_id = %rule.id, owner_id = %user.user_id, next_run_at = ?rule.next_run_at, "Rule created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RuleWithProducts { rule, product_ids },
        }),
    ))
}

/// GET /api/v1/rules
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<RuleWithProducts>>>> {
    let rules = state.repos.rules.list_for_owner(user.user_id).await?;
    let mut data = Vec::with_capacity(rules.len());
    for rule in rules {
        let product_ids = state.repos.rules.product_ids(rule.id).await?;
        data.push(RuleWithProducts { rule, product_ids });
    }
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/rules/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<RuleWithProducts>>> {
    let rule = find_owned(&state, id, user.user_id).await?;
    let product_ids = state.repos.rules.product_ids(rule.id).await?;
    Ok(Json(DataResponse {
        data: RuleWithProducts { rule, product_ids },
    }))
}

/// PUT /api/v1/rules/{id}
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    AppJson(input): AppJson<UpdateRule>,
) -> AppResult<Json<DataResponse<RuleWithProducts>>> {
    if input.is_empty() {
        return Err(AppError::BadRequest("No fields to update".into()));
    }
    find_owned(&state, id, user.user_id).await?;

    let changes = rule_changes(&state, user.user_id, input).await?;
    let rule = state
        .repos
        .rules
        .update(id, &changes)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Rule", id }))?;
    let product_ids = state.repos.rules.product_ids(rule.id).await?;

    tracing::info!(rule_id = %rule.id, "Rule updated");
    Ok(Json(DataResponse {
        data: RuleWithProducts { rule, product_ids },
    }))
}

/// PUT /api/v1/rules/{id}/status
///
/// Flips the rule between `ACTIVE` and `INACTIVE`.
pub async fn toggle_status(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Rule>>> {
    let rule = find_owned(&state, id, user.user_id).await?;
    let status = rule.status().toggled();

    let rule = state
        .repos
        .rules
        .update(
            id,
            &RuleChanges {
                status: Some(status),
                ..Default::default()
            },
        )
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Rule", id }))?;

    tracing::info!(rule_id = %rule.id, status = %status, "Rule status toggled");
    Ok(Json(DataResponse { data: rule }))
}

/// DELETE /api/v1/rules/{id}
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    find_owned(&state, id, user.user_id).await?;
    if state.repos.rules.delete(id).await? {
        tracing::info!(rule_id = %id, "Rule deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound { entity: "Rule", id }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_owned(state: &AppState, id: DbId, owner_id: DbId) -> AppResult<Rule> {
    state
        .repos
        .rules
        .find_for_owner(id, owner_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Rule", id }))
}

/// Validate a patch into repository changes. A new schedule time
/// reschedules the rule from now.
async fn rule_changes(state: &AppState, owner_id: DbId, input: UpdateRule) -> AppResult<RuleChanges> {
    let mut changes = RuleChanges::default();

    if let Some(name) = input.rule_name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("ruleName must not be empty".into()));
        }
        changes.rule_name = Some(name);
    }
    if let Some(platform) = input.platform {
        changes.platform = Some(platform.parse::<Platform>()?);
    }
    if let Some(raw) = input.schedule_time {
        let time: ScheduleTime = raw.parse()?;
        changes.schedule_time = Some(time);
        changes.next_run_at = Some(state.scheduler.initial_run(time, Utc::now()));
    }
    if let Some(raw) = input.frequency {
        changes.frequency = Some(raw.parse::<Frequency>()?.as_str().to_string());
    }
    if let Some(template) = input.prompt_template {
        if template.trim().is_empty() {
            return Err(AppError::BadRequest("promptTemplate must not be empty".into()));
        }
        changes.prompt_template = Some(template);
    }
    if let Some(raw) = input.status {
        changes.status = Some(raw.parse::<RuleStatus>()?);
    }
    if let Some(preview) = input.preview {
        changes.preview = Some(checked_preview(preview)?);
    }
    if input.product_ids.is_some() {
        changes.product_ids =
            Some(owned_product_ids(state, owner_id, input.product_ids.as_ref()).await?);
    }

    Ok(changes)
}

/// A preview must look like a cached preview; `null` means none.
fn checked_preview(preview: Option<serde_json::Value>) -> AppResult<Option<serde_json::Value>> {
    match preview {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => {
            serde_json::from_value::<RulePreview>(value.clone()).map_err(|_| {
                AppError::BadRequest("preview must contain text and productName".into())
            })?;
            Ok(Some(value))
        }
    }
}

/// Parse a `productIds` body field and check every id belongs to the owner.
///
/// Absent and `null` mean an empty pool. Duplicates collapse, keeping the
/// first occurrence.
async fn owned_product_ids(
    state: &AppState,
    owner_id: DbId,
    raw: Option<&serde_json::Value>,
) -> AppResult<Vec<DbId>> {
    let ids = parse_product_ids(raw)?;
    if ids.is_empty() {
        return Ok(ids);
    }
    let owned = state.repos.products.count_owned(owner_id, &ids).await?;
    if owned != ids.len() as i64 {
        return Err(AppError::BadRequest(
            "productIds contains products that do not exist or are not yours".into(),
        ));
    }
    Ok(ids)
}

fn parse_product_ids(raw: Option<&serde_json::Value>) -> AppResult<Vec<DbId>> {
    let items = match raw {
        None | Some(serde_json::Value::Null) => return Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => return Err(AppError::BadRequest("productIds must be an array".into())),
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_str()
            .and_then(|s| s.parse::<DbId>().ok())
            .ok_or_else(|| AppError::BadRequest("productIds must contain product ids".into()))?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn product_ids_must_be_an_array_of_ids() {
        assert!(parse_product_ids(None).unwrap().is_empty());
        assert!(parse_product_ids(Some(&json!(null))).unwrap().is_empty());
        assert_matches!(parse_product_ids(Some(&json!("abc"))), Err(AppError::BadRequest(_)));
        assert_matches!(parse_product_ids(Some(&json!([1, 2]))), Err(AppError::BadRequest(_)));
    }

    #[test]
    fn duplicate_product_ids_collapse_in_order() {
        let a = new_id();
        let b = new_id();
        let raw = json!([a.to_string(), b.to_string(), a.to_string()]);
        assert_eq!(parse_product_ids(Some(&raw)).unwrap(), vec![a, b]);
    }

    #[test]
    fn preview_shape_is_checked() {
        assert_eq!(checked_preview(Some(json!(null))).unwrap(), None);
        assert!(checked_preview(Some(json!({"text": "t", "productName": "P"}))).unwrap().is_some());
        assert_matches!(checked_preview(Some(json!({"foo": 1}))), Err(AppError::BadRequest(_)));
    }
}
