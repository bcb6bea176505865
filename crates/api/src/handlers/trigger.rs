//! Owner-initiated rule actions that go beyond CRUD.

use autopost_core::content::{render_prompt, PromptContext};
use autopost_core::error::CoreError;
use autopost_core::rotation::least_recently_posted;
use autopost_core::types::DbId;
use autopost_db::models::product::Product;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::engine::dispatcher::{TriggerDispatcher, TriggerRequest, TriggerResponse};
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// POST /api/v1/rules/trigger
pub async fn trigger(
    user: AuthUser,
    State(state): State<AppState>,
    AppJson(input): AppJson<TriggerRequest>,
) -> AppResult<Json<TriggerResponse>> {
    let response = TriggerDispatcher::from_state(&state)
        .trigger(user.user_id, &input, Utc::now())
        .await?;
    Ok(Json(response))
}

/// Body of `POST /rules/preview-prompt`: the rule form as currently filled in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPromptRequest {
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub schedule_time: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub product_ids: Vec<DbId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPreview {
    pub prompt: String,
    pub product_id: DbId,
    pub product_name: String,
    pub image_url: String,
}

/// POST /api/v1/rules/preview-prompt
///
/// Fills the template's placeholders from the product the rule would post
/// next. Generating text from the prompt happens in the runner.
pub async fn preview_prompt(
    user: AuthUser,
    State(state): State<AppState>,
    AppJson(input): AppJson<PreviewPromptRequest>,
) -> AppResult<Json<PromptPreview>> {
    if input.prompt_template.trim().is_empty() {
        return Err(AppError::BadRequest("promptTemplate is required".into()));
    }

    let product = preview_product(&state, user.user_id, &input.product_ids)
        .await?
        .ok_or_else(|| {
            CoreError::Precondition("At least one product is required to preview a prompt".into())
        })?;

    let prompt = render_prompt(
        &input.prompt_template,
        &PromptContext {
            product_name: &product.name,
            product_description: &product.description,
            rule_name: &input.rule_name,
            platform: &input.platform,
            schedule_time: &input.schedule_time,
            frequency: &input.frequency,
            status: &input.status,
        },
    );

    Ok(Json(PromptPreview {
        prompt,
        product_id: product.id,
        image_url: product.first_image().unwrap_or_default().to_owned(),
        product_name: product.name,
    }))
}

/// The selected products posted longest ago, else the whole catalog's.
async fn preview_product(
    state: &AppState,
    owner_id: DbId,
    product_ids: &[DbId],
) -> AppResult<Option<Product>> {
    let mut selected = Vec::with_capacity(product_ids.len());
    for id in product_ids {
        if let Some(product) = state.repos.products.find_by_id(*id).await? {
            if product.owner_id == owner_id {
                selected.push(product);
            }
        }
    }
    if let Some(product) = least_recently_posted(&selected) {
        return Ok(Some(product.clone()));
    }
    Ok(state.repos.products.least_recently_posted(owner_id).await?)
}
