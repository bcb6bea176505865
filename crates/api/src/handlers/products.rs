//! Handlers for the `/products` resource.
//!
//! A product owned by another account answers 403; one that does not exist
//! answers 404.

use autopost_core::error::CoreError;
use autopost_core::types::{new_id, DbId};
use autopost_db::models::product::{CreateProduct, NewProduct, Product, UpdateProduct};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/products
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    AppJson(input): AppJson<CreateProduct>,
) -> AppResult<(StatusCode, Json<DataResponse<Product>>)> {
    input.validate()?;

    let product = state
        .repos
        .products
        .create(&NewProduct {
            id: new_id(),
            owner_id: user.user_id,
            name: input.name.trim().to_string(),
            description: input.description,
            image_urls: input.image_urls,
        })
        .await?;

    tracing::info!(product_id = %product.id, owner_id = %user.user_id, "Product created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: product })))
}

/// GET /api/v1/products
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Product>>>> {
    let products = state.repos.products.list_for_owner(user.user_id).await?;
    Ok(Json(DataResponse { data: products }))
}

/// GET /api/v1/products/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Product>>> {
    let product = find_owned(&state, id, user.user_id).await?;
    Ok(Json(DataResponse { data: product }))
}

/// PATCH /api/v1/products/{id}
///
/// Edits never touch `lastPostedAt`; only successful runs advance it.
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    AppJson(input): AppJson<UpdateProduct>,
) -> AppResult<Json<DataResponse<Product>>> {
    if input.is_empty() {
        return Err(AppError::BadRequest("No fields to update".into()));
    }
    input.validate()?;
    find_owned(&state, id, user.user_id).await?;

    let product = state
        .repos
        .products
        .update(id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Product",
            id,
        }))?;
    Ok(Json(DataResponse { data: product }))
}

/// DELETE /api/v1/products/{id}
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    find_owned(&state, id, user.user_id).await?;
    if state.repos.products.delete(id).await? {
        tracing::info!(product_id = %id, "Product deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Product",
            id,
        }))
    }
}

async fn find_owned(state: &AppState, id: DbId, owner_id: DbId) -> AppResult<Product> {
    let product = state
        .repos
        .products
        .find_by_id(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Product",
            id,
        }))?;
    if product.owner_id != owner_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "You do not have access to this product".into(),
        )));
    }
    Ok(product)
}
