//! Handlers for the `/posts` resource. Posts are created only by the
//! outcome reconciler; owners can list, inspect and delete them.

use autopost_core::error::CoreError;
use autopost_core::types::DbId;
use autopost_db::models::post::{Post, PostListQuery};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/posts?ruleId=
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> AppResult<Json<DataResponse<Vec<Post>>>> {
    let posts = state
        .repos
        .posts
        .list_for_owner(user.user_id, query.rule_id)
        .await?;
    Ok(Json(DataResponse { data: posts }))
}

/// GET /api/v1/posts/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Post>>> {
    let post = find_owned(&state, id, user.user_id).await?;
    Ok(Json(DataResponse { data: post }))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    find_owned(&state, id, user.user_id).await?;
    if state.repos.posts.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound { entity: "Post", id }))
    }
}

/// Another owner's post is reported as missing.
async fn find_owned(state: &AppState, id: DbId, owner_id: DbId) -> AppResult<Post> {
    state
        .repos
        .posts
        .find_by_id(id)
        .await?
        .filter(|p| p.owner_id == owner_id)
        .ok_or(AppError::Core(CoreError::NotFound { entity: "Post", id }))
}
