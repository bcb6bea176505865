//! Post entity: the durable artifact of a successful run.

use autopost_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `posts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: DbId,
    pub rule_id: DbId,
    pub owner_id: DbId,
    pub external_post_id: Option<String>,
    pub post_url: Option<String>,
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub views: i64,
    pub interactions: i64,
    pub shares: i64,
    pub comments: i64,
    pub last_synced_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Insert struct built by the reconciler.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: DbId,
    pub rule_id: DbId,
    pub owner_id: DbId,
    pub external_post_id: Option<String>,
    pub post_url: Option<String>,
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub views: i64,
    pub interactions: i64,
    pub shares: i64,
    pub comments: i64,
    pub last_synced_at: Option<Timestamp>,
}

/// Query parameters for listing posts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub rule_id: Option<DbId>,
}
