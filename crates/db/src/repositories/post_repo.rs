//! Repository for the `posts` table.

use async_trait::async_trait;
use autopost_core::types::DbId;
use sqlx::PgPool;

use super::PostRepository;
use crate::models::post::{NewPost, Post};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, rule_id, owner_id, external_post_id, post_url, page_id, page_name, \
    views, interactions, shares, comments, last_synced_at, created_at";

/// PostgreSQL implementation of [`PostRepository`].
#[derive(Clone)]
pub struct PgPostRepo {
    pool: PgPool,
}

impl PgPostRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PgPostRepo {
    async fn create(&self, input: &NewPost) -> Result<Post, sqlx::Error> {
        let query = format!(
            "INSERT INTO posts
                (id, rule_id, owner_id, external_post_id, post_url, page_id, page_name,
                 views, interactions, shares, comments, last_synced_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Post>(&query)
            .bind(input.id)
            .bind(input.rule_id)
            .bind(input.owner_id)
            .bind(&input.external_post_id)
            .bind(&input.post_url)
            .bind(&input.page_id)
            .bind(&input.page_name)
            .bind(input.views)
            .bind(input.interactions)
            .bind(input.shares)
            .bind(input.comments)
            .bind(input.last_synced_at)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Post>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM posts WHERE id = $1");
        sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_for_owner(
        &self,
        owner_id: DbId,
        rule_id: Option<DbId>,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM posts
             WHERE owner_id = $1 AND ($2::uuid IS NULL OR rule_id = $2)
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Post>(&query)
            .bind(owner_id)
            .bind(rule_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
