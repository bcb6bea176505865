//! Repository for the `products` table.

use async_trait::async_trait;
use autopost_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use super::ProductRepository;
use crate::models::product::{NewProduct, Product, UpdateProduct};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str =
    "id, owner_id, name, description, image_urls, last_posted_at, created_at, updated_at";

/// PostgreSQL implementation of [`ProductRepository`].
#[derive(Clone)]
pub struct PgProductRepo {
    pool: PgPool,
}

impl PgProductRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepo {
    async fn create(&self, input: &NewProduct) -> Result<Product, sqlx::Error> {
        let query = format!(
            "INSERT INTO products (id, owner_id, name, description, image_urls)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(input.id)
            .bind(input.owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.image_urls)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Product>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Product>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM products WHERE owner_id = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Product>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn update(&self, id: DbId, input: &UpdateProduct) -> Result<Option<Product>, sqlx::Error> {
        let query = format!(
            "UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                image_urls = COALESCE($4, image_urls)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.image_urls)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pool_for_rule(&self, rule_id: DbId) -> Result<Vec<Product>, sqlx::Error> {
        let query = format!(
            "SELECT {cols}
             FROM products p
             JOIN rule_products rp ON rp.product_id = p.id
             WHERE rp.rule_id = $1
             ORDER BY rp.position, p.id",
            cols = qualified("p"),
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(rule_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn least_recently_posted(&self, owner_id: DbId) -> Result<Option<Product>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM products
             WHERE owner_id = $1
             ORDER BY last_posted_at ASC NULLS FIRST, created_at ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, Product>(&query)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn mark_posted(&self, id: DbId, at: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE products
             SET last_posted_at = GREATEST(COALESCE(last_posted_at, $2), $2)
             WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_owned(&self, owner_id: DbId, ids: &[DbId]) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM products WHERE owner_id = $1 AND id = ANY($2)",
        )
        .bind(owner_id)
        .bind(ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

fn qualified(alias: &str) -> String {
    COLUMNS
        .split(", ")
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}
