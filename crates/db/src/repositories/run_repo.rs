//! Repository for the `rule_runs` table.

use async_trait::async_trait;
use autopost_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use super::RunRepository;
use crate::models::run::{NewRun, Run};

const COLUMNS: &str = "id, rule_id, product_id, trigger, dispatched_at, reconciled_at, succeeded";

/// PostgreSQL implementation of [`RunRepository`].
#[derive(Clone)]
pub struct PgRunRepo {
    pool: PgPool,
}

impl PgRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for PgRunRepo {
    async fn create(&self, input: &NewRun) -> Result<Run, sqlx::Error> {
        let query = format!(
            "INSERT INTO rule_runs (id, rule_id, product_id, trigger, dispatched_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Run>(&query)
            .bind(input.id)
            .bind(input.rule_id)
            .bind(input.product_id)
            .bind(input.trigger.as_str())
            .bind(input.dispatched_at)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Run>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rule_runs WHERE id = $1");
        sqlx::query_as::<_, Run>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn mark_reconciled(
        &self,
        id: DbId,
        at: Timestamp,
        succeeded: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rule_runs SET reconciled_at = $2, succeeded = $3
             WHERE id = $1 AND reconciled_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .bind(succeeded)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
