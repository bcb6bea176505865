//! Repository for the `rules` and `rule_products` tables.

use async_trait::async_trait;
use autopost_core::rule::{Platform, RuleStatus};
use autopost_core::types::{DbId, Timestamp};
use sqlx::{PgPool, Postgres, Transaction};

use super::RuleRepository;
use crate::models::rule::{DueRule, NewRule, Rule, RuleChanges, RunBookkeeping};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, owner_id, rule_name, platform, schedule_time, frequency, \
    prompt_template, status, preview, last_run_at, next_run_at, claimed_until, claim_run_id, \
    created_at, updated_at";

/// Same columns qualified for the due-rule join.
const DUE_COLUMNS: &str = "r.id, r.owner_id, r.rule_name, r.platform, r.schedule_time, \
    r.frequency, r.prompt_template, r.status, r.preview, r.last_run_at, r.next_run_at, \
    r.claimed_until, r.claim_run_id, r.created_at, r.updated_at, \
    a.page_id, a.name AS page_name, a.page_token";

/// PostgreSQL implementation of [`RuleRepository`].
#[derive(Clone)]
pub struct PgRuleRepo {
    pool: PgPool,
}

impl PgRuleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn replace_pool(
        tx: &mut Transaction<'_, Postgres>,
        rule_id: DbId,
        product_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM rule_products WHERE rule_id = $1")
            .bind(rule_id)
            .execute(&mut **tx)
            .await?;

        for (position, product_id) in product_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO rule_products (rule_id, product_id, position)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (rule_id, product_id) DO NOTHING",
            )
            .bind(rule_id)
            .bind(product_id)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepo {
    async fn create(&self, input: &NewRule) -> Result<Rule, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO rules
                (id, owner_id, rule_name, platform, schedule_time, frequency,
                 prompt_template, status, preview, next_run_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        let rule = sqlx::query_as::<_, Rule>(&query)
            .bind(input.id)
            .bind(input.owner_id)
            .bind(&input.rule_name)
            .bind(input.platform.as_str())
            .bind(input.schedule_time.to_string())
            .bind(&input.frequency)
            .bind(&input.prompt_template)
            .bind(RuleStatus::Active.as_str())
            .bind(&input.preview)
            .bind(input.next_run_at)
            .fetch_one(&mut *tx)
            .await?;

        Self::replace_pool(&mut tx, rule.id, &input.product_ids).await?;
        tx.commit().await?;
        Ok(rule)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Rule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rules WHERE id = $1");
        sqlx::query_as::<_, Rule>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_for_owner(&self, id: DbId, owner_id: DbId) -> Result<Option<Rule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rules WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, Rule>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Rule>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM rules WHERE owner_id = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Rule>(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn product_ids(&self, rule_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "SELECT product_id FROM rule_products WHERE rule_id = $1 ORDER BY position, product_id",
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn update(&self, id: DbId, changes: &RuleChanges) -> Result<Option<Rule>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE rules SET
                rule_name = COALESCE($2, rule_name),
                platform = COALESCE($3, platform),
                schedule_time = COALESCE($4, schedule_time),
                frequency = COALESCE($5, frequency),
                prompt_template = COALESCE($6, prompt_template),
                status = COALESCE($7, status),
                preview = CASE WHEN $8 THEN $9 ELSE preview END,
                next_run_at = COALESCE($10, next_run_at)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let rule = sqlx::query_as::<_, Rule>(&query)
            .bind(id)
            .bind(&changes.rule_name)
            .bind(changes.platform.map(Platform::as_str))
            .bind(changes.schedule_time.map(|t| t.to_string()))
            .bind(&changes.frequency)
            .bind(&changes.prompt_template)
            .bind(changes.status.map(RuleStatus::as_str))
            .bind(changes.preview.is_some())
            .bind(changes.preview.clone().flatten())
            .bind(changes.next_run_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(rule) = rule else {
            return Ok(None);
        };
        if let Some(product_ids) = &changes.product_ids {
            Self::replace_pool(&mut tx, rule.id, product_ids).await?;
        }
        tx.commit().await?;
        Ok(Some(rule))
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueRule>, sqlx::Error> {
        let query = format!(
            "SELECT {DUE_COLUMNS}
             FROM rules r
             JOIN accounts a ON a.id = r.owner_id
             WHERE r.status = $1
               AND (r.next_run_at IS NULL OR r.next_run_at <= $2)
               AND (r.claimed_until IS NULL OR r.claimed_until <= $2)
               AND a.page_id IS NOT NULL
               AND a.page_token IS NOT NULL
             ORDER BY r.next_run_at ASC NULLS FIRST, r.created_at ASC
             LIMIT $3"
        );
        sqlx::query_as::<_, DueRule>(&query)
            .bind(RuleStatus::Active.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    async fn claim(
        &self,
        id: DbId,
        run_id: DbId,
        until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rules SET claimed_until = $3, claim_run_id = $2
             WHERE id = $1 AND (claimed_until IS NULL OR claimed_until <= $4)",
        )
        .bind(id)
        .bind(run_id)
        .bind(until)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_claim(&self, id: DbId, run_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rules SET claimed_until = NULL, claim_run_id = NULL
             WHERE id = $1 AND claim_run_id = $2",
        )
        .bind(id)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_run(
        &self,
        id: DbId,
        bookkeeping: RunBookkeeping,
    ) -> Result<Option<Rule>, sqlx::Error> {
        let query = format!(
            "UPDATE rules SET
                last_run_at = $2,
                next_run_at = $3,
                claimed_until = CASE
                    WHEN $4::uuid IS NULL OR claim_run_id IS NULL OR claim_run_id = $4 THEN NULL
                    ELSE claimed_until END,
                claim_run_id = CASE
                    WHEN $4::uuid IS NULL OR claim_run_id IS NULL OR claim_run_id = $4 THEN NULL
                    ELSE claim_run_id END
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Rule>(&query)
            .bind(id)
            .bind(bookkeeping.last_run_at)
            .bind(bookkeeping.next_run_at)
            .bind(bookkeeping.run_id)
            .fetch_optional(&self.pool)
            .await
    }
}
