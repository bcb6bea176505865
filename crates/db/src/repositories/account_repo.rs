//! Repository for the `accounts` table.

use async_trait::async_trait;
use autopost_core::types::DbId;
use sqlx::PgPool;

use super::AccountRepository;
use crate::models::account::{Account, NewAccount};

const COLUMNS: &str = "id, name, page_id, page_token, created_at, updated_at";

/// PostgreSQL implementation of [`AccountRepository`].
#[derive(Clone)]
pub struct PgAccountRepo {
    pool: PgPool,
}

impl PgAccountRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepo {
    async fn create(&self, input: &NewAccount) -> Result<Account, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (id, name, page_id, page_token)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(input.id)
            .bind(&input.name)
            .bind(&input.page_id)
            .bind(&input.page_token)
            .fetch_one(&self.pool)
            .await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}
