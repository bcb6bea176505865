//! Repository layer.
//!
//! Each entity has an object-safe repository trait so services receive their
//! storage as injected `Arc<dyn ...>` handles. `Pg*Repo` structs implement the
//! traits against PostgreSQL; [`MemoryStore`](crate::memory::MemoryStore)
//! implements all of them in process for tests and local development.

use std::sync::Arc;

use async_trait::async_trait;
use autopost_core::types::{DbId, Timestamp};

use crate::memory::MemoryStore;
use crate::models::account::{Account, NewAccount};
use crate::models::post::{NewPost, Post};
use crate::models::product::{NewProduct, Product, UpdateProduct};
use crate::models::rule::{DueRule, NewRule, Rule, RuleChanges, RunBookkeeping};
use crate::models::run::{NewRun, Run};
use crate::DbPool;

pub mod account_repo;
pub mod post_repo;
pub mod product_repo;
pub mod rule_repo;
pub mod run_repo;

pub use account_repo::PgAccountRepo;
pub use post_repo::PgPostRepo;
pub use product_repo::PgProductRepo;
pub use rule_repo::PgRuleRepo;
pub use run_repo::PgRunRepo;

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert a rule together with its product pool.
    async fn create(&self, input: &NewRule) -> Result<Rule, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Rule>, sqlx::Error>;

    /// Find a rule only if it belongs to `owner_id`.
    async fn find_for_owner(&self, id: DbId, owner_id: DbId) -> Result<Option<Rule>, sqlx::Error>;

    /// Rules of one owner, newest first.
    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Rule>, sqlx::Error>;

    /// Product ids in the rule's eligible pool, in pool order.
    async fn product_ids(&self, rule_id: DbId) -> Result<Vec<DbId>, sqlx::Error>;

    /// Apply a patch. `product_ids: Some(..)` replaces the whole pool.
    /// Returns `None` if the rule does not exist.
    async fn update(&self, id: DbId, changes: &RuleChanges) -> Result<Option<Rule>, sqlx::Error>;

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error>;

    /// Active, unclaimed rules whose `next_run_at` is unset or has passed and
    /// whose owner holds a complete page credential. Ordered by
    /// `next_run_at` ascending with never-run rules first; at most `limit`.
    async fn find_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueRule>, sqlx::Error>;

    /// Atomically claim a rule for `run_id` until `until`. Succeeds only if
    /// the rule is unclaimed or its previous lease has expired at `now`.
    async fn claim(
        &self,
        id: DbId,
        run_id: DbId,
        until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error>;

    /// Drop the claim held by `run_id`. A claim taken over by a newer run is
    /// left alone.
    async fn release_claim(&self, id: DbId, run_id: DbId) -> Result<bool, sqlx::Error>;

    /// Write run bookkeeping and clear the claim if the reported run holds
    /// it (see [`RunBookkeeping::releases`]).
    async fn record_run(
        &self,
        id: DbId,
        bookkeeping: RunBookkeeping,
    ) -> Result<Option<Rule>, sqlx::Error>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, input: &NewProduct) -> Result<Product, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Product>, sqlx::Error>;

    /// Products of one owner, newest first.
    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Product>, sqlx::Error>;

    async fn update(&self, id: DbId, input: &UpdateProduct) -> Result<Option<Product>, sqlx::Error>;

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error>;

    /// Members of a rule's explicit product pool, in pool order.
    async fn pool_for_rule(&self, rule_id: DbId) -> Result<Vec<Product>, sqlx::Error>;

    /// The owner's product posted longest ago (never-posted first).
    async fn least_recently_posted(&self, owner_id: DbId) -> Result<Option<Product>, sqlx::Error>;

    /// Advance `last_posted_at` to `at`. Never moves it backwards.
    async fn mark_posted(&self, id: DbId, at: Timestamp) -> Result<bool, sqlx::Error>;

    /// How many of `ids` exist and belong to `owner_id`.
    async fn count_owned(&self, owner_id: DbId, ids: &[DbId]) -> Result<i64, sqlx::Error>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, input: &NewPost) -> Result<Post, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Post>, sqlx::Error>;

    /// Posts of one owner, newest first, optionally limited to one rule.
    async fn list_for_owner(
        &self,
        owner_id: DbId,
        rule_id: Option<DbId>,
    ) -> Result<Vec<Post>, sqlx::Error>;

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, input: &NewAccount) -> Result<Account, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Account>, sqlx::Error>;
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, input: &NewRun) -> Result<Run, sqlx::Error>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Run>, sqlx::Error>;

    /// Mark a run reconciled. Returns `false` if it was already reconciled
    /// (or does not exist), so concurrent duplicate reports apply once.
    async fn mark_reconciled(
        &self,
        id: DbId,
        at: Timestamp,
        succeeded: bool,
    ) -> Result<bool, sqlx::Error>;
}

/// Liveness probe for the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl StoreHealth for DbPool {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        crate::health_check(self).await
    }
}

/// The full set of repositories a service needs, as injected trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub rules: Arc<dyn RuleRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub runs: Arc<dyn RunRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            rules: Arc::new(PgRuleRepo::new(pool.clone())),
            products: Arc::new(PgProductRepo::new(pool.clone())),
            posts: Arc::new(PgPostRepo::new(pool.clone())),
            accounts: Arc::new(PgAccountRepo::new(pool.clone())),
            runs: Arc::new(PgRunRepo::new(pool.clone())),
            health: Arc::new(pool),
        }
    }

    /// Repositories backed by a shared in-process store.
    pub fn in_memory(store: MemoryStore) -> Self {
        Self {
            rules: Arc::new(store.clone()),
            products: Arc::new(store.clone()),
            posts: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            runs: Arc::new(store.clone()),
            health: Arc::new(store),
        }
    }
}
