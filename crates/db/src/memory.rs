//! In-process implementation of every repository trait.
//!
//! Mirrors the PostgreSQL semantics the services rely on: owner scoping,
//! cascade deletes, `NULLS FIRST` ordering, atomic claims and monotonic
//! `last_posted_at`. Backs the engine unit tests and the API integration
//! tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use autopost_core::rotation::least_recently_posted;
use autopost_core::rule::RuleStatus;
use autopost_core::types::{DbId, Timestamp};
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::account::{Account, NewAccount};
use crate::models::post::{NewPost, Post};
use crate::models::product::{NewProduct, Product, UpdateProduct};
use crate::models::rule::{DueRule, NewRule, Rule, RuleChanges, RunBookkeeping};
use crate::models::run::{NewRun, Run};
use crate::repositories::{
    AccountRepository, PostRepository, ProductRepository, RuleRepository, RunRepository,
    StoreHealth,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: Vec<Account>,
    products: Vec<Product>,
    rules: Vec<Rule>,
    /// `(rule_id, product_id)` in pool order.
    rule_products: Vec<(DbId, DbId)>,
    posts: Vec<Post>,
    runs: Vec<Run>,
}

/// Shared in-memory tables. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the pool were exhausted.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), sqlx::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }

    /// Overwrite a stored rule row wholesale (seeding `next_run_at`,
    /// `status`, claims).
    pub async fn put_rule(&self, rule: Rule) {
        let mut t = self.tables.lock().await;
        match t.rules.iter().position(|r| r.id == rule.id) {
            Some(i) => t.rules[i] = rule,
            None => t.rules.push(rule),
        }
    }

    /// Overwrite a product's `last_posted_at` without the monotonic guard.
    pub async fn set_last_posted(&self, product_id: DbId, at: Option<Timestamp>) {
        let mut t = self.tables.lock().await;
        if let Some(p) = t.products.iter_mut().find(|p| p.id == product_id) {
            p.last_posted_at = at;
        }
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.tables.lock().await.posts.clone()
    }

    pub async fn runs(&self) -> Vec<Run> {
        self.tables.lock().await.runs.clone()
    }
}

fn apply_rule_changes(rule: &mut Rule, changes: &RuleChanges, now: Timestamp) {
    if let Some(name) = &changes.rule_name {
        rule.rule_name = name.clone();
    }
    if let Some(platform) = changes.platform {
        rule.platform = platform.as_str().to_owned();
    }
    if let Some(time) = changes.schedule_time {
        rule.schedule_time = time.to_string();
    }
    if let Some(frequency) = &changes.frequency {
        rule.frequency = frequency.clone();
    }
    if let Some(template) = &changes.prompt_template {
        rule.prompt_template = template.clone();
    }
    if let Some(status) = changes.status {
        rule.status = status.as_str().to_owned();
    }
    if let Some(preview) = &changes.preview {
        rule.preview = preview.clone();
    }
    if let Some(next) = changes.next_run_at {
        rule.next_run_at = Some(next);
    }
    rule.updated_at = now;
}

fn replace_pool(t: &mut Tables, rule_id: DbId, product_ids: &[DbId]) {
    t.rule_products.retain(|(r, _)| *r != rule_id);
    for id in product_ids {
        if !t.rule_products.contains(&(rule_id, *id)) {
            t.rule_products.push((rule_id, *id));
        }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn create(&self, input: &NewRule) -> Result<Rule, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let rule = Rule {
            id: input.id,
            owner_id: input.owner_id,
            rule_name: input.rule_name.clone(),
            platform: input.platform.as_str().to_owned(),
            schedule_time: input.schedule_time.to_string(),
            frequency: input.frequency.clone(),
            prompt_template: input.prompt_template.clone(),
            status: RuleStatus::Active.as_str().to_owned(),
            preview: input.preview.clone(),
            last_run_at: None,
            next_run_at: Some(input.next_run_at),
            claimed_until: None,
            claim_run_id: None,
            created_at: now,
            updated_at: now,
        };
        t.rules.push(rule.clone());
        replace_pool(&mut t, rule.id, &input.product_ids);
        Ok(rule)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Rule>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.rules.iter().find(|r| r.id == id).cloned())
    }

    async fn find_for_owner(&self, id: DbId, owner_id: DbId) -> Result<Option<Rule>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.rules
            .iter()
            .find(|r| r.id == id && r.owner_id == owner_id)
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Rule>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.rules
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn product_ids(&self, rule_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.rule_products
            .iter()
            .filter(|(r, _)| *r == rule_id)
            .map(|(_, p)| *p)
            .collect())
    }

    async fn update(&self, id: DbId, changes: &RuleChanges) -> Result<Option<Rule>, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let Some(rule) = t.rules.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        apply_rule_changes(rule, changes, Utc::now());
        let rule = rule.clone();
        if let Some(product_ids) = &changes.product_ids {
            replace_pool(&mut t, id, product_ids);
        }
        Ok(Some(rule))
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let before = t.rules.len();
        t.rules.retain(|r| r.id != id);
        if t.rules.len() == before {
            return Ok(false);
        }
        t.rule_products.retain(|(r, _)| *r != id);
        t.posts.retain(|p| p.rule_id != id);
        t.runs.retain(|r| r.rule_id != id);
        Ok(true)
    }

    async fn find_due(&self, now: Timestamp, limit: i64) -> Result<Vec<DueRule>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        let mut due: Vec<DueRule> = t
            .rules
            .iter()
            .filter(|r| r.is_active())
            .filter(|r| r.next_run_at.map_or(true, |next| next <= now))
            .filter(|r| !r.is_claimed(now))
            .filter_map(|r| {
                let owner = t.accounts.iter().find(|a| a.id == r.owner_id)?;
                let credential = owner.credential()?;
                Some(DueRule {
                    rule: r.clone(),
                    page_id: credential.page_id.to_owned(),
                    page_name: owner.name.clone(),
                    page_token: credential.token.to_owned(),
                })
            })
            .collect();

        // `None < Some(_)` gives NULLS FIRST; the sort is stable.
        due.sort_by_key(|d| (d.rule.next_run_at, d.rule.created_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim(
        &self,
        id: DbId,
        run_id: DbId,
        until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        match t.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) if !rule.is_claimed(now) => {
                rule.claimed_until = Some(until);
                rule.claim_run_id = Some(run_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_claim(&self, id: DbId, run_id: DbId) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        match t.rules.iter_mut().find(|r| r.id == id) {
            Some(rule) if rule.claim_run_id == Some(run_id) => {
                rule.claimed_until = None;
                rule.claim_run_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_run(
        &self,
        id: DbId,
        bookkeeping: RunBookkeeping,
    ) -> Result<Option<Rule>, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let Some(rule) = t.rules.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        rule.last_run_at = Some(bookkeeping.last_run_at);
        rule.next_run_at = Some(bookkeeping.next_run_at);
        if bookkeeping.releases(rule.claim_run_id) {
            rule.claimed_until = None;
            rule.claim_run_id = None;
        }
        rule.updated_at = Utc::now();
        Ok(Some(rule.clone()))
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn create(&self, input: &NewProduct) -> Result<Product, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let product = Product {
            id: input.id,
            owner_id: input.owner_id,
            name: input.name.clone(),
            description: input.description.clone(),
            image_urls: input.image_urls.clone(),
            last_posted_at: None,
            created_at: now,
            updated_at: now,
        };
        t.products.push(product.clone());
        Ok(product)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Product>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_for_owner(&self, owner_id: DbId) -> Result<Vec<Product>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.products
            .iter()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: DbId, input: &UpdateProduct) -> Result<Option<Product>, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let Some(product) = t.products.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            product.name = name.clone();
        }
        if let Some(description) = &input.description {
            product.description = description.clone();
        }
        if let Some(images) = &input.image_urls {
            product.image_urls = images.clone();
        }
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let before = t.products.len();
        t.products.retain(|p| p.id != id);
        if t.products.len() == before {
            return Ok(false);
        }
        t.rule_products.retain(|(_, p)| *p != id);
        for run in t.runs.iter_mut().filter(|r| r.product_id == Some(id)) {
            run.product_id = None;
        }
        Ok(true)
    }

    async fn pool_for_rule(&self, rule_id: DbId) -> Result<Vec<Product>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.rule_products
            .iter()
            .filter(|(r, _)| *r == rule_id)
            .filter_map(|(_, pid)| t.products.iter().find(|p| p.id == *pid).cloned())
            .collect())
    }

    async fn least_recently_posted(&self, owner_id: DbId) -> Result<Option<Product>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        let owned: Vec<&Product> = t.products.iter().filter(|p| p.owner_id == owner_id).collect();
        Ok(least_recently_posted(&owned).map(|p| (*p).clone()))
    }

    async fn mark_posted(&self, id: DbId, at: Timestamp) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let Some(product) = t.products.iter_mut().find(|p| p.id == id) else {
            return Ok(false);
        };
        product.last_posted_at = Some(product.last_posted_at.map_or(at, |prev| prev.max(at)));
        Ok(true)
    }

    async fn count_owned(&self, owner_id: DbId, ids: &[DbId]) -> Result<i64, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        let count = t
            .products
            .iter()
            .filter(|p| p.owner_id == owner_id && ids.contains(&p.id))
            .count();
        Ok(count as i64)
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, input: &NewPost) -> Result<Post, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let post = Post {
            id: input.id,
            rule_id: input.rule_id,
            owner_id: input.owner_id,
            external_post_id: input.external_post_id.clone(),
            post_url: input.post_url.clone(),
            page_id: input.page_id.clone(),
            page_name: input.page_name.clone(),
            views: input.views,
            interactions: input.interactions,
            shares: input.shares,
            comments: input.comments,
            last_synced_at: input.last_synced_at,
            created_at: Utc::now(),
        };
        t.posts.push(post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Post>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_for_owner(
        &self,
        owner_id: DbId,
        rule_id: Option<DbId>,
    ) -> Result<Vec<Post>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.posts
            .iter()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .filter(|p| rule_id.map_or(true, |r| p.rule_id == r))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: DbId) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let before = t.posts.len();
        t.posts.retain(|p| p.id != id);
        Ok(t.posts.len() < before)
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create(&self, input: &NewAccount) -> Result<Account, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let account = Account {
            id: input.id,
            name: input.name.clone(),
            page_id: input.page_id.clone(),
            page_token: input.page_token.clone(),
            created_at: now,
            updated_at: now,
        };
        t.accounts.push(account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Account>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.accounts.iter().find(|a| a.id == id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[async_trait]
impl RunRepository for MemoryStore {
    async fn create(&self, input: &NewRun) -> Result<Run, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        let run = Run {
            id: input.id,
            rule_id: input.rule_id,
            product_id: input.product_id,
            trigger: input.trigger.as_str().to_owned(),
            dispatched_at: input.dispatched_at,
            reconciled_at: None,
            succeeded: None,
        };
        t.runs.push(run.clone());
        Ok(run)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Run>, sqlx::Error> {
        self.check()?;
        let t = self.tables.lock().await;
        Ok(t.runs.iter().find(|r| r.id == id).cloned())
    }

    async fn mark_reconciled(
        &self,
        id: DbId,
        at: Timestamp,
        succeeded: bool,
    ) -> Result<bool, sqlx::Error> {
        self.check()?;
        let mut t = self.tables.lock().await;
        match t.runs.iter_mut().find(|r| r.id == id) {
            Some(run) if run.reconciled_at.is_none() => {
                run.reconciled_at = Some(at);
                run.succeeded = Some(succeeded);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        self.check()
    }
}
