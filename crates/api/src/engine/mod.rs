//! Rule execution engine.
//!
//! - [`due`] -- finds due rules, claims them and hands them to the runner.
//! - [`selector`] -- least-recently-posted product selection.
//! - [`dispatcher`] -- owner-initiated immediate dispatch to the runner.
//! - [`reconciler`] -- applies reported run outcomes to rules, products and posts.
//!
//! Every component takes its repositories as injected trait objects and
//! receives `now` from the caller.

pub mod dispatcher;
pub mod due;
pub mod reconciler;
pub mod selector;

use autopost_core::types::{DbId, Timestamp};
use autopost_db::repositories::{RuleRepository, RunRepository};

use crate::error::AppError;

/// Give up a claimed run: drop the rule's claim and close the run as failed.
///
/// Callers are already on an error path, so store failures here are logged
/// rather than returned. A run that was never recorded is left alone.
pub(crate) async fn abandon_run(
    rules: &dyn RuleRepository,
    runs: &dyn RunRepository,
    rule_id: DbId,
    run_id: DbId,
    now: Timestamp,
) {
    if let Err(e) = rules.release_claim(rule_id, run_id).await {
        tracing::warn!(rule_id = %rule_id, run_id = %run_id, error = %e, "Failed to release claim");
    }
    if let Err(e) = runs.mark_reconciled(run_id, now, false).await {
        tracing::warn!(run_id = %run_id, error = %e, "Failed to close abandoned run");
    }
}

/// Parse a required id field from a request body.
///
/// Missing, empty and malformed values are all rejected with 400.
pub(crate) fn require_id(field: &str, raw: Option<&str>) -> Result<DbId, AppError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))?;
    parse_id(field, raw)
}

/// Parse an optional id field. Empty strings count as absent.
pub(crate) fn optional_id(field: &str, raw: Option<&str>) -> Result<Option<DbId>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_id(field, raw).map(Some),
        None => Ok(None),
    }
}

fn parse_id(field: &str, raw: &str) -> Result<DbId, AppError> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("{field} is not a valid id")))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Seed helpers shared by the engine unit tests.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use autopost_core::rule::Platform;
    use autopost_core::types::{new_id, DbId, Timestamp};
    use autopost_db::memory::MemoryStore;
    use autopost_db::models::account::NewAccount;
    use autopost_db::models::product::{NewProduct, Product};
    use autopost_db::models::rule::{NewRule, Rule};
    use autopost_db::models::run::{NewRun, Run};
    use autopost_db::repositories::{
        AccountRepository, ProductRepository, RuleRepository, RunRepository,
    };

    pub async fn account(store: &MemoryStore, with_credential: bool) -> DbId {
        let id = new_id();
        AccountRepository::create(
            store,
            &NewAccount {
                id,
                name: Some("Tea House".into()),
                page_id: with_credential.then(|| "page-1".to_string()),
                page_token: with_credential.then(|| "token-1".to_string()),
            },
        )
        .await
        .unwrap();
        id
    }

    pub async fn product(
        store: &MemoryStore,
        owner_id: DbId,
        name: &str,
        last_posted_at: Option<Timestamp>,
    ) -> Product {
        let product = ProductRepository::create(
            store,
            &NewProduct {
                id: new_id(),
                owner_id,
                name: name.into(),
                description: format!("{name} description"),
                image_urls: vec![format!("https://cdn/{name}.png")],
            },
        )
        .await
        .unwrap();
        store.set_last_posted(product.id, last_posted_at).await;
        Product {
            last_posted_at,
            ..product
        }
    }

    pub async fn rule(
        store: &MemoryStore,
        owner_id: DbId,
        next_run_at: Timestamp,
        product_ids: Vec<DbId>,
    ) -> Rule {
        RuleRepository::create(
            store,
            &NewRule {
                id: new_id(),
                owner_id,
                rule_name: "Morning post".into(),
                platform: Platform::Social,
                schedule_time: "09:00".parse().unwrap(),
                frequency: "DAILY".into(),
                prompt_template: "Write about [PRODUCT_NAME]".into(),
                preview: None,
                next_run_at,
                product_ids,
            },
        )
        .await
        .unwrap()
    }

    /// Run store whose `create` starts failing after `succeed` inserts.
    pub struct FailingRuns {
        store: MemoryStore,
        succeed: usize,
        created: AtomicUsize,
    }

    impl FailingRuns {
        pub fn new(store: &MemoryStore, succeed: usize) -> Self {
            Self {
                store: store.clone(),
                succeed,
                created: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RunRepository for FailingRuns {
        async fn create(&self, input: &NewRun) -> Result<Run, sqlx::Error> {
            if self.created.fetch_add(1, Ordering::SeqCst) >= self.succeed {
                return Err(sqlx::Error::PoolTimedOut);
            }
            RunRepository::create(&self.store, input).await
        }

        async fn find_by_id(&self, id: DbId) -> Result<Option<Run>, sqlx::Error> {
            RunRepository::find_by_id(&self.store, id).await
        }

        async fn mark_reconciled(
            &self,
            id: DbId,
            at: Timestamp,
            succeeded: bool,
        ) -> Result<bool, sqlx::Error> {
            self.store.mark_reconciled(id, at, succeeded).await
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn require_id_rejects_missing_and_malformed() {
        assert_matches!(require_id("ruleId", None), Err(AppError::BadRequest(m)) if m == "ruleId is required");
        assert_matches!(require_id("ruleId", Some("  ")), Err(AppError::BadRequest(_)));
        assert_matches!(require_id("ruleId", Some("abc")), Err(AppError::BadRequest(m)) if m == "ruleId is not a valid id");

        let id = autopost_core::types::new_id();
        assert_eq!(require_id("ruleId", Some(&id.to_string())).unwrap(), id);
    }

    #[test]
    fn optional_id_treats_empty_as_absent() {
        assert_eq!(optional_id("productId", Some("")).unwrap(), None);
        assert_eq!(optional_id("productId", None).unwrap(), None);
        assert!(optional_id("productId", Some("nope")).is_err());
    }
}
