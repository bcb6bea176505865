//! Product selection for a run.

use std::sync::Arc;

use autopost_core::rotation::least_recently_posted;
use autopost_db::models::product::Product;
use autopost_db::models::rule::Rule;
use autopost_db::repositories::ProductRepository;

/// Picks the product a run publishes.
///
/// A rule with an explicit pool rotates through that pool; a rule without
/// one rotates through the owner's whole catalog. Either way the product
/// posted longest ago wins and never-posted products come first.
#[derive(Clone)]
pub struct ProductSelector {
    products: Arc<dyn ProductRepository>,
}

impl ProductSelector {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    /// `None` when the owner has no product at all.
    pub async fn select(&self, rule: &Rule) -> Result<Option<Product>, sqlx::Error> {
        let pool = self.products.pool_for_rule(rule.id).await?;
        if !pool.is_empty() {
            return Ok(least_recently_posted(&pool).cloned());
        }
        self.products.least_recently_posted(rule.owner_id).await
    }
}
