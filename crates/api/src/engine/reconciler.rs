//! Applies runner-reported outcomes to persisted state.

use std::sync::Arc;

use autopost_core::content::{resolve_post_url, DEFAULT_POST_URL_BASE};
use autopost_core::error::CoreError;
use autopost_core::schedule::{RunOutcome, RunScheduler};
use autopost_core::types::{new_id, DbId, Timestamp};
use autopost_db::models::post::NewPost;
use autopost_db::models::rule::{Rule, RunBookkeeping};
use autopost_db::repositories::{
    AccountRepository, PostRepository, ProductRepository, RuleRepository, RunRepository,
};
use autopost_runner::PageDirectory;
use serde::{Deserialize, Serialize};

use crate::engine::{optional_id, require_id};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /runner/report`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReport {
    #[serde(default)]
    pub rule_id: Option<String>,
    /// Run id from the due-rule poll or manual trigger. Reports without one
    /// are applied every time they arrive.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub success: bool,
    pub post_url: Option<String>,
    pub post_id: Option<String>,
    pub page_id: Option<String>,
    pub page_name: Option<String>,
    pub views: Option<i64>,
    pub interactions: Option<i64>,
    pub shares: Option<i64>,
    pub comments: Option<i64>,
    pub error: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub next_run_at: Timestamp,
}

/// Reconciles run outcomes into rule bookkeeping, product rotation and posts.
pub struct OutcomeReconciler {
    rules: Arc<dyn RuleRepository>,
    products: Arc<dyn ProductRepository>,
    posts: Arc<dyn PostRepository>,
    accounts: Arc<dyn AccountRepository>,
    runs: Arc<dyn RunRepository>,
    pages: Arc<dyn PageDirectory>,
    scheduler: RunScheduler,
}

impl OutcomeReconciler {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            rules: Arc::clone(&state.repos.rules),
            products: Arc::clone(&state.repos.products),
            posts: Arc::clone(&state.repos.posts),
            accounts: Arc::clone(&state.repos.accounts),
            runs: Arc::clone(&state.repos.runs),
            pages: Arc::clone(&state.pages),
            scheduler: state.scheduler,
        }
    }

    /// Apply `report` at `now`.
    ///
    /// Nothing is written when the report is rejected (bad ids, unknown
    /// rule or run, run already reconciled).
    pub async fn reconcile(&self, report: &OutcomeReport, now: Timestamp) -> AppResult<OutcomeResponse> {
        let rule_id = require_id("ruleId", report.rule_id.as_deref())?;
        let run_id = optional_id("runId", report.run_id.as_deref())?;
        let reported_product = optional_id("productId", report.product_id.as_deref())?;

        let rule = self
            .rules
            .find_by_id(rule_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Rule",
                id: rule_id,
            }))?;

        let outcome = if report.success {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };
        let next_run_at = self.next_run(&rule, outcome, now)?;

        let mut run_product = None;
        if let Some(run_id) = run_id {
            run_product = self.close_run(run_id, rule.id, report.success, now).await?;
        }

        if report.success {
            self.record_post(&rule, report, now).await?;

            if let Some(product_id) = reported_product.or(run_product) {
                if !self.products.mark_posted(product_id, now).await? {
                    tracing::warn!(product_id = %product_id, "Reported product not updated");
                }
            }
        }

        self.rules
            .record_run(
                rule.id,
                RunBookkeeping {
                    last_run_at: now,
                    next_run_at,
                    run_id,
                },
            )
            .await?;

        tracing::info!(
            rule_id = %rule.id,
            success = report.success,
            next_run_at = %next_run_at,
            "Run outcome reconciled",
        );

        Ok(if report.success {
            OutcomeResponse {
                success: true,
                message: "Post recorded and schedule advanced".into(),
                error: None,
                next_run_at,
            }
        } else {
            OutcomeResponse {
                success: false,
                message: "Run failed; retry scheduled".into(),
                error: Some(
                    report
                        .error
                        .clone()
                        .unwrap_or_else(|| "Unknown error".into()),
                ),
                next_run_at,
            }
        })
    }

    fn next_run(&self, rule: &Rule, outcome: RunOutcome, now: Timestamp) -> AppResult<Timestamp> {
        let time = rule.schedule_time().map_err(|e| {
            AppError::InternalError(format!("Rule {} has a malformed schedule time: {e}", rule.id))
        })?;
        Ok(self.scheduler.next_run(time, rule.frequency(), now, outcome))
    }

    /// Mark the run reconciled, returning the product it was dispatched with.
    async fn close_run(
        &self,
        run_id: DbId,
        rule_id: DbId,
        succeeded: bool,
        now: Timestamp,
    ) -> AppResult<Option<DbId>> {
        let run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Run",
                id: run_id,
            }))?;

        if run.rule_id != rule_id {
            return Err(AppError::BadRequest(format!(
                "Run {run_id} does not belong to rule {rule_id}"
            )));
        }

        let already = || {
            AppError::Core(CoreError::Conflict(format!(
                "Run {run_id} has already been reconciled"
            )))
        };
        if run.is_reconciled() {
            return Err(already());
        }
        // Concurrent duplicates race here; only one wins.
        if !self.runs.mark_reconciled(run_id, now, succeeded).await? {
            return Err(already());
        }
        Ok(run.product_id)
    }

    async fn record_post(&self, rule: &Rule, report: &OutcomeReport, now: Timestamp) -> AppResult<()> {
        let account = self.accounts.find_by_id(rule.owner_id).await?;
        let stored_page_id = account.as_ref().and_then(|a| a.page_id.clone());
        let stored_name = account.as_ref().and_then(|a| a.name.clone());
        let token = account.as_ref().and_then(|a| a.page_token.clone());

        let page_id = report.page_id.clone().or(stored_page_id);
        let mut page_name = report.page_name.clone().or(stored_name);

        if let (Some(page_id), Some(token)) = (page_id.as_deref(), token.as_deref()) {
            if let Some(name) = self.pages.page_name(page_id, token).await {
                page_name = Some(name);
            }
        }

        let post = self
            .posts
            .create(&NewPost {
                id: new_id(),
                rule_id: rule.id,
                owner_id: rule.owner_id,
                external_post_id: report.post_id.clone(),
                post_url: resolve_post_url(
                    report.post_url.as_deref(),
                    report.post_id.as_deref(),
                    DEFAULT_POST_URL_BASE,
                ),
                page_id,
                page_name,
                views: report.views.unwrap_or(0),
                interactions: report.interactions.unwrap_or(0),
                shares: report.shares.unwrap_or(0),
                comments: report.comments.unwrap_or(0),
                last_synced_at: Some(now),
            })
            .await?;

        tracing::info!(rule_id = %rule.id, post_id = %post.id, "Post recorded");
        Ok(())
    }
}
