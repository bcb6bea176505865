//! Due-rule polling: find, claim and describe the rules a runner should
//! execute now.

use std::sync::Arc;

use autopost_core::types::{new_id, DbId, Timestamp};
use autopost_db::models::product::Product;
use autopost_db::models::rule::DueRule;
use autopost_db::models::run::{NewRun, RunTrigger};
use autopost_db::repositories::{RuleRepository, RunRepository};
use serde::Serialize;

use crate::engine::abandon_run;
use crate::engine::selector::ProductSelector;
use crate::state::AppState;

/// Product fields a runner needs to generate content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProduct {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub image_urls: Vec<String>,
}

impl From<Product> for CandidateProduct {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            image_urls: p.image_urls,
        }
    }
}

/// One claimed rule handed to the runner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCandidate {
    pub rule_id: DbId,
    /// Must be echoed back in the outcome report.
    pub run_id: DbId,
    pub rule_name: String,
    pub platform: String,
    pub schedule_time: String,
    pub frequency: String,
    pub prompt_template: String,
    pub preview: Option<serde_json::Value>,
    pub product: Option<CandidateProduct>,
    pub page_id: String,
    pub page_name: Option<String>,
    pub page_token: String,
    pub user_id: DbId,
}

/// Response body of the due-rule poll.
#[derive(Debug, Clone, Serialize)]
pub struct DueBatch {
    pub rules: Vec<RunCandidate>,
    pub count: usize,
    pub timestamp: Timestamp,
}

/// Finds due rules and claims each one for a fresh run.
pub struct DueRuleFinder {
    rules: Arc<dyn RuleRepository>,
    runs: Arc<dyn RunRepository>,
    selector: ProductSelector,
    lease: chrono::Duration,
    limit: i64,
}

impl DueRuleFinder {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        runs: Arc<dyn RunRepository>,
        selector: ProductSelector,
        lease: chrono::Duration,
        limit: i64,
    ) -> Self {
        Self {
            rules,
            runs,
            selector,
            lease,
            limit,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::clone(&state.repos.rules),
            Arc::clone(&state.repos.runs),
            ProductSelector::new(Arc::clone(&state.repos.products)),
            chrono::Duration::seconds(state.config.claim_lease_secs),
            state.config.due_batch_limit,
        )
    }

    /// Claim the next batch of due rules at `now`.
    ///
    /// Rules another poller claimed first are dropped from the batch. Each
    /// returned candidate carries a newly minted run id and a `Run` record
    /// exists for it. On error no claim taken by this call survives.
    pub async fn claim_due(&self, now: Timestamp) -> Result<DueBatch, sqlx::Error> {
        let due = self.rules.find_due(now, self.limit).await?;
        let mut rules: Vec<RunCandidate> = Vec::with_capacity(due.len());

        for candidate in due {
            let run_id = new_id();
            let rule_id = candidate.rule.id;
            let step = match self.rules.claim(rule_id, run_id, now + self.lease, now).await {
                Ok(false) => {
                    tracing::debug!(rule_id = %rule_id, "Rule claimed by another poller, skipping");
                    continue;
                }
                Ok(true) => self.prepare(candidate, run_id, now).await,
                Err(e) => Err(e),
            };

            match step {
                Ok(prepared) => rules.push(prepared),
                Err(e) => {
                    tracing::warn!(rule_id = %rule_id, error = %e, "Due poll failed, abandoning claimed batch");
                    abandon_run(self.rules.as_ref(), self.runs.as_ref(), rule_id, run_id, now).await;
                    for claimed in &rules {
                        abandon_run(
                            self.rules.as_ref(),
                            self.runs.as_ref(),
                            claimed.rule_id,
                            claimed.run_id,
                            now,
                        )
                        .await;
                    }
                    return Err(e);
                }
            }
        }

        if !rules.is_empty() {
            tracing::info!(count = rules.len(), "Claimed due rules");
        }

        Ok(DueBatch {
            count: rules.len(),
            rules,
            timestamp: now,
        })
    }

    async fn prepare(
        &self,
        due: DueRule,
        run_id: DbId,
        now: Timestamp,
    ) -> Result<RunCandidate, sqlx::Error> {
        let product = self.selector.select(&due.rule).await?;
        self.runs
            .create(&NewRun {
                id: run_id,
                rule_id: due.rule.id,
                product_id: product.as_ref().map(|p| p.id),
                trigger: RunTrigger::Poll,
                dispatched_at: now,
            })
            .await?;

        let rule = due.rule;
        Ok(RunCandidate {
            rule_id: rule.id,
            run_id,
            rule_name: rule.rule_name,
            platform: rule.platform,
            schedule_time: rule.schedule_time,
            frequency: rule.frequency,
            prompt_template: rule.prompt_template,
            preview: rule.preview,
            product: product.map(CandidateProduct::from),
            page_id: due.page_id,
            page_name: due.page_name,
            page_token: due.page_token,
            user_id: rule.owner_id,
        })
    }
}
