//! Owner-initiated immediate dispatch of a rule to the workflow runner.

use std::sync::Arc;

use autopost_core::content::{resolve_run_content, ProductRef};
use autopost_core::error::CoreError;
use autopost_core::types::{new_id, DbId, Timestamp};
use autopost_db::models::run::{NewRun, RunTrigger};
use autopost_db::repositories::{AccountRepository, RuleRepository, RunRepository};
use autopost_runner::{RunPayload, RunnerError, WorkflowRunner};
use serde::{Deserialize, Serialize};

use crate::engine::{abandon_run, require_id};
use crate::engine::selector::ProductSelector;
use crate::error::{AppError, AppResult, UpstreamDebug};
use crate::state::AppState;

/// Body of `POST /rules/trigger`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    #[serde(default)]
    pub rule_id: Option<String>,
    /// Text the owner edited in the preview dialog; wins over the cached preview.
    #[serde(default)]
    pub edited_preview_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub message: String,
    /// The runner's response body, passed through.
    pub data: serde_json::Value,
    pub run_id: DbId,
}

/// Sends one rule to the runner right now.
pub struct TriggerDispatcher {
    rules: Arc<dyn RuleRepository>,
    accounts: Arc<dyn AccountRepository>,
    runs: Arc<dyn RunRepository>,
    selector: ProductSelector,
    runner: Arc<dyn WorkflowRunner>,
    lease: chrono::Duration,
    expose_debug: bool,
}

impl TriggerDispatcher {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            rules: Arc::clone(&state.repos.rules),
            accounts: Arc::clone(&state.repos.accounts),
            runs: Arc::clone(&state.repos.runs),
            selector: ProductSelector::new(Arc::clone(&state.repos.products)),
            runner: Arc::clone(&state.runner),
            lease: chrono::Duration::seconds(state.config.claim_lease_secs),
            expose_debug: !state.config.is_production(),
        }
    }

    /// Dispatch `request.rule_id` on behalf of `owner_id`.
    ///
    /// The rule is claimed for a new run before the runner is called. A
    /// runner failure releases the claim and closes the run as failed
    /// without touching the rule's schedule.
    pub async fn trigger(
        &self,
        owner_id: DbId,
        request: &TriggerRequest,
        now: Timestamp,
    ) -> AppResult<TriggerResponse> {
        let rule_id = require_id("ruleId", request.rule_id.as_deref())?;

        if !self.runner.is_configured() {
            return Err(self.upstream(&RunnerError::NotConfigured));
        }

        let rule = self
            .rules
            .find_for_owner(rule_id, owner_id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Rule",
                id: rule_id,
            }))?;

        if !rule.is_active() {
            return Err(CoreError::Precondition("Rule is not active".into()).into());
        }

        let account = self.accounts.find_by_id(owner_id).await?;
        if account.as_ref().and_then(|a| a.credential()).is_none() {
            return Err(CoreError::Precondition("No publishing page is connected".into()).into());
        }

        let product = self
            .selector
            .select(&rule)
            .await?
            .ok_or_else(|| CoreError::Precondition("No product available to post".into()))?;

        let preview = rule.preview();
        // An edited text that is present but empty still overrides the preview.
        let content = resolve_run_content(
            request.edited_preview_text.as_deref(),
            preview.as_ref(),
            ProductRef {
                name: &product.name,
                first_image: product.first_image(),
            },
        );

        let run_id = new_id();
        if !self
            .rules
            .claim(rule.id, run_id, now + self.lease, now)
            .await?
        {
            return Err(CoreError::Conflict("Rule already has a run in progress".into()).into());
        }

        let recorded = self
            .runs
            .create(&NewRun {
                id: run_id,
                rule_id: rule.id,
                product_id: Some(product.id),
                trigger: RunTrigger::Manual,
                dispatched_at: now,
            })
            .await;
        if let Err(e) = recorded {
            abandon_run(self.rules.as_ref(), self.runs.as_ref(), rule.id, run_id, now).await;
            return Err(e.into());
        }

        let payload = RunPayload {
            user_id: owner_id,
            rule_id: rule.id,
            run_id,
            preview_data: content,
        };

        match self.dispatch_detached(payload, now).await? {
            Ok(data) => {
                tracing::info!(rule_id = %rule.id, run_id = %run_id, "Rule dispatched to runner");
                Ok(TriggerResponse {
                    success: true,
                    message: "Workflow runner triggered".into(),
                    data,
                    run_id,
                })
            }
            Err(err) => Err(self.upstream(&err)),
        }
    }

    /// Call the runner on a spawned task that also abandons the run on
    /// failure. The task outlives the request, so a request timeout cannot
    /// leave the rule claimed.
    async fn dispatch_detached(
        &self,
        payload: RunPayload,
        now: Timestamp,
    ) -> AppResult<Result<serde_json::Value, RunnerError>> {
        let rules = Arc::clone(&self.rules);
        let runs = Arc::clone(&self.runs);
        let runner = Arc::clone(&self.runner);

        let task = tokio::spawn(async move {
            let result = runner.dispatch(&payload).await;
            if let Err(e) = &result {
                tracing::debug!(rule_id = %payload.rule_id, run_id = %payload.run_id, error = %e, "Runner dispatch failed, abandoning run");
                abandon_run(rules.as_ref(), runs.as_ref(), payload.rule_id, payload.run_id, now).await;
            }
            result
        });

        task.await
            .map_err(|e| AppError::InternalError(format!("Runner dispatch task failed: {e}")))
    }

    fn upstream(&self, err: &RunnerError) -> AppError {
        AppError::Upstream {
            message: err.to_string(),
            debug: self.expose_debug.then(|| UpstreamDebug {
                error_type: err.kind(),
                runner_configured: self.runner.is_configured(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use autopost_db::memory::MemoryStore;
    use chrono::{Duration, Utc};

    use super::*;
    use crate::engine::fixtures;

    struct AcceptingRunner;

    #[async_trait]
    impl WorkflowRunner for AcceptingRunner {
        fn is_configured(&self) -> bool {
            true
        }

        async fn dispatch(&self, _payload: &RunPayload) -> Result<serde_json::Value, RunnerError> {
            Ok(serde_json::json!({}))
        }
    }

    fn dispatcher(store: &MemoryStore, runs: Arc<dyn RunRepository>) -> TriggerDispatcher {
        let shared = Arc::new(store.clone());
        TriggerDispatcher {
            rules: shared.clone(),
            accounts: shared.clone(),
            runs,
            selector: ProductSelector::new(shared),
            runner: Arc::new(AcceptingRunner),
            lease: Duration::minutes(15),
            expose_debug: true,
        }
    }

    fn request(rule_id: DbId) -> TriggerRequest {
        TriggerRequest {
            rule_id: Some(rule_id.to_string()),
            edited_preview_text: None,
        }
    }

    #[tokio::test]
    async fn run_record_failure_releases_claim() {
        let store = MemoryStore::new();
        let owner = fixtures::account(&store, true).await;
        fixtures::product(&store, owner, "tea", None).await;
        let now = Utc::now();
        let rule = fixtures::rule(&store, owner, now, vec![]).await;

        let failing = dispatcher(&store, Arc::new(fixtures::FailingRuns::new(&store, 0)));
        let err = failing.trigger(owner, &request(rule.id), now).await.unwrap_err();
        assert_matches!(err, AppError::Database(_));

        let stored = RuleRepository::find_by_id(&store, rule.id).await.unwrap().unwrap();
        assert!(!stored.is_claimed(now));

        let healthy = dispatcher(&store, Arc::new(store.clone()));
        let response = healthy.trigger(owner, &request(rule.id), now).await.unwrap();
        assert!(response.success);
    }
}
