#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use autopost_api::auth::api_key::hash_api_key;
use autopost_api::auth::jwt::{generate_access_token, JwtConfig};
use autopost_api::config::ServerConfig;
use autopost_api::router::build_app_router;
use autopost_api::state::AppState;
use autopost_core::rule::Platform;
use autopost_core::schedule::{RunScheduler, ScheduleZone};
use autopost_core::types::{new_id, DbId, Timestamp};
use autopost_db::memory::MemoryStore;
use autopost_db::models::account::NewAccount;
use autopost_db::models::product::{NewProduct, Product};
use autopost_db::models::rule::{NewRule, Rule};
use autopost_db::repositories::{AccountRepository, ProductRepository, RuleRepository};
use autopost_db::Repositories;
use autopost_runner::{PageDirectory, RunPayload, RunnerError, WorkflowRunner};
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";
pub const RUNNER_KEY: &str = "runner-test-key";

/// Build a test `ServerConfig` with safe defaults.
///
/// Schedules in UTC so expected timestamps can be written literally.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        runner_timeout_secs: 20,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        runner_api_key_hash: Some(hash_api_key(RUNNER_KEY)),
        runner_webhook_url: Some("http://runner.test/webhook".to_string()),
        graph_api_base_url: "http://graph.test".to_string(),
        graph_api_version: "v19.0".to_string(),
        schedule_zone: ScheduleZone::utc(),
        claim_lease_secs: 900,
        due_batch_limit: 10,
        app_env: "test".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Records every payload; fails with `Rejected` when `fail_with` is set.
/// `delay` stalls each dispatch before it is recorded.
#[derive(Default)]
pub struct FakeRunner {
    pub payloads: Mutex<Vec<RunPayload>>,
    pub fail_with: Option<String>,
    pub unconfigured: bool,
    pub delay: Option<Duration>,
}

#[async_trait]
impl WorkflowRunner for FakeRunner {
    fn is_configured(&self) -> bool {
        !self.unconfigured
    }

    async fn dispatch(&self, payload: &RunPayload) -> Result<serde_json::Value, RunnerError> {
        if self.unconfigured {
            return Err(RunnerError::NotConfigured);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.payloads.lock().unwrap().push(payload.clone());
        match &self.fail_with {
            Some(message) => Err(RunnerError::Rejected {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(serde_json::json!({"status": "ok", "post_id": "1_2"})),
        }
    }
}

/// Answers every lookup with the same name (or none).
pub struct FakePages(pub Option<String>);

#[async_trait]
impl PageDirectory for FakePages {
    async fn page_name(&self, _page_id: &str, _access_token: &str) -> Option<String> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub runner: Arc<FakeRunner>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router over an in-memory store.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config(), FakeRunner::default())
}

pub fn build_test_app_with(config: ServerConfig, runner: FakeRunner) -> TestApp {
    let store = MemoryStore::new();
    let runner = Arc::new(runner);

    let state = AppState {
        repos: Repositories::in_memory(store.clone()),
        config: Arc::new(config.clone()),
        scheduler: RunScheduler::new(config.schedule_zone),
        runner: runner.clone(),
        pages: Arc::new(FakePages(None)),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        runner,
    }
}

pub fn owner_token(owner_id: DbId) -> String {
    generate_access_token(owner_id, &test_config().jwt).unwrap()
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub async fn seed_account(store: &MemoryStore, with_credential: bool) -> DbId {
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

pub async fn seed_product(store: &MemoryStore, owner_id: DbId, name: &str) -> Product {
    ProductRepository::create(
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
    .unwrap()
}

pub async fn seed_rule(
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

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Send a request with an optional bearer token and JSON body.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Unauthenticated GET.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
