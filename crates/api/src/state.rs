use std::sync::Arc;

use autopost_core::schedule::RunScheduler;
use autopost_db::Repositories;
use autopost_runner::{PageDirectory, WorkflowRunner};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Injected repositories (PostgreSQL in production, in-memory in tests).
    pub repos: Repositories,
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// The single scheduler every `next_run_at` computation goes through.
    pub scheduler: RunScheduler,
    /// Outbound client for the workflow runner webhook.
    pub runner: Arc<dyn WorkflowRunner>,
    /// Page display-name lookup used when recording posts.
    pub pages: Arc<dyn PageDirectory>,
}
