use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use autopost_api::config::ServerConfig;
use autopost_api::router::build_app_router;
use autopost_api::state::AppState;
use autopost_core::schedule::RunScheduler;
use autopost_db::Repositories;
use autopost_runner::{GraphPageDirectory, HttpWorkflowRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "autopost_api=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        schedule_zone = %config.schedule_zone,
        app_env = %config.app_env,
        "Loaded server configuration",
    );
    if config.runner_api_key_hash.is_none() {
        tracing::warn!("RUNNER_API_KEY is not set; runner endpoints accept unauthenticated requests");
    }
    if config.runner_webhook_url.is_none() {
        tracing::warn!("RUNNER_WEBHOOK_URL is not set; manual triggers will fail");
    }

    // --- Database ---
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;

    let pool = autopost_db::create_pool(&database_url).await?;
    tracing::info!("Database connection pool created");

    autopost_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    autopost_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    // --- Outbound clients ---
    let outbound_timeout = Duration::from_secs(config.runner_timeout_secs);
    let runner = HttpWorkflowRunner::new(config.runner_webhook_url.clone(), outbound_timeout)?;
    let pages = GraphPageDirectory::new(
        config.graph_api_base_url.clone(),
        config.graph_api_version.clone(),
        outbound_timeout,
    )?;

    // --- App state ---
    let state = AppState {
        repos: Repositories::postgres(pool.clone()),
        config: Arc::new(config.clone()),
        scheduler: RunScheduler::new(config.schedule_zone),
        runner: Arc::new(runner),
        pages: Arc::new(pages),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, mut draining_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(true);
        })
        .into_future();

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let drain_deadline = async move {
        if draining_rx.changed().await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result?,
        () = drain_deadline => {
            tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed, dropping in-flight requests");
        }
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
