use std::str::FromStr;

use autopost_core::schedule::ScheduleZone;
use autopost_runner::pages::{DEFAULT_GRAPH_API_BASE_URL, DEFAULT_GRAPH_API_VERSION};

use crate::auth::api_key::hash_api_key;
use crate::auth::jwt::{JwtConfig, DEFAULT_ACCESS_EXPIRY_MINS};

/// Startup configuration errors. Any of these aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Timeout for outbound runner and page-directory calls (default: `20`).
    /// Must be shorter than the request timeout.
    pub runner_timeout_secs: u64,
    /// Grace period for in-flight requests after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    /// Owner access-token validation.
    pub jwt: JwtConfig,
    /// SHA-256 digest of the runner's bearer key. `None` leaves the runner
    /// endpoints open.
    pub runner_api_key_hash: Option<String>,
    /// Runner webhook that receives manual triggers.
    pub runner_webhook_url: Option<String>,
    pub graph_api_base_url: String,
    pub graph_api_version: String,
    /// Zone schedule times are interpreted in.
    pub schedule_zone: ScheduleZone,
    /// How long a dispatched run holds its rule.
    pub claim_lease_secs: i64,
    /// Upper bound on rules handed out per due-rule poll.
    pub due_batch_limit: i64,
    /// Deployment environment name (`development`, `production`, ...).
    pub app_env: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                       |
    /// |-------------------------|-------------------------------|
    /// | `HOST`                  | `0.0.0.0`                     |
    /// | `PORT`                  | `3000`                        |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`       |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                          |
    /// | `RUNNER_TIMEOUT_SECS`   | `20`                          |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                          |
    /// | `JWT_SECRET`            | required                      |
    /// | `JWT_ACCESS_EXPIRY_MINS`| `15`                          |
    /// | `RUNNER_API_KEY`        | unset (runner endpoints open) |
    /// | `RUNNER_WEBHOOK_URL`    | unset (trigger returns 502)   |
    /// | `GRAPH_API_BASE_URL`    | `https://graph.facebook.com`  |
    /// | `GRAPH_API_VERSION`     | `v19.0`                       |
    /// | `SCHEDULE_TIMEZONE`     | `+07:00`                      |
    /// | `CLAIM_LEASE_SECS`      | `900`                         |
    /// | `DUE_BATCH_LIMIT`       | `10`                          |
    /// | `APP_ENV`               | `development`                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0");
        let port = parse_env("PORT", 3000u16)?;

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(ConfigError::Invalid {
                    name: "CORS_ORIGINS",
                    value: origin.clone(),
                    reason: "not a valid header value".into(),
                });
            }
        }

        let secret = non_empty_env("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt = JwtConfig {
            secret,
            access_token_expiry_mins: parse_env("JWT_ACCESS_EXPIRY_MINS", DEFAULT_ACCESS_EXPIRY_MINS)?,
        };

        let claim_lease_secs = parse_env("CLAIM_LEASE_SECS", 900i64)?;
        if claim_lease_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "CLAIM_LEASE_SECS",
                value: claim_lease_secs.to_string(),
                reason: "must be positive".into(),
            });
        }
        let due_batch_limit = parse_env("DUE_BATCH_LIMIT", 10i64)?;
        if due_batch_limit <= 0 {
            return Err(ConfigError::Invalid {
                name: "DUE_BATCH_LIMIT",
                value: due_batch_limit.to_string(),
                reason: "must be positive".into(),
            });
        }

        let request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", 30u64)?;
        let runner_timeout_secs = parse_env("RUNNER_TIMEOUT_SECS", 20u64)?;
        check_runner_timeout(request_timeout_secs, runner_timeout_secs)?;

        let schedule_zone = match non_empty_env("SCHEDULE_TIMEZONE") {
            Some(raw) => raw.parse().map_err(|e: autopost_core::error::CoreError| {
                ConfigError::Invalid {
                    name: "SCHEDULE_TIMEZONE",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => ScheduleZone::default(),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            runner_timeout_secs,
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30u64)?,
            jwt,
            runner_api_key_hash: non_empty_env("RUNNER_API_KEY").map(|k| hash_api_key(&k)),
            runner_webhook_url: non_empty_env("RUNNER_WEBHOOK_URL"),
            graph_api_base_url: env_or("GRAPH_API_BASE_URL", DEFAULT_GRAPH_API_BASE_URL),
            graph_api_version: env_or("GRAPH_API_VERSION", DEFAULT_GRAPH_API_VERSION),
            schedule_zone,
            claim_lease_secs,
            due_batch_limit,
            app_env: env_or("APP_ENV", "development"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

/// Outbound calls must time out before the request does.
fn check_runner_timeout(request_secs: u64, runner_secs: u64) -> Result<(), ConfigError> {
    if runner_secs == 0 || runner_secs >= request_secs {
        return Err(ConfigError::Invalid {
            name: "RUNNER_TIMEOUT_SECS",
            value: runner_secs.to_string(),
            reason: format!("must be between 1 and REQUEST_TIMEOUT_SECS ({request_secs}) exclusive"),
        });
    }
    Ok(())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    non_empty_env(name).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_env(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
