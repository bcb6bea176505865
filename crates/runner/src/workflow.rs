//! Client for the external workflow runner's trigger webhook.
//!
//! The runner receives the owner id, rule id, run id and the resolved
//! content. Page credentials are never sent; the runner resolves them from
//! the owner id when it executes.

use std::time::Duration;

use async_trait::async_trait;
use autopost_core::content::RunContent;
use autopost_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Message substituted when the runner reports the webhook is not registered.
pub const NOT_REGISTERED_MESSAGE: &str = "The runner workflow webhook is not active. \
    Open the workflow in the runner and execute it once, or activate the workflow \
    to use its production webhook.";

/// Body sent to the runner webhook.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload {
    pub user_id: DbId,
    pub rule_id: DbId,
    pub run_id: DbId,
    pub preview_data: RunContent,
}

/// Hands a run to the external workflow runner.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Whether a runner endpoint is configured at all.
    fn is_configured(&self) -> bool;

    /// Send one run. Returns the runner's response body; non-JSON bodies are
    /// wrapped as `{"message": text}` and empty bodies become `{}`.
    async fn dispatch(&self, payload: &RunPayload) -> Result<serde_json::Value, RunnerError>;
}

/// reqwest-backed [`WorkflowRunner`] posting JSON to a webhook URL.
pub struct HttpWorkflowRunner {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl HttpWorkflowRunner {
    /// Create a runner client. `webhook_url = None` yields a client whose
    /// every dispatch fails with [`RunnerError::NotConfigured`].
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Ensure the response has a success status code, turning failures
    /// into [`RunnerError::Rejected`] with the extracted message.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RunnerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("unknown status");
            return Err(RunnerError::Rejected {
                status: status.as_u16(),
                message: rejection_message(reason, &body),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl WorkflowRunner for HttpWorkflowRunner {
    fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn dispatch(&self, payload: &RunPayload) -> Result<serde_json::Value, RunnerError> {
        let url = self.webhook_url.as_deref().ok_or(RunnerError::NotConfigured)?;

        tracing::debug!(rule_id = %payload.rule_id, run_id = %payload.run_id, "Calling runner webhook");

        let response = self.client.post(url).json(payload).send().await?;
        tracing::debug!(status = response.status().as_u16(), "Runner webhook responded");

        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        Ok(response_body(&text))
    }
}

// ---------------------------------------------------------------------------
// Body interpretation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RunnerErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

impl RunnerErrorBody {
    fn is_not_registered(&self) -> bool {
        let code_is_404 = match &self.code {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(404),
            Some(serde_json::Value::String(s)) => s == "404",
            _ => false,
        };
        code_is_404
            && self
                .message
                .as_deref()
                .is_some_and(|m| m.contains("not registered"))
    }
}

/// Build the message for a rejected webhook call.
///
/// A JSON body contributes `message` (else `error`); a not-registered 404
/// is replaced by [`NOT_REGISTERED_MESSAGE`]; a `hint` is appended. A body
/// that is not JSON is appended verbatim to the generic message.
pub fn rejection_message(reason: &str, body: &str) -> String {
    let generic = format!("Runner webhook failed: {reason}");

    match serde_json::from_str::<RunnerErrorBody>(body) {
        Ok(parsed) => {
            let mut message = if parsed.is_not_registered() {
                NOT_REGISTERED_MESSAGE.to_owned()
            } else {
                parsed
                    .message
                    .clone()
                    .or_else(|| parsed.error.clone())
                    .unwrap_or(generic)
            };
            if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
                message.push_str("\n\nHint: ");
                message.push_str(&hint);
            }
            message
        }
        Err(_) if body.trim().is_empty() => generic,
        Err(_) => format!("{generic} - {body}"),
    }
}

/// Interpret a successful response body.
pub fn response_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        tracing::warn!("Runner webhook returned an empty body");
        return serde_json::json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| {
        tracing::warn!("Runner webhook returned a non-JSON body");
        serde_json::json!({ "message": text })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_field_wins_over_error_field() {
        let msg = rejection_message("Bad Request", r#"{"message":"boom","error":"other"}"#);
        assert_eq!(msg, "boom");

        let msg = rejection_message("Bad Request", r#"{"error":"only error"}"#);
        assert_eq!(msg, "only error");
    }

    #[test]
    fn not_registered_is_rewritten_and_hint_appended() {
        let body = r#"{"code":404,"message":"The requested webhook \"POST abc\" is not registered.","hint":"Click the 'Execute workflow' button"}"#;
        let msg = rejection_message("Not Found", body);
        assert!(msg.starts_with(NOT_REGISTERED_MESSAGE));
        assert!(msg.ends_with("\n\nHint: Click the 'Execute workflow' button"));
    }

    #[test]
    fn not_registered_requires_404_code() {
        let body = r#"{"code":500,"message":"workflow not registered"}"#;
        assert_eq!(rejection_message("Internal Server Error", body), "workflow not registered");
    }

    #[test]
    fn plain_text_body_is_appended() {
        assert_eq!(
            rejection_message("Bad Gateway", "upstream down"),
            "Runner webhook failed: Bad Gateway - upstream down"
        );
        assert_eq!(
            rejection_message("Bad Gateway", ""),
            "Runner webhook failed: Bad Gateway"
        );
    }

    #[test]
    fn json_without_message_keeps_generic_text() {
        assert_eq!(
            rejection_message("Forbidden", r#"{"status":"denied"}"#),
            "Runner webhook failed: Forbidden"
        );
    }

    #[test]
    fn success_bodies_are_normalized() {
        assert_eq!(response_body(""), serde_json::json!({}));
        assert_eq!(
            response_body(r#"{"status":"ok","post_id":"1_2"}"#),
            serde_json::json!({"status":"ok","post_id":"1_2"})
        );
        assert_eq!(
            response_body("Workflow was started"),
            serde_json::json!({"message":"Workflow was started"})
        );
    }
}
