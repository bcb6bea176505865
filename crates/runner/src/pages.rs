//! Page display-name lookup against the platform's Graph API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RunnerError;

pub const DEFAULT_GRAPH_API_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_API_VERSION: &str = "v19.0";

/// Resolves the current display name of a publishing page.
#[async_trait]
pub trait PageDirectory: Send + Sync {
    /// Best effort: any failure yields `None` and is logged, never raised.
    async fn page_name(&self, page_id: &str, access_token: &str) -> Option<String>;
}

/// [`PageDirectory`] backed by `GET {base}/{version}/{page_id}?fields=name`.
///
/// The page token travels as a bearer header, never in the URL.
pub struct GraphPageDirectory {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct PageFields {
    name: Option<String>,
}

impl GraphPageDirectory {
    pub fn new(base_url: String, version: String, timeout: Duration) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            version,
        })
    }

    /// Look up a page's display name, surfacing failures.
    pub async fn fetch_name(
        &self,
        page_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, RunnerError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.version,
            page_id
        );
        let response = self
            .client
            .get(url)
            .query(&[("fields", "name")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunnerError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }
        let fields: PageFields = response.json().await.map_err(reqwest::Error::without_url)?;
        Ok(fields.name)
    }
}

#[async_trait]
impl PageDirectory for GraphPageDirectory {
    async fn page_name(&self, page_id: &str, access_token: &str) -> Option<String> {
        match self.fetch_name(page_id, access_token).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(page_id, error = %e, "Failed to fetch page name");
                None
            }
        }
    }
}
