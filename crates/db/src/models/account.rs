//! Account entity: the owner of rules and products, holding the page
//! credential the runner publishes with.

use autopost_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: DbId,
    pub name: Option<String>,
    pub page_id: Option<String>,
    #[serde(skip_serializing)]
    pub page_token: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Borrowed view of a complete page credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCredential<'a> {
    pub page_id: &'a str,
    pub token: &'a str,
}

impl Account {
    /// The publishing credential, present only when both halves are set.
    pub fn credential(&self) -> Option<PageCredential<'_>> {
        match (self.page_id.as_deref(), self.page_token.as_deref()) {
            (Some(page_id), Some(token)) => Some(PageCredential { page_id, token }),
            _ => None,
        }
    }
}

/// Insert struct used when provisioning accounts (identity sync, tests).
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub id: DbId,
    pub name: Option<String>,
    pub page_id: Option<String>,
    pub page_token: Option<String>,
}
