//! Run entity: one row per dispatch, keyed by the run id handed to the
//! workflow runner. Reports carrying a run id are reconciled at most once.

use std::fmt;

use autopost_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    /// Claimed by the runner's due-rule poll.
    Poll,
    /// Dispatched by the owner through the manual trigger.
    Manual,
}

impl RunTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `rule_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: DbId,
    pub rule_id: DbId,
    pub product_id: Option<DbId>,
    pub trigger: String,
    pub dispatched_at: Timestamp,
    pub reconciled_at: Option<Timestamp>,
    pub succeeded: Option<bool>,
}

impl Run {
    pub fn is_reconciled(&self) -> bool {
        self.reconciled_at.is_some()
    }
}

/// Insert struct recorded at dispatch time.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: DbId,
    pub rule_id: DbId,
    pub product_id: Option<DbId>,
    pub trigger: RunTrigger,
    pub dispatched_at: Timestamp,
}
