//! Rule vocabulary shared by every layer: target platform, posting
//! frequency and lifecycle status.
//!
//! Values are persisted as upper-case TEXT (`"SOCIAL"`, `"DAILY"`,
//! `"ACTIVE"`) so the database rows stay readable without lookup tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// Where the runner publishes the generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    /// A social page (the dashboard form calls it `FACEBOOK`).
    #[serde(alias = "FACEBOOK")]
    Social,
    Email,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Social => "SOCIAL",
            Self::Email => "EMAIL",
        }
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOCIAL" | "FACEBOOK" => Ok(Self::Social),
            "EMAIL" => Ok(Self::Email),
            other => Err(CoreError::Validation(format!("Unknown platform: {other}"))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// How often a rule fires after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    /// Interpret a stored frequency label.
    ///
    /// Unknown labels fall back to [`Frequency::Daily`]; rows written by
    /// older clients may carry values this enum does not know.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "WEEKLY" => Self::Weekly,
            _ => Self::Daily,
        }
    }

    /// Whole days between two successful runs.
    pub fn interval_days(self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
        }
    }
}

/// Strict parse for owner input; stored labels go through [`Frequency::from_label`].
impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            other => Err(CoreError::Validation(format!("Unknown frequency: {other}"))),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Rule lifecycle status. Only `Active` rules are ever dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    Active,
    Inactive,
}

impl RuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }

    /// The opposite status, used by the status toggle.
    pub fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Inactive,
            Self::Inactive => Self::Active,
        }
    }
}

impl FromStr for RuleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(CoreError::Validation(format!("Unknown rule status: {other}"))),
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
