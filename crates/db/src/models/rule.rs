//! Posting rule entity, DTOs and the due-rule projection.

use autopost_core::content::RulePreview;
use autopost_core::error::CoreError;
use autopost_core::rule::{Frequency, Platform, RuleStatus};
use autopost_core::schedule::ScheduleTime;
use autopost_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use super::double_option;

/// A row from the `rules` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: DbId,
    pub owner_id: DbId,
    pub rule_name: String,
    pub platform: String,
    pub schedule_time: String,
    pub frequency: String,
    pub prompt_template: String,
    pub status: String,
    pub preview: Option<serde_json::Value>,
    pub last_run_at: Option<Timestamp>,
    pub next_run_at: Option<Timestamp>,
    pub claimed_until: Option<Timestamp>,
    pub claim_run_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Rule {
    pub fn status(&self) -> RuleStatus {
        self.status.parse().unwrap_or(RuleStatus::Inactive)
    }

    pub fn is_active(&self) -> bool {
        self.status() == RuleStatus::Active
    }

    /// Stored frequency label; unknown labels schedule like `DAILY`.
    pub fn frequency(&self) -> Frequency {
        Frequency::from_label(&self.frequency)
    }

    pub fn schedule_time(&self) -> Result<ScheduleTime, CoreError> {
        self.schedule_time.parse()
    }

    /// The cached preview, if one is stored and well-formed.
    pub fn preview(&self) -> Option<RulePreview> {
        self.preview
            .as_ref()
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether another dispatch currently holds the rule.
    pub fn is_claimed(&self, now: Timestamp) -> bool {
        self.claimed_until.is_some_and(|until| until > now)
    }
}

/// A due rule joined with its owner's page credential.
#[derive(Debug, Clone, FromRow)]
pub struct DueRule {
    #[sqlx(flatten)]
    pub rule: Rule,
    pub page_id: String,
    pub page_name: Option<String>,
    pub page_token: String,
}

fn validate_schedule_time(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<ScheduleTime>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("schedule_time").with_message("scheduleTime must be HH:MM".into()))
}

/// DTO for creating a rule.
///
/// Every field defaults so that missing values surface as validation
/// errors (400) rather than body rejections.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRule {
    #[serde(default)]
    #[validate(length(min = 1, message = "ruleName is required"))]
    pub rule_name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "platform is required"))]
    pub platform: String,
    #[serde(default)]
    #[validate(custom(function = "validate_schedule_time"))]
    pub schedule_time: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "frequency is required"))]
    pub frequency: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "promptTemplate is required"))]
    pub prompt_template: String,
    /// Kept untyped so a non-array value is reported as a 400.
    #[serde(default)]
    pub product_ids: Option<serde_json::Value>,
    #[serde(default)]
    pub preview: Option<serde_json::Value>,
}

/// DTO for a partial rule update. Absent fields are left untouched;
/// `preview: null` clears the cached preview.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRule {
    pub rule_name: Option<String>,
    pub platform: Option<String>,
    pub schedule_time: Option<String>,
    pub frequency: Option<String>,
    pub prompt_template: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub product_ids: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "double_option")]
    pub preview: Option<Option<serde_json::Value>>,
}

impl UpdateRule {
    pub fn is_empty(&self) -> bool {
        self.rule_name.is_none()
            && self.platform.is_none()
            && self.schedule_time.is_none()
            && self.frequency.is_none()
            && self.prompt_template.is_none()
            && self.status.is_none()
            && self.product_ids.is_none()
            && self.preview.is_none()
    }
}

/// Insert struct for a validated rule.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub id: DbId,
    pub owner_id: DbId,
    pub rule_name: String,
    pub platform: Platform,
    pub schedule_time: ScheduleTime,
    pub frequency: String,
    pub prompt_template: String,
    pub preview: Option<serde_json::Value>,
    pub next_run_at: Timestamp,
    pub product_ids: Vec<DbId>,
}

/// Validated patch applied by [`RuleRepository::update`](crate::repositories::RuleRepository::update).
#[derive(Debug, Clone, Default)]
pub struct RuleChanges {
    pub rule_name: Option<String>,
    pub platform: Option<Platform>,
    pub schedule_time: Option<ScheduleTime>,
    pub frequency: Option<String>,
    pub prompt_template: Option<String>,
    pub status: Option<RuleStatus>,
    pub preview: Option<Option<serde_json::Value>>,
    pub next_run_at: Option<Timestamp>,
    pub product_ids: Option<Vec<DbId>>,
}

/// Bookkeeping written by the reconciler after a run attempt.
#[derive(Debug, Clone, Copy)]
pub struct RunBookkeeping {
    pub last_run_at: Timestamp,
    pub next_run_at: Timestamp,
    /// The reported run. A claim held by a different run survives; `None`
    /// clears whatever claim is present.
    pub run_id: Option<DbId>,
}

impl RunBookkeeping {
    /// Whether writing this bookkeeping releases a claim held by `holder`.
    pub fn releases(&self, holder: Option<DbId>) -> bool {
        match (self.run_id, holder) {
            (None, _) | (_, None) => true,
            (Some(run), Some(held)) => run == held,
        }
    }
}
