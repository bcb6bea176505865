//! Run scheduling: when a rule becomes eligible to fire again.
//!
//! All arithmetic happens in the account's local civil time (a
//! [`ScheduleZone`]) and the result is returned in UTC. There is exactly one
//! implementation of "next run from schedule"; rule creation, rule edits and
//! outcome reconciliation all go through [`RunScheduler`].

use std::fmt;
use std::str::FromStr;

use chrono::{
    Days, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::rule::Frequency;
use crate::types::Timestamp;

/// Delay before a failed run becomes due again. Fixed, not exponential.
pub const FAILURE_RETRY_SECS: i64 = 3600;

/// Offset the dashboard historically assumed for every account (UTC+7).
pub const DEFAULT_OFFSET_SECS: i32 = 7 * 3600;

// ---------------------------------------------------------------------------
// ScheduleTime
// ---------------------------------------------------------------------------

/// A validated `"HH:MM"` time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    hour: u32,
    minute: u32,
}

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, CoreError> {
        if hour > 23 || minute > 59 {
            return Err(CoreError::Validation(format!(
                "Invalid time of day: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(self) -> u32 {
        self.hour
    }

    pub fn minute(self) -> u32 {
        self.minute
    }

    fn as_naive(self) -> NaiveTime {
        // Range checked in `new`.
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for ScheduleTime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("Invalid time format '{s}', expected HH:MM"));

        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = clock_field(h).ok_or_else(invalid)?;
        let minute = clock_field(m).ok_or_else(invalid)?;
        Self::new(hour, minute)
    }
}

/// One or two ASCII digits, no sign.
fn clock_field(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 2 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ---------------------------------------------------------------------------
// ScheduleZone
// ---------------------------------------------------------------------------

/// The civil time zone schedule times are interpreted in.
///
/// Parsed from `UTC`, a fixed offset (`+07:00`, `-0530`) or an IANA name
/// (`Asia/Ho_Chi_Minh`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl ScheduleZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Local calendar date of `at` in this zone.
    fn local_date(&self, at: Timestamp) -> NaiveDate {
        match self {
            Self::Fixed(offset) => at.with_timezone(offset).date_naive(),
            Self::Named(tz) => at.with_timezone(tz).date_naive(),
        }
    }

    /// Map a local wall-clock time back to UTC.
    fn resolve(&self, local: NaiveDateTime) -> Timestamp {
        match self {
            Self::Fixed(offset) => resolve_local(offset, local),
            Self::Named(tz) => resolve_local(tz, local),
        }
    }
}

impl Default for ScheduleZone {
    fn default() -> Self {
        Self::Fixed(FixedOffset::east_opt(DEFAULT_OFFSET_SECS).unwrap_or_else(|| Utc.fix()))
    }
}

impl FromStr for ScheduleZone {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return Ok(Self::utc());
        }
        if s.starts_with('+') || s.starts_with('-') {
            return parse_offset(s).map(Self::Fixed);
        }
        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| CoreError::Validation(format!("Unknown time zone: {s}")))
    }
}

impl fmt::Display for ScheduleZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(offset) => write!(f, "{offset}"),
            Self::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Parse `+HH:MM`, `+HHMM` or `+HH`.
fn parse_offset(s: &str) -> Result<FixedOffset, CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid UTC offset: {s}"));

    let (sign, rest) = s.split_at(1);
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if minutes > 59 {
        return Err(invalid());
    }

    let secs = (hours * 3600 + minutes * 60) * if sign == "-" { -1 } else { 1 };
    FixedOffset::east_opt(secs).ok_or_else(invalid)
}

/// Resolve a local wall-clock time in `zone`.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are shifted forward by one hour.
fn resolve_local<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> Timestamp {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = local + chrono::Duration::hours(1);
            zone.from_local_datetime(&shifted)
                .earliest()
                .map(|at| at.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&shifted))
        }
    }
}

// ---------------------------------------------------------------------------
// RunScheduler
// ---------------------------------------------------------------------------

/// How the last run attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Computes `next_run_at` values for rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunScheduler {
    zone: ScheduleZone,
}

impl RunScheduler {
    pub fn new(zone: ScheduleZone) -> Self {
        Self { zone }
    }

    /// Next eligible run after an attempt that ended with `outcome` at `now`.
    ///
    /// - Success: the local date of `now` advanced by the frequency interval
    ///   (1 day daily, 7 days weekly) at `time`, seconds zeroed.
    /// - Failure: `now + 1 hour`, ignoring `time` and `frequency`.
    ///
    /// The result is always strictly after `now`.
    pub fn next_run(
        &self,
        time: ScheduleTime,
        frequency: Frequency,
        now: Timestamp,
        outcome: RunOutcome,
    ) -> Timestamp {
        match outcome {
            RunOutcome::Failed => now + chrono::Duration::seconds(FAILURE_RETRY_SECS),
            RunOutcome::Succeeded => self.slot_after(time, frequency.interval_days(), now),
        }
    }

    /// First run of a newly created (or re-timed) rule: tomorrow at `time`.
    pub fn initial_run(&self, time: ScheduleTime, now: Timestamp) -> Timestamp {
        self.slot_after(time, 1, now)
    }

    /// `time` on the local date `days` after `now`, pushed forward a day at a
    /// time until it lies strictly in the future.
    fn slot_after(&self, time: ScheduleTime, days: i64, now: Timestamp) -> Timestamp {
        let mut date = self.zone.local_date(now) + Days::new(days.max(0) as u64);
        let mut candidate = self.zone.resolve(date.and_time(time.as_naive()));

        while candidate <= now {
            date = date + Days::new(1);
            candidate = self.zone.resolve(date.and_time(time.as_naive()));
        }

        candidate
    }
}
