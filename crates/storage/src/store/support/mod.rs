#![forbid(unsafe_code)]

use super::StoreError;
use rg_core::model::{TestcaseStatus, TrialStatus};
use rusqlite::ErrorCode;
use rusqlite::types::Type;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

#[derive(Debug)]
struct UnknownStatus(String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status value {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

fn status_column<T>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(UnknownStatus(raw)))
    })
}

pub(super) fn testcase_status_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<TestcaseStatus> {
    status_column(row, idx, TestcaseStatus::parse)
}

pub(super) fn trial_status_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<TrialStatus> {
    status_column(row, idx, TrialStatus::parse)
}

/// Turn a uniqueness violation into a typed conflict; anything else stays SQL.
pub(super) fn map_insert_conflict(err: rusqlite::Error, what: &'static str) -> StoreError {
    if is_constraint_violation(&err) {
        return StoreError::Conflict(what);
    }
    StoreError::Sql(err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

pub(super) fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}

pub(super) fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, super::MAX_LIST_LIMIT)
}

pub(super) fn normalize_required(
    raw: &str,
    max_len: usize,
    empty: &'static str,
    too_long: &'static str,
) -> Result<String, StoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput(empty));
    }
    if trimmed.len() > max_len {
        return Err(StoreError::InvalidInput(too_long));
    }
    Ok(trimmed.to_string())
}

pub(super) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

fn format_snapshot_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_string())
}

/// Current UTC calendar date as `YYYY-MM-DD`.
pub(super) fn today_utc() -> String {
    format_snapshot_date(OffsetDateTime::now_utc().date())
}

/// Accepts a `YYYY-MM-DD` calendar date no later than today (UTC).
pub(super) fn validate_snapshot_date(raw: &str) -> Result<String, StoreError> {
    let date = Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| StoreError::InvalidInput("snapshot date must be a YYYY-MM-DD calendar date"))?;
    if date > OffsetDateTime::now_utc().date() {
        return Err(StoreError::InvalidInput("snapshot date is in the future"));
    }
    Ok(format_snapshot_date(date))
}
