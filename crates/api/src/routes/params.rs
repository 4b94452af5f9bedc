//! Shared request parameter parsing

use time::{format_description::FormatItem, macros::format_description, Date, Time};

use crate::error::ApiError;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const SHORT_TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

/// Parse `YYYY-MM-DD`, defaulting to `fallback` when absent
pub fn parse_date(raw: Option<&str>, fallback: Date) -> Result<Date, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Date::parse(s, DATE_FORMAT)
            .map_err(|_| ApiError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", s))),
        None => Ok(fallback),
    }
}

/// Parse `HH:MM` or `HH:MM:SS`
pub fn parse_time(raw: &str) -> Result<Time, ApiError> {
    let s = raw.trim();
    Time::parse(s, TIME_FORMAT)
        .or_else(|_| Time::parse(s, SHORT_TIME_FORMAT))
        .map_err(|_| ApiError::Validation(format!("Invalid time '{}', expected HH:MM", s)))
}

/// Clamp a client-supplied page size
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}
