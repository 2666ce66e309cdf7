use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Convert an interval token to milliseconds.
/// For example: "1m" -> 60000, "1h" -> 3600000
pub fn interval_to_milliseconds(interval: &str) -> i64 {
    let last_char = interval.chars().last().unwrap_or('m');
    let value: i64 = interval[..interval.len().saturating_sub(1)].parse().unwrap_or(1);

    match last_char {
        'm' => value * 60 * 1000,
        'h' => value * 60 * 60 * 1000,
        'd' => value * 24 * 60 * 60 * 1000,
        'w' => value * 7 * 24 * 60 * 60 * 1000,
        _ => value * 60 * 1000,
    }
}

/// Floor a millisecond timestamp to the start of its period.
pub fn align_to_interval(timestamp_ms: i64, interval_ms: i64) -> i64 {
    timestamp_ms - timestamp_ms.rem_euclid(interval_ms)
}

/// Render a millisecond timestamp as a UTC datetime string for logs.
pub fn format_ms(timestamp_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp_ms.to_string(),
    }
}

/// Parse a `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` argument into UTC milliseconds.
pub fn parse_datetime_arg(value: &str) -> Result<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp_millis());
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(AppError::TimeParseError)?;
    let dt = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::ConfigError(format!("Invalid time: {}", value)))?;
    Ok(dt.and_utc().timestamp_millis())
}
