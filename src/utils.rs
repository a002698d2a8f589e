//! Utility functions for timerag
//!
//! This module provides small helpers shared by the library and the CLI.

use crate::error::{RagError, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Format file size in human readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Current time in seconds since the epoch
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Parse a time bound: unix seconds, an RFC 3339 timestamp, or a `YYYY-MM-DD` date (midnight UTC)
pub fn parse_time(value: &str) -> Result<i64> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).timestamp());
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp());
        }
    }

    Err(RagError::InvalidQuery(format!("Unrecognized time value: {}", value)))
}

/// First `max_chars` characters of `text`, with an ellipsis if cut
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
