// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Human-readable formatting for search results and pull summaries.

use chrono::{DateTime, Utc};

/// Placeholder shown for missing or unparseable dates.
pub const UNKNOWN_DATE: &str = "Unknown";

const BYTE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Format a count compactly: `1234567` → `"1.2M"`, `4321` → `"4.3K"`.
pub fn format_number(num: u64) -> String {
    if num >= 1_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else if num >= 1_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else {
        num.to_string()
    }
}

/// Format a size with binary units, up to two decimals.
///
/// Trailing zeros are dropped: `1536` → `"1.5 KB"`, `1024` → `"1 KB"`.
/// Sizes beyond the gigabyte range stay in GB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, BYTE_UNITS[unit])
}

/// Format an RFC 3339 timestamp as a calendar date (`YYYY-MM-DD`).
pub fn format_date(iso: Option<&str>) -> String {
    iso.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

/// Format a percentage right-aligned, `None` as `" --"`.
pub fn format_percent(percent: Option<u8>) -> String {
    match percent {
        Some(p) => format!("{:>3}%", p),
        None => " --".to_string(),
    }
}
