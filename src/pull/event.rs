// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress events reported by an image pull.
//!
//! Each line of a pull response is one JSON object. Every field is optional:
//! the engine sends layer-scoped events (`id` set), operation-level events,
//! build-style `stream` output and, on failure, `error`/`errorDetail`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Byte counters attached to a layer event.
///
/// Some engines send `-1` for a blob of unknown size, and a few send
/// floats. Negative or non-numeric counters decode as unknown (`None`);
/// fractions are truncated and huge values saturate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    /// Bytes processed so far.
    #[serde(default, deserialize_with = "lenient_count")]
    pub current: Option<u64>,
    /// Total bytes expected.
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: Option<u64>,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(count_from_value))
}

fn count_from_value(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    match value.as_f64() {
        // `as` saturates at u64::MAX and truncates fractions.
        Some(f) if f.is_finite() && f >= 0.0 => Some(f as u64),
        _ => None,
    }
}

/// Structured error payload sent alongside `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<i64>,
    pub message: Option<String>,
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64()))
}

/// One decoded line of a pull stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Human-readable status ("Downloading", "Pull complete", ...).
    pub status: Option<String>,
    /// Failure reported by the remote operation.
    pub error: Option<String>,
    pub error_detail: Option<ErrorDetail>,
    /// Raw log output to append verbatim.
    pub stream: Option<String>,
    pub progress_detail: Option<ProgressDetail>,
    /// Pre-rendered progress bar text. Informational only.
    pub progress: Option<String>,
    /// Layer identifier. Absent for operation-level events.
    pub id: Option<String>,
}

impl ProgressEvent {
    /// The error text, if this event reports a failure.
    ///
    /// Prefers `error` and falls back to `errorDetail.message`.
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.error_detail.as_ref().and_then(|d| d.message.as_deref()))
    }

    /// Returns true if none of the recognized fields are set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.error_message().is_none()
            && self.stream.is_none()
            && self.progress_detail.is_none()
    }
}

/// A line that could not be decoded as a progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// The offending line, as received.
    pub line: String,
    /// Decoder message.
    pub reason: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed progress line ({}): {}", self.reason, self.line)
    }
}

impl std::error::Error for ParseFailure {}

/// Returns true for lines the caller should skip without parsing.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Parse one line of a pull stream.
///
/// Only JSON objects are accepted. Unknown fields are ignored, so an object
/// with none of the recognized fields is still a valid (no-op) event.
pub fn parse_line(line: &str) -> Result<ProgressEvent, ParseFailure> {
    let trimmed = line.trim();
    // The derived visitor would also accept a JSON array by position.
    if !trimmed.starts_with('{') {
        return Err(ParseFailure {
            line: line.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    serde_json::from_str::<ProgressEvent>(trimmed).map_err(|e| ParseFailure {
        line: line.to_string(),
        reason: e.to_string(),
    })
}
