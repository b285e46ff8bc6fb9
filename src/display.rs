// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Display sinks for pull sessions.
//!
//! [`TerminalSink`] draws an indicatif bar with a status message and prints
//! log output above it. [`RecordingSink`] keeps every callback in memory and
//! is shared between a session and whoever inspects it afterwards.
//! [`SilentSink`] keeps only the latest update, for `--quiet` runs.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::pull::ProgressSink;

/// Progress bar sink for interactive terminals.
pub struct TerminalSink {
    bar: ProgressBar,
    title: String,
    /// The bar is only shown once a percentage is known.
    showing_bar: bool,
    last_log_line: Option<String>,
}

impl TerminalSink {
    /// Create a sink for a pull of `title` (usually `repo:tag`).
    pub fn new(title: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(format!("Pulling {}: Starting...", title));

        Self {
            bar,
            title: title.to_string(),
            showing_bar: false,
            last_log_line: None,
        }
    }

    /// The most recent log text printed above the bar.
    pub fn last_log_line(&self) -> Option<&str> {
        self.last_log_line.as_deref()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
        .map(|style| style.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressSink for TerminalSink {
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
        self.bar.set_message(status.to_string());

        if let Some(pct) = percent {
            if !self.showing_bar {
                self.bar.set_style(bar_style());
                self.showing_bar = true;
            }
            self.bar.set_position(u64::from(pct));
        }

        if let Some(line) = log_line {
            // Verbatim; println supplies the trailing line break.
            self.bar.println(line);
            self.last_log_line = Some(line.to_string());
        }
    }

    fn succeed(&mut self) {
        self.bar.finish_and_clear();
        println!("{} Pulled {}", "✓".green(), self.title.bold());
    }

    fn fail(&mut self, message: &str) {
        self.bar.abandon();
        eprintln!("{} Pull of {} failed: {}", "✗".red(), self.title.bold(), message);
    }
}

/// Sink that keeps only the latest update and logs the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SilentSink {
    pub status: Option<String>,
    pub percent: Option<u8>,
    pub outcome: Option<Result<(), String>>,
}

impl SilentSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for SilentSink {
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
        tracing::trace!(status, ?percent, log_line, "pull progress");
        if self.status.as_deref() != Some(status) {
            self.status = Some(status.to_string());
        }
        if percent.is_some() {
            self.percent = percent;
        }
    }

    fn succeed(&mut self) {
        self.outcome = Some(Ok(()));
    }

    fn fail(&mut self, message: &str) {
        self.outcome = Some(Err(message.to_string()));
    }
}

/// One recorded sink callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Update {
        status: String,
        percent: Option<u8>,
        log_line: Option<String>,
    },
    Succeeded,
    Failed(String),
}

/// Sink that records callbacks. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SinkEvent>> {
        // A poisoned record is still readable.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every callback so far, in order.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Number of `update` calls.
    pub fn update_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Update { .. }))
            .count()
    }

    /// Last percentage reported by an update that carried one.
    pub fn last_percent(&self) -> Option<u8> {
        self.lock().iter().rev().find_map(|e| match e {
            SinkEvent::Update { percent, .. } => *percent,
            _ => None,
        })
    }

    /// Status of the most recent update.
    pub fn last_status(&self) -> Option<String> {
        self.lock().iter().rev().find_map(|e| match e {
            SinkEvent::Update { status, .. } => Some(status.clone()),
            _ => None,
        })
    }

    /// Log lines in the order they were reported.
    pub fn log_lines(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Update { log_line, .. } => log_line.clone(),
                _ => None,
            })
            .collect()
    }

    /// Number of `succeed` calls.
    pub fn success_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Succeeded))
            .count()
    }

    /// Messages passed to `fail`.
    pub fn failures(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Failed(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
        self.lock().push(SinkEvent::Update {
            status: status.to_string(),
            percent,
            log_line: log_line.map(String::from),
        });
    }

    fn succeed(&mut self) {
        self.lock().push(SinkEvent::Succeeded);
    }

    fn fail(&mut self, message: &str) {
        self.lock().push(SinkEvent::Failed(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_shares_record() {
        let sink = RecordingSink::new();
        let mut writer = sink.clone();

        writer.update("Downloading", None, None);
        writer.update("Downloading", Some(40), Some("log\n"));
        writer.update("Extracting", None, None);
        writer.succeed();

        assert_eq!(sink.update_count(), 3);
        assert_eq!(sink.last_percent(), Some(40));
        assert_eq!(sink.last_status().as_deref(), Some("Extracting"));
        assert_eq!(sink.log_lines(), vec!["log\n".to_string()]);
        assert_eq!(sink.success_count(), 1);
        assert!(sink.failures().is_empty());
        assert_eq!(sink.events().last(), Some(&SinkEvent::Succeeded));
    }

    #[test]
    fn test_recording_sink_failures() {
        let mut sink = RecordingSink::new();
        sink.fail("manifest not found");
        assert_eq!(sink.failures(), vec!["manifest not found".to_string()]);
        assert_eq!(sink.success_count(), 0);
        assert_eq!(sink.last_percent(), None);
    }

    #[test]
    fn test_silent_sink_keeps_latest_only() {
        let mut sink = SilentSink::new();
        sink.update("Pulling fs layer", None, None);
        sink.update("Downloading", Some(30), Some("Step 1/2\n"));
        sink.update("Extracting", None, None);
        assert_eq!(sink.status.as_deref(), Some("Extracting"));
        assert_eq!(sink.percent, Some(30));
        assert_eq!(sink.outcome, None);

        sink.fail("denied");
        assert_eq!(sink.outcome, Some(Err("denied".to_string())));
    }

    #[test]
    fn test_terminal_sink_accepts_updates() {
        let mut sink = TerminalSink::new("alpine:latest");
        sink.update("Pulling fs layer", None, None);
        assert!(!sink.showing_bar);
        sink.update("Downloading", Some(12), Some("Step 1/2\n"));
        assert!(sink.showing_bar);
        assert_eq!(sink.last_log_line(), Some("Step 1/2\n"));
        assert_eq!(sink.bar.position(), 12);
        sink.succeed();
        assert!(sink.bar.is_finished());
    }
}
