// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Folding layer events into one overall pull status.
//!
//! A pull downloads many layers at once and the engine interleaves their
//! events. The reducer keeps byte counters per layer and derives the overall
//! percentage from the sums across every layer seen so far.

use indexmap::IndexMap;

use super::event::ProgressEvent;

/// Status shown when an event carries no status text.
pub const DEFAULT_STATUS: &str = "Processing";

/// Outcome of a session once it can no longer change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Terminal {
    /// Still running
    #[default]
    None,
    /// Stream ended normally
    Success,
    /// Remote operation reported an error
    Error,
}

impl Terminal {
    /// Returns true once the pull has finished (success or failure).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Terminal::None)
    }
}

/// Byte counters for a single layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerState {
    pub current: u64,
    pub total: u64,
    pub last_status: String,
}

impl LayerState {
    /// Progress of this layer alone (0-100), if its size is known.
    pub fn percent(&self) -> Option<u8> {
        percent_of(self.current.min(self.total), self.total)
    }
}

/// Immutable snapshot handed to a display sink after each applied event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub status: String,
    /// Overall percentage, `None` while no layer size is known.
    pub percent: Option<u8>,
    /// Raw log output carried by the event.
    pub log_line: Option<String>,
    pub terminal: Terminal,
}

/// Aggregated state of one pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Layers in the order they were first reported.
    pub layers: IndexMap<String, LayerState>,
    pub overall_status: String,
    pub terminal: Terminal,
    pub error_message: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            layers: IndexMap::new(),
            overall_status: "Starting...".to_string(),
            terminal: Terminal::None,
            error_message: None,
        }
    }
}

impl SessionState {
    /// Create a fresh state for a new pull.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    ///
    /// Returns the resulting snapshot, or `None` if the session had already
    /// reached a terminal state and the event was ignored.
    pub fn apply(&mut self, event: &ProgressEvent) -> Option<ProgressUpdate> {
        if self.terminal.is_terminal() {
            return None;
        }

        if let Some(error) = event.error_message() {
            self.terminal = Terminal::Error;
            self.error_message = Some(error.to_string());
            self.overall_status = error.to_string();
            return Some(self.snapshot(event.stream.clone()));
        }

        if let Some(id) = &event.id {
            let detail = event.progress_detail.unwrap_or_default();
            match self.layers.get_mut(id) {
                Some(layer) => {
                    // Empty details ("Download complete", "Pull complete")
                    // must not reset counters.
                    if let Some(current) = detail.current {
                        layer.current = current;
                    }
                    if let Some(total) = detail.total {
                        layer.total = total;
                    }
                    if let Some(status) = &event.status {
                        layer.last_status = status.clone();
                    }
                }
                None => {
                    self.layers.insert(
                        id.clone(),
                        LayerState {
                            current: detail.current.unwrap_or(0),
                            total: detail.total.unwrap_or(1),
                            last_status: event.status.clone().unwrap_or_default(),
                        },
                    );
                }
            }
        }

        self.overall_status = event
            .status
            .clone()
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        Some(self.snapshot(event.stream.clone()))
    }

    /// Mark the pull as successfully finished.
    ///
    /// Has no effect once the session is terminal.
    pub fn complete(&mut self) -> bool {
        if self.terminal.is_terminal() {
            return false;
        }
        self.terminal = Terminal::Success;
        true
    }

    /// Overall percentage across every known layer.
    ///
    /// `None` until at least one layer reports a positive total.
    pub fn percent(&self) -> Option<u8> {
        let (current, total) = self
            .layers
            .values()
            .fold((0u64, 0u64), |(current, total), layer| {
                (
                    current.saturating_add(layer.current.min(layer.total)),
                    total.saturating_add(layer.total),
                )
            });
        percent_of(current, total)
    }

    /// Number of layers whose last status reports completion.
    pub fn completed_layers(&self) -> usize {
        self.layers
            .values()
            .filter(|l| {
                let status = l.last_status.to_ascii_lowercase();
                status.contains("complete") || status.contains("already exists")
            })
            .count()
    }

    fn snapshot(&self, log_line: Option<String>) -> ProgressUpdate {
        ProgressUpdate {
            status: self.overall_status.clone(),
            percent: self.percent(),
            log_line,
            terminal: self.terminal,
        }
    }
}

/// By-value form of [`SessionState::apply`].
pub fn apply(mut state: SessionState, event: &ProgressEvent) -> SessionState {
    state.apply(event);
    state
}

fn percent_of(current: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (current as f64 / total as f64 * 100.0).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}
