// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! dockpull - Docker Hub search and streaming image pulls
//!
//! Searches Docker Hub through a dashboard backend, starts image pulls, and
//! turns the engine's newline-delimited JSON progress stream into one
//! coherent progress view.
//!
//! # Core Modules
//!
//! - [`pull`] - Line decoding, event parsing, progress reduction and the
//!   stream session that ties them together
//! - [`api`] - Dashboard client (search, image details, pull trigger, pull stream)
//! - [`display`] - Terminal and recording progress sinks
//! - [`format`] - Human-readable numbers, sizes and dates
//! - [`config`] - Connection settings

pub mod api;
pub mod config;
pub mod display;
pub mod format;
pub mod pull;

// Re-export commonly used types from the pull pipeline
pub use pull::{
    create_session, CancelHandle, LineDecoder, ProgressEvent, ProgressSink, ProgressUpdate,
    PullError, PullSession, SessionOutcome, SessionPhase, SessionState, Terminal,
};

// Re-export client types
pub use api::{
    ApiError, DashboardClient, ImageRef, PullTrigger, RepoInfo, SearchResult, SearchResults, TagInfo,
};

pub use config::Config;
pub use display::{RecordingSink, SilentSink, TerminalSink};
pub use format::{format_bytes, format_date, format_number};
