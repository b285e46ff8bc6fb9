// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streaming pull progress for dockpull
//!
//! Turns the newline-delimited JSON body of an image pull into a single
//! progress view: one status line, one overall percentage and a raw log.
//!
//! # Architecture
//!
//! ```text
//! bytes ──▶ LineDecoder ──▶ parse_line ──▶ SessionState::apply ──▶ ProgressSink
//!  (decoder)               (event)         (reducer)               (session)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use dockpull::api::{DashboardClient, ImageRef};
//! use dockpull::display::TerminalSink;
//! use dockpull::pull::PullSession;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = DashboardClient::new();
//! let image = ImageRef::parse("library/alpine:3.20")?;
//! let body = client.pull_stream(&image).await?;
//!
//! let session = PullSession::new(body, TerminalSink::new(&image.to_string()));
//! let cancel = session.cancel_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     cancel.cancel();
//! });
//!
//! let outcome = session.start().await;
//! println!("{:?}", outcome.phase);
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod event;
pub mod reducer;
pub mod session;

pub use decoder::LineDecoder;
pub use event::{is_blank, parse_line, ErrorDetail, ParseFailure, ProgressDetail, ProgressEvent};
pub use reducer::{LayerState, ProgressUpdate, SessionState, Terminal, DEFAULT_STATUS};
pub use session::{
    create_session, CancelHandle, ProgressSink, PullError, PullSession, SessionOutcome,
    SessionPhase,
};
