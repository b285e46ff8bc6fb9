// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Driving a pull stream from first byte to final outcome.
//!
//! A [`PullSession`] owns the response byte stream and the display sink.
//! [`PullSession::start`] reads chunks until the stream ends, the remote
//! side reports an error, the connection fails, or the caller cancels.
//!
//! ```text
//! Idle ──start──▶ Streaming ──end of stream──▶ Completed
//!                    │  │
//!                    │  └──error event / read failure──▶ Failed
//!                    └──cancel──▶ Cancelled (silent)
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::watch;

use super::decoder::LineDecoder;
use super::event::{is_blank, parse_line};
use super::reducer::{SessionState, Terminal};

/// Receiver of progress updates.
///
/// Implementations decide presentation (progress bar, log panel, ...).
/// `succeed` and `fail` are each called at most once per session, and never
/// both.
pub trait ProgressSink {
    /// A new event was applied. `log_line` is raw output; append it followed
    /// by a line break.
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>);

    /// The stream ended normally.
    fn succeed(&mut self);

    /// The pull failed. The message distinguishes remote errors from
    /// connection failures.
    fn fail(&mut self, message: &str);
}

impl<T: ProgressSink + ?Sized> ProgressSink for &mut T {
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
        (**self).update(status, percent, log_line)
    }

    fn succeed(&mut self) {
        (**self).succeed()
    }

    fn fail(&mut self, message: &str) {
        (**self).fail(message)
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Box<T> {
    fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
        (**self).update(status, percent, log_line)
    }

    fn succeed(&mut self) {
        (**self).succeed()
    }

    fn fail(&mut self, message: &str) {
        (**self).fail(message)
    }
}

/// Fatal session errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullError {
    /// The remote operation reported a failure.
    Operation(String),
    /// Reading the byte stream failed.
    Transport(String),
}

impl fmt::Display for PullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(msg) => write!(f, "{}", msg),
            Self::Transport(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

impl std::error::Error for PullError {}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, not started
    Idle,
    /// Reading the stream
    Streaming,
    /// Stream ended without an error
    Completed,
    /// Remote error or transport failure
    Failed,
    /// Stopped by the caller
    Cancelled,
}

impl SessionPhase {
    /// Returns true if no further transitions can occur.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled
        )
    }
}

/// Result of [`PullSession::start`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub phase: SessionPhase,
    /// Final aggregated state.
    pub state: SessionState,
    /// Set when `phase` is `Failed`.
    pub error: Option<PullError>,
    /// Lines skipped because they were not valid JSON.
    pub parse_failures: usize,
}

/// Cloneable handle that stops a running session.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One pull operation over one byte stream.
pub struct PullSession<S, K> {
    source: S,
    sink: K,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

/// Build an idle session. Same as [`PullSession::new`].
pub fn create_session<S, K>(source: S, sink: K) -> PullSession<S, K> {
    PullSession::new(source, sink)
}

impl<S, K> PullSession<S, K> {
    /// Create an idle session over `source`, reporting to `sink`.
    pub fn new(source: S, sink: K) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            source,
            sink,
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
        }
    }

    /// Handle for cancelling the session from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Cancel before starting. `start` then returns without reading.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }
}

enum Step<T> {
    Cancelled,
    Read(Option<T>),
}

/// Mutable state of a running session.
struct Run<K> {
    sink: K,
    decoder: LineDecoder,
    state: SessionState,
    parse_failures: usize,
}

impl<K: ProgressSink> Run<K> {
    /// Apply one line. Returns the operation error if it ended the pull.
    fn handle_line(&mut self, line: &str) -> Option<PullError> {
        if is_blank(line) {
            return None;
        }

        let event = match parse_line(line) {
            Ok(event) => event,
            Err(failure) => {
                self.parse_failures += 1;
                tracing::warn!("Skipping {}", failure);
                return None;
            }
        };

        let update = self.state.apply(&event)?;
        self.sink
            .update(&update.status, update.percent, update.log_line.as_deref());

        if update.terminal == Terminal::Error {
            let message = self.state.error_message.clone().unwrap_or(update.status);
            return Some(PullError::Operation(message));
        }
        None
    }
}

impl<S, B, E, K> PullSession<S, K>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    K: ProgressSink,
{
    /// Read the stream to the end and report the outcome to the sink.
    ///
    /// The source is dropped before this returns, whatever the outcome.
    pub async fn start(self) -> SessionOutcome {
        let PullSession {
            source,
            sink,
            cancel_tx,
            mut cancel_rx,
        } = self;
        let mut source = Box::pin(source);
        let mut run = Run {
            sink,
            decoder: LineDecoder::new(),
            state: SessionState::new(),
            parse_failures: 0,
        };

        let mut error = None;
        let phase = if *cancel_rx.borrow_and_update() {
            tracing::debug!("Session cancelled before start");
            SessionPhase::Cancelled
        } else {
            tracing::debug!("Session streaming");
            loop {
                let step = tokio::select! {
                    biased;
                    changed = cancel_rx.changed() => {
                        if changed.is_ok() && *cancel_rx.borrow_and_update() {
                            Step::Cancelled
                        } else {
                            continue;
                        }
                    }
                    item = source.next() => Step::Read(item),
                };

                match step {
                    Step::Cancelled => {
                        tracing::debug!("Session cancelled while streaming");
                        break SessionPhase::Cancelled;
                    }
                    Step::Read(Some(Ok(chunk))) => {
                        let lines = run.decoder.feed(chunk.as_ref());
                        if let Some(err) = lines.iter().find_map(|line| run.handle_line(line)) {
                            error = Some(err);
                            break SessionPhase::Failed;
                        }
                    }
                    Step::Read(Some(Err(e))) => {
                        tracing::warn!("Pull stream read failed: {}", e);
                        error = Some(PullError::Transport(e.to_string()));
                        break SessionPhase::Failed;
                    }
                    Step::Read(None) => {
                        if let Some(fragment) = run.decoder.flush() {
                            if let Some(err) = run.handle_line(&fragment) {
                                error = Some(err);
                                break SessionPhase::Failed;
                            }
                        }
                        run.state.complete();
                        break SessionPhase::Completed;
                    }
                }
            }
        };

        // Release the connection before reporting.
        drop(source);
        drop(cancel_tx);

        match (&phase, &error) {
            (SessionPhase::Completed, _) => {
                tracing::debug!("Session completed ({} layers)", run.state.layers.len());
                run.sink.succeed();
            }
            (SessionPhase::Failed, Some(err)) => {
                tracing::debug!("Session failed: {}", err);
                run.sink.fail(&err.to_string());
            }
            _ => {}
        }

        SessionOutcome {
            phase,
            state: run.state,
            error,
            parse_failures: run.parse_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[derive(Default)]
    struct Calls {
        updates: Vec<(String, Option<u8>, Option<String>)>,
        succeeded: usize,
        failed: Vec<String>,
    }

    impl ProgressSink for Calls {
        fn update(&mut self, status: &str, percent: Option<u8>, log_line: Option<&str>) {
            self.updates
                .push((status.to_string(), percent, log_line.map(String::from)));
        }

        fn succeed(&mut self) {
            self.succeeded += 1;
        }

        fn fail(&mut self, message: &str) {
            self.failed.push(message.to_string());
        }
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, String>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_completes_on_end_of_stream() {
        let mut calls = Calls::default();
        let outcome = PullSession::new(
            chunks(&[
                "{\"status\":\"Downloading\",\"id\":\"L1\",\"progressDetail\":{\"current\":10,\"total\":100}}\n",
                "{\"status\":\"Downloading\",\"id\":\"L1\",\"progressDetail\":{\"current\":100,\"total\":100}}\n",
            ]),
            &mut calls,
        )
        .start()
        .await;

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert_eq!(outcome.state.terminal, Terminal::Success);
        assert_eq!(calls.updates.last().map(|u| u.1), Some(Some(100)));
        assert_eq!(calls.succeeded, 1);
        assert!(calls.failed.is_empty());
    }

    #[tokio::test]
    async fn test_trailing_fragment_is_applied() {
        let mut calls = Calls::default();
        let outcome = PullSession::new(
            chunks(&["{\"status\":\"Pulling\"}\n{\"status\":\"Digest: sha256:1\"}"]),
            &mut calls,
        )
        .start()
        .await;

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert_eq!(calls.updates.len(), 2);
        assert_eq!(outcome.state.overall_status, "Digest: sha256:1");
    }

    #[tokio::test]
    async fn test_trailing_error_fragment_fails() {
        let mut calls = Calls::default();
        let outcome = PullSession::new(chunks(&["{\"error\":\"denied\"}"]), &mut calls)
            .start()
            .await;

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert_eq!(calls.failed, vec!["denied".to_string()]);
        assert_eq!(calls.succeeded, 0);
    }

    #[tokio::test]
    async fn test_error_stops_processing_within_chunk() {
        let mut calls = Calls::default();
        let outcome = PullSession::new(
            chunks(&[
                "{\"error\":\"manifest not found\"}\n{\"status\":\"ignored\"}\n",
                "{\"status\":\"also ignored\"}\n",
            ]),
            &mut calls,
        )
        .start()
        .await;

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert_eq!(
            outcome.error,
            Some(PullError::Operation("manifest not found".to_string()))
        );
        assert_eq!(calls.updates.len(), 1);
        assert_eq!(calls.failed, vec!["manifest not found".to_string()]);
        assert_eq!(calls.succeeded, 0);
    }

    #[tokio::test]
    async fn test_transport_error_message_is_distinct() {
        let mut calls = Calls::default();
        let source = stream::iter(vec![
            Ok(b"{\"status\":\"Downloading\"}\n".to_vec()),
            Err("connection reset by peer".to_string()),
            Ok(b"{\"status\":\"never read\"}\n".to_vec()),
        ]);
        let outcome = PullSession::new(source, &mut calls).start().await;

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert_eq!(calls.failed, vec!["connection error: connection reset by peer".to_string()]);
        assert_eq!(calls.updates.len(), 1);
        assert_eq!(outcome.state.terminal, Terminal::None);
    }

    #[tokio::test]
    async fn test_cancel_before_start_reads_nothing() {
        let mut calls = Calls::default();
        let session = PullSession::new(chunks(&["{\"status\":\"x\"}\n"]), &mut calls);
        let handle = session.cancel_handle();
        session.cancel();
        assert!(handle.is_cancelled());

        let outcome = session.start().await;
        assert_eq!(outcome.phase, SessionPhase::Cancelled);
        assert!(calls.updates.is_empty());
        assert_eq!(calls.succeeded, 0);
        assert!(calls.failed.is_empty());
    }

    #[tokio::test]
    async fn test_blank_and_malformed_lines_skipped() {
        let mut calls = Calls::default();
        let outcome = PullSession::new(
            chunks(&["\n  \n{\"status\":\n", "{\"status\":\"Downloading\"}\n"]),
            &mut calls,
        )
        .start()
        .await;

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert_eq!(outcome.parse_failures, 1);
        assert_eq!(calls.updates.len(), 1);
        assert_eq!(calls.updates[0].0, "Downloading");
    }

    #[test]
    fn test_pull_error_display() {
        assert_eq!(PullError::Operation("boom".into()).to_string(), "boom");
        assert_eq!(
            PullError::Transport("eof".into()).to_string(),
            "connection error: eof"
        );
        assert!(SessionPhase::Cancelled.is_finished());
        assert!(!SessionPhase::Streaming.is_finished());
    }
}
