//! Stream Session
//!
//! Lifecycle state of the single active chat turn. The session owns the
//! cancellation token of the in-flight exchange and a generation counter;
//! every event is applied against the generation it was opened under, so
//! events that arrive after a reset or close are dropped.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::chunk::Chunk;
use crate::error::StreamError;
use crate::transport::TransportEvent;

// ============================================================================
// Phase
// ============================================================================

/// Lifecycle phase of a turn
///
/// `Idle -> Loading -> Streaming -> Stopped`. A failure passes through
/// `Errored` and the stop sequence then leaves the session `Stopped` with
/// the error retained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Nothing started yet
    #[default]
    Idle,
    /// Request issued, waiting for the open acknowledgement
    Loading,
    /// Events are flowing
    Streaming,
    /// Ended, by the server, the caller, or after a failure
    Stopped,
    /// Failure recorded, stop sequence pending
    Errored,
}

impl StreamPhase {
    /// Whether an exchange is live in this phase
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Loading | Self::Streaming)
    }
}

/// Outcome of applying one transport event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Applied {
    /// Chunk to hand to the chunk handler
    pub chunk: Option<Chunk>,
    /// Whether the driver of this exchange should stop reading events
    pub terminal: bool,
}

impl Applied {
    fn chunk(chunk: Chunk) -> Self {
        Self {
            chunk: Some(chunk),
            terminal: false,
        }
    }

    fn pending() -> Self {
        Self::default()
    }

    fn terminal() -> Self {
        Self {
            chunk: None,
            terminal: true,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// State of the current turn
#[derive(Debug)]
pub struct StreamSession {
    phase: StreamPhase,
    /// Every chunk of the current turn, in arrival order
    output: Vec<Chunk>,
    last_error: Option<StreamError>,
    /// Token of the live exchange; an inert fresh token when none is live
    token: CancellationToken,
    generation: u64,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Idle,
            output: Vec::new(),
            last_error: None,
            token: CancellationToken::new(),
            generation: 0,
        }
    }

    /// Start a new turn
    ///
    /// Cancels any live exchange, clears output and error, and enters
    /// `Loading`. Returns the generation and token the new exchange must be
    /// driven under.
    pub fn begin(&mut self) -> (u64, CancellationToken) {
        if self.phase != StreamPhase::Idle {
            self.close();
        }

        self.token = CancellationToken::new();
        self.generation = self.generation.wrapping_add(1);
        self.output.clear();
        self.last_error = None;
        self.phase = StreamPhase::Loading;

        tracing::debug!(generation = self.generation, "Turn started");
        (self.generation, self.token.clone())
    }

    /// Whether `generation` is the live exchange
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && !self.token.is_cancelled()
    }

    /// Apply an event of the exchange opened under `generation`
    pub fn apply(&mut self, generation: u64, event: TransportEvent) -> Applied {
        if !self.is_current(generation) {
            tracing::trace!(generation, current = self.generation, "Dropping stale event");
            return Applied::terminal();
        }

        match event {
            TransportEvent::Opened { status } if (200..300).contains(&status) => {
                if self.phase == StreamPhase::Loading {
                    self.phase = StreamPhase::Streaming;
                }
                tracing::debug!(status, "Event stream opened");
                Applied::pending()
            }
            TransportEvent::Opened { status } => {
                self.fail(StreamError::OpenRejected { status });
                Applied::terminal()
            }
            TransportEvent::Message(event) => match serde_json::from_str::<Chunk>(&event.data) {
                Ok(chunk) => {
                    self.phase = StreamPhase::Streaming;
                    self.output.push(chunk.clone());
                    Applied::chunk(chunk)
                }
                Err(e) => {
                    self.fail(StreamError::Transport(format!("malformed event: {e}")));
                    Applied::terminal()
                }
            },
            TransportEvent::Error(message) => {
                self.fail(StreamError::Transport(message));
                Applied::terminal()
            }
            TransportEvent::Closed => {
                tracing::debug!(chunks = self.output.len(), "Event stream closed by server");
                self.close();
                Applied::terminal()
            }
        }
    }

    /// Record a failure of the live exchange and stop it
    ///
    /// Non-fatal errors are only logged; the turn carries on.
    pub fn fail(&mut self, error: StreamError) {
        if !error.is_fatal() {
            tracing::warn!(error = %error, phase = ?self.phase, "Ignoring non-fatal turn error");
            return;
        }
        tracing::warn!(error = %error, chunks = self.output.len(), "Turn failed");
        self.last_error = Some(error);
        self.phase = StreamPhase::Errored;
        self.close();
    }

    /// Record a failure only if `generation` is still live
    pub fn fail_current(&mut self, generation: u64, error: StreamError) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.fail(error);
        true
    }

    /// Stop the live exchange, if any
    ///
    /// Idempotent. Output and the last error are kept; an idle session stays
    /// idle.
    pub fn close(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation = self.generation.wrapping_add(1);
        if self.phase != StreamPhase::Idle {
            self.phase = StreamPhase::Stopped;
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Chunks of the current turn
    #[must_use]
    pub fn output(&self) -> &[Chunk] {
        &self.output
    }

    /// Failure of the current turn, if any
    #[must_use]
    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    /// Waiting for the open acknowledgement
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.phase == StreamPhase::Loading
    }

    /// A turn is in flight, from start until it ends
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.phase.is_active()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::transport::SseEvent;

    fn message(data: &str) -> TransportEvent {
        TransportEvent::Message(SseEvent::data(data))
    }

    #[test]
    fn test_begin_enters_loading() {
        let mut session = StreamSession::new();
        assert_eq!(session.phase(), StreamPhase::Idle);
        assert!(!session.is_streaming());

        let (generation, token) = session.begin();
        assert_eq!(session.phase(), StreamPhase::Loading);
        assert!(session.is_loading());
        assert!(session.is_streaming());
        assert!(session.is_current(generation));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_open_then_messages_accumulate() {
        let mut session = StreamSession::new();
        let (generation, _) = session.begin();

        let applied = session.apply(generation, TransportEvent::Opened { status: 200 });
        assert!(!applied.terminal);
        assert_eq!(session.phase(), StreamPhase::Streaming);
        assert!(!session.is_loading());

        let applied = session.apply(generation, message(r#"{"content":"a"}"#));
        assert_eq!(applied.chunk, Some(json!({"content": "a"})));
        session.apply(generation, message(r#"{"content":"b"}"#));

        assert_eq!(
            session.output(),
            &[json!({"content": "a"}), json!({"content": "b"})]
        );
    }

    #[test]
    fn test_server_close_stops_without_error() {
        let mut session = StreamSession::new();
        let (generation, token) = session.begin();
        session.apply(generation, TransportEvent::Opened { status: 200 });

        let applied = session.apply(generation, TransportEvent::Closed);
        assert!(applied.terminal);
        assert_eq!(session.phase(), StreamPhase::Stopped);
        assert!(session.last_error().is_none());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_rejected_open_records_status() {
        let mut session = StreamSession::new();
        let (generation, _) = session.begin();

        let applied = session.apply(generation, TransportEvent::Opened { status: 401 });
        assert!(applied.terminal);
        assert_eq!(session.last_error(), Some(&StreamError::OpenRejected { status: 401 }));
        assert_eq!(session.phase(), StreamPhase::Stopped);
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_error_keeps_partial_output() {
        let mut session = StreamSession::new();
        let (generation, _) = session.begin();
        session.apply(generation, TransportEvent::Opened { status: 200 });
        session.apply(generation, message("{}"));
        session.apply(generation, message("[]"));

        session.apply(generation, TransportEvent::Error("reset".into()));
        assert_eq!(session.output().len(), 2);
        assert_eq!(
            session.last_error(),
            Some(&StreamError::Transport("reset".into()))
        );
    }

    #[test]
    fn test_malformed_payload_fails_turn() {
        let mut session = StreamSession::new();
        let (generation, _) = session.begin();

        let applied = session.apply(generation, message("not json"));
        assert!(applied.terminal);
        assert!(applied.chunk.is_none());
        match session.last_error() {
            Some(StreamError::Transport(msg)) => assert!(msg.starts_with("malformed event")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_events_after_close_are_ignored() {
        let mut session = StreamSession::new();
        let (generation, _) = session.begin();
        session.apply(generation, message("1"));
        session.close();

        let applied = session.apply(generation, message("2"));
        assert!(applied.terminal);
        assert_eq!(session.output(), &[json!(1)]);
        assert_eq!(session.phase(), StreamPhase::Stopped);
    }

    #[test]
    fn test_new_turn_invalidates_previous() {
        let mut session = StreamSession::new();
        let (first, first_token) = session.begin();
        session.apply(first, message("1"));

        let (second, _) = session.begin();
        assert!(first_token.is_cancelled());
        assert!(session.output().is_empty());

        session.apply(first, message("2"));
        session.apply(second, message("3"));
        assert_eq!(session.output(), &[json!(3)]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = StreamSession::new();
        session.close();
        assert_eq!(session.phase(), StreamPhase::Idle);

        session.begin();
        session.close();
        session.close();
        assert_eq!(session.phase(), StreamPhase::Stopped);
        assert!(!session.is_streaming());
        assert!(!session.is_loading());
    }

    #[test]
    fn test_fail_current_ignores_stale_generation() {
        let mut session = StreamSession::new();
        let (first, _) = session.begin();
        let (second, _) = session.begin();

        assert!(!session.fail_current(first, StreamError::MissingCredential));
        assert!(session.last_error().is_none());
        assert!(session.fail_current(second, StreamError::MissingCredential));
        assert_eq!(session.last_error(), Some(&StreamError::MissingCredential));
    }

    #[test]
    fn test_non_fatal_error_keeps_turn_alive() {
        let mut session = StreamSession::new();
        let (generation, token) = session.begin();
        session.apply(generation, TransportEvent::Opened { status: 200 });

        session.fail(StreamError::MalformedTenantState("not json".into()));
        assert_eq!(session.phase(), StreamPhase::Streaming);
        assert!(session.last_error().is_none());
        assert!(session.is_current(generation));
        assert!(!token.is_cancelled());

        session.fail(StreamError::Transport("reset".into()));
        assert_eq!(session.phase(), StreamPhase::Stopped);
        assert!(token.is_cancelled());
    }
}
