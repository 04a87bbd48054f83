//! Stream Controller
//!
//! Public face of the streaming core. Starts a turn, forwards each chunk to
//! the registered handler, exposes the observable turn state, and stops the
//! exchange on request or on drop.
//!
//! # Example
//!
//! ```ignore
//! let controller = StreamController::from_config(&config)?;
//! controller.on_chunk(|chunk| println!("{chunk}"));
//! controller
//!     .start_stream(StreamRequest::post(AGENT_CHAT_ENDPOINT, "s1", "hello"))
//!     .await;
//! if let Some(error) = controller.error() {
//!     eprintln!("{error}");
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use super::session::{StreamPhase, StreamSession};
use crate::chunk::Chunk;
use crate::config::ClientConfig;
use crate::credentials::CredentialResolver;
use crate::error::StreamError;
use crate::request::{RequestBuilder, StreamRequest, TurnOp};
use crate::state::{FileStateStore, StateProvider};
use crate::transport::{HttpTransport, StreamTransport, TransportError, TransportEvent};

/// Callback invoked once per chunk, in arrival order
pub type ChunkHandler = Arc<dyn Fn(&Chunk) + Send + Sync>;

/// Observable state of the current turn
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamSnapshot {
    /// Chunks received so far
    pub output: Vec<Chunk>,
    /// Waiting for the open acknowledgement
    pub is_loading: bool,
    /// A turn is in flight
    pub is_streaming: bool,
    /// Failure of the current turn, rendered for display
    pub error: Option<String>,
    /// Lifecycle phase
    pub phase: StreamPhase,
}

impl StreamSnapshot {
    /// Bring the snapshot in line with `session`
    ///
    /// Output only grows within a turn and is cleared when the next one
    /// begins, so only the new tail is copied.
    fn sync(&mut self, session: &StreamSession) {
        let output = session.output();
        if self.output.len() > output.len() {
            self.output.clear();
        }
        let seen = self.output.len();
        self.output.extend_from_slice(&output[seen..]);
        self.is_loading = session.is_loading();
        self.is_streaming = session.is_streaming();
        self.error = session.last_error().map(ToString::to_string);
        self.phase = session.phase();
    }
}

/// State shared between the controller and its turn drivers
struct Inner {
    transport: Arc<dyn StreamTransport>,
    resolver: CredentialResolver,
    builder: RequestBuilder,
    session: Mutex<StreamSession>,
    handler: Mutex<Option<ChunkHandler>>,
    snapshot_tx: watch::Sender<StreamSnapshot>,
}

impl Inner {
    /// Mutate the session and publish the resulting snapshot
    ///
    /// Publishing happens under the session lock so observers never see
    /// snapshots out of order.
    fn update<R>(&self, f: impl FnOnce(&mut StreamSession) -> R) -> R {
        let mut session = self.session.lock();
        let result = f(&mut session);
        self.snapshot_tx.send_modify(|snapshot| snapshot.sync(&session));
        result
    }

    fn stop(&self) {
        self.update(StreamSession::close);
    }

    fn dispatch(&self, generation: u64, chunk: &Chunk) {
        // Clone the handler out so it runs without any lock held
        let handler = self.handler.lock().clone();
        let Some(handler) = handler else {
            return;
        };
        // A stop landing between this check and the call still lets this
        // one chunk through
        if self.session.lock().is_current(generation) {
            handler(chunk);
        }
    }

    async fn run(self: Arc<Self>, request: StreamRequest) {
        let (generation, cancel) = self.update(StreamSession::begin);

        let auth = match self.resolver.resolve() {
            Ok(auth) => auth,
            Err(e) => {
                self.update(|s| s.fail_current(generation, e));
                return;
            }
        };

        let descriptor = self.builder.build(TurnOp::StartTurn, &request, &auth);
        tracing::info!(
            transport = self.transport.name(),
            method = %descriptor.method,
            url = %descriptor.url,
            request_id = %auth.request_id,
            "Opening chat stream"
        );

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            opened = self.transport.open(descriptor, cancel.clone()) => opened,
        };
        let mut events = match opened {
            Ok(events) => events,
            Err(e) => {
                self.update(|s| s.fail_current(generation, StreamError::Transport(e.to_string())));
                return;
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            // A channel that ends without a terminal event counts as a close
            let event = event.unwrap_or(TransportEvent::Closed);

            let applied = self.update(|s| s.apply(generation, event));
            if let Some(ref chunk) = applied.chunk {
                self.dispatch(generation, chunk);
            }
            if applied.terminal {
                break;
            }
        }

        tracing::debug!(generation, "Chat stream driver finished");
    }
}

/// Drives a single chat turn at a time
pub struct StreamController {
    inner: Arc<Inner>,
}

impl StreamController {
    /// Create a controller over a transport and persisted state
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        state: Arc<dyn StateProvider>,
        builder: RequestBuilder,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(StreamSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                resolver: CredentialResolver::new(state),
                builder,
                session: Mutex::new(StreamSession::new()),
                handler: Mutex::new(None),
                snapshot_tx,
            }),
        }
    }

    /// Create an HTTP controller reading credentials from the configured state file
    ///
    /// # Errors
    ///
    /// Fails if the HTTP transport cannot be built from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(config)?;
        let state = FileStateStore::new(config.state_file.clone());
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(state),
            config.request_builder(),
        ))
    }

    /// Run a turn until the server ends it, it fails, or it is stopped
    ///
    /// Any turn already in flight is stopped first. Failures are never
    /// returned; they land in [`error`](Self::error).
    pub async fn start_stream(&self, request: StreamRequest) {
        Arc::clone(&self.inner).run(request).await;
    }

    /// Run a turn on a background task
    ///
    /// The task does not keep the controller alive: dropping the controller
    /// stops the turn.
    pub fn spawn_stream(&self, request: StreamRequest) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.inner).run(request))
    }

    /// Register the chunk handler, replacing any previous one
    pub fn on_chunk<F>(&self, handler: F)
    where
        F: Fn(&Chunk) + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Stop the current turn. Safe to call at any time, any number of times.
    ///
    /// The exchange is cancelled before this returns. A chunk the driver had
    /// already taken off the channel may still reach the handler once, if its
    /// dispatch raced the stop; nothing after it does.
    pub fn stop_stream(&self) {
        tracing::debug!("Stopping chat stream");
        self.inner.stop();
    }

    /// Ask the server to stop generating `message_id`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::MissingCredential`] without a login token and
    /// [`StreamError::Transport`] if the request fails.
    pub async fn request_stop(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<serde_json::Value, StreamError> {
        let auth = self.inner.resolver.resolve()?;
        let request = StreamRequest::resume("", session_id, message_id);
        let descriptor = self.inner.builder.build(TurnOp::StopTurn, &request, &auth);

        tracing::info!(session_id, message_id, url = %descriptor.url, "Requesting server-side stop");
        self.inner
            .transport
            .send(descriptor)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))
    }

    /// Chunks of the current turn
    #[must_use]
    pub fn output(&self) -> Vec<Chunk> {
        self.inner.session.lock().output().to_vec()
    }

    /// Waiting for the open acknowledgement
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.session.lock().is_loading()
    }

    /// A turn is in flight
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.inner.session.lock().is_streaming()
    }

    /// Failure of the current turn
    #[must_use]
    pub fn error(&self) -> Option<StreamError> {
        self.inner.session.lock().last_error().cloned()
    }

    /// Lifecycle phase
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.inner.session.lock().phase()
    }

    /// Current snapshot of the observable state
    #[must_use]
    pub fn snapshot(&self) -> StreamSnapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Watch snapshot changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Snapshot changes as a stream, starting with the current state
    #[must_use]
    pub fn updates(&self) -> WatchStream<StreamSnapshot> {
        WatchStream::new(self.subscribe())
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.inner.stop();
    }
}
