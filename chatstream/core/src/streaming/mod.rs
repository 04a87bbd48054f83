//! Streaming Core for Chat Turns
//!
//! One turn at a time: the [`StreamController`] resolves credentials, builds
//! the request, opens it on a transport and feeds every event through the
//! [`StreamSession`] state machine.
//!
//! ```text
//!   start_stream ──► CredentialResolver ──► RequestBuilder ──► StreamTransport::open
//!                                                                    │
//!                           TransportEvent (Opened/Message/Error/Closed)
//!                                                                    ▼
//!   on_chunk handler ◄── chunk ◄── StreamSession::apply ──► watch<StreamSnapshot>
//! ```
//!
//! Starting a new turn or calling `stop_stream` cancels the exchange in
//! flight. Events that were already queued for it are discarded.

mod controller;
mod session;

pub use controller::{ChunkHandler, StreamController, StreamSnapshot};
pub use session::{Applied, StreamPhase, StreamSession};
