//! Transport Layer for Chat Turns
//!
//! Provides abstraction over the push mechanism that carries a turn:
//! - `HttpTransport`: `text/event-stream` over HTTP (reqwest + eventsource-stream)
//! - `InProcessTransport`: direct channels (embedded servers, tests)
//!
//! # Design Philosophy
//!
//! A transport only moves bytes and lifecycle signals. It knows nothing about
//! credentials, chunk schemas, or session state; the streaming core turns its
//! [`TransportEvent`]s into state transitions. Any implementation of
//! [`StreamTransport`] is interchangeable.

pub mod http;
pub mod in_process;
pub mod traits;

// Re-exports for convenience
pub use http::HttpTransport;
pub use in_process::{InProcessExchange, InProcessServer, InProcessTransport};
pub use traits::{SseEvent, StreamTransport, TransportError, TransportEvent};
