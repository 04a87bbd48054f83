//! Transport Traits
//!
//! The streaming core drives any push transport that can deliver the four
//! lifecycle signals of one exchange: open acknowledgement, message, error,
//! and normal close. Cancellation is handed in as a token; cancelling it
//! aborts the in-flight request.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::request::RequestDescriptor;

/// One decoded server-sent event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`event:` field), `None` for the default `message` type
    pub event: Option<String>,
    /// Payload (`data:` lines joined with `\n`)
    pub data: String,
    /// Event id (`id:` field), if any
    pub id: Option<String>,
}

impl SseEvent {
    /// A default-typed event carrying `data`
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }
}

/// Signals delivered by a transport for one exchange
///
/// The channel carrying these ends after [`TransportEvent::Error`] or
/// [`TransportEvent::Closed`], or as soon as the exchange is cancelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The server acknowledged the request with this status
    Opened {
        /// HTTP status code
        status: u16,
    },
    /// An event arrived
    Message(SseEvent),
    /// The exchange failed
    Error(String),
    /// The server ended the event stream
    Closed,
}

/// Errors raised by transports before or outside an event stream
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The descriptor cannot be turned into a request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The peer side of an in-process transport went away
    #[error("transport channel closed")]
    ChannelClosed,

    /// Response body could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A push transport for chat turns
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Open an event stream for `request`
    ///
    /// Returns a receiver of lifecycle events. Failures after the request
    /// was issued (network errors, bad status) arrive as events, not as an
    /// `Err`. Once `cancel` fires, the implementation aborts the request and
    /// emits nothing more.
    async fn open(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Send a one-shot request and return its JSON response
    ///
    /// An empty body yields `Value::Null`; a non-JSON body is returned as a
    /// string value.
    async fn send(&self, request: RequestDescriptor) -> Result<serde_json::Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_event_data() {
        let event = SseEvent::data("{}");
        assert_eq!(event.data, "{}");
        assert!(event.event.is_none());
        assert!(event.id.is_none());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "server returned 502: bad gateway");
        assert!(TransportError::ConnectionFailed("refused".into())
            .to_string()
            .contains("connection failed"));
    }
}
