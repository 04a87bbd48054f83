//! In-Process Transport
//!
//! Channel-based transport for embedding a chat server in the same process,
//! and for driving the streaming core deterministically in tests.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, mut server) = InProcessTransport::new_pair();
//!
//! // Give the transport to a StreamController, then serve exchanges:
//! while let Some(exchange) = server.accept().await {
//!     exchange.ack(200).await;
//!     exchange.message_json(&serde_json::json!({"content": "hi"})).await;
//!     exchange.close().await;
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::traits::{SseEvent, StreamTransport, TransportError, TransportEvent};
use crate::request::RequestDescriptor;

/// Default capacity of exchange event channels
const DEFAULT_CAPACITY: usize = 100;

/// Requests seen by the transport
#[derive(Debug, Default)]
struct RequestLog {
    opened: Vec<RequestDescriptor>,
    sent: Vec<RequestDescriptor>,
}

/// Client half: implements [`StreamTransport`]
#[derive(Clone)]
pub struct InProcessTransport {
    /// Hands new exchanges to the server half
    exchange_tx: mpsc::UnboundedSender<InProcessExchange>,
    /// Every request issued through this transport
    log: Arc<Mutex<RequestLog>>,
    /// Capacity of each exchange's event channel
    capacity: usize,
}

/// Server half: accepts exchanges opened by the client
pub struct InProcessServer {
    exchange_rx: mpsc::UnboundedReceiver<InProcessExchange>,
}

/// One open exchange, as seen by the server half
pub struct InProcessExchange {
    /// The request that opened the exchange
    pub request: RequestDescriptor,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl InProcessTransport {
    /// Create a connected transport/server pair
    #[must_use]
    pub fn new_pair() -> (Self, InProcessServer) {
        Self::new_pair_with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with custom event channel capacity
    #[must_use]
    pub fn new_pair_with_capacity(capacity: usize) -> (Self, InProcessServer) {
        let (exchange_tx, exchange_rx) = mpsc::unbounded_channel();
        let transport = Self {
            exchange_tx,
            log: Arc::new(Mutex::new(RequestLog::default())),
            capacity: capacity.max(1),
        };
        (transport, InProcessServer { exchange_rx })
    }

    /// Number of event streams opened so far
    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.log.lock().opened.len()
    }

    /// Requests that opened event streams, oldest first
    #[must_use]
    pub fn opened_requests(&self) -> Vec<RequestDescriptor> {
        self.log.lock().opened.clone()
    }

    /// One-shot requests sent so far, oldest first
    #[must_use]
    pub fn sent_requests(&self) -> Vec<RequestDescriptor> {
        self.log.lock().sent.clone()
    }
}

#[async_trait]
impl StreamTransport for InProcessTransport {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn open(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (events, rx) = mpsc::channel(self.capacity);
        self.log.lock().opened.push(request.clone());

        self.exchange_tx
            .send(InProcessExchange {
                request,
                events,
                cancel,
            })
            .map_err(|_| TransportError::ChannelClosed)?;

        Ok(rx)
    }

    async fn send(&self, request: RequestDescriptor) -> Result<serde_json::Value, TransportError> {
        self.log.lock().sent.push(request);
        Ok(serde_json::Value::Null)
    }
}

impl InProcessServer {
    /// Wait for the next exchange; `None` once every transport clone is dropped
    pub async fn accept(&mut self) -> Option<InProcessExchange> {
        self.exchange_rx.recv().await
    }

    /// Take the next exchange if one is already waiting
    pub fn try_accept(&mut self) -> Option<InProcessExchange> {
        self.exchange_rx.try_recv().ok()
    }
}

impl InProcessExchange {
    /// Send a raw event; `false` if the client stopped listening
    pub async fn send(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Acknowledge the open with `status`
    pub async fn ack(&self, status: u16) -> bool {
        self.send(TransportEvent::Opened { status }).await
    }

    /// Deliver a message with a raw data payload
    pub async fn message(&self, data: impl Into<String>) -> bool {
        self.send(TransportEvent::Message(SseEvent::data(data))).await
    }

    /// Deliver a message carrying `value` as JSON
    pub async fn message_json(&self, value: &serde_json::Value) -> bool {
        self.message(value.to_string()).await
    }

    /// Fail the exchange
    pub async fn error(&self, message: impl Into<String>) -> bool {
        self.send(TransportEvent::Error(message.into())).await
    }

    /// End the event stream normally
    pub async fn close(&self) -> bool {
        self.send(TransportEvent::Closed).await
    }

    /// Whether the client cancelled this exchange
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the client cancels this exchange
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            method: Method::Post,
            url: "/api/v1/agent-chat/s1".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn test_in_process_roundtrip() {
        let (transport, mut server) = InProcessTransport::new_pair();

        let mut rx = transport
            .open(descriptor(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transport.opened_count(), 1);

        let exchange = server.accept().await.unwrap();
        assert_eq!(exchange.request.url, "/api/v1/agent-chat/s1");
        assert!(exchange.ack(200).await);
        assert!(exchange.message("{}").await);
        assert!(exchange.close().await);

        assert_eq!(rx.recv().await, Some(TransportEvent::Opened { status: 200 }));
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Message(SseEvent::data("{}")))
        );
        assert_eq!(rx.recv().await, Some(TransportEvent::Closed));
    }

    #[tokio::test]
    async fn test_exchange_sees_cancellation() {
        let (transport, mut server) = InProcessTransport::new_pair();
        let cancel = CancellationToken::new();

        let _rx = transport.open(descriptor(), cancel.clone()).await.unwrap();
        let exchange = server.try_accept().unwrap();
        assert!(!exchange.is_cancelled());

        cancel.cancel();
        exchange.cancelled().await;
        assert!(exchange.is_cancelled());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (transport, mut server) = InProcessTransport::new_pair();
        let rx = transport
            .open(descriptor(), CancellationToken::new())
            .await
            .unwrap();
        drop(rx);

        let exchange = server.accept().await.unwrap();
        assert!(!exchange.ack(200).await);
    }

    #[tokio::test]
    async fn test_open_fails_when_server_dropped() {
        let (transport, server) = InProcessTransport::new_pair();
        drop(server);

        let result = transport.open(descriptor(), CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_one_shot_requests_are_logged() {
        let (transport, _server) = InProcessTransport::new_pair();
        let value = transport.send(descriptor()).await.unwrap();
        assert!(value.is_null());
        assert_eq!(transport.sent_requests().len(), 1);
        assert_eq!(transport.opened_count(), 0);
    }
}
