//! HTTP Event-Stream Transport
//!
//! Opens chat turns as `text/event-stream` responses over reqwest. The body
//! is framed into events by `eventsource-stream`; the stream is read once and
//! never reconnected.
//!
//! The client is built without a total request timeout and with TCP
//! keep-alive enabled: a turn may stay open for as long as the server keeps
//! generating, including long silent stretches while the surface is hidden or
//! backgrounded. Only connection establishment is bounded.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::traits::{SseEvent, StreamTransport, TransportError, TransportEvent};
use crate::config::ClientConfig;
use crate::request::{Method, RequestDescriptor};

/// reqwest-backed event-stream transport
#[derive(Clone)]
pub struct HttpTransport {
    /// HTTP client
    http_client: reqwest::Client,
    /// Origin that relative request paths are joined onto
    origin: Option<Url>,
    /// Capacity of each exchange's event channel
    event_buffer: usize,
}

impl HttpTransport {
    /// Create a transport from client configuration
    ///
    /// # Errors
    ///
    /// Fails if the configured origin is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let origin = config
            .origin
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| TransportError::InvalidRequest(format!("bad origin: {e}")))?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        if config.tcp_keepalive_secs > 0 {
            builder = builder.tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs));
        }
        let http_client = builder
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            origin,
            event_buffer: config.event_buffer.max(1),
        })
    }

    /// Resolve a descriptor URL, joining paths onto the configured origin
    fn resolve_url(&self, url: &str) -> Result<Url, TransportError> {
        if !url.starts_with('/') {
            return Url::parse(url).map_err(|e| TransportError::InvalidRequest(e.to_string()));
        }

        match self.origin {
            Some(ref origin) => origin
                .join(url)
                .map_err(|e| TransportError::InvalidRequest(e.to_string())),
            None => Err(TransportError::InvalidRequest(format!(
                "relative URL {url} needs a configured origin"
            ))),
        }
    }

    fn request(&self, descriptor: &RequestDescriptor) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self.resolve_url(&descriptor.url)?;
        let method = match descriptor.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.http_client.request(method, url);
        for (name, value) in &descriptor.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = descriptor.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

/// Default-typed events carry no event name; an empty id means none
fn sse_event(event: Event) -> SseEvent {
    SseEvent {
        event: Some(event.event).filter(|name| !name.is_empty() && name != "message"),
        data: event.data,
        id: Some(event.id).filter(|id| !id.is_empty()),
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    fn name(&self) -> &str {
        "HTTP event-stream"
    }

    async fn open(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let builder = self
            .request(&request)?
            .header(ACCEPT, "text/event-stream");
        let (tx, rx) = mpsc::channel(self.event_buffer);

        tokio::spawn(async move {
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(url = %request.url, "Exchange cancelled before open");
                    return;
                }
                response = builder.send() => response,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                    return;
                }
            };

            let status = response.status();
            if tx
                .send(TransportEvent::Opened {
                    status: status.as_u16(),
                })
                .await
                .is_err()
                || !status.is_success()
            {
                return;
            }

            let mut stream = response.bytes_stream().eventsource();

            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!(url = %request.url, "Exchange cancelled");
                        return;
                    }
                    next = stream.next() => next,
                };

                match next {
                    Some(Ok(event)) if event.data.is_empty() => {
                        tracing::trace!(event = %event.event, "Skipping event without data");
                    }
                    Some(Ok(event)) => {
                        if tx.send(TransportEvent::Message(sse_event(event))).await.is_err() {
                            // Receiver dropped, stop streaming
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        let _ = tx.send(TransportEvent::Closed).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, request: RequestDescriptor) -> Result<serde_json::Value, TransportError> {
        let response = self
            .request(&request)?
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(status = status.as_u16(), error = %e, "Failed to read error body");
                    String::new()
                }
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}
