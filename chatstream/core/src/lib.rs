//! Chatstream Core - Streaming Transport for Knowledge-Base Chat
//!
//! Opens a server-sent event stream for one chat turn against a
//! knowledge-base chat server, authenticates it from persisted login state,
//! and hands every parsed event payload to a consumer as it arrives.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      StreamController                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────┐  │
//! │  │  Credential    │  │    Request     │  │    Stream      │  │
//! │  │  Resolver      │─►│    Builder     │─►│    Session     │  │
//! │  │ (StateProvider)│  │ (descriptors)  │  │ (state machine)│  │
//! │  └────────────────┘  └────────────────┘  └───────▲────────┘  │
//! └──────────────────────────────────────────────────┼───────────┘
//!                                                    │ TransportEvent
//! ┌──────────────────────────────────────────────────┼───────────┐
//! │                    StreamTransport                            │
//! │        HttpTransport (reqwest + SSE)  │  InProcessTransport   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`StreamController`]: starts and stops turns, exposes observable state
//! - [`CredentialResolver`]: bearer token, request id, tenant override
//! - [`RequestBuilder`]: turns a [`StreamRequest`] into a [`RequestDescriptor`]
//! - [`StreamTransport`]: push transport abstraction
//! - [`ClientConfig`]: server location and transport tuning
//!
//! # Quick Start
//!
//! ```ignore
//! use chatstream_core::{load_config, StreamController, StreamRequest, AGENT_CHAT_ENDPOINT};
//!
//! let config = load_config()?;
//! let controller = StreamController::from_config(&config)?;
//! controller.on_chunk(|chunk| println!("{chunk}"));
//! controller
//!     .start_stream(StreamRequest::post(AGENT_CHAT_ENDPOINT, "session-1", "hello"))
//!     .await;
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod chunk;
pub mod config;
pub mod credentials;
pub mod error;
pub mod request;
pub mod state;
pub mod streaming;
pub mod transport;

pub use chunk::{Chunk, ResponseType, StreamResponse};
pub use config::{
    default_config_path, default_state_path, load_config, load_config_from_path, ClientConfig,
    ConfigError, ConfigOverrides, ConfigSource,
};
pub use credentials::{AuthContext, CredentialResolver, RequestId};
pub use error::StreamError;
pub use request::{
    Method, RequestBuilder, RequestDescriptor, StreamRequest, TurnOp, AGENT_CHAT_ENDPOINT,
    KNOWLEDGE_CHAT_ENDPOINT,
};
pub use state::{FileStateStore, MemoryStateStore, StateProvider};
pub use streaming::{StreamController, StreamPhase, StreamSnapshot};
pub use transport::{
    HttpTransport, InProcessServer, InProcessTransport, StreamTransport, TransportError,
    TransportEvent,
};
