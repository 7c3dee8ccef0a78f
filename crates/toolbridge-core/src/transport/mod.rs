//! Transports to remote tool servers
//!
//! A factory turns a [`TransportConfig`] into an [`McpConnection`]: a
//! dialed (or spawned) channel that rmcp's client drives once the session
//! performs the handshake. Request ids, response pairing and server-to-client
//! requests are handled by rmcp's service loop.

mod config;
pub(crate) mod connection;
mod event_stream;
mod factory;
mod http;
mod sse;
mod stdio;

pub use config::{TransportConfig, TransportKind};
pub use connection::{McpClient, McpConnection};
pub use event_stream::{EventStreamDecoder, SseEvent};
pub use factory::{DefaultTransportFactory, HttpClients, TransportFactory, DEFAULT_HTTP_TIMEOUT};
pub use sse::SseTransport;
