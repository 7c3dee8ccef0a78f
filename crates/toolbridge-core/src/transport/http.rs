//! Streamable HTTP transport
//!
//! rmcp's streamable HTTP client owns the protocol details: one POST per
//! message, JSON or event-stream replies, the `Mcp-Session-Id` header and
//! the closing DELETE. This module only supplies its HTTP client.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use url::Url;

use super::{HttpClients, McpConnection, TransportKind};
use crate::error::BridgeResult;
use crate::logging::Logger;

/// No I/O happens until the handshake
///
/// Requests go through a streaming client: connection setup is bounded,
/// but a slow tool call is only limited by the caller's context.
pub(crate) fn connect(
    server_id: &str,
    url: Url,
    headers: HeaderMap,
    clients: &HttpClients,
    logger: Arc<dyn Logger>,
) -> BridgeResult<McpConnection> {
    logger.info(&format!("[http] {}: using {}", server_id, url));

    let client = clients.streaming_with_headers(headers)?;
    let config = StreamableHttpClientTransportConfig::with_uri(url.as_str());
    let transport = StreamableHttpClientTransport::with_client(client, config);
    Ok(McpConnection::new(TransportKind::StreamableHttp, transport))
}
