//! Builds connected transports from their configuration

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::config::{header_map, parse_url};
use super::{http, stdio, McpConnection, SseTransport, TransportConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{Logger, NoOpLogger};
use crate::oauth::{MemoryTokenStore, OAuthClient, TokenStore};

/// Request timeout of the shared HTTP client
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP clients shared by every network transport
///
/// `aux` has a bounded request timeout and is used for SSE POSTs (answered
/// with 202 right away) and OAuth calls. `streaming` only bounds connection
/// setup, so event streams and streamable HTTP calls stay open as long as
/// the caller's context allows.
#[derive(Debug, Clone)]
pub struct HttpClients {
    aux: reqwest::Client,
    streaming: reqwest::Client,
    timeout: Duration,
}

impl HttpClients {
    pub fn new(timeout: Duration) -> BridgeResult<Self> {
        let aux = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::configuration(format!("failed to build HTTP client: {}", e)))?;
        let streaming = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BridgeError::configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            aux,
            streaming,
            timeout,
        })
    }

    pub fn aux(&self) -> &reqwest::Client {
        &self.aux
    }

    pub fn streaming(&self) -> &reqwest::Client {
        &self.streaming
    }

    /// A streaming client that sends `headers` on every request
    pub fn streaming_with_headers(&self, headers: HeaderMap) -> BridgeResult<reqwest::Client> {
        if headers.is_empty() {
            return Ok(self.streaming.clone());
        }
        reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| BridgeError::configuration(format!("failed to build HTTP client: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Produces connected-but-uninitialized connections
///
/// The registry depends on this trait only, so tests can substitute an
/// in-process fake.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, server_id: &str, config: &TransportConfig) -> BridgeResult<McpConnection>;
}

/// Factory for the four built-in transports
pub struct DefaultTransportFactory {
    clients: HttpClients,
    token_store: Arc<dyn TokenStore>,
    logger: Arc<dyn Logger>,
}

impl DefaultTransportFactory {
    pub fn new(timeout: Duration, logger: Arc<dyn Logger>) -> BridgeResult<Self> {
        Ok(Self {
            clients: HttpClients::new(timeout)?,
            token_store: Arc::new(MemoryTokenStore::new()),
            logger,
        })
    }

    /// Keep OAuth tokens in `store` instead of a private in-memory store
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = store;
        self
    }

    pub fn token_store(&self) -> Arc<dyn TokenStore> {
        self.token_store.clone()
    }

    pub fn clients(&self) -> &HttpClients {
        &self.clients
    }
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        let clients = HttpClients::new(DEFAULT_HTTP_TIMEOUT).unwrap_or_else(|_| HttpClients {
            aux: reqwest::Client::new(),
            streaming: reqwest::Client::new(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        });
        Self {
            clients,
            token_store: Arc::new(MemoryTokenStore::new()),
            logger: Arc::new(NoOpLogger),
        }
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn connect(&self, server_id: &str, config: &TransportConfig) -> BridgeResult<McpConnection> {
        if server_id.trim().is_empty() {
            return Err(BridgeError::configuration("server id is required"));
        }
        config.validate()?;

        match config {
            TransportConfig::Stdio { command, args, env } => {
                stdio::spawn(server_id, command, args, env, self.logger.clone())
            }
            TransportConfig::Sse { url, headers } => {
                let url = parse_url(url, config.kind())?;
                let transport = SseTransport::connect(
                    server_id,
                    url,
                    header_map(headers)?,
                    &self.clients,
                    None,
                    self.logger.clone(),
                )
                .await?;
                Ok(McpConnection::new(transport.kind(), transport))
            }
            TransportConfig::OAuthSse { url, headers, oauth } => {
                let url = parse_url(url, config.kind())?;
                let auth = OAuthClient::new(
                    server_id,
                    url.clone(),
                    oauth.clone(),
                    self.clients.aux().clone(),
                    self.token_store.clone(),
                    self.logger.clone(),
                );
                // Acquire the first token before opening the stream
                auth.authorization_header().await?;
                let transport = SseTransport::connect(
                    server_id,
                    url,
                    header_map(headers)?,
                    &self.clients,
                    Some(Arc::new(auth)),
                    self.logger.clone(),
                )
                .await?;
                Ok(McpConnection::new(transport.kind(), transport))
            }
            TransportConfig::StreamableHttp { url, headers } => {
                let url = parse_url(url, config.kind())?;
                http::connect(server_id, url, header_map(headers)?, &self.clients, self.logger.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthParams;
    use crate::transport::TransportKind;

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let factory = DefaultTransportFactory::default();

        let err = factory
            .connect("files", &TransportConfig::stdio("  ", Vec::<String>::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));

        let err = factory
            .connect("docs", &TransportConfig::oauth_sse("https://x.example.com/sse", OAuthParams::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::Configuration(_)));

        let err = factory
            .connect("", &TransportConfig::sse("http://localhost:1/sse"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("server id"));
    }

    #[tokio::test]
    async fn test_streamable_http_connects_lazily() {
        let factory = DefaultTransportFactory::default();
        let connection = factory
            .connect("remote", &TransportConfig::streamable_http("http://127.0.0.1:9/mcp"))
            .await
            .unwrap();
        assert_eq!(connection.kind(), TransportKind::StreamableHttp);
    }

    #[test]
    fn test_streaming_client_carries_configured_headers() {
        let clients = HttpClients::new(Duration::from_secs(1)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(clients.streaming_with_headers(headers).is_ok());
        assert!(clients.streaming_with_headers(HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_http_clients_keep_timeout() {
        let clients = HttpClients::new(Duration::from_secs(5)).unwrap();
        assert_eq!(clients.timeout(), Duration::from_secs(5));
    }
}
