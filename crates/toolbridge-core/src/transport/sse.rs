//! SSE transport (plain and OAuth)
//!
//! A long-lived GET carries server-to-client messages as events. The first
//! `endpoint` event names the URL that client messages are POSTed to;
//! responses come back on the stream as `message` events. The transport
//! plugs into rmcp's client as a [`rmcp::transport::Transport`].

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::Transport;
use rmcp::RoleClient;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use super::event_stream::{EventStreamDecoder, SseEvent};
use super::{HttpClients, TransportKind};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::Logger;
use crate::oauth::OAuthClient;

/// Messages buffered between the reader task and the client service
const INBOX_CAPACITY: usize = 64;

/// Authenticated HTTP sender shared by the transport and the stream request
#[derive(Clone)]
struct HttpSender {
    server_id: Arc<str>,
    client: reqwest::Client,
    headers: HeaderMap,
    auth: Option<Arc<OAuthClient>>,
}

impl HttpSender {
    fn error(&self, message: impl std::fmt::Display) -> BridgeError {
        BridgeError::transport(self.server_id.as_ref(), message)
    }

    async fn authorize(&self, builder: RequestBuilder) -> BridgeResult<RequestBuilder> {
        match &self.auth {
            Some(auth) => Ok(builder.header(AUTHORIZATION, auth.authorization_header().await?)),
            None => Ok(builder),
        }
    }

    /// Send, retrying once with a fresh token when the server answers 401
    async fn send<F>(&self, build: F) -> BridgeResult<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retried = false;
        loop {
            let request = self.authorize(build().headers(self.headers.clone())).await?;
            let response = request.send().await.map_err(|e| self.error(e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !retried {
                if let Some(auth) = &self.auth {
                    auth.invalidate()?;
                    retried = true;
                    continue;
                }
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(self.error(format!("server returned {}: {}", status, body)));
            }
            return Ok(response);
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &Url, body: &T) -> BridgeResult<()> {
        self.send(|| self.client.post(endpoint.clone()).json(body)).await?;
        Ok(())
    }
}

/// Client side of an SSE (or OAuth-SSE) session
pub struct SseTransport {
    server_id: String,
    kind: TransportKind,
    endpoint: Url,
    sender: HttpSender,
    inbox: mpsc::Receiver<ServerJsonRpcMessage>,
    reader: Option<JoinHandle<()>>,
    logger: Arc<dyn Logger>,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` event
    pub async fn connect(
        server_id: &str,
        url: Url,
        headers: HeaderMap,
        clients: &HttpClients,
        auth: Option<Arc<OAuthClient>>,
        logger: Arc<dyn Logger>,
    ) -> BridgeResult<Self> {
        let kind = if auth.is_some() {
            TransportKind::OAuthSse
        } else {
            TransportKind::Sse
        };
        logger.info(&format!("[sse] {}: connecting to {}", server_id, url));

        let stream_sender = HttpSender {
            server_id: Arc::from(server_id),
            client: clients.streaming().clone(),
            headers: headers.clone(),
            auth: auth.clone(),
        };
        let response = stream_sender
            .send(|| {
                stream_sender
                    .client
                    .get(url.clone())
                    .header(ACCEPT, "text/event-stream")
            })
            .await?;

        // POSTs are answered with 202 right away, the reply travels on the stream
        let sender = HttpSender {
            client: clients.aux().clone(),
            ..stream_sender
        };
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        let router = EventRouter {
            server_id: server_id.to_string(),
            base: url,
            inbox: inbox_tx,
            endpoint_tx: Some(endpoint_tx),
            logger: logger.clone(),
        };
        let reader = tokio::spawn(router.run(response));

        let endpoint = match tokio::time::timeout(clients.timeout(), endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(e))) => {
                reader.abort();
                return Err(e);
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(BridgeError::transport(
                    server_id,
                    "event stream ended before the endpoint event",
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(BridgeError::transport(
                    server_id,
                    "timed out waiting for the endpoint event",
                ));
            }
        };
        logger.debug(&format!("[sse] {}: posting messages to {}", server_id, endpoint));

        Ok(Self {
            server_id: server_id.to_string(),
            kind,
            endpoint,
            sender,
            inbox,
            reader: Some(reader),
            logger,
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// URL announced by the server's `endpoint` event
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport<RoleClient> for SseTransport {
    type Error = BridgeError;

    fn send(&mut self, item: ClientJsonRpcMessage) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let sender = self.sender.clone();
        let endpoint = self.endpoint.clone();
        async move { sender.post(&endpoint, &item).await }
    }

    fn receive(&mut self) -> impl Future<Output = Option<ServerJsonRpcMessage>> + Send {
        self.inbox.recv()
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inbox.close();
        self.logger.debug(&format!("[sse] {}: closed", self.server_id));
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Reader task state: turns stream events into client messages
struct EventRouter {
    server_id: String,
    base: Url,
    inbox: mpsc::Sender<ServerJsonRpcMessage>,
    endpoint_tx: Option<oneshot::Sender<BridgeResult<Url>>>,
    logger: Arc<dyn Logger>,
}

impl EventRouter {
    async fn run(mut self, response: reqwest::Response) {
        let mut decoder = EventStreamDecoder::new();
        let mut stream = response.bytes_stream();

        let reason = 'read: loop {
            match stream.next().await {
                Some(Ok(bytes)) => {
                    for event in decoder.push(&bytes) {
                        if !self.handle(event).await {
                            break 'read "client went away".to_string();
                        }
                    }
                }
                Some(Err(e)) => break format!("event stream read failed: {}", e),
                None => {
                    if let Some(event) = decoder.finish() {
                        self.handle(event).await;
                    }
                    break "event stream ended".to_string();
                }
            }
        };

        // Dropping the inbox sender tells the client service the transport is gone
        self.logger.warn(&format!("[sse] {}: {}", self.server_id, reason));
        if let Some(tx) = self.endpoint_tx.take() {
            let _ = tx.send(Err(BridgeError::transport(&self.server_id, reason)));
        }
    }

    /// Returns false once nobody is receiving
    async fn handle(&mut self, event: SseEvent) -> bool {
        match event.event.as_str() {
            "endpoint" => {
                let resolved = self.base.join(event.data.trim()).map_err(|e| {
                    BridgeError::transport(&self.server_id, format!("invalid endpoint '{}': {}", event.data, e))
                });
                if let Some(tx) = self.endpoint_tx.take() {
                    let _ = tx.send(resolved);
                }
                true
            }
            "message" => match serde_json::from_str::<ServerJsonRpcMessage>(&event.data) {
                Ok(message) => self.inbox.send(message).await.is_ok(),
                Err(e) => {
                    self.logger.warn(&format!("[sse] {}: unparseable message event: {}", self.server_id, e));
                    true
                }
            },
            other => {
                self.logger.debug(&format!("[sse] {}: ignoring '{}' event", self.server_id, other));
                true
            }
        }
    }
}
