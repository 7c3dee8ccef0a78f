//! Protocol session: handshake and lifecycle of one remote server
//!
//! `Disconnected -> Connecting -> Started -> Initializing -> Ready`. Any
//! failed step moves to `Failed` and releases the connection; there is no
//! automatic reconnect. Once ready, requests go through the peer of rmcp's
//! running client service.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, ClientRequest, ErrorCode, Implementation,
    PaginatedRequestParams, PingRequest, RawContent, Tool,
};
use rmcp::service::ClientInitializeError;
use rmcp::{Peer, RoleClient, ServiceError};
use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::logging::Logger;
use crate::transport::connection::{Cleanup, Handshake};
use crate::transport::{McpClient, McpConnection, TransportConfig, TransportFactory, TransportKind};
use crate::types::{CallContext, SessionState};

/// Identity advertised in `initialize`
pub fn client_info(name: &str, version: &str) -> ClientInfo {
    ClientInfo {
        meta: None,
        protocol_version: Default::default(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: name.to_string(),
            title: None,
            version: version.to_string(),
            website_url: None,
            icons: None,
        },
    }
}

/// One handshaked connection to a remote tool server
pub struct ProtocolSession {
    server_id: String,
    transport_kind: TransportKind,
    state: RwLock<SessionState>,
    handshake: Mutex<Option<Handshake>>,
    cleanup: Mutex<Option<Cleanup>>,
    service: Mutex<Option<McpClient>>,
    peer: RwLock<Option<Peer<RoleClient>>>,
    server_info: RwLock<Option<Implementation>>,
    protocol_version: RwLock<Option<String>>,
    client_info: ClientInfo,
    created_at: DateTime<Utc>,
    logger: Arc<dyn Logger>,
}

impl ProtocolSession {
    pub fn new(
        server_id: impl Into<String>,
        transport_kind: TransportKind,
        client_info: ClientInfo,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            transport_kind,
            state: RwLock::new(SessionState::Disconnected),
            handshake: Mutex::new(None),
            cleanup: Mutex::new(None),
            service: Mutex::new(None),
            peer: RwLock::new(None),
            server_info: RwLock::new(None),
            protocol_version: RwLock::new(None),
            client_info,
            created_at: Utc::now(),
            logger,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `serverInfo` from the initialize result
    pub fn server_info(&self) -> Option<Implementation> {
        self.server_info.read().clone()
    }

    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().clone()
    }

    fn expect_state(&self, expected: SessionState) -> BridgeResult<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(BridgeError::InvalidState {
                server_id: self.server_id.clone(),
                state,
                expected,
            })
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write();
        // Closed is terminal; a late failure must not resurrect the session
        if *state != SessionState::Closed {
            *state = next;
        }
    }

    /// Stop the client service, then run the connection's cleanup
    async fn release(&self) -> BridgeResult<()> {
        self.handshake.lock().take();
        self.peer.write().take();
        let service = self.service.lock().take();
        let cleanup = self.cleanup.lock().take();

        let mut result = Ok(());
        if let Some(service) = service {
            if let Err(e) = service.cancel().await {
                result = Err(BridgeError::transport(&self.server_id, format!("client service panicked: {}", e)));
            }
        }
        if let Some(cleanup) = cleanup {
            let cleaned = cleanup.run().await;
            if result.is_ok() {
                result = cleaned;
            }
        }
        result
    }

    async fn fail(&self) {
        self.set_state(SessionState::Failed);
        if let Err(e) = self.release().await {
            self.logger.debug(&format!(
                "[Session] {}: releasing failed connection: {}",
                self.server_id, e
            ));
        }
    }

    /// Dial or spawn through `factory`; `Disconnected -> Started`
    pub async fn connect(
        &self,
        ctx: &CallContext,
        factory: &dyn TransportFactory,
        config: &TransportConfig,
    ) -> BridgeResult<()> {
        self.expect_state(SessionState::Disconnected)?;
        self.set_state(SessionState::Connecting);

        match ctx.cancellable(factory.connect(&self.server_id, config)).await {
            Ok(connection) => {
                self.adopt(connection);
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("[Session] {}: connect failed: {}", self.server_id, e));
                self.fail().await;
                Err(e)
            }
        }
    }

    /// Adopt an already connected transport; `Disconnected -> Started`
    pub fn attach(&self, connection: McpConnection) -> BridgeResult<()> {
        self.expect_state(SessionState::Disconnected)?;
        self.adopt(connection);
        Ok(())
    }

    fn adopt(&self, connection: McpConnection) {
        let (handshake, cleanup) = connection.into_parts();
        *self.handshake.lock() = Some(handshake);
        *self.cleanup.lock() = cleanup;
        self.set_state(SessionState::Started);
    }

    /// Protocol handshake; `Started -> Initializing -> Ready`
    pub async fn initialize(&self, ctx: &CallContext) -> BridgeResult<()> {
        self.expect_state(SessionState::Started)?;
        self.set_state(SessionState::Initializing);

        match self.handshake(ctx).await {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                self.logger.info(&format!(
                    "[Session] {}: ready (server {}, protocol {})",
                    self.server_id,
                    self.server_info()
                        .map(|i| format!("{} {}", i.name, i.version))
                        .unwrap_or_else(|| "unknown".to_string()),
                    self.protocol_version().unwrap_or_default()
                ));
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("[Session] {}: initialize failed: {}", self.server_id, e));
                self.fail().await;
                Err(e)
            }
        }
    }

    async fn handshake(&self, ctx: &CallContext) -> BridgeResult<()> {
        let handshake = self
            .handshake
            .lock()
            .take()
            .ok_or_else(|| BridgeError::handshake(&self.server_id, "connection already used"))?;

        let info = self.client_info.clone();
        let service = ctx
            .cancellable(async move {
                handshake
                    .serve(info)
                    .await
                    .map_err(|e| initialize_error(&self.server_id, e))
            })
            .await?;

        if let Some(result) = service.peer_info() {
            *self.protocol_version.write() = Some(result.protocol_version.to_string());
            *self.server_info.write() = Some(result.server_info.clone());
        }
        *self.peer.write() = Some(service.peer().clone());
        *self.service.lock() = Some(service);
        Ok(())
    }

    fn peer(&self) -> BridgeResult<Peer<RoleClient>> {
        self.expect_state(SessionState::Ready)?;
        self.peer.read().clone().ok_or_else(|| BridgeError::InvalidState {
            server_id: self.server_id.clone(),
            state: self.state(),
            expected: SessionState::Ready,
        })
    }

    /// Await a request on a ready session; a transport failure fails the session
    async fn request<T, F>(&self, ctx: &CallContext, method: &str, request: F) -> BridgeResult<T>
    where
        F: std::future::Future<Output = Result<T, ServiceError>>,
    {
        let result = ctx
            .cancellable(async { request.await.map_err(|e| service_error(&self.server_id, e)) })
            .await;
        if let Err(e) = &result {
            if e.is_transport() {
                self.logger.warn(&format!(
                    "[Session] {}: {} failed, marking session failed: {}",
                    self.server_id, method, e
                ));
                self.fail().await;
            }
        }
        result
    }

    /// All tools advertised by the server, following pagination
    pub async fn list_tools(&self, ctx: &CallContext) -> BridgeResult<Vec<Tool>> {
        let peer = self.peer()?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = PaginatedRequestParams {
                meta: None,
                cursor: cursor.clone(),
            };
            let page = self.request(ctx, "tools/list", peer.list_tools(Some(params))).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    self.logger.warn(&format!(
                        "[Session] {}: repeated cursor {}, stopping pagination",
                        self.server_id, next
                    ));
                    break;
                }
                None => break,
            }
        }

        self.logger.debug(&format!("[Session] {}: listed {} tools", self.server_id, tools.len()));
        Ok(tools)
    }

    /// Invoke a remote tool; an `isError` result becomes [`BridgeError::Protocol`]
    ///
    /// `arguments` must be a JSON object or null.
    pub async fn call_tool(&self, ctx: &CallContext, name: &str, arguments: Value) -> BridgeResult<CallToolResult> {
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            _ => return Err(BridgeError::Schema("arguments must be an object".to_string())),
        };
        let peer = self.peer()?;
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_owned().into(),
            arguments,
            task: None,
        };
        let result = self.request(ctx, "tools/call", peer.call_tool(params)).await?;

        if result.is_error.unwrap_or(false) {
            return Err(BridgeError::Protocol {
                tool: name.to_string(),
                message: error_text(&result),
            });
        }
        Ok(result)
    }

    pub async fn ping(&self, ctx: &CallContext) -> BridgeResult<()> {
        let peer = self.peer()?;
        let ping = ClientRequest::PingRequest(PingRequest {
            method: Default::default(),
            extensions: Default::default(),
        });
        self.request(ctx, "ping", peer.send_request(ping)).await.map(|_| ())
    }

    /// Release the connection; any state moves to `Closed`
    pub async fn close(&self) -> BridgeResult<()> {
        let was = std::mem::replace(&mut *self.state.write(), SessionState::Closed);
        if was != SessionState::Closed {
            self.logger.info(&format!("[Session] {}: closing", self.server_id));
        }
        self.release().await
    }
}

fn initialize_error(server_id: &str, err: ClientInitializeError) -> BridgeError {
    match err {
        ClientInitializeError::Cancelled => BridgeError::Cancelled,
        ClientInitializeError::JsonRpcError(data) => {
            BridgeError::handshake(server_id, format!("server refused initialize: {}", data.message))
        }
        other => BridgeError::handshake(server_id, other),
    }
}

fn service_error(server_id: &str, err: ServiceError) -> BridgeError {
    match err {
        ServiceError::McpError(data) => BridgeError::Rpc {
            code: i64::from(data.code.0),
            message: data.message.into_owned(),
        },
        ServiceError::Cancelled { .. } => BridgeError::Cancelled,
        ServiceError::UnexpectedResponse => BridgeError::Rpc {
            code: i64::from(ErrorCode::INTERNAL_ERROR.0),
            message: "unexpected response type".to_string(),
        },
        other => BridgeError::transport(server_id, other),
    }
}

fn error_text(result: &CallToolResult) -> String {
    let text = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        "remote tool reported an error".to_string()
    } else {
        text
    }
}

impl std::fmt::Debug for ProtocolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolSession")
            .field("server_id", &self.server_id)
            .field("transport_kind", &self.transport_kind)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// In-memory server answering by method name
    ///
    /// Hangs up instead of answering `hang_up`; returns the methods it saw.
    fn scripted(hang_up: Option<&'static str>) -> (McpConnection, Arc<Mutex<Vec<String>>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let methods = Arc::new(Mutex::new(Vec::new()));
        let seen = methods.clone();

        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let message: Value = serde_json::from_str(&line).unwrap();
                let method = message["method"].as_str().unwrap_or_default().to_string();
                seen.lock().push(method.clone());
                if hang_up == Some(method.as_str()) {
                    return;
                }
                let Some(id) = message.get("id").cloned() else {
                    continue;
                };
                let params = &message["params"];
                let result = match method.as_str() {
                    "initialize" => json!({
                        "protocolVersion": "2025-03-26",
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "scripted", "version": "1.0" }
                    }),
                    "tools/list" if params.get("cursor").is_none() => json!({
                        "tools": [{ "name": "a", "inputSchema": { "type": "object" } }],
                        "nextCursor": "page2"
                    }),
                    "tools/list" => json!({ "tools": [{ "name": "b", "inputSchema": { "type": "object" } }] }),
                    "tools/call" if params["name"] == "fail" => {
                        json!({ "content": [{ "type": "text", "text": "boom" }], "isError": true })
                    }
                    "tools/call" => json!({ "content": [{ "type": "text", "text": "ok" }] }),
                    _ => json!({}),
                };
                let reply = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                    return;
                }
            }
        });

        (McpConnection::new(TransportKind::Stdio, tokio::io::split(client)), methods)
    }

    fn session() -> ProtocolSession {
        ProtocolSession::new("srv", TransportKind::Stdio, client_info("test", "0.0.1"), Arc::new(NoOpLogger))
    }

    async fn ready(hang_up: Option<&'static str>) -> (ProtocolSession, Arc<Mutex<Vec<String>>>) {
        let (connection, methods) = scripted(hang_up);
        let s = session();
        s.attach(connection).unwrap();
        s.initialize(&CallContext::new()).await.unwrap();
        (s, methods)
    }

    #[tokio::test]
    async fn test_not_ready_calls_return_invalid_state() {
        let ctx = CallContext::new();
        let s = session();

        assert!(matches!(
            s.list_tools(&ctx).await,
            Err(BridgeError::InvalidState { state: SessionState::Disconnected, expected: SessionState::Ready, .. })
        ));

        s.attach(scripted(None).0).unwrap();
        assert!(matches!(
            s.call_tool(&ctx, "a", json!({})).await,
            Err(BridgeError::InvalidState { state: SessionState::Started, .. })
        ));
        assert!(matches!(s.ping(&ctx).await, Err(BridgeError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_handshake_sends_initialized_notification() {
        let (s, methods) = ready(None).await;

        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.protocol_version().as_deref(), Some("2025-03-26"));
        assert_eq!(s.server_info().unwrap().name, "scripted");

        s.ping(&CallContext::new()).await.unwrap();
        assert_eq!(*methods.lock(), vec!["initialize", "notifications/initialized", "ping"]);
    }

    #[tokio::test]
    async fn test_initialize_failure_is_handshake_error() {
        let ctx = CallContext::new();
        let s = session();
        s.attach(scripted(Some("initialize")).0).unwrap();

        assert!(matches!(s.initialize(&ctx).await, Err(BridgeError::Handshake { .. })));
        assert_eq!(s.state(), SessionState::Failed);
        // Failed is terminal: no second handshake
        assert!(matches!(s.initialize(&ctx).await, Err(BridgeError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let (s, _) = ready(None).await;

        let names: Vec<_> = s
            .list_tools(&CallContext::new())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_is_error_result_is_protocol_error() {
        let ctx = CallContext::new();
        let (s, _) = ready(None).await;

        let err = s.call_tool(&ctx, "fail", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { ref tool, ref message } if tool == "fail" && message == "boom"));
        assert!(s.call_tool(&ctx, "ok", json!({})).await.is_ok());
        assert!(s.call_tool(&ctx, "ok", Value::Null).await.is_ok());
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_rejected_before_sending() {
        let ctx = CallContext::new();
        let (s, methods) = ready(None).await;

        for arguments in [json!([1, 2]), json!("text"), json!(42)] {
            let err = s.call_tool(&ctx, "ok", arguments).await.unwrap_err();
            assert!(matches!(err, BridgeError::Schema(ref m) if m == "arguments must be an object"));
        }
        s.ping(&ctx).await.unwrap();
        assert!(!methods.lock().iter().any(|m| m == "tools/call"));
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_transport_error_fails_session() {
        let ctx = CallContext::new();
        let (s, _) = ready(Some("ping")).await;

        assert!(matches!(s.ping(&ctx).await, Err(BridgeError::Transport { .. })));
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_close() {
        let (connection, _) = scripted(None);
        let cleaned = Arc::new(Mutex::new(false));
        let flag = cleaned.clone();
        let connection = connection.with_cleanup(move || async move {
            *flag.lock() = true;
            Ok(())
        });

        let s = session();
        s.attach(connection).unwrap();
        s.initialize(&CallContext::new()).await.unwrap();
        s.close().await.unwrap();
        assert!(*cleaned.lock());
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let ctx = CallContext::new();
        let (s, _) = ready(None).await;
        s.close().await.unwrap();

        assert_eq!(s.state(), SessionState::Closed);
        assert!(matches!(s.ping(&ctx).await, Err(BridgeError::InvalidState { state: SessionState::Closed, .. })));
        s.close().await.unwrap();
    }
}
