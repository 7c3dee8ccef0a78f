//! Shared fakes for the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use toolbridge_core::{BridgeError, BridgeResult, McpConnection, TransportConfig, TransportFactory, TransportKind};

/// How long the fake `slow` tool takes
pub const SLOW_DELAY: Duration = Duration::from_secs(5);

/// Tool list in the shape a server returns from `tools/list`
pub fn tool(name: &str, required: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = required
        .iter()
        .map(|p| (p.to_string(), json!({ "type": "string" })))
        .collect();
    json!({
        "name": name,
        "description": format!("{} tool", name),
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// `result` a fake server answers a request with
///
/// `fail` answers with `isError`; every other tool echoes its arguments,
/// wrapped with the answering server's id when one is given.
pub fn answer(server: Option<&str>, method: &str, params: &Value, tools: &[Value]) -> Result<Value, (i64, String)> {
    match method {
        "initialize" => Ok(json!({
            "protocolVersion": "2025-03-26",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "fake", "version": "1.0.0" }
        })),
        "tools/list" => Ok(json!({ "tools": tools })),
        "tools/call" => {
            let name = params["name"].as_str().unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            if name == "fail" {
                return Ok(json!({ "content": [{ "type": "text", "text": "remote refused" }], "isError": true }));
            }
            let text = match server {
                Some(server) => json!({ "server": server, "arguments": arguments }),
                None => arguments,
            };
            Ok(json!({ "content": [{ "type": "text", "text": text.to_string() }] }))
        }
        "ping" => Ok(json!({})),
        other => Err((-32601, format!("method not found: {}", other))),
    }
}

/// JSON-RPC response envelope for [`answer`]; `None` for notifications
pub fn respond(request: &Value, tools: &[Value]) -> Option<Value> {
    respond_as(None, request, tools)
}

fn respond_as(server: Option<&str>, request: &Value, tools: &[Value]) -> Option<Value> {
    let id = request.get("id").cloned()?;
    let method = request["method"].as_str().unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    Some(match answer(server, method, &params, tools) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    })
}

/// Connection to an in-process server speaking newline-delimited JSON-RPC
///
/// Requests are answered concurrently; `slow` waits [`SLOW_DELAY`] first.
/// Returns the methods the server received, in arrival order.
pub fn fake_connection(server_id: &str, tools: Vec<Value>) -> (McpConnection, Arc<Mutex<Vec<String>>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let methods = Arc::new(Mutex::new(Vec::new()));
    let seen = methods.clone();
    let server_id = server_id.to_string();
    let tools = Arc::new(tools);

    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server);
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Value>();
        tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                if write.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            seen.lock().push(message["method"].as_str().unwrap_or_default().to_string());

            let (server_id, tools, reply_tx) = (server_id.clone(), tools.clone(), reply_tx.clone());
            tokio::spawn(async move {
                if message["method"] == "tools/call" && message["params"]["name"] == "slow" {
                    tokio::time::sleep(SLOW_DELAY).await;
                }
                if let Some(reply) = respond_as(Some(&server_id), &message, &tools) {
                    let _ = reply_tx.send(reply);
                }
            });
        }
    });

    (McpConnection::new(TransportKind::Stdio, tokio::io::split(client)), methods)
}

/// Factory counting dials per server id
///
/// Tools are advertised per server id; ids listed in `fail_close` get a
/// connection whose release fails.
#[derive(Default)]
pub struct FakeFactory {
    pub tools: BTreeMap<String, Vec<Value>>,
    pub fail_close: Vec<String>,
    pub dial_delay: Duration,
    pub dials: AtomicUsize,
    pub methods: Mutex<BTreeMap<String, Arc<Mutex<Vec<String>>>>>,
}

impl FakeFactory {
    pub fn with_server(mut self, server_id: &str, tools: Vec<Value>) -> Self {
        self.tools.insert(server_id.to_string(), tools);
        self
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Methods received by the last connection to `server_id`
    pub fn methods(&self, server_id: &str) -> Vec<String> {
        self.methods
            .lock()
            .get(server_id)
            .map(|m| m.lock().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn connect(&self, server_id: &str, _config: &TransportConfig) -> BridgeResult<McpConnection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }
        let tools = self
            .tools
            .get(server_id)
            .cloned()
            .ok_or_else(|| BridgeError::transport(server_id, "connection refused"))?;

        let (connection, methods) = fake_connection(server_id, tools);
        self.methods.lock().insert(server_id.to_string(), methods);
        if self.fail_close.iter().any(|id| id == server_id) {
            let id = server_id.to_string();
            return Ok(connection.with_cleanup(move || async move { Err(BridgeError::transport(id, "broken pipe")) }));
        }
        Ok(connection)
    }
}

/// Any config; the fake factory ignores it
pub fn fake_config() -> TransportConfig {
    TransportConfig::stdio("fake-server", Vec::<String>::new())
}
