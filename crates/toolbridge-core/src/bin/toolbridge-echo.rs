//! Minimal stdio tool server
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout and exposes:
//! - `echo`: returns its arguments as JSON text
//! - `slow`: like `echo`, after sleeping `ms` milliseconds
//! - `fail`: always answers with `isError: true`
//!
//! Requests are served concurrently, so responses may leave in a different
//! order than the requests arrived.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

fn tools() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Echo the arguments back",
            "inputSchema": {
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }
        },
        {
            "name": "slow",
            "description": "Echo the arguments back after a delay",
            "inputSchema": {
                "type": "object",
                "properties": { "ms": { "type": "integer" } }
            }
        },
        {
            "name": "fail",
            "description": "Always fails",
            "inputSchema": { "type": "object" }
        }
    ])
}

async fn call_tool(params: &Value) -> Value {
    let name = params["name"].as_str().unwrap_or_default();
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match name {
        "echo" => json!({ "content": [{ "type": "text", "text": arguments.to_string() }] }),
        "slow" => {
            let ms = arguments["ms"].as_u64().unwrap_or(100);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            json!({ "content": [{ "type": "text", "text": arguments.to_string() }] })
        }
        "fail" => json!({ "content": [{ "type": "text", "text": "echo server refused" }], "isError": true }),
        other => json!({
            "content": [{ "type": "text", "text": format!("unknown tool: {}", other) }],
            "isError": true
        }),
    }
}

async fn handle(message: Value) -> Option<Value> {
    let id = message.get("id").cloned()?;
    let method = message["method"].as_str().unwrap_or_default().to_string();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": params["protocolVersion"].as_str().unwrap_or("2025-03-26"),
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "toolbridge-echo", "version": env!("CARGO_PKG_VERSION") }
        }),
        "tools/list" => json!({ "tools": tools() }),
        "tools/call" => call_tool(&params).await,
        "ping" => json!({}),
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {}", other) }
            }))
        }
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(b"toolbridge-echo ready\n").await?;
    stderr.flush().await?;

    let (tx, mut rx) = mpsc::channel::<Value>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                stderr.write_all(format!("bad message: {}\n", e).as_bytes()).await?;
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = handle(message).await {
                let _ = tx.send(reply).await;
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
