//! Stdio transport: a child process speaking newline-delimited JSON-RPC
//!
//! The child's stdout and stdin are handed to rmcp as an async read/write
//! pair. Stderr is drained into the logger and never affects calls.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::{McpConnection, TransportKind};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::Logger;

/// How long the release waits for the child to exit after stdin is closed
const GRACEFUL_EXIT: Duration = Duration::from_millis(500);

/// Spawn `command` and wire its pipes; must run inside a tokio runtime
pub(crate) fn spawn(
    server_id: &str,
    command: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    logger: Arc<dyn Logger>,
) -> BridgeResult<McpConnection> {
    logger.info(&format!(
        "[stdio] {}: spawning {} {}",
        server_id,
        command,
        args.join(" ")
    ));

    let mut child = Command::new(command)
        .args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BridgeError::transport(server_id, format!("failed to spawn `{}`: {}", command, e)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| BridgeError::transport(server_id, "failed to open stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::transport(server_id, "failed to open stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::transport(server_id, "failed to open stderr"))?;

    // Not tracked: ends on its own when the child's stderr closes
    tokio::spawn(drain_stderr(server_id.to_string(), stderr, logger.clone()));

    let id = server_id.to_string();
    Ok(McpConnection::new(TransportKind::Stdio, (stdout, stdin))
        .with_cleanup(move || reap(id, child, logger)))
}

/// Wait briefly for the child to exit on closed stdin, then kill it
async fn reap(server_id: String, mut child: Child, logger: Arc<dyn Logger>) -> BridgeResult<()> {
    match tokio::time::timeout(GRACEFUL_EXIT, child.wait()).await {
        Ok(Ok(status)) => {
            logger.debug(&format!("[stdio] {}: exited with {}", server_id, status));
            Ok(())
        }
        Ok(Err(e)) => Err(BridgeError::transport(&server_id, format!("wait failed: {}", e))),
        Err(_) => {
            logger.debug(&format!("[stdio] {}: killing child", server_id));
            child
                .kill()
                .await
                .map_err(|e| BridgeError::transport(&server_id, format!("kill failed: {}", e)))
        }
    }
}

/// Log each stderr line as `[<server_id>] <line>` at warn level
///
/// Ends on EOF or a closed pipe; other read errors are logged first.
pub(crate) async fn drain_stderr<R: AsyncRead + Unpin>(server_id: String, stderr: R, logger: Arc<dyn Logger>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if !line.is_empty() {
                    logger.warn(&format!("[{}] {}", server_id, line));
                }
            }
            Ok(None) => break,
            Err(e) if is_closed_pipe(&e) => break,
            Err(e) => {
                logger.error(&format!("[{}] stderr read error: {}", server_id, e));
                break;
            }
        }
    }
}

fn is_closed_pipe(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(err.kind(), ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof)
        || err.to_string().contains("already closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLogger, NoOpLogger};

    #[tokio::test]
    async fn test_drain_stderr_prefixes_server_id() {
        let logger = Arc::new(MemoryLogger::new());
        let data: &[u8] = b"starting up\n\nlistening on stdio\n";
        drain_stderr("files".to_string(), data, logger.clone()).await;

        assert_eq!(
            logger.messages(LogLevel::Warn),
            vec!["[files] starting up", "[files] listening on stdio"]
        );
        assert!(logger.messages(LogLevel::Error).is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_transport_error() {
        let result = spawn(
            "ghost",
            "/nonexistent/toolbridge-test-binary",
            &[],
            &BTreeMap::new(),
            Arc::new(NoOpLogger),
        );
        assert!(matches!(result, Err(BridgeError::Transport { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_release_reaps_child() {
        let connection = spawn("cat", "cat", &[], &BTreeMap::new(), Arc::new(NoOpLogger)).unwrap();
        assert_eq!(connection.kind(), TransportKind::Stdio);

        // Dropping the handshake closes stdin, so `cat` exits on its own
        let (handshake, cleanup) = connection.into_parts();
        drop(handshake);
        cleanup.unwrap().run().await.unwrap();
    }
}
