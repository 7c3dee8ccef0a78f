//! Protocol client: sessions and the per-server session pool
//!
//! # Example
//!
//! ```rust,ignore
//! use toolbridge_core::mcp::{client_info, ProtocolSession};
//!
//! let session = ProtocolSession::new("files", TransportKind::Stdio, client_info("app", "1.0"), logger);
//! session.connect(&ctx, &factory, &TransportConfig::stdio("files-server", ["--root", "."])).await?;
//! session.initialize(&ctx).await?;
//!
//! let tools = session.list_tools(&ctx).await?;
//! let result = session.call_tool(&ctx, "read_file", json!({ "path": "README.md" })).await?;
//! ```

mod pool;
mod session;

pub use pool::SessionPool;
pub use session::{client_info, ProtocolSession};

// Re-export rmcp types that consumers might need
pub use rmcp::model::{CallToolResult as McpToolResult, Tool as McpTool};
