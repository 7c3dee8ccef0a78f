//! Toolbridge Core
//!
//! Tool registry and protocol client for LLM-driven engines.
//! Native, meta and remote tools share one flat namespace and one calling
//! convention; remote tools are reached over stdio, SSE, OAuth-SSE or
//! streamable HTTP through one handshaked session per server.
//!
//! ## Tool Orchestration
//!
//! ```rust,ignore
//! use toolbridge_core::{CallContext, ToolRegistry, TransportConfig};
//!
//! let registry = ToolRegistry::new(logger)?;
//! registry.register_native_tool("done_agent", "", &Default::default())?;
//! registry
//!     .register_remote_tool(&ctx, "files", &TransportConfig::stdio("files-server", ["--root", "."]))
//!     .await?;
//!
//! // Engine side
//! let tool = registry.get("read_file")?;
//! let result = tool.call(&ctx, json!({ "path": "README.md" })).await?;
//! let records = ctx.trace().records();
//!
//! registry.close().await?;
//! ```

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod oauth;
pub mod transport;
pub mod mcp;
pub mod tools;

// Re-export commonly used types
pub use types::{
    CallContext, CallRecord, CallTrace, CancellationToken,
    SchemaNode, SessionState, ToolDescriptor, ToolKind,
};

pub use error::{BridgeError, BridgeResult, SessionCloseFailure};

pub use logging::{Logger, NoOpLogger, ConsoleLogger, MemoryLogger};

pub use config::{
    SkillSource, SkillDeclaration, MemorySkillSource, FileSkillSource,
    RegistryOptions, RegistrationPolicy, ConfigError,
};

pub use oauth::{OAuthParams, OAuthToken, TokenStore, MemoryTokenStore};

pub use transport::{
    McpClient, McpConnection, TransportConfig, TransportKind, TransportFactory, DefaultTransportFactory,
};

pub use mcp::{ProtocolSession, SessionPool};

pub use tools::{
    ToolRegistry, ToolRegistryBuilder, ToolHandle, ToolHandler, TypedTool,
    NameCollision, RemoteRegistration,
};

pub use tools::native::{KnowledgeService, WebSearchService};
