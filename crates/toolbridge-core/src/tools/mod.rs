//! Tool management module
//!
//! Every tool, wherever it runs, is reached through the same handle:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  ToolRegistry                               │
//! │                                             │
//! │  - native: compiled-in handlers             │
//! │  - meta: fixed instructions for the LLM     │
//! │  - remote: forwarders to protocol sessions  │
//! │  - typed adapter + call-trace capture       │
//! └─────────────────────────────────────────────┘
//!           │
//!           │ tools/list, tools/call, ping
//!           ▼
//! ┌─────────────────────────────────────────────┐
//! │  SessionPool (one session per server id)    │
//! │    stdio │ sse │ oauth-sse │ http           │
//! └─────────────────────────────────────────────┘
//! ```

mod handler;
mod meta;
pub mod native;
mod registry;
mod remote;
mod skills;

pub use handler::{ToolHandle, ToolHandler, TypedTool};
pub use meta::{MetaReply, NoArguments};
pub use registry::{NameCollision, RemoteRegistration, ToolRegistry, ToolRegistryBuilder};
pub use remote::convert_result;
