//! Core types shared by the registry, the sessions and the transports

mod cancellation;
mod context;
mod state;
mod tool;
mod trace;

pub use cancellation::CancellationToken;
pub use context::CallContext;
pub use state::SessionState;
pub use tool::{SchemaNode, ToolDescriptor, ToolKind};
pub use trace::{CallRecord, CallTrace};
