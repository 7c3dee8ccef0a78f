//! `done_agent`: lets the model mark its task as completed

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::DONE_AGENT;
use crate::error::BridgeResult;
use crate::tools::handler::{ToolHandler, TypedTool};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

pub(super) const DESCRIPTION: &str = "Mark the current task as completed when you've fulfilled all requirements";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DoneRequest {
    /// Reason why the task is considered done
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DoneReply {
    pub success: bool,
    pub message: String,
}

pub(super) fn build(description: &str) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let descriptor = ToolDescriptor::new(
        DONE_AGENT,
        description,
        SchemaNode::for_type::<DoneRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(DONE_AGENT, |_ctx: CallContext, req: DoneRequest| async move {
        Ok(DoneReply {
            success: true,
            message: format!("Task marked as completed: {}", req.reason),
        })
    });
    Ok((descriptor, Arc::new(handler)))
}
