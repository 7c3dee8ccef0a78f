//! Meta tools: zero-argument tools that hand a fixed instruction back to the engine

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::handler::{ToolHandler, TypedTool};
use crate::error::{BridgeError, BridgeResult};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

/// Meta tools take no arguments; anything sent is ignored
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NoArguments {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MetaReply {
    /// Additional important instruction to the LLM
    pub additional_important_instruction: String,
}

pub(crate) fn meta_tool(
    name: &str,
    description: &str,
    instruction: &str,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    if name.trim().is_empty() {
        return Err(BridgeError::configuration("meta tool name is required"));
    }
    if description.trim().is_empty() {
        return Err(BridgeError::configuration(format!("meta tool {}: description is required", name)));
    }
    if instruction.trim().is_empty() {
        return Err(BridgeError::configuration(format!("meta tool {}: instruction is required", name)));
    }

    let descriptor = ToolDescriptor::new(name, description, SchemaNode::for_type::<NoArguments>()?, ToolKind::Meta);
    let instruction = instruction.to_string();
    let handler = TypedTool::new(name, move |_ctx: CallContext, _input: NoArguments| {
        let reply = MetaReply {
            additional_important_instruction: instruction.clone(),
        };
        async move { Ok(reply) }
    });
    Ok((descriptor, Arc::new(handler)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_meta_tool_returns_instruction() {
        let (descriptor, handler) = meta_tool("be_brief", "Reminds the model", "Answer in one line").unwrap();
        assert_eq!(descriptor.kind, ToolKind::Meta);

        let ctx = CallContext::new();
        let out = handler.invoke(&ctx, json!({ "ignored": 1 })).await.unwrap();
        assert_eq!(out, json!({ "additional_important_instruction": "Answer in one line" }));
        assert_eq!(ctx.trace().records()[0].arguments, json!({}));
    }

    #[test]
    fn test_meta_tool_requires_every_field() {
        assert!(meta_tool("", "d", "i").is_err());
        assert!(meta_tool("n", " ", "i").is_err());
        let err = meta_tool("n", "d", "").err().unwrap();
        assert!(err.to_string().contains("instruction is required"));
    }
}
