//! Forwarding of registered names to remote tool servers

use std::sync::Arc;

use rmcp::model::{CallToolResult, RawContent, Tool};
use serde_json::Value;

use super::handler::{ToolHandler, TypedTool};
use crate::error::{BridgeError, BridgeResult};
use crate::mcp::ProtocolSession;
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

/// Descriptor for a tool advertised by `server_id`
pub(crate) fn remote_descriptor(server_id: &str, tool: &Tool) -> BridgeResult<ToolDescriptor> {
    let schema = SchemaNode::from_remote(tool.input_schema.as_ref())?;
    let description = tool
        .description
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();
    Ok(ToolDescriptor::new(tool.name.to_string(), description, schema, ToolKind::Remote).with_server(server_id))
}

/// Handler that pings the session and forwards the call
pub(crate) fn forwarder(session: Arc<ProtocolSession>, descriptor: &ToolDescriptor) -> Arc<dyn ToolHandler> {
    let schema = descriptor.input_schema.clone();
    let tool_name = descriptor.name.clone();

    Arc::new(TypedTool::new(descriptor.name.clone(), move |ctx: CallContext, arguments: Value| {
        let session = session.clone();
        let schema = schema.clone();
        let tool_name = tool_name.clone();
        async move {
            if !(arguments.is_object() || arguments.is_null()) {
                return Err(BridgeError::Schema("arguments must be an object".to_string()));
            }
            schema.check_required(&arguments)?;
            session.ping(&ctx).await?;
            let result = session.call_tool(&ctx, &tool_name, arguments).await?;
            convert_result(result)
        }
    }))
}

/// JSON form of a successful call result
///
/// `structuredContent` wins when present. A lone text item is parsed as JSON
/// when possible and returned as a string otherwise; a lone non-text item is
/// returned as its JSON form; several items become an array.
pub fn convert_result(result: CallToolResult) -> BridgeResult<Value> {
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    let mut content = result.content;
    if content.len() == 1 {
        let item = content.remove(0);
        return match item.raw {
            RawContent::Text(text) => {
                Ok(serde_json::from_str(&text.text).unwrap_or(Value::String(text.text)))
            }
            _ => Ok(serde_json::to_value(&item)?),
        };
    }

    let items = content
        .iter()
        .map(|item| match &item.raw {
            RawContent::Text(text) => Ok(Value::String(text.text.clone())),
            _ => serde_json::to_value(item),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(items))
}
