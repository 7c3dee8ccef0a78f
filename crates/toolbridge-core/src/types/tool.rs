//! Tool descriptors and input schemas

use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BridgeError, BridgeResult};

/// Where a tool's implementation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Compiled-in handler
    Native,
    /// Returns a fixed instruction to the engine
    Meta,
    /// Forwarded to a remote tool server
    Remote,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Native => "native",
            ToolKind::Meta => "meta",
            ToolKind::Remote => "remote",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON Schema describing a tool's input object
///
/// Only the object shape, `properties` and `required` are interpreted; the
/// rest of the document is carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaNode(Value);

impl Default for SchemaNode {
    fn default() -> Self {
        Self::empty_object()
    }
}

impl SchemaNode {
    /// Object schema with no properties
    pub fn empty_object() -> Self {
        Self(json!({ "type": "object", "properties": {} }))
    }

    /// Derive the schema of a typed input
    pub fn for_type<T: JsonSchema>() -> BridgeResult<Self> {
        let schema = schemars::schema_for!(T);
        let mut value = serde_json::to_value(&schema)?;
        if let Value::Object(map) = &mut value {
            map.remove("$schema");
        }
        Ok(Self(value))
    }

    /// Translate a schema advertised by a remote server
    pub fn from_remote(schema: &JsonObject) -> BridgeResult<Self> {
        match schema.get("type") {
            None => {}
            Some(Value::String(t)) if t == "object" => {}
            Some(other) => {
                return Err(BridgeError::Schema(format!(
                    "input schema must describe an object, got type {}",
                    other
                )))
            }
        }

        if let Some(props) = schema.get("properties") {
            if !props.is_object() {
                return Err(BridgeError::Schema(
                    "input schema 'properties' must be an object".to_string(),
                ));
            }
        }

        if let Some(required) = schema.get("required") {
            let valid = required
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false);
            if !valid {
                return Err(BridgeError::Schema(
                    "input schema 'required' must be an array of strings".to_string(),
                ));
            }
        }

        let mut map = schema.clone();
        map.entry("type").or_insert_with(|| json!("object"));
        Ok(Self(Value::Object(map)))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Property names listed in `required`
    pub fn required_properties(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Fail with [`BridgeError::Schema`] when `arguments` lacks a required property
    pub fn check_required(&self, arguments: &Value) -> BridgeResult<()> {
        let required = self.required_properties();
        if required.is_empty() {
            return Ok(());
        }

        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => {
                return Err(BridgeError::Schema(format!(
                    "missing required property '{}'",
                    required[0]
                )))
            }
            other => {
                return Err(BridgeError::Schema(format!(
                    "arguments must be an object, got {}",
                    other
                )))
            }
        };

        match required.iter().find(|name| !object.contains_key(**name)) {
            Some(missing) => Err(BridgeError::Schema(format!(
                "missing required property '{}'",
                missing
            ))),
            None => Ok(()),
        }
    }
}

/// Metadata of one registered tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: SchemaNode,
    pub kind: ToolKind,
    /// Owning remote server, set for [`ToolKind::Remote`] only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: SchemaNode,
        kind: ToolKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            kind,
            server_id: None,
        }
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}
