//! Type-erased tool dispatch
//!
//! Every tool is stored as an [`Arc<dyn ToolHandler>`]. Typed handlers are
//! wrapped by [`TypedTool`], which owns decoding, cancellation and call-trace
//! recording so individual tools never deal with raw JSON.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{BridgeError, BridgeResult};
use crate::types::{CallContext, CallRecord, ToolDescriptor};

/// Untyped entry point of a registered tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, ctx: &CallContext, arguments: Value) -> BridgeResult<Value>;
}

/// Adapter from a typed async function to [`ToolHandler`]
///
/// `null` arguments decode as `{}`. A decode failure is a
/// [`BridgeError::Schema`]. The handler runs with a child context, and on
/// success one [`CallRecord`] is appended to the caller's trace. Failures
/// propagate untouched and record nothing.
pub struct TypedTool<In, Out, F> {
    name: String,
    handler: F,
    _types: PhantomData<fn(In) -> Out>,
}

impl<In, Out, F> TypedTool<In, Out, F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<In, Out, F, Fut> ToolHandler for TypedTool<In, Out, F>
where
    In: DeserializeOwned + Serialize + Send + 'static,
    Out: Serialize + Send + 'static,
    F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BridgeResult<Out>> + Send + 'static,
{
    async fn invoke(&self, ctx: &CallContext, arguments: Value) -> BridgeResult<Value> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let input: In = serde_json::from_value(arguments)
            .map_err(|e| BridgeError::Schema(format!("invalid arguments for {}: {}", self.name, e)))?;
        let recorded = serde_json::to_value(&input)?;

        let output = ctx.cancellable((self.handler)(ctx.child(), input)).await?;
        let output = serde_json::to_value(output)?;

        ctx.trace()
            .record(CallRecord::new(self.name.clone(), recorded, output.clone()));
        Ok(output)
    }
}

/// A registered tool as handed to the engine
#[derive(Clone)]
pub struct ToolHandle {
    descriptor: Arc<ToolDescriptor>,
    handler: Arc<dyn ToolHandler>,
}

impl ToolHandle {
    pub fn new(descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Invoke the tool with untyped JSON arguments
    pub async fn call(&self, ctx: &CallContext, arguments: Value) -> BridgeResult<Value> {
        self.handler.invoke(ctx, arguments).await
    }
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHandle")
            .field("name", &self.descriptor.name)
            .field("kind", &self.descriptor.kind)
            .finish()
    }
}
