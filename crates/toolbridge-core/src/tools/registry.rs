//! Tool registry: one flat namespace of native, meta and remote tools
//!
//! The ToolRegistry is the central component for:
//! - Registering compiled-in, meta and typed in-process tools
//! - Connecting to remote tool servers (one session per server id)
//! - Discovering remote tools and forwarding calls to them
//! - Handing tools to the engine by name

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::handler::{ToolHandle, ToolHandler, TypedTool};
use super::meta::meta_tool;
use super::native::{native_tool, KnowledgeService, NativeServices, WebSearchService};
use super::remote::{forwarder, remote_descriptor};
use crate::config::{RegistrationPolicy, RegistryOptions};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{Logger, NoOpLogger};
use crate::mcp::{client_info, ProtocolSession, SessionPool};
use crate::oauth::TokenStore;
use crate::transport::{DefaultTransportFactory, HttpClients, TransportConfig, TransportFactory};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

/// A registration that lost to an already registered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCollision {
    pub name: String,
    pub kept_kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kept_server: Option<String>,
    pub rejected_kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_server: Option<String>,
}

impl std::fmt::Display for NameCollision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = |kind: &ToolKind, server: &Option<String>| match server {
            Some(server) => format!("{} tool from {}", kind, server),
            None => format!("{} tool", kind),
        };
        write!(
            f,
            "'{}': kept {}, ignored {}",
            self.name,
            source(&self.kept_kind, &self.kept_server),
            source(&self.rejected_kind, &self.rejected_server)
        )
    }
}

/// Outcome of registering one remote server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRegistration {
    pub server_id: String,
    /// Names registered by this call
    pub registered: Vec<String>,
    /// Names this server had already registered
    pub already_registered: Vec<String>,
    /// Names not registered: taken by another tool, or with an unusable schema
    pub skipped: Vec<String>,
}

enum Insertion {
    Added,
    AlreadyRegistered,
    Collided,
}

#[derive(Default)]
struct ToolTable {
    order: Vec<String>,
    handles: HashMap<String, ToolHandle>,
}

impl ToolTable {
    /// The collision registering `descriptor` would cause
    fn collision(&self, descriptor: &ToolDescriptor) -> Option<NameCollision> {
        let kept = self.handles.get(&descriptor.name)?.descriptor();
        // The same source registering the same name again is not a collision
        if kept.kind == descriptor.kind && kept.server_id == descriptor.server_id {
            return None;
        }
        Some(NameCollision {
            name: descriptor.name.clone(),
            kept_kind: kept.kind,
            kept_server: kept.server_id.clone(),
            rejected_kind: descriptor.kind,
            rejected_server: descriptor.server_id.clone(),
        })
    }

    fn insert(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> (ToolHandle, Insertion) {
        if let Some(existing) = self.handles.get(&descriptor.name) {
            let kept = existing.descriptor();
            let insertion = if kept.kind == descriptor.kind && kept.server_id == descriptor.server_id {
                Insertion::AlreadyRegistered
            } else {
                Insertion::Collided
            };
            return (existing.clone(), insertion);
        }

        let handle = ToolHandle::new(descriptor, handler);
        self.order.push(handle.name().to_string());
        self.handles.insert(handle.name().to_string(), handle.clone());
        (handle, Insertion::Added)
    }
}

/// Builder for [`ToolRegistry`]
#[derive(Default)]
pub struct ToolRegistryBuilder {
    options: RegistryOptions,
    logger: Option<Arc<dyn Logger>>,
    factory: Option<Arc<dyn TransportFactory>>,
    token_store: Option<Arc<dyn TokenStore>>,
    knowledge: Option<Arc<dyn KnowledgeService>>,
    web_search: Option<Arc<dyn WebSearchService>>,
}

impl ToolRegistryBuilder {
    pub fn with_options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the built-in transports, e.g. with an in-process fake
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Token store used by the built-in OAuth-SSE transport
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn with_knowledge_service(mut self, service: Arc<dyn KnowledgeService>) -> Self {
        self.knowledge = Some(service);
        self
    }

    pub fn with_web_search(mut self, service: Arc<dyn WebSearchService>) -> Self {
        self.web_search = Some(service);
        self
    }

    pub fn build(self) -> BridgeResult<ToolRegistry> {
        let logger = self.logger.unwrap_or_else(|| Arc::new(NoOpLogger));
        let timeout = self.options.http_timeout();

        let factory = match self.factory {
            Some(factory) => factory,
            None => {
                let mut factory = DefaultTransportFactory::new(timeout, logger.clone())?;
                if let Some(store) = self.token_store {
                    factory = factory.with_token_store(store);
                }
                Arc::new(factory)
            }
        };

        let natives = NativeServices {
            http: HttpClients::new(timeout)?.aux().clone(),
            knowledge: self.knowledge,
            web_search: self.web_search,
            logger: logger.clone(),
        };

        Ok(ToolRegistry {
            tools: RwLock::new(ToolTable::default()),
            pool: SessionPool::new(logger.clone()),
            factory,
            natives,
            options: self.options,
            collisions: Mutex::new(Vec::new()),
            logger,
        })
    }
}

/// Registry of every tool available to one engine
pub struct ToolRegistry {
    tools: RwLock<ToolTable>,
    pool: SessionPool,
    factory: Arc<dyn TransportFactory>,
    natives: NativeServices,
    options: RegistryOptions,
    collisions: Mutex<Vec<NameCollision>>,
    logger: Arc<dyn Logger>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Registry with the built-in transports and default options
    pub fn new(logger: Arc<dyn Logger>) -> BridgeResult<Self> {
        Self::builder().with_logger(logger).build()
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub(crate) fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    fn insert(
        &self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> BridgeResult<(ToolHandle, Insertion)> {
        self.insert_all(vec![(descriptor, handler)])?
            .pop()
            .ok_or_else(|| BridgeError::configuration("no tool to register"))
    }

    /// Register a batch under one lock
    ///
    /// In strict mode a single collision rejects the whole batch and nothing
    /// is inserted.
    fn insert_all(
        &self,
        entries: Vec<(ToolDescriptor, Arc<dyn ToolHandler>)>,
    ) -> BridgeResult<Vec<(ToolHandle, Insertion)>> {
        let mut table = self.tools.write();
        let collisions: Vec<NameCollision> = entries
            .iter()
            .filter_map(|(descriptor, _)| table.collision(descriptor))
            .collect();

        if self.options.duplicate_names == RegistrationPolicy::Strict && !collisions.is_empty() {
            drop(table);
            let message = collisions
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            self.record_collisions(collisions);
            return Err(BridgeError::configuration(format!("tool name collision {}", message)));
        }

        let inserted = entries
            .into_iter()
            .map(|(descriptor, handler)| table.insert(descriptor, handler))
            .collect();
        drop(table);
        self.record_collisions(collisions);
        Ok(inserted)
    }

    fn record_collisions(&self, collisions: Vec<NameCollision>) {
        for collision in &collisions {
            self.logger
                .warn(&format!("[ToolRegistry] Tool name collision {}", collision));
        }
        self.collisions.lock().extend(collisions);
    }

    /// Register a typed in-process tool; its schema is derived from `In`
    ///
    /// Returns the tool now bound to `name`, which is the earlier one when the
    /// name was already taken.
    pub fn register_fn<In, Out, F, Fut>(
        &self,
        name: &str,
        description: &str,
        handler: F,
    ) -> BridgeResult<ToolHandle>
    where
        In: JsonSchema + DeserializeOwned + Serialize + Send + 'static,
        Out: Serialize + Send + 'static,
        F: Fn(CallContext, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Out>> + Send + 'static,
    {
        if name.trim().is_empty() {
            return Err(BridgeError::configuration("tool name is required"));
        }
        let descriptor = ToolDescriptor::new(name, description, SchemaNode::for_type::<In>()?, ToolKind::Native);
        let (handle, _) = self.insert(descriptor, Arc::new(TypedTool::new(name, handler)))?;
        Ok(handle)
    }

    /// Bind one of the compiled-in tools, matched case-insensitively
    ///
    /// An empty `description` keeps the tool's built-in one. `env` carries
    /// the tool's settings, e.g. `OPENWEATHER_API_KEY`.
    pub fn register_native_tool(
        &self,
        name: &str,
        description: &str,
        env: &HashMap<String, Value>,
    ) -> BridgeResult<()> {
        match native_tool(name, description, env, &self.natives)? {
            Some((descriptor, handler)) => {
                let (handle, insertion) = self.insert(descriptor, handler)?;
                if let Insertion::Added = insertion {
                    self.logger
                        .info(&format!("[ToolRegistry] Registered native tool {}", handle.name()));
                }
                Ok(())
            }
            None => match self.options.unknown_native {
                RegistrationPolicy::Tolerant => {
                    self.logger
                        .warn(&format!("[ToolRegistry] Unknown native tool '{}', skipping", name));
                    Ok(())
                }
                RegistrationPolicy::Strict => Err(BridgeError::configuration(format!(
                    "unknown native tool: {}",
                    name
                ))),
            },
        }
    }

    /// Register a zero-argument tool answering with a fixed instruction
    pub fn register_meta_tool(
        &self,
        name: &str,
        description: &str,
        instruction: &str,
    ) -> BridgeResult<ToolHandle> {
        let (descriptor, handler) = meta_tool(name, description, instruction)?;
        let (handle, _) = self.insert(descriptor, handler)?;
        Ok(handle)
    }

    /// Connect to a remote server (once per id) and register its tools
    ///
    /// Configuration is validated before any I/O. Connection, handshake and
    /// listing failures abort the registration. Tools whose names are taken
    /// are skipped and recorded as collisions.
    pub async fn register_remote_tool(
        &self,
        ctx: &CallContext,
        server_id: &str,
        config: &TransportConfig,
    ) -> BridgeResult<RemoteRegistration> {
        if server_id.trim().is_empty() {
            return Err(BridgeError::configuration("server id is required"));
        }
        config.validate()?;

        let session = self.session(ctx, server_id, config).await?;
        let tools = match session.list_tools(ctx).await {
            Ok(tools) => tools,
            Err(e) => {
                self.discard_unused_session(server_id).await;
                return Err(e);
            }
        };

        let mut registration = RemoteRegistration {
            server_id: server_id.to_string(),
            ..Default::default()
        };
        let mut entries = Vec::with_capacity(tools.len());
        for tool in &tools {
            match remote_descriptor(server_id, tool) {
                Ok(descriptor) => {
                    let handler = forwarder(session.clone(), &descriptor);
                    entries.push((descriptor, handler));
                }
                Err(e) => {
                    self.logger.warn(&format!(
                        "[ToolRegistry] Skipping {} from {}: {}",
                        tool.name, server_id, e
                    ));
                    registration.skipped.push(tool.name.to_string());
                }
            }
        }

        let inserted = match self.insert_all(entries) {
            Ok(inserted) => inserted,
            Err(e) => {
                self.discard_unused_session(server_id).await;
                return Err(e);
            }
        };
        for (handle, insertion) in inserted {
            let name = handle.name().to_string();
            match insertion {
                Insertion::Added => registration.registered.push(name),
                Insertion::AlreadyRegistered => registration.already_registered.push(name),
                Insertion::Collided => registration.skipped.push(name),
            }
        }

        self.logger.info(&format!(
            "[ToolRegistry] Discovered {} tools from {} ({} registered, {} skipped)",
            tools.len(),
            server_id,
            registration.registered.len(),
            registration.skipped.len()
        ));
        Ok(registration)
    }

    /// Close and forget `server_id`'s session when no registered tool uses it
    async fn discard_unused_session(&self, server_id: &str) {
        let in_use = self
            .tools
            .read()
            .handles
            .values()
            .any(|handle| handle.descriptor().server_id.as_deref() == Some(server_id));
        if in_use {
            return;
        }
        if let Some(session) = self.pool.remove(server_id) {
            self.logger.debug(&format!("[ToolRegistry] Dropping unused session for {}", server_id));
            if let Err(e) = session.close().await {
                self.logger
                    .warn(&format!("[ToolRegistry] Failed to close {}: {}", server_id, e));
            }
        }
    }

    async fn session(
        &self,
        ctx: &CallContext,
        server_id: &str,
        config: &TransportConfig,
    ) -> BridgeResult<Arc<ProtocolSession>> {
        let session = self
            .pool
            .get_or_create(server_id, move || async move {
                let session = ProtocolSession::new(
                    server_id,
                    config.kind(),
                    client_info(&self.options.client_name, &self.options.client_version),
                    self.logger.clone(),
                );
                session.connect(ctx, self.factory.as_ref(), config).await?;
                session.initialize(ctx).await?;
                Ok(Arc::new(session))
            })
            .await?;

        if session.transport_kind() != config.kind() {
            self.logger.debug(&format!(
                "[ToolRegistry] {} already connected over {}, ignoring {} configuration",
                server_id,
                session.transport_kind(),
                config.kind()
            ));
        }
        Ok(session)
    }

    /// Tool bound to `name`; never performs I/O
    pub fn lookup(&self, name: &str) -> Option<ToolHandle> {
        self.tools.read().handles.get(name).cloned()
    }

    /// Like [`lookup`](Self::lookup) but fails with [`BridgeError::NotFound`]
    pub fn get(&self, name: &str) -> BridgeResult<ToolHandle> {
        self.lookup(name)
            .ok_or_else(|| BridgeError::NotFound(name.to_string()))
    }

    /// Tool bound to `name` only when it is forwarded to `server_id`
    pub fn lookup_remote(&self, server_id: &str, name: &str) -> Option<ToolHandle> {
        self.lookup(name)
            .filter(|handle| handle.descriptor().server_id.as_deref() == Some(server_id))
    }

    /// Look up `name` and invoke it
    pub async fn call(&self, ctx: &CallContext, name: &str, arguments: Value) -> BridgeResult<Value> {
        let handle = self.get(name)?;
        self.logger
            .debug(&format!("[ToolRegistry] Calling tool: {}", name));
        handle.call(ctx, arguments).await
    }

    /// Every registered descriptor, in registration order
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let table = self.tools.read();
        table
            .order
            .iter()
            .filter_map(|name| table.handles.get(name))
            .map(|handle| handle.descriptor().clone())
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.read().order.len()
    }

    /// Tools currently advertised by a connected server
    ///
    /// Re-queries the live session. Names registered for this server yield
    /// the registered handle; the rest get an unregistered forwarder. Errors
    /// are logged and produce an empty list.
    pub async fn list_remote_tools(&self, ctx: &CallContext, server_id: &str) -> Vec<ToolHandle> {
        let Some(session) = self.pool.get(server_id) else {
            self.logger
                .warn(&format!("[ToolRegistry] No session for {}", server_id));
            return Vec::new();
        };

        let tools = match session.list_tools(ctx).await {
            Ok(tools) => tools,
            Err(e) => {
                self.logger.error(&format!(
                    "[ToolRegistry] Failed to fetch tools from {}: {}",
                    server_id, e
                ));
                return Vec::new();
            }
        };

        tools
            .iter()
            .filter_map(|tool| {
                if let Some(handle) = self.lookup_remote(server_id, &tool.name) {
                    return Some(handle);
                }
                match remote_descriptor(server_id, tool) {
                    Ok(descriptor) => {
                        let handler = forwarder(session.clone(), &descriptor);
                        Some(ToolHandle::new(descriptor, handler))
                    }
                    Err(e) => {
                        self.logger.warn(&format!(
                            "[ToolRegistry] Skipping {} from {}: {}",
                            tool.name, server_id, e
                        ));
                        None
                    }
                }
            })
            .collect()
    }

    /// Every name collision seen so far
    pub fn collisions(&self) -> Vec<NameCollision> {
        self.collisions.lock().clone()
    }

    /// Session of `server_id`, if connected
    pub fn session_for(&self, server_id: &str) -> Option<Arc<ProtocolSession>> {
        self.pool.get(server_id)
    }

    /// Close every remote session, reporting all failures together
    pub async fn close(&self) -> BridgeResult<()> {
        self.logger.info("[ToolRegistry] Closing sessions");
        self.pool.close_all().await
    }
}
