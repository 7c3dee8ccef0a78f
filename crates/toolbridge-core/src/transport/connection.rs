//! A connected, not yet initialized channel to one remote server

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, RunningService};
use rmcp::transport::IntoTransport;
use rmcp::{RoleClient, ServiceExt};

use super::TransportKind;
use crate::error::BridgeResult;

/// rmcp client service running over one connection
pub type McpClient = RunningService<RoleClient, ClientInfo>;

type ServeFn = Box<dyn FnOnce(ClientInfo) -> BoxFuture<'static, Result<McpClient, ClientInitializeError>> + Send>;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, BridgeResult<()>> + Send>;

/// Transport handed from a factory to a session
///
/// Holds any rmcp transport behind one type so factories stay object safe.
/// The handshake happens when the session calls [`McpConnection::serve`];
/// the optional cleanup runs after the client service has stopped, e.g. to
/// reap a child process.
pub struct McpConnection {
    kind: TransportKind,
    serve: ServeFn,
    cleanup: Option<CleanupFn>,
}

impl McpConnection {
    pub fn new<T, E, A>(kind: TransportKind, transport: T) -> Self
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
        A: 'static,
    {
        Self {
            kind,
            serve: Box::new(move |info: ClientInfo| info.serve(transport).boxed()),
            cleanup: None,
        }
    }

    /// Run `cleanup` when the session releases this connection
    pub fn with_cleanup<F, Fut>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BridgeResult<()>> + Send + 'static,
    {
        self.cleanup = Some(Box::new(move || cleanup().boxed()));
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Split into the handshake and the release hook
    pub(crate) fn into_parts(self) -> (Handshake, Option<Cleanup>) {
        (Handshake(self.serve), self.cleanup.map(Cleanup))
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("kind", &self.kind)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

pub(crate) struct Handshake(ServeFn);

impl Handshake {
    /// `initialize`, then `notifications/initialized`, then the service loop
    pub(crate) async fn serve(self, info: ClientInfo) -> Result<McpClient, ClientInitializeError> {
        (self.0)(info).await
    }
}

pub(crate) struct Cleanup(CleanupFn);

impl Cleanup {
    pub(crate) async fn run(self) -> BridgeResult<()> {
        (self.0)().await
    }
}
