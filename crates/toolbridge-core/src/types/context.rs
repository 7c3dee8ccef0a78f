//! Per-run invocation context

use std::future::Future;

use super::cancellation::CancellationToken;
use super::trace::CallTrace;
use crate::error::{BridgeError, BridgeResult};

/// Cancellation and call trace for one engine run
///
/// Clones share both the token and the trace. [`CallContext::child`] derives a
/// context whose token is cancelled with the parent's but which records into
/// the same trace.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    trace: CallTrace,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one owned by the host engine
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            trace: CallTrace::new(),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            trace: self.trace.clone(),
        }
    }

    pub fn trace(&self) -> &CallTrace {
        &self.trace
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut` until it completes or this context is cancelled
    pub async fn cancellable<T, F>(&self, fut: F) -> BridgeResult<T>
    where
        F: Future<Output = BridgeResult<T>>,
    {
        if self.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BridgeError::Cancelled),
            result = fut => result,
        }
    }
}
