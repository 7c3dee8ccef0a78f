//! One protocol session per remote server id

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::ProtocolSession;
use crate::error::{BridgeError, BridgeResult, SessionCloseFailure};
use crate::logging::Logger;

type Slot = Arc<OnceCell<Arc<ProtocolSession>>>;

/// Concurrency-safe map from server id to its session
///
/// Each id owns a once-cell. The first caller runs the creation future while
/// concurrent callers for the same id wait on the cell and reuse the result.
/// A failed creation leaves the cell empty so a later caller may retry.
pub struct SessionPool {
    slots: Mutex<BTreeMap<String, Slot>>,
    logger: Arc<dyn Logger>,
}

impl SessionPool {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            logger,
        }
    }

    fn slot(&self, server_id: &str) -> Slot {
        self.slots
            .lock()
            .entry(server_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Existing session for `server_id`, or the one produced by `create`
    pub async fn get_or_create<F, Fut>(&self, server_id: &str, create: F) -> BridgeResult<Arc<ProtocolSession>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<Arc<ProtocolSession>>>,
    {
        let slot = self.slot(server_id);
        let session = slot
            .get_or_try_init(|| async move {
                crate::log_debug!(self.logger, "[SessionPool] creating session for {}", server_id);
                create().await
            })
            .await?;
        Ok(session.clone())
    }

    /// Session for `server_id` if one was created
    pub fn get(&self, server_id: &str) -> Option<Arc<ProtocolSession>> {
        self.slots
            .lock()
            .get(server_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Take `server_id`'s session out of the pool without closing it
    ///
    /// The next [`get_or_create`](Self::get_or_create) for the id creates a
    /// fresh session.
    pub fn remove(&self, server_id: &str) -> Option<Arc<ProtocolSession>> {
        self.slots
            .lock()
            .remove(server_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Ids with an established session, sorted
    pub fn server_ids(&self) -> Vec<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every session, continuing past failures
    ///
    /// The pool is empty afterwards. Failures are reported together as
    /// [`BridgeError::CloseFailed`].
    pub async fn close_all(&self) -> BridgeResult<()> {
        let slots = std::mem::take(&mut *self.slots.lock());
        let mut failures = Vec::new();

        for (server_id, slot) in slots {
            let Some(session) = slot.get() else {
                continue;
            };
            if let Err(e) = session.close().await {
                crate::log_error!(self.logger, "[SessionPool] failed to close {}: {}", server_id, e);
                failures.push(SessionCloseFailure {
                    server_id,
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::CloseFailed(failures))
        }
    }
}
