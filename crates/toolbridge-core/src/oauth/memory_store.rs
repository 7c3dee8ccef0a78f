//! In-memory token store

use std::collections::HashMap;

use parking_lot::RwLock;

use super::traits::{OAuthToken, TokenStore, TokenStoreResult};

/// In-memory token store; tokens are lost when the store is dropped
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self, server_id: &str) -> TokenStoreResult<Option<OAuthToken>> {
        Ok(self.tokens.read().get(server_id).cloned())
    }

    fn save(&self, server_id: &str, token: OAuthToken) -> TokenStoreResult<()> {
        self.tokens.write().insert(server_id.to_string(), token);
        Ok(())
    }

    fn remove(&self, server_id: &str) -> TokenStoreResult<()> {
        self.tokens.write().remove(server_id);
        Ok(())
    }
}
