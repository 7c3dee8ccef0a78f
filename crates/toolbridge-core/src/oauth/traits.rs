//! Token storage traits and types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens expiring within this window are treated as expired
const EXPIRY_SKEW_SECS: i64 = 30;

/// Bearer token issued by an authorization server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Build from a token endpoint `expires_in` (seconds from now)
    pub fn with_expires_in(mut self, expires_in: Option<i64>) -> Self {
        self.expires_at = expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token)
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Errors that can occur during token store operations
#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Store not available: {0}")]
    NotAvailable(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Storage for OAuth tokens, keyed by remote server id
///
/// Implementations can be:
/// - In-memory (`MemoryTokenStore`), the default
/// - Custom implementations backed by a keychain or a host application
pub trait TokenStore: Send + Sync {
    /// Human-readable name of this store
    fn name(&self) -> &str;

    fn load(&self, server_id: &str) -> TokenStoreResult<Option<OAuthToken>>;

    fn save(&self, server_id: &str, token: OAuthToken) -> TokenStoreResult<()>;

    fn remove(&self, server_id: &str) -> TokenStoreResult<()>;
}
