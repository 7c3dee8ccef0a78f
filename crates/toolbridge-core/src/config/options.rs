//! Registry options

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the registry treats questionable registrations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Log a warning and keep going
    #[default]
    Tolerant,
    /// Fail with a configuration error
    Strict,
}

/// Settings of one [`ToolRegistry`](crate::tools::ToolRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryOptions {
    /// Client name advertised in `initialize`
    pub client_name: String,
    pub client_version: String,
    /// Connect timeout for remote servers and request timeout for OAuth and
    /// SSE POSTs, in seconds; tool calls are bounded by the call context
    pub http_timeout_secs: u64,
    /// Native skill names missing from the catalog
    pub unknown_native: RegistrationPolicy,
    /// Names that are already registered
    pub duplicate_names: RegistrationPolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            client_name: "toolbridge".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            http_timeout_secs: 30,
            unknown_native: RegistrationPolicy::Tolerant,
            duplicate_names: RegistrationPolicy::Tolerant,
        }
    }
}

impl RegistryOptions {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn strict() -> Self {
        Self {
            unknown_native: RegistrationPolicy::Strict,
            duplicate_names: RegistrationPolicy::Strict,
            ..Self::default()
        }
    }
}
