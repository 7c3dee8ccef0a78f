//! Skill source trait

use async_trait::async_trait;

use super::options::RegistryOptions;
use super::skill::SkillDeclaration;
use crate::error::BridgeError;

/// Where agent skill declarations come from
///
/// Implementations:
/// - `MemorySkillSource`: In-memory, for tests and embedding hosts
/// - `FileSkillSource`: YAML file (~/.config/toolbridge/agents.yaml)
#[async_trait]
pub trait SkillSource: Send + Sync {
    /// Names of every configured agent
    async fn agents(&self) -> ConfigResult<Vec<String>>;

    /// Skill declarations of one agent
    async fn skills(&self, agent: &str) -> ConfigResult<Vec<SkillDeclaration>>;

    /// Registry options carried by the source
    async fn options(&self) -> ConfigResult<RegistryOptions> {
        Ok(RegistryOptions::default())
    }
}

/// Errors that can occur while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid skill: {0}")]
    InvalidSkill(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Configuration(err.to_string())
    }
}
