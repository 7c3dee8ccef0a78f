//! In-memory skill source

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::options::RegistryOptions;
use super::skill::SkillDeclaration;
use super::traits::{ConfigError, ConfigResult, SkillSource};

/// In-memory skill source for tests and embedding hosts
#[derive(Debug, Default)]
pub struct MemorySkillSource {
    agents: RwLock<BTreeMap<String, Vec<SkillDeclaration>>>,
    options: RwLock<RegistryOptions>,
}

impl MemorySkillSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(self, agent: impl Into<String>, skills: Vec<SkillDeclaration>) -> Self {
        self.set_skills(agent, skills);
        self
    }

    pub fn with_options(self, options: RegistryOptions) -> Self {
        *self.options.write() = options;
        self
    }

    /// Replace an agent's skills
    pub fn set_skills(&self, agent: impl Into<String>, skills: Vec<SkillDeclaration>) {
        self.agents.write().insert(agent.into(), skills);
    }

    pub fn remove_agent(&self, agent: &str) -> ConfigResult<()> {
        self.agents
            .write()
            .remove(agent)
            .map(|_| ())
            .ok_or_else(|| ConfigError::AgentNotFound(agent.to_string()))
    }
}

#[async_trait]
impl SkillSource for MemorySkillSource {
    async fn agents(&self) -> ConfigResult<Vec<String>> {
        Ok(self.agents.read().keys().cloned().collect())
    }

    async fn skills(&self, agent: &str) -> ConfigResult<Vec<SkillDeclaration>> {
        self.agents
            .read()
            .get(agent)
            .cloned()
            .ok_or_else(|| ConfigError::AgentNotFound(agent.to_string()))
    }

    async fn options(&self) -> ConfigResult<RegistryOptions> {
        Ok(self.options.read().clone())
    }
}
