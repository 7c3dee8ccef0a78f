//! File-based skill source (YAML)
//!
//! Supports a user-level file (~/.config/toolbridge/agents.yaml) or any explicit path.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::options::RegistryOptions;
use super::skill::SkillDeclaration;
use super::traits::{ConfigError, ConfigResult, SkillSource};

/// Skill file structure
///
/// ```yaml
/// options:
///   clientName: my-runtime
/// agents:
///   assistant:
///     - type: nativeTool
///       name: get_weather
///     - type: mcp
///       name: files
///       command: files-server
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillFile {
    #[serde(default)]
    pub options: RegistryOptions,
    #[serde(default)]
    pub agents: std::collections::BTreeMap<String, Vec<SkillDeclaration>>,
}

/// Skill source backed by a YAML file
///
/// # Example
///
/// ```no_run
/// use toolbridge_core::config::FileSkillSource;
///
/// // User-level file
/// let user = FileSkillSource::user();
///
/// // Explicit path
/// let local = FileSkillSource::new("./agents.yaml");
/// ```
pub struct FileSkillSource {
    path: PathBuf,
    cache: RwLock<Option<SkillFile>>,
}

impl FileSkillSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    /// User-level source (~/.config/toolbridge/agents.yaml)
    pub fn user() -> Self {
        // XDG config directory (~/.config on Linux, ~/Library/Application Support on macOS)
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config"));
        Self::new(config_dir.join("toolbridge").join("agents.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> ConfigResult<SkillFile> {
        if !self.path.exists() {
            return Ok(SkillFile::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let file: SkillFile = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse {}: {}", self.path.display(), e)))?;

        for (agent, skills) in &file.agents {
            for skill in skills {
                skill
                    .validate()
                    .map_err(|e| ConfigError::InvalidSkill(format!("{}/{}: {}", agent, skill.name(), e)))?;
            }
        }
        Ok(file)
    }

    fn get_file(&self) -> ConfigResult<SkillFile> {
        if let Some(file) = self.cache.read().as_ref() {
            return Ok(file.clone());
        }
        let file = self.load()?;
        *self.cache.write() = Some(file.clone());
        Ok(file)
    }

    /// Re-read the file from disk
    pub fn reload(&self) -> ConfigResult<SkillFile> {
        let file = self.load()?;
        *self.cache.write() = Some(file.clone());
        Ok(file)
    }

    /// Write `file` to disk and cache it
    pub fn save(&self, file: &SkillFile) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(file)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize YAML: {}", e)))?;
        fs::write(&self.path, content)?;
        *self.cache.write() = Some(file.clone());
        Ok(())
    }
}

impl std::fmt::Debug for FileSkillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSkillSource")
            .field("path", &self.path)
            .field("exists", &self.exists())
            .finish()
    }
}

#[async_trait]
impl SkillSource for FileSkillSource {
    async fn agents(&self) -> ConfigResult<Vec<String>> {
        Ok(self.get_file()?.agents.into_keys().collect())
    }

    async fn skills(&self, agent: &str) -> ConfigResult<Vec<SkillDeclaration>> {
        self.get_file()?
            .agents
            .remove(agent)
            .ok_or_else(|| ConfigError::AgentNotFound(agent.to_string()))
    }

    async fn options(&self) -> ConfigResult<RegistryOptions> {
        Ok(self.get_file()?.options)
    }
}
