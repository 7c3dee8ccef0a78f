//! Skill configuration sources
//!
//! Supports multiple configuration sources:
//! - `MemorySkillSource`: In-memory for testing
//! - `FileSkillSource`: YAML file-based (user level or explicit path)

mod traits;
mod memory;
mod file;
mod options;
mod skill;

pub use traits::{SkillSource, ConfigError, ConfigResult};
pub use memory::MemorySkillSource;
pub use file::{FileSkillSource, SkillFile};
pub use options::{RegistrationPolicy, RegistryOptions};
pub use skill::{McpSkill, MetaSkill, NativeSkill, SkillDeclaration};
