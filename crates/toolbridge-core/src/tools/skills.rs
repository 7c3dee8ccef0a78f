//! Seeding a registry from skill declarations

use crate::config::{SkillDeclaration, SkillSource};
use crate::error::BridgeResult;
use crate::types::CallContext;

use super::registry::{RemoteRegistration, ToolRegistry};

impl ToolRegistry {
    /// Register every declaration in order
    ///
    /// Each declaration is validated before anything is registered. The
    /// first configuration or handshake error aborts the run; tools
    /// registered before it stay registered.
    pub async fn register_skills(
        &self,
        ctx: &CallContext,
        skills: &[SkillDeclaration],
    ) -> BridgeResult<Vec<RemoteRegistration>> {
        for skill in skills {
            skill.validate()?;
        }

        let mut remotes = Vec::new();
        for skill in skills {
            match skill {
                SkillDeclaration::Native(native) => {
                    self.register_native_tool(&native.name, &native.description, &native.env)?;
                }
                SkillDeclaration::Meta(meta) => {
                    self.register_meta_tool(&meta.name, &meta.description, &meta.instruction)?;
                }
                SkillDeclaration::Mcp(mcp) => {
                    let config = mcp.transport_config()?;
                    remotes.push(self.register_remote_tool(ctx, &mcp.name, &config).await?);
                }
            }
        }
        Ok(remotes)
    }

    /// Register the skills `source` declares for `agent`
    pub async fn register_agent(
        &self,
        ctx: &CallContext,
        source: &dyn SkillSource,
        agent: &str,
    ) -> BridgeResult<Vec<RemoteRegistration>> {
        let skills = source.skills(agent).await?;
        self.logger().info(&format!(
            "[ToolRegistry] Registering {} skills for agent {}",
            skills.len(),
            agent
        ));
        self.register_skills(ctx, &skills).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{McpSkill, MemorySkillSource, MetaSkill, NativeSkill};
    use crate::error::BridgeError;
    use crate::logging::NoOpLogger;
    use std::sync::Arc;

    fn meta(name: &str) -> SkillDeclaration {
        SkillDeclaration::Meta(MetaSkill {
            name: name.into(),
            description: "desc".into(),
            instruction: "do it".into(),
        })
    }

    #[tokio::test]
    async fn test_register_agent_from_memory_source() {
        let source = MemorySkillSource::new().with_agent(
            "assistant",
            vec![
                meta("plan"),
                SkillDeclaration::Native(NativeSkill {
                    name: "done_agent".into(),
                    ..Default::default()
                }),
            ],
        );
        let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();

        let remotes = registry
            .register_agent(&CallContext::new(), &source, "assistant")
            .await
            .unwrap();
        assert!(remotes.is_empty());
        assert!(registry.lookup("plan").is_some());
        assert!(registry.lookup("done_agent").is_some());
    }

    #[tokio::test]
    async fn test_invalid_declaration_registers_nothing() {
        let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
        let skills = vec![
            meta("plan"),
            SkillDeclaration::Mcp(McpSkill {
                name: "broken".into(),
                transport: Some("carrier-pigeon".into()),
                ..Default::default()
            }),
        ];

        let err = registry
            .register_skills(&CallContext::new(), &skills)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert_eq!(registry.tool_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_configuration_error() {
        let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
        let err = registry
            .register_agent(&CallContext::new(), &MemorySkillSource::new(), "nobody")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Agent not found: nobody"));
    }
}
