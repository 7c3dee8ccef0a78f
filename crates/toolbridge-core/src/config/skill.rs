//! Skill declarations: the configuration-level description of one tool source

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::oauth::OAuthParams;
use crate::transport::{TransportConfig, TransportKind};

/// One skill of an agent, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SkillDeclaration {
    #[serde(rename = "nativeTool", alias = "native")]
    Native(NativeSkill),
    #[serde(rename = "llm", alias = "meta")]
    Meta(MetaSkill),
    #[serde(rename = "mcp")]
    Mcp(McpSkill),
}

impl SkillDeclaration {
    pub fn name(&self) -> &str {
        match self {
            SkillDeclaration::Native(s) => &s.name,
            SkillDeclaration::Meta(s) => &s.name,
            SkillDeclaration::Mcp(s) => &s.name,
        }
    }

    /// Check required fields without touching the network
    pub fn validate(&self) -> BridgeResult<()> {
        match self {
            SkillDeclaration::Native(s) if s.name.trim().is_empty() => {
                Err(BridgeError::configuration("native tool name is required"))
            }
            SkillDeclaration::Native(_) => Ok(()),
            SkillDeclaration::Meta(s) => {
                if s.name.trim().is_empty() {
                    return Err(BridgeError::configuration("llm name is required"));
                }
                if s.description.trim().is_empty() {
                    return Err(BridgeError::configuration("llm description is required"));
                }
                if s.instruction.trim().is_empty() {
                    return Err(BridgeError::configuration("llm instruction is required"));
                }
                Ok(())
            }
            SkillDeclaration::Mcp(s) => s.transport_config().map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeSkill {
    pub name: String,
    /// Falls back to the tool's built-in description when empty
    #[serde(default, alias = "details")]
    pub description: String,
    /// Settings for the tool, e.g. `OPENWEATHER_API_KEY`
    #[serde(default)]
    pub env: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSkill {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: String,
}

/// A remote tool server; `name` is its server id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpSkill {
    pub name: String,
    /// `stdio`, `sse`, `oauth-sse` or `http`; detected from `url` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthParams>,
}

impl McpSkill {
    /// Selected transport: explicit, or `sse` when a url is set, else `stdio`
    pub fn transport_kind(&self) -> BridgeResult<TransportKind> {
        match self.transport.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(selector) => selector.parse(),
            None if !self.url.trim().is_empty() => Ok(TransportKind::Sse),
            None => Ok(TransportKind::Stdio),
        }
    }

    /// Validated transport configuration for this server
    pub fn transport_config(&self) -> BridgeResult<TransportConfig> {
        let config = match self.transport_kind()? {
            TransportKind::Stdio => TransportConfig::Stdio {
                command: self.command.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
            },
            TransportKind::Sse => TransportConfig::Sse {
                url: self.url.clone(),
                headers: self.headers.clone(),
            },
            TransportKind::OAuthSse => TransportConfig::OAuthSse {
                url: self.url.clone(),
                headers: self.headers.clone(),
                oauth: self.oauth.clone().ok_or_else(|| {
                    BridgeError::configuration("OAuth configuration is required for oauth-sse transport")
                })?,
            },
            TransportKind::StreamableHttp => TransportConfig::StreamableHttp {
                url: self.url.clone(),
                headers: self.headers.clone(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_skill_types() {
        let yaml = r#"
- type: nativeTool
  name: get_weather
  env:
    OPENWEATHER_API_KEY: abc
- type: llm
  name: be_brief
  description: Reminder
  instruction: Keep answers short
- type: mcp
  name: files
  command: files-server
  args: ["--root", "."]
- type: native
  name: done_agent
  details: Finish
"#;
        let skills: Vec<SkillDeclaration> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(skills.len(), 4);
        assert!(matches!(&skills[0], SkillDeclaration::Native(s) if s.env["OPENWEATHER_API_KEY"] == "abc"));
        assert!(matches!(&skills[1], SkillDeclaration::Meta(s) if s.instruction == "Keep answers short"));
        assert!(matches!(&skills[3], SkillDeclaration::Native(s) if s.description == "Finish"));
        assert!(skills.iter().all(|s| s.validate().is_ok()));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<SkillDeclaration, _> = serde_json::from_str(r#"{"type": "rss", "name": "feed"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_transport_auto_detection() {
        let stdio = McpSkill {
            name: "files".into(),
            command: "files-server".into(),
            ..Default::default()
        };
        assert_eq!(stdio.transport_config().unwrap().kind(), TransportKind::Stdio);

        let sse = McpSkill {
            name: "docs".into(),
            url: "https://docs.example.com/sse".into(),
            ..Default::default()
        };
        assert_eq!(sse.transport_config().unwrap().kind(), TransportKind::Sse);

        let http = McpSkill {
            transport: Some("streamable-http".into()),
            ..sse.clone()
        };
        assert_eq!(http.transport_config().unwrap().kind(), TransportKind::StreamableHttp);
    }

    #[test]
    fn test_transport_errors_name_the_problem() {
        let missing_command = McpSkill {
            name: "files".into(),
            ..Default::default()
        };
        assert!(missing_command
            .transport_config()
            .unwrap_err()
            .to_string()
            .contains("command is required for stdio transport"));

        let missing_url = McpSkill {
            name: "docs".into(),
            transport: Some("http".into()),
            ..Default::default()
        };
        assert!(missing_url
            .transport_config()
            .unwrap_err()
            .to_string()
            .contains("URL is required for http transport"));

        let unsupported = McpSkill {
            name: "x".into(),
            transport: Some("websocket".into()),
            ..Default::default()
        };
        assert!(unsupported
            .transport_config()
            .unwrap_err()
            .to_string()
            .contains("unsupported transport type: websocket"));

        let no_oauth = McpSkill {
            name: "secure".into(),
            transport: Some("oauth-sse".into()),
            url: "https://secure.example.com/sse".into(),
            ..Default::default()
        };
        assert!(no_oauth
            .transport_config()
            .unwrap_err()
            .to_string()
            .contains("OAuth configuration is required"));
    }

    #[test]
    fn test_meta_skill_requires_instruction() {
        let skill = SkillDeclaration::Meta(MetaSkill {
            name: "x".into(),
            description: "d".into(),
            instruction: String::new(),
        });
        assert!(skill.validate().unwrap_err().to_string().contains("llm instruction is required"));
    }
}
