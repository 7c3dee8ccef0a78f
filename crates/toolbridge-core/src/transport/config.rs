//! Transport selectors and per-transport configuration

use std::collections::BTreeMap;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BridgeError, BridgeResult};
use crate::oauth::OAuthParams;

/// The four ways of reaching a remote tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "sse")]
    Sse,
    #[serde(rename = "oauth-sse")]
    OAuthSse,
    #[serde(rename = "http")]
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::OAuthSse => "oauth-sse",
            TransportKind::StreamableHttp => "http",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "oauth-sse" | "oauth_sse" => Ok(TransportKind::OAuthSse),
            "http" | "streamable-http" | "streamable_http" => Ok(TransportKind::StreamableHttp),
            other => Err(BridgeError::configuration(format!(
                "unsupported transport type: {}",
                other
            ))),
        }
    }
}

/// Connection settings for one remote tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport")]
pub enum TransportConfig {
    #[serde(rename = "stdio")]
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    #[serde(rename = "sse")]
    Sse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    #[serde(rename = "oauth-sse")]
    OAuthSse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        oauth: OAuthParams,
    },
    #[serde(rename = "http", alias = "streamable-http")]
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl TransportConfig {
    pub fn stdio(command: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        TransportConfig::Stdio {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        TransportConfig::Sse {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn oauth_sse(url: impl Into<String>, oauth: OAuthParams) -> Self {
        TransportConfig::OAuthSse {
            url: url.into(),
            headers: BTreeMap::new(),
            oauth,
        }
    }

    pub fn streamable_http(url: impl Into<String>) -> Self {
        TransportConfig::StreamableHttp {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header (HTTP kinds) or an environment entry (stdio)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self {
            TransportConfig::Stdio { env, .. } => {
                env.insert(name.into(), value.into());
            }
            TransportConfig::Sse { headers, .. }
            | TransportConfig::OAuthSse { headers, .. }
            | TransportConfig::StreamableHttp { headers, .. } => {
                headers.insert(name.into(), value.into());
            }
        }
        self
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Stdio { .. } => TransportKind::Stdio,
            TransportConfig::Sse { .. } => TransportKind::Sse,
            TransportConfig::OAuthSse { .. } => TransportKind::OAuthSse,
            TransportConfig::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }

    /// Check required fields without touching the network or the filesystem
    pub fn validate(&self) -> BridgeResult<()> {
        match self {
            TransportConfig::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(BridgeError::configuration(
                        "command is required for stdio transport",
                    ));
                }
                Ok(())
            }
            TransportConfig::Sse { url, headers } | TransportConfig::StreamableHttp { url, headers } => {
                parse_url(url, self.kind())?;
                header_map(headers)?;
                Ok(())
            }
            TransportConfig::OAuthSse { url, headers, oauth } => {
                parse_url(url, self.kind())?;
                header_map(headers)?;
                oauth.validate()
            }
        }
    }
}

pub(crate) fn parse_url(url: &str, kind: TransportKind) -> BridgeResult<Url> {
    if url.trim().is_empty() {
        return Err(BridgeError::configuration(format!(
            "URL is required for {} transport",
            kind
        )));
    }
    let parsed = Url::parse(url)
        .map_err(|e| BridgeError::configuration(format!("invalid URL '{}': {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(BridgeError::configuration(format!(
            "unsupported URL scheme '{}' for {} transport",
            scheme, kind
        ))),
    }
}

pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> BridgeResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BridgeError::configuration(format!("invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BridgeError::configuration(format!("invalid value for header '{}': {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}
