//! `knowledge_search`: semantic search through the host's knowledge service
//!
//! Service failures are reported inside a successful reply so the model can
//! rephrase and retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{NativeServices, KNOWLEDGE_SEARCH};
use crate::error::{BridgeError, BridgeResult};
use crate::tools::handler::{ToolHandler, TypedTool};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

pub(super) const DESCRIPTION: &str = "Search through the external knowledge base to find relevant information, documents, and context.

Use it when asked about information that might be stored in the knowledge base, to retrieve context from \
previous conversations or saved documents, or when the user references something from the past.

Provide a clear, specific search query. The search is semantic, so exact keyword matches are not required. \
Results are ranked by relevance. If an error occurs, the error field contains the message; try rephrasing \
the query or waiting before retrying.";

const DEFAULT_LIMIT: usize = 5;
const KNOWLEDGE_IDS: &str = "knowledge_ids";

/// Stored content of one search hit
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeContent {
    pub mime_type: String,
    pub text: Option<String>,
    /// Image URL or data URI for image content
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeHit {
    pub score: f32,
    pub content: KnowledgeContent,
}

/// Knowledge/RAG backend supplied by the host
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    /// Up to `limit` hits for `query`, restricted to `knowledge_ids` when given
    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        knowledge_ids: Option<&[String]>,
    ) -> BridgeResult<Vec<KnowledgeHit>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeRequest {
    /// The search query to find relevant information
    pub query: String,
    /// The maximum number of results to return (default 5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    /// Score of the search result
    pub score: f64,
    /// Text of the search result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeReply {
    /// List of search results with relevant knowledge
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<KnowledgeItem>,
    /// Error message if the search fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn to_item(hit: KnowledgeHit) -> BridgeResult<KnowledgeItem> {
    let mut item = KnowledgeItem {
        score: f64::from(hit.score),
        ..Default::default()
    };
    match hit.content.mime_type.as_str() {
        "image/jpeg" | "image/png" | "image/jpg" | "image/webp" => {
            item.content_type = Some(hit.content.mime_type);
            item.url = hit.content.image;
        }
        "text/plain" | "plain/text" => item.context = hit.content.text,
        other => {
            return Err(BridgeError::handler(
                KNOWLEDGE_SEARCH,
                format!("unknown content type: {}", other),
            ))
        }
    }
    Ok(item)
}

fn knowledge_ids(env: &HashMap<String, Value>) -> Option<Vec<String>> {
    env.get(KNOWLEDGE_IDS)?.as_array().map(|ids| {
        ids.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

pub(super) fn build(
    description: &str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let service = services.knowledge.clone().ok_or_else(|| {
        BridgeError::configuration(format!("{} requires a knowledge service", KNOWLEDGE_SEARCH))
    })?;
    let allowed = Arc::new(knowledge_ids(env));
    let logger = services.logger.clone();

    let descriptor = ToolDescriptor::new(
        KNOWLEDGE_SEARCH,
        description,
        SchemaNode::for_type::<KnowledgeRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(KNOWLEDGE_SEARCH, move |ctx: CallContext, req: KnowledgeRequest| {
        let service = service.clone();
        let allowed = allowed.clone();
        let logger = logger.clone();
        async move {
            let limit = req.limit.unwrap_or(DEFAULT_LIMIT);
            let hits = match ctx
                .cancellable(service.retrieve(&req.query, limit, allowed.as_deref()))
                .await
            {
                Ok(hits) => hits,
                Err(BridgeError::Cancelled) => return Err(BridgeError::Cancelled),
                Err(e) => {
                    logger.warn(&format!("[NativeTools] knowledge_search failed: {}", e));
                    return Ok(KnowledgeReply {
                        output: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            };

            let output = hits.into_iter().map(to_item).collect::<BridgeResult<Vec<_>>>()?;
            Ok(KnowledgeReply { output, error: None })
        }
    });
    Ok((descriptor, Arc::new(handler)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, usize, Option<Vec<String>>)>>,
        fail: bool,
    }

    #[async_trait]
    impl KnowledgeService for Recording {
        async fn retrieve(
            &self,
            query: &str,
            limit: usize,
            knowledge_ids: Option<&[String]>,
        ) -> BridgeResult<Vec<KnowledgeHit>> {
            self.calls
                .lock()
                .push((query.to_string(), limit, knowledge_ids.map(|ids| ids.to_vec())));
            if self.fail {
                return Err(BridgeError::handler("knowledge", "index offline"));
            }
            Ok(vec![KnowledgeHit {
                score: 0.5,
                content: KnowledgeContent {
                    mime_type: "text/plain".to_string(),
                    text: Some("the answer".to_string()),
                    image: None,
                },
            }])
        }
    }

    fn services(service: Arc<Recording>) -> NativeServices {
        NativeServices {
            http: reqwest::Client::new(),
            knowledge: Some(service as Arc<dyn KnowledgeService>),
            web_search: None,
            logger: Arc::new(NoOpLogger),
        }
    }

    #[tokio::test]
    async fn test_default_limit_and_knowledge_ids() {
        let service = Arc::new(Recording::default());
        let mut env = HashMap::new();
        env.insert(KNOWLEDGE_IDS.to_string(), json!(["kb-1"]));
        let (_, handler) = build(DESCRIPTION, &env, &services(service.clone())).unwrap();

        let out = handler
            .invoke(&CallContext::new(), json!({ "query": "what" }))
            .await
            .unwrap();
        assert_eq!(out, json!({ "output": [{ "score": 0.5, "context": "the answer" }] }));
        assert_eq!(
            service.calls.lock()[0],
            ("what".to_string(), 5, Some(vec!["kb-1".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_service_failure_becomes_error_field() {
        let service = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let (_, handler) = build(DESCRIPTION, &HashMap::new(), &services(service)).unwrap();

        let ctx = CallContext::new();
        let out = handler
            .invoke(&ctx, json!({ "query": "what", "limit": 2 }))
            .await
            .unwrap();
        assert!(out["error"].as_str().unwrap().contains("index offline"));
        assert!(out.get("output").is_none());
        // Still a successful call
        assert_eq!(ctx.trace().len(), 1);
    }

    #[test]
    fn test_requires_service() {
        let services = NativeServices {
            http: reqwest::Client::new(),
            knowledge: None,
            web_search: None,
            logger: Arc::new(NoOpLogger),
        };
        assert!(matches!(
            build(DESCRIPTION, &HashMap::new(), &services),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_content_type_is_rejected() {
        let hit = KnowledgeHit {
            score: 1.0,
            content: KnowledgeContent {
                mime_type: "application/pdf".to_string(),
                text: None,
                image: None,
            },
        };
        assert!(to_item(hit).is_err());
    }
}
