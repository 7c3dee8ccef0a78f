//! `web_search`: delegates to a host-provided search service

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{NativeServices, WEB_SEARCH};
use crate::error::BridgeResult;
use crate::tools::handler::{ToolHandler, TypedTool};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

pub(super) const DESCRIPTION: &str = "Search the web for up-to-date information";

const NOT_CONFIGURED: &str = "Web search is not configured";

/// Search backend supplied by the host
#[async_trait]
pub trait WebSearchService: Send + Sync {
    async fn search(&self, query: &str) -> BridgeResult<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebSearchRequest {
    /// What to search for
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebSearchReply {
    pub result: String,
}

pub(super) fn build(
    description: &str,
    services: &NativeServices,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let service = services.web_search.clone();
    if service.is_none() {
        services
            .logger
            .warn("[NativeTools] web_search registered without a search service");
    }

    let descriptor = ToolDescriptor::new(
        WEB_SEARCH,
        description,
        SchemaNode::for_type::<WebSearchRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(WEB_SEARCH, move |ctx: CallContext, req: WebSearchRequest| {
        let service = service.clone();
        async move {
            let result = match service {
                Some(service) => ctx.cancellable(service.search(&req.query)).await?,
                None => NOT_CONFIGURED.to_string(),
            };
            Ok(WebSearchReply { result })
        }
    });
    Ok((descriptor, Arc::new(handler)))
}
