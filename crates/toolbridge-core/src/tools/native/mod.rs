//! Compiled-in tools
//!
//! The catalog maps each native tool name to its built-in description.
//! Names are matched case-insensitively at registration.

mod done;
mod feeds;
mod knowledge;
mod weather;
mod web_search;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;

use super::handler::ToolHandler;
use crate::error::BridgeResult;
use crate::logging::Logger;
use crate::types::ToolDescriptor;

pub use done::{DoneReply, DoneRequest};
pub use feeds::{FeedItem, FeedMatch, FeedSource, ReadRssReply, ReadRssRequest, SearchRssReply, SearchRssRequest};
pub use knowledge::{KnowledgeContent, KnowledgeHit, KnowledgeItem, KnowledgeReply, KnowledgeRequest, KnowledgeService};
pub use weather::{WeatherRequest, WeatherSummary};
pub use web_search::{WebSearchReply, WebSearchRequest, WebSearchService};

pub const GET_WEATHER: &str = "get_weather";
pub const WEB_SEARCH: &str = "web_search";
pub const KNOWLEDGE_SEARCH: &str = "knowledge_search";
pub const DONE_AGENT: &str = "done_agent";
pub const SEARCH_RSS: &str = "search_rss";
pub const READ_RSS: &str = "read_rss";

static CATALOG: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut catalog = BTreeMap::new();
    catalog.insert(GET_WEATHER, weather::DESCRIPTION);
    catalog.insert(WEB_SEARCH, web_search::DESCRIPTION);
    catalog.insert(KNOWLEDGE_SEARCH, knowledge::DESCRIPTION);
    catalog.insert(DONE_AGENT, done::DESCRIPTION);
    catalog.insert(SEARCH_RSS, feeds::SEARCH_DESCRIPTION);
    catalog.insert(READ_RSS, feeds::READ_DESCRIPTION);
    catalog
});

/// Names of every compiled-in tool, sorted
pub fn native_tool_names() -> Vec<&'static str> {
    CATALOG.keys().copied().collect()
}

/// Canonical name and built-in description for `name`, ignoring case
pub fn find_native(name: &str) -> Option<(&'static str, &'static str)> {
    let wanted = name.trim().to_ascii_lowercase();
    CATALOG
        .iter()
        .find(|(canonical, _)| **canonical == wanted)
        .map(|(canonical, description)| (*canonical, *description))
}

/// Collaborators the native handlers depend on
#[derive(Clone)]
pub(crate) struct NativeServices {
    pub http: reqwest::Client,
    pub knowledge: Option<Arc<dyn KnowledgeService>>,
    pub web_search: Option<Arc<dyn WebSearchService>>,
    pub logger: Arc<dyn Logger>,
}

/// Skill `env` value for `key`, falling back to the process environment
pub(crate) fn setting(env: &HashMap<String, Value>, key: &str) -> Option<String> {
    match env.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => std::env::var(key).ok().filter(|v| !v.trim().is_empty()),
    }
}

/// Build the handler for a catalog entry; `None` when `name` is not native
pub(crate) fn native_tool(
    name: &str,
    description: &str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<Option<(ToolDescriptor, Arc<dyn ToolHandler>)>> {
    let Some((canonical, default_description)) = find_native(name) else {
        return Ok(None);
    };
    let description = if description.trim().is_empty() {
        default_description
    } else {
        description
    };

    let built = match canonical {
        GET_WEATHER => weather::build(description, env, services)?,
        WEB_SEARCH => web_search::build(description, services)?,
        KNOWLEDGE_SEARCH => knowledge::build(description, env, services)?,
        SEARCH_RSS => feeds::build_search(description, env, services)?,
        READ_RSS => feeds::build_read(description, env, services)?,
        _ => done::build(description)?,
    };
    Ok(Some(built))
}
