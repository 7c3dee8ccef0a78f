//! `search_rss` and `read_rss`: items from the feeds a skill allows
//!
//! The allowed feeds come from the skill's `allowed_feed_urls` env entry and
//! are listed in both tool descriptions. URLs outside that list are refused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{NativeServices, READ_RSS, SEARCH_RSS};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::Logger;
use crate::tools::handler::{ToolHandler, TypedTool};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

pub(super) const SEARCH_DESCRIPTION: &str = "Search several RSS feeds for items matching a keyword.

The query is matched case-insensitively against item titles and descriptions. Pass feed URLs exactly \
as listed under the allowed feeds; feeds that cannot be fetched are skipped. max_items caps the number \
of results across all feeds. The reply carries the query, the matching items with the feed each came \
from, and the count.";

pub(super) const READ_DESCRIPTION: &str = "Read every recent item from one RSS feed.

Pass a feed URL exactly as listed under the allowed feeds. limit caps the number of items returned. \
Each item carries its title, description, link, publication date, author and categories. Use \
search_rss to filter by keyword across several feeds.";

const ALLOWED_FEED_URLS: &str = "allowed_feed_urls";
const FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a skill's `allowed_feed_urls`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRssRequest {
    /// RSS feed URLs to search, taken from the allowed feeds
    pub urls: Vec<String>,
    /// Keyword or phrase matched against titles and descriptions
    pub query: String,
    /// Maximum number of results across all feeds (default: no limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadRssRequest {
    /// RSS feed URL to read, taken from the allowed feeds
    pub url: String,
    /// Maximum number of items to return (default: no limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl FeedItem {
    fn matches(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(query) || self.description.to_lowercase().contains(query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMatch {
    pub source: String,
    pub item: FeedItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRssReply {
    pub query: String,
    pub results: Vec<FeedMatch>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRssReply {
    pub feed_url: String,
    pub items: Vec<FeedItem>,
    pub count: usize,
}

/// Parse `allowed_feed_urls`; absent means no feed is allowed
fn allowed_feeds(env: &HashMap<String, Value>) -> BridgeResult<Vec<FeedSource>> {
    match env.get(ALLOWED_FEED_URLS) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| BridgeError::configuration(format!("invalid {}: {}", ALLOWED_FEED_URLS, e))),
    }
}

/// `description` followed by the allowed feed list
fn render_description(description: &str, feeds: &[FeedSource]) -> String {
    let mut out = format!("{}\n\n## Allowed RSS Feeds\n<allowed_rss_feeds>\n", description.trim_end());
    if feeds.is_empty() {
        out.push_str("No RSS feeds have been configured for this agent.\n");
    }
    for feed in feeds {
        out.push_str(&format!("- [**{}**]({}): {}\n", feed.name, feed.url, feed.description));
    }
    out.push_str("</allowed_rss_feeds>");
    out
}

fn item_from(item: &rss::Item) -> FeedItem {
    FeedItem {
        title: item.title().unwrap_or_default().to_string(),
        description: item.description().unwrap_or_default().to_string(),
        link: item.link().unwrap_or_default().to_string(),
        published: item
            .pub_date()
            .and_then(|date| DateTime::parse_from_rfc2822(date.trim()).ok()),
        author: item.author().unwrap_or_default().to_string(),
        categories: item.categories().iter().map(|c| c.name().to_string()).collect(),
    }
}

struct FeedReader {
    tool: &'static str,
    http: reqwest::Client,
    allowed: Vec<FeedSource>,
    logger: Arc<dyn Logger>,
}

impl FeedReader {
    fn failure(&self, message: impl std::fmt::Display) -> BridgeError {
        BridgeError::handler(self.tool, message)
    }

    fn is_allowed(&self, url: &str) -> bool {
        self.allowed.iter().any(|feed| feed.url == url)
    }

    async fn fetch(&self, url: &str) -> BridgeResult<Vec<FeedItem>> {
        if !self.is_allowed(url) {
            return Err(self.failure(format!("feed is not in the allowed list: {}", url)));
        }
        let body = tokio::time::timeout(FEED_TIMEOUT, async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| self.failure(format!("failed to fetch feed {}: {}", url, e)))?;
            if !response.status().is_success() {
                return Err(self.failure(format!("failed to fetch feed {}: HTTP {}", url, response.status())));
            }
            response
                .bytes()
                .await
                .map_err(|e| self.failure(format!("failed to fetch feed {}: {}", url, e)))
        })
        .await
        .map_err(|_| self.failure(format!("timed out fetching feed {}", url)))??;

        let channel = rss::Channel::read_from(&body[..])
            .map_err(|e| self.failure(format!("failed to parse feed {}: {}", url, e)))?;
        Ok(channel.items().iter().map(item_from).collect())
    }

    async fn search(&self, req: SearchRssRequest) -> SearchRssReply {
        let query = req.query.to_lowercase();
        let feeds = join_all(req.urls.iter().map(|url| self.fetch(url))).await;

        let mut results = Vec::new();
        'feeds: for (url, feed) in req.urls.iter().zip(feeds) {
            let items = match feed {
                Ok(items) => items,
                Err(e) => {
                    self.logger.warn(&format!("[NativeTools] search_rss skipping feed: {}", e));
                    continue;
                }
            };
            for item in items {
                if req.max_items.is_some_and(|max| results.len() >= max) {
                    break 'feeds;
                }
                if item.matches(&query) {
                    results.push(FeedMatch {
                        source: url.clone(),
                        item,
                    });
                }
            }
        }

        SearchRssReply {
            query: req.query,
            count: results.len(),
            results,
        }
    }

    async fn read(&self, req: ReadRssRequest) -> BridgeResult<ReadRssReply> {
        let mut items = self.fetch(&req.url).await?;
        if let Some(limit) = req.limit.filter(|limit| *limit > 0) {
            items.truncate(limit);
        }
        Ok(ReadRssReply {
            feed_url: req.url,
            count: items.len(),
            items,
        })
    }
}

fn reader(
    tool: &'static str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<(Arc<FeedReader>, Vec<FeedSource>)> {
    let allowed = allowed_feeds(env)?;
    let reader = Arc::new(FeedReader {
        tool,
        http: services.http.clone(),
        allowed: allowed.clone(),
        logger: services.logger.clone(),
    });
    Ok((reader, allowed))
}

pub(super) fn build_search(
    description: &str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let (reader, allowed) = reader(SEARCH_RSS, env, services)?;
    let descriptor = ToolDescriptor::new(
        SEARCH_RSS,
        render_description(description, &allowed),
        SchemaNode::for_type::<SearchRssRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(SEARCH_RSS, move |ctx: CallContext, req: SearchRssRequest| {
        let reader = reader.clone();
        async move {
            reader.logger.debug(&format!(
                "[NativeTools] search_rss query={} feeds={}",
                req.query,
                req.urls.len()
            ));
            ctx.cancellable(async { Ok(reader.search(req).await) }).await
        }
    });
    Ok((descriptor, Arc::new(handler)))
}

pub(super) fn build_read(
    description: &str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let (reader, allowed) = reader(READ_RSS, env, services)?;
    let descriptor = ToolDescriptor::new(
        READ_RSS,
        render_description(description, &allowed),
        SchemaNode::for_type::<ReadRssRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(READ_RSS, move |ctx: CallContext, req: ReadRssRequest| {
        let reader = reader.clone();
        async move { ctx.cancellable(reader.read(req)).await }
    });
    Ok((descriptor, Arc::new(handler)))
}
