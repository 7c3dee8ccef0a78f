//! Compiled-in tools against fake upstreams, and agents seeded from YAML

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use toolbridge_core::{
    BridgeError, CallContext, FileSkillSource, NoOpLogger, SkillSource, ToolKind, ToolRegistry,
};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn geocode(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(query.get("limit").map(String::as_str), Some("1"));
    match query.get("q").map(String::as_str) {
        Some("HK") => Json(json!([{ "name": "Hong Kong", "lat": 22.28, "lon": 114.17 }])),
        _ => Json(json!([])),
    }
}

async fn day_summary(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("appid").map(String::as_str) != Some("test-key") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "cod": 401, "message": "Invalid API key", "parameters": [] })),
        )
            .into_response();
    }
    assert_eq!(query.get("lat").map(String::as_str), Some("22.280000"));
    assert_eq!(query.get("unit").map(String::as_str), Some("metric"));
    Json(json!({
        "lat": 22.28,
        "lon": 114.17,
        "date": query.get("date"),
        "humidity": { "afternoon": 71.0 },
        "temperature": { "min": 24.5, "max": 29.0 },
        "wind": { "max": { "speed": 6.2, "direction": 120.0 } }
    }))
    .into_response()
}

async fn weather_env(api_key: &str) -> HashMap<String, Value> {
    let base = serve(
        Router::new()
            .route("/geo", get(geocode))
            .route("/summary", get(day_summary)),
    )
    .await;
    HashMap::from([
        ("OPENWEATHER_API_KEY".to_string(), json!(api_key)),
        ("OPENWEATHER_GEO_URL".to_string(), json!(format!("{}/geo", base))),
        ("OPENWEATHER_BASE_URL".to_string(), json!(format!("{}/summary", base))),
    ])
}

#[tokio::test]
async fn test_weather_resolves_venue_alias() {
    let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
    registry
        .register_native_tool("get_weather", "", &weather_env("test-key").await)
        .unwrap();
    let ctx = CallContext::new();

    let out = registry
        .call(&ctx, "get_weather", json!({ "location": "HKCEC", "date": "2026-10-15" }))
        .await
        .unwrap();
    assert_eq!(out["temperature"]["max"], json!(29.0));
    assert_eq!(out["wind"]["max"]["speed"], json!(6.2));

    let records = ctx.trace().records();
    assert_eq!(records.len(), 1);
    // The record keeps what the engine asked for
    assert_eq!(records[0].arguments["location"], "HKCEC");
}

#[tokio::test]
async fn test_weather_upstream_errors_are_handler_errors() {
    let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
    registry
        .register_native_tool("get_weather", "", &weather_env("wrong-key").await)
        .unwrap();
    let ctx = CallContext::new();

    let err = registry
        .call(&ctx, "get_weather", json!({ "location": "HK", "date": "2026-10-15" }))
        .await
        .unwrap_err();
    match err {
        BridgeError::Handler { tool, message } => {
            assert_eq!(tool, "get_weather");
            assert!(message.contains("Invalid API key"));
        }
        other => panic!("expected handler error, got {other:?}"),
    }

    let err = registry
        .call(&ctx, "get_weather", json!({ "location": "Atlantis", "date": "2026-10-15" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("city not found: Atlantis"));
    assert!(ctx.trace().is_empty());
}

const TECH_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Tech</title>
    <link>http://tech.example</link>
    <description>Tech news</description>
    <item><title>Rust in the kernel</title><description>Drivers land</description><link>http://tech.example/1</link></item>
    <item><title>New phones</title><description>Cameras again</description><link>http://tech.example/2</link></item>
    <item><title>Compilers</title><description>Why rust builds are faster now</description><link>http://tech.example/3</link></item>
  </channel>
</rss>"#;

const GARDEN_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Garden</title>
    <link>http://garden.example</link>
    <description>Garden notes</description>
    <item><title>RUST on tomato leaves</title><description>Fungus season</description><link>http://garden.example/1</link></item>
  </channel>
</rss>"#;

async fn rss_feed(body: &'static str) -> Response {
    ([(axum::http::header::CONTENT_TYPE, "application/rss+xml")], body).into_response()
}

async fn feeds_env() -> (HashMap<String, Value>, String) {
    let base = serve(
        Router::new()
            .route("/tech", get(|| rss_feed(TECH_FEED)))
            .route("/garden", get(|| rss_feed(GARDEN_FEED)))
            .route("/broken", get(|| async { StatusCode::BAD_GATEWAY })),
    )
    .await;
    let env = HashMap::from([(
        "allowed_feed_urls".to_string(),
        json!([
            { "url": format!("{}/tech", base), "name": "Tech", "description": "Tech news" },
            { "url": format!("{}/garden", base), "name": "Garden", "description": "Garden notes" },
            { "url": format!("{}/broken", base), "name": "Broken", "description": "Always down" }
        ]),
    )]);
    (env, base)
}

#[tokio::test]
async fn test_search_rss_matches_across_allowed_feeds() {
    let (env, base) = feeds_env().await;
    let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
    registry.register_native_tool("search_rss", "", &env).unwrap();

    let handle = registry.lookup("search_rss").unwrap();
    assert!(handle
        .descriptor()
        .description
        .contains(&format!("- [**Garden**]({}/garden): Garden notes", base)));

    let ctx = CallContext::new();
    let urls = json!([format!("{}/broken", base), format!("{}/tech", base), format!("{}/garden", base)]);
    let out = registry
        .call(&ctx, "search_rss", json!({ "urls": urls, "query": "Rust" }))
        .await
        .unwrap();
    assert_eq!(out["query"], "Rust");
    assert_eq!(out["count"], 3);
    let links: Vec<_> = out["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["item"]["link"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        links,
        vec!["http://tech.example/1", "http://tech.example/3", "http://garden.example/1"]
    );
    assert_eq!(out["results"][2]["source"], format!("{}/garden", base));

    let capped = registry
        .call(&ctx, "search_rss", json!({ "urls": urls, "query": "rust", "max_items": 1 }))
        .await
        .unwrap();
    assert_eq!(capped["count"], 1);

    // Feeds outside the allowed list are skipped
    let outside = registry
        .call(&ctx, "search_rss", json!({ "urls": ["http://127.0.0.1:1/feed"], "query": "rust" }))
        .await
        .unwrap();
    assert_eq!(outside["count"], 0);
}

#[tokio::test]
async fn test_read_rss_returns_limited_items() {
    let (env, base) = feeds_env().await;
    let registry = ToolRegistry::new(Arc::new(NoOpLogger)).unwrap();
    registry.register_native_tool("read_rss", "", &env).unwrap();
    let ctx = CallContext::new();

    let out = registry
        .call(&ctx, "read_rss", json!({ "url": format!("{}/tech", base), "limit": 2 }))
        .await
        .unwrap();
    assert_eq!(out["count"], 2);
    assert_eq!(out["items"][1]["title"], "New phones");

    let err = registry
        .call(&ctx, "read_rss", json!({ "url": format!("{}/broken", base) }))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Handler { .. }));
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn test_agent_from_yaml_mixes_every_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agents.yaml");
    let yaml = format!(
        r#"
options:
  clientName: yaml-test
agents:
  concierge:
    - type: llm
      name: plan_trip
      description: Plan before acting
      instruction: Always plan the itinerary first
    - type: nativeTool
      name: DONE_AGENT
    - type: mcp
      name: echo
      transport: stdio
      command: "{}"
"#,
        env!("CARGO_BIN_EXE_toolbridge-echo")
    );
    std::fs::write(&path, yaml).unwrap();

    let source = FileSkillSource::new(&path);
    let options = source.options().await.unwrap();
    assert_eq!(options.client_name, "yaml-test");

    let registry = ToolRegistry::builder().with_options(options).build().unwrap();
    let ctx = CallContext::new();
    let remotes = registry.register_agent(&ctx, &source, "concierge").await.unwrap();
    assert_eq!(remotes.len(), 1);
    assert_eq!(remotes[0].server_id, "echo");

    let kinds: Vec<_> = registry
        .descriptors()
        .into_iter()
        .map(|d| (d.name, d.kind))
        .collect();
    assert_eq!(kinds[0], ("plan_trip".to_string(), ToolKind::Meta));
    assert_eq!(kinds[1], ("done_agent".to_string(), ToolKind::Native));
    assert!(kinds[2..].iter().all(|(_, kind)| *kind == ToolKind::Remote));

    let hint = registry.call(&ctx, "plan_trip", json!(null)).await.unwrap();
    assert_eq!(hint["additional_important_instruction"], "Always plan the itinerary first");

    let done = registry
        .call(&ctx, "done_agent", json!({ "reason": "booked" }))
        .await
        .unwrap();
    assert_eq!(done["success"], json!(true));
    assert_eq!(done["message"], "Task marked as completed: booked");

    let echoed = registry.call(&ctx, "echo", json!({ "text": "bye" })).await.unwrap();
    assert_eq!(echoed, json!({ "text": "bye" }));
    assert_eq!(ctx.trace().len(), 3);

    registry.close().await.unwrap();
}
