//! `get_weather`: daily summary from the OpenWeather geocoding and One Call APIs

use std::collections::HashMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{setting, NativeServices, GET_WEATHER};
use crate::error::{BridgeError, BridgeResult};
use crate::tools::handler::{ToolHandler, TypedTool};
use crate::types::{CallContext, SchemaNode, ToolDescriptor, ToolKind};

pub(super) const DESCRIPTION: &str = "Get weather information when you need it";

const API_KEY: &str = "OPENWEATHER_API_KEY";
const GEO_URL: &str = "OPENWEATHER_GEO_URL";
const BASE_URL: &str = "OPENWEATHER_BASE_URL";
const DEFAULT_GEO_URL: &str = "http://api.openweathermap.org/geo/1.0/direct";
const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/3.0/onecall/day_summary";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WeatherRequest {
    /// Location to get the weather for
    pub location: String,
    /// Date to get the weather for in YYYY-MM-DD format
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WeatherSummary {
    #[serde(default)]
    pub humidity: Humidity,
    #[serde(default)]
    pub temperature: Temperature,
    #[serde(default)]
    pub wind: Wind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Humidity {
    #[serde(default)]
    pub afternoon: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Temperature {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub afternoon: f64,
    #[serde(default)]
    pub night: f64,
    #[serde(default)]
    pub evening: f64,
    #[serde(default)]
    pub morning: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Wind {
    #[serde(default)]
    pub max: WindMax,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WindMax {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub direction: f64,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    cod: Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    parameters: Vec<String>,
}

struct WeatherClient {
    http: reqwest::Client,
    api_key: String,
    geo_url: String,
    base_url: String,
}

fn failure(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::handler(GET_WEATHER, message)
}

impl WeatherClient {
    async fn coordinates(&self, city: &str) -> BridgeResult<(f64, f64)> {
        let response = self
            .http
            .get(&self.geo_url)
            .query(&[("q", city), ("limit", "1"), ("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| failure(format!("failed to convert coordinates: {}", e)))?;

        if !response.status().is_success() {
            return Err(failure(format!(
                "failed to convert coordinates: geocoding API call failed: {}",
                response.status()
            )));
        }

        let places: Vec<GeoLocation> = response
            .json()
            .await
            .map_err(|e| failure(format!("failed to convert coordinates: {}", e)))?;
        places
            .first()
            .map(|p| (p.lat, p.lon))
            .ok_or_else(|| failure(format!("failed to convert coordinates: city not found: {}", city)))
    }

    async fn day_summary(&self, date: &str, lat: f64, lon: f64) -> BridgeResult<WeatherSummary> {
        let lat = format!("{:.6}", lat);
        let lon = format!("{:.6}", lon);
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("date", date),
                ("appid", self.api_key.as_str()),
                ("unit", "metric"),
                ("lang", "en"),
            ])
            .send()
            .await
            .map_err(|e| failure(format!("error occurred while fetching weather information: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(err) => format!(
                    "API call failed: HTTP {}, message: {}, parameters: {:?}",
                    err.cod, err.message, err.parameters
                ),
                Err(_) => format!("API call failed: HTTP {} (response decode failed)", status.as_u16()),
            };
            return Err(failure(format!(
                "error occurred while fetching weather information: {}",
                message
            )));
        }

        response
            .json()
            .await
            .map_err(|e| failure(format!("error occurred while fetching weather information: {}", e)))
    }
}

pub(super) fn build(
    description: &str,
    env: &HashMap<String, Value>,
    services: &NativeServices,
) -> BridgeResult<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    let api_key = setting(env, API_KEY)
        .ok_or_else(|| BridgeError::configuration(format!("{} requires {}", GET_WEATHER, API_KEY)))?;
    let client = Arc::new(WeatherClient {
        http: services.http.clone(),
        api_key,
        geo_url: setting(env, GEO_URL).unwrap_or_else(|| DEFAULT_GEO_URL.to_string()),
        base_url: setting(env, BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    });
    let logger = services.logger.clone();

    let descriptor = ToolDescriptor::new(
        GET_WEATHER,
        description,
        SchemaNode::for_type::<WeatherRequest>()?,
        ToolKind::Native,
    );
    let handler = TypedTool::new(GET_WEATHER, move |ctx: CallContext, mut req: WeatherRequest| {
        let client = client.clone();
        let logger = logger.clone();
        async move {
            // The geocoder does not know the convention centre by name
            if req.location.contains("HKCEC") {
                req.location = "HK".to_string();
            }
            logger.debug(&format!(
                "[NativeTools] get_weather location={} date={}",
                req.location, req.date
            ));

            let (lat, lon) = ctx.cancellable(client.coordinates(&req.location)).await?;
            ctx.cancellable(client.day_summary(&req.date, lat, lon)).await
        }
    });
    Ok((descriptor, Arc::new(handler)))
}
