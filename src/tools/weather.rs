//! Current-weather lookup (OpenWeatherMap-compatible API).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::{required_str, single_string_schema, Tool};
use crate::config::ToolsConfig;

/// Fetch current weather for a city.
pub struct WeatherFetcher {
    api_key: Option<String>,
    api_url: String,
}

impl WeatherFetcher {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            api_key: config.weather_api_key.clone(),
            api_url: config.weather_api_url.clone(),
        }
    }
}

#[async_trait]
impl Tool for WeatherFetcher {
    fn name(&self) -> &str {
        "weather_fetcher"
    }

    fn description(&self) -> &str {
        "Fetches the current weather for a specific city. Provide the full city name (e.g., 'New Delhi', 'London', 'Washington D.C.'). Avoid abbreviations (like 'DC') or state/country names as they may not be recognized. Only provide the 'city' parameter."
    }

    fn parameters_schema(&self) -> Value {
        single_string_schema("city", "The city name to fetch weather for (e.g., London).")
    }

    async fn execute(&self, args: Value, _workspace: &Path) -> anyhow::Result<String> {
        let city = required_str(&args, "city")?.trim();
        if city.is_empty() {
            anyhow::bail!("City parameter is required.");
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("WEATHER_API_KEY is not set in the environment. This tool cannot function."))?;

        tracing::info!(city, "Fetching weather");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let response = client
            .get(&self.api_url)
            .query(&[("q", city), ("appid", api_key), ("units", "metric")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Network error connecting to weather service for {}: {}", city, e))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut message = format!("HTTP error fetching weather for {}: {}. Response: {}", city, status, body);
            if status == StatusCode::UNAUTHORIZED {
                message.push_str(" (This often indicates an invalid or missing API key)");
            }
            anyhow::bail!(message);
        }

        let data: Value = serde_json::from_str(&body).map_err(|_| {
            anyhow::anyhow!("Could not parse weather data response for {}. Raw response: {}", city, body)
        })?;

        summarize_weather(&data, city)
    }
}

/// Map an API payload to the short text summary handed back to the model.
pub fn summarize_weather(data: &Value, city: &str) -> anyhow::Result<String> {
    // `cod` is a number on success and sometimes a string on errors.
    let cod = match &data["cod"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    };
    if cod != "200" {
        let message = data["message"].as_str().unwrap_or("Unknown error from API");
        anyhow::bail!("Error fetching weather for {}: {}", city, message);
    }

    let weather = &data["weather"][0];
    let name = data["name"].as_str().unwrap_or(city);

    Ok(format!(
        "Current weather in {}:\n\
         - Condition: {} ({})\n\
         - Temperature: {}°C (Feels like: {}°C)\n\
         - Humidity: {}%\n\
         - Wind Speed: {} m/s",
        name,
        field(&weather["main"]),
        field(&weather["description"]),
        field(&data["main"]["temp"]),
        field(&data["main"]["feels_like"]),
        field(&data["main"]["humidity"]),
        field(&data["wind"]["speed"]),
    ))
}

fn field(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "N/A".to_string(),
    }
}
