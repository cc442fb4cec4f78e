//! Weather lookup tool — stub that returns mock weather data.
//!
//! In production this would call a real geocoding + forecast API. The stub
//! derives plausible conditions from the location name so the agent loop can
//! be exercised end-to-end without network access, and the same location
//! always returns the same report.

use async_trait::async_trait;
use threadline_core::error::ToolError;
use threadline_core::tool::{Tool, ToolResult};

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a location. Returns temperature, conditions, humidity, and wind speed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and optionally country, e.g. 'San Francisco' or 'Paris, France'"
                },
                "units": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature units. Defaults to celsius."
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let location = arguments["location"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;
        let units = arguments["units"].as_str().unwrap_or("celsius");

        let report = mock_report(location, units);
        let output = format!(
            "Weather in {}:\n• Condition: {}\n• Temperature: {}{} (feels like {}{})\n• Humidity: {}%\n• Wind: {} mph {}",
            location,
            report.condition,
            report.temperature,
            report.unit_symbol,
            report.feels_like,
            report.unit_symbol,
            report.humidity,
            report.wind_speed,
            report.wind_direction,
        );

        Ok(ToolResult {
            success: true,
            output,
            data: Some(serde_json::json!({
                "location": location,
                "condition": report.condition,
                "temperature": report.temperature,
                "humidity": report.humidity,
            })),
        })
    }
}

struct Report {
    condition: &'static str,
    temperature: f64,
    feels_like: f64,
    unit_symbol: &'static str,
    humidity: u32,
    wind_speed: u32,
    wind_direction: &'static str,
}

/// Derive a deterministic mock report from the location name.
fn mock_report(location: &str, units: &str) -> Report {
    let hash: u32 = location
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "Clear sky",
        "Partly cloudy",
        "Overcast",
        "Light drizzle",
        "Moderate rain",
        "Thunderstorm",
        "Slight snow",
        "Foggy",
    ];
    let wind_dirs = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

    let temp_c = ((hash % 40) as f64) - 5.0; // -5 to 35°C
    let (temperature, unit_symbol) = if units == "fahrenheit" {
        (temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (temp_c, "°C")
    };

    Report {
        condition: conditions[(hash as usize / 7) % conditions.len()],
        temperature: (temperature * 10.0).round() / 10.0,
        feels_like: ((temperature - 1.5) * 10.0).round() / 10.0,
        unit_symbol,
        humidity: 30 + (hash % 60),
        wind_speed: 5 + (hash % 25),
        wind_direction: wind_dirs[(hash as usize / 3) % wind_dirs.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_report() {
        let tool = WeatherLookupTool;
        let result = tool
            .execute(serde_json::json!({"location": "Tokyo"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Tokyo"));
        assert!(result.output.contains("Temperature"));
        assert!(result.data.is_some());
    }

    #[tokio::test]
    async fn fahrenheit_units() {
        let tool = WeatherLookupTool;
        let result = tool
            .execute(serde_json::json!({"location": "New York", "units": "fahrenheit"}))
            .await
            .unwrap();

        assert!(result.output.contains("°F"));
    }

    #[tokio::test]
    async fn same_location_same_report() {
        let tool = WeatherLookupTool;
        let r1 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();
        let r2 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();

        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn missing_location_is_an_error() {
        let tool = WeatherLookupTool;
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn definition_uses_tool_name() {
        let def = WeatherLookupTool.to_definition();
        assert_eq!(def.name, "get_weather");
    }
}
