use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::model::Coordinate;

use super::truncate_body;

const DEFAULT_BASE_URL: &str = "https://api.airvisual.com";

/// Air quality for the monitoring city nearest a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub location: String,
    /// US EPA air quality index.
    pub aqi: i64,
}

#[derive(Debug, Clone)]
pub struct AirVisualClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl AirVisualClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self::with_base_url(http, api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(http: Client, api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn nearest_aqi(&self, coordinate: Coordinate) -> Result<AirQuality> {
        let url = format!("{}/v2/nearest_city", self.base_url);
        let lat = format!("{:.2}", coordinate.latitude());
        let lon = format!("{:.2}", coordinate.longitude());

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to AirVisual (nearest city)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read AirVisual response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "AirVisual request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: AvResponse =
            serde_json::from_str(&body).context("Failed to parse AirVisual JSON")?;

        Ok(AirQuality {
            location: coordinate.key(),
            aqi: parsed.data.current.pollution.aqius,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AvPollution {
    aqius: i64,
}

#[derive(Debug, Deserialize)]
struct AvCurrent {
    pollution: AvPollution,
}

#[derive(Debug, Deserialize)]
struct AvData {
    current: AvCurrent,
}

#[derive(Debug, Deserialize)]
struct AvResponse {
    data: AvData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_us_aqi() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v2/nearest_city"))
            .and(query_param("lat", "40.71"))
            .and(query_param("lon", "-74.00"))
            .and(query_param("key", "KEY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"city": "New York", "current": {"pollution": {"aqius": 42, "mainus": "p2"}}}
            })))
            .mount(&mock_server)
            .await;

        let client = AirVisualClient::with_base_url(Client::new(), "KEY".into(), mock_server.uri());
        let aq = client
            .nearest_aqi(Coordinate::new(40.7128, -74.0).unwrap())
            .await
            .unwrap();

        assert_eq!(aq, AirQuality { location: "40.71,-74.00".into(), aqi: 42 });
    }

    #[tokio::test]
    async fn rejected_key_surfaces_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("incorrect_api_key"))
            .mount(&mock_server)
            .await;

        let client = AirVisualClient::with_base_url(Client::new(), "BAD".into(), mock_server.uri());
        let err = client
            .nearest_aqi(Coordinate::new(40.71, -74.0).unwrap())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("401"));
    }
}
