use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::truncate_body;

const DEFAULT_BASE_URL: &str = "https://www.mapquestapi.com";

/// A US place returned by the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub city: String,
    pub county: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
pub struct MapQuestClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl MapQuestClient {
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

    /// Free-text geocode, keeping only hits inside the US.
    pub async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>> {
        let url = format!("{}/geocoding/v1/address", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("location", query)])
            .send()
            .await
            .context("Failed to send request to MapQuest (geocoding)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read MapQuest response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "MapQuest geocoding request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: MqResponse =
            serde_json::from_str(&body).context("Failed to parse MapQuest geocoding JSON")?;

        let hits = parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.locations)
            .unwrap_or_default()
            .into_iter()
            .filter(|loc| loc.admin_area1 == "US")
            .map(|loc| GeocodeHit {
                city: loc.admin_area5,
                county: loc.admin_area4,
                state: loc.admin_area3,
                latitude: loc.lat_lng.lat,
                longitude: loc.lat_lng.lng,
            })
            .collect();

        Ok(hits)
    }
}

#[derive(Debug, Deserialize)]
struct MqLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MqLocation {
    #[serde(default)]
    admin_area1: String,
    #[serde(default)]
    admin_area3: String,
    #[serde(default)]
    admin_area4: String,
    #[serde(default)]
    admin_area5: String,
    lat_lng: MqLatLng,
}

#[derive(Debug, Deserialize)]
struct MqResult {
    #[serde(default)]
    locations: Vec<MqLocation>,
}

#[derive(Debug, Deserialize)]
struct MqResponse {
    #[serde(default)]
    results: Vec<MqResult>,
}
