use crate::{
    Config,
    error::ForecastError,
    model::{Coordinate, GridIdentity, PointMetadata},
    observation::GridSeries,
    provider::{airvisual::AirVisualClient, mapquest::MapQuestClient, nws::NwsClient},
};
use async_trait::async_trait;
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug};

pub mod airvisual;
pub mod mapquest;
pub mod nws;

/// Resolves a rounded coordinate to the forecast grid cell covering it.
#[async_trait]
pub trait PointResolver: Send + Sync + Debug {
    async fn resolve_point(&self, coordinate: Coordinate) -> Result<PointMetadata, ForecastError>;
}

/// Fetches the raw per-parameter observation series for a grid cell.
#[async_trait]
pub trait GridSeriesProvider: Send + Sync + Debug {
    async fn fetch_series(&self, grid: &GridIdentity) -> Result<GridSeries, ForecastError>;
}

/// Keyed passthrough providers (air quality, geocoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    AirVisual,
    MapQuest,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::AirVisual => "airvisual",
            ProviderId::MapQuest => "mapquest",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::AirVisual, ProviderId::MapQuest]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "airvisual" | "aqi" => Ok(ProviderId::AirVisual),
            "mapquest" | "geocode" => Ok(ProviderId::MapQuest),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: airvisual, mapquest."
            )),
        }
    }
}

/// Shared HTTP client with the configured timeout and User-Agent.
pub fn http_client(config: &Config) -> anyhow::Result<Client> {
    let client = Client::builder()
        .timeout(config.upstream_timeout())
        .user_agent(config.user_agent())
        .build()?;
    Ok(client)
}

pub fn nws_from_config(config: &Config, http: Client) -> NwsClient {
    NwsClient::with_base_url(http, config.nws_base_url())
}

fn api_key_for(id: ProviderId, config: &Config) -> anyhow::Result<String> {
    config
        .provider_api_key(id)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured for provider '{id}'.\n\
                 Hint: run `gridcast configure {id}` and enter your API key."
            )
        })
}

fn base_url_for(id: ProviderId, config: &Config) -> Option<String> {
    config.provider_config(id).and_then(|p| p.base_url.clone())
}

pub fn airvisual_from_config(config: &Config, http: Client) -> anyhow::Result<AirVisualClient> {
    let api_key = api_key_for(ProviderId::AirVisual, config)?;
    let client = match base_url_for(ProviderId::AirVisual, config) {
        Some(url) => AirVisualClient::with_base_url(http, api_key, url),
        None => AirVisualClient::new(http, api_key),
    };
    Ok(client)
}

pub fn mapquest_from_config(config: &Config, http: Client) -> anyhow::Result<MapQuestClient> {
    let api_key = api_key_for(ProviderId::MapQuest, config)?;
    let client = match base_url_for(ProviderId::MapQuest, config) {
        Some(url) => MapQuestClient::with_base_url(http, api_key, url),
        None => MapQuestClient::new(http, api_key),
    };
    Ok(client)
}

/// Cap an upstream body for inclusion in error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
