use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    error::ForecastError,
    model::{Coordinate, GridIdentity, Parameter, PointMetadata},
    observation::{GridSeries, RawObservation},
};

use super::{GridSeriesProvider, PointResolver, truncate_body};

/// Client for the api.weather.gov `points` and `gridpoints` endpoints.
#[derive(Debug, Clone)]
pub struct NwsClient {
    http: Client,
    base_url: String,
}

impl NwsClient {
    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, ForecastError> {
        debug!(%url, "requesting {what}");

        let res = self
            .http
            .get(url)
            .header("Accept", "application/geo+json")
            .send()
            .await
            .map_err(|e| ForecastError::upstream(&format!("Failed to send {what} request"), e))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| ForecastError::upstream(&format!("Failed to read {what} response body"), e))?;

        if !status.is_success() {
            return Err(ForecastError::UpstreamResolutionFailure(format!(
                "{what} request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ForecastError::upstream(&format!("Failed to parse {what} JSON"), e))
    }
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    properties: PointProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointProperties {
    grid_id: String,
    grid_x: i64,
    grid_y: i64,
    relative_location: RelativeLocation,
    time_zone: String,
}

#[derive(Debug, Deserialize)]
struct RelativeLocation {
    properties: RelativeLocationProperties,
}

#[derive(Debug, Deserialize)]
struct RelativeLocationProperties {
    city: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct GridpointResponse {
    properties: GridpointProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridpointProperties {
    temperature: Option<GridpointLayer>,
    dewpoint: Option<GridpointLayer>,
    relative_humidity: Option<GridpointLayer>,
    apparent_temperature: Option<GridpointLayer>,
    wind_direction: Option<GridpointLayer>,
    wind_speed: Option<GridpointLayer>,
    probability_of_precipitation: Option<GridpointLayer>,
}

#[derive(Debug, Deserialize)]
struct GridpointLayer {
    #[serde(default)]
    values: Vec<RawObservation>,
}

impl GridpointProperties {
    fn into_series(self) -> GridSeries {
        let layers = [
            (Parameter::Temperature, self.temperature),
            (Parameter::Dewpoint, self.dewpoint),
            (Parameter::RelativeHumidity, self.relative_humidity),
            (Parameter::ApparentTemperature, self.apparent_temperature),
            (Parameter::WindDirection, self.wind_direction),
            (Parameter::WindSpeed, self.wind_speed),
            (Parameter::ProbabilityOfPrecipitation, self.probability_of_precipitation),
        ];

        let mut series = GridSeries::new();
        for (parameter, layer) in layers
            .into_iter()
            .filter_map(|(p, layer)| layer.map(|l| (p, l)))
        {
            series.insert(parameter, layer.values);
        }
        series
    }
}

#[async_trait]
impl PointResolver for NwsClient {
    async fn resolve_point(&self, coordinate: Coordinate) -> Result<PointMetadata, ForecastError> {
        let url = format!("{}/points/{}", self.base_url, coordinate);
        let parsed: PointResponse = self.get_json(&url, "point").await?;
        let props = parsed.properties;

        Ok(PointMetadata {
            grid_x: props.grid_x,
            grid_y: props.grid_y,
            grid_id: props.grid_id,
            city: props.relative_location.properties.city,
            state: props.relative_location.properties.state,
            time_zone: props.time_zone,
        })
    }
}

#[async_trait]
impl GridSeriesProvider for NwsClient {
    async fn fetch_series(&self, grid: &GridIdentity) -> Result<GridSeries, ForecastError> {
        let url = format!(
            "{}/gridpoints/{}/{},{}",
            self.base_url, grid.grid_id, grid.grid_x, grid.grid_y
        );
        let parsed: GridpointResponse = self.get_json(&url, "gridpoint").await?;
        Ok(parsed.properties.into_series())
    }
}
