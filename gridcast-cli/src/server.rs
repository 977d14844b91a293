//! HTTP surface over the forecast core.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use gridcast_core::{
    Config, Coordinate, ForecastError, ForecastOptions, ForecastService, GridStore, UnitSystem,
    provider::{self, airvisual::AirVisualClient, mapquest::MapQuestClient},
};
use serde::{Deserialize, Deserializer};
use tokio::net::TcpListener;

const USAGE: &str = "\
gridcast

GET /hourly?latitude=&longitude=[&imperial][&cardinal]
    25-hour forecast of temperature, apparent temperature, dewpoint, relative
    humidity, wind direction, wind speed and precipitation chance, keyed by
    hour offset. `imperial` gives degrees F and mph instead of degrees C and
    km/h; `cardinal` gives wind direction as a compass point.
GET /point?latitude=&longitude=
    Forecast grid cell, city, state and time zone for a coordinate.
GET /locations?coords=lat,lon+lat,lon[&imperial]
    Current temperature for each coordinate pair, in order.
GET /cache?query=
    Previously resolved places whose city and state match the query.
GET /aqi?latitude=&longitude=
    US air quality index of the nearest monitored city.
GET /search?query=
    US places matching a free-text query.
";

pub struct AppState {
    service: ForecastService,
    airvisual: Option<AirVisualClient>,
    mapquest: Option<MapQuestClient>,
}

impl AppState {
    pub fn new(
        service: ForecastService,
        airvisual: Option<AirVisualClient>,
        mapquest: Option<MapQuestClient>,
    ) -> Self {
        Self {
            service,
            airvisual,
            mapquest,
        }
    }

    /// Wire the service and passthrough clients from configuration. Passthrough
    /// providers without an API key are left disabled.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let service = service_from_config(config)?;
        let http = provider::http_client(config).context("Failed to build HTTP client")?;

        let airvisual = provider::airvisual_from_config(config, http.clone())
            .inspect_err(|e| tracing::info!(reason = %e, "air quality endpoint disabled"))
            .ok();
        let mapquest = provider::mapquest_from_config(config, http)
            .inspect_err(|e| tracing::info!(reason = %e, "geocoding endpoint disabled"))
            .ok();

        Ok(Self::new(service, airvisual, mapquest))
    }
}

pub fn service_from_config(config: &Config) -> anyhow::Result<ForecastService> {
    let db_path = config.database_file_path()?;
    let store = GridStore::open(&db_path)
        .with_context(|| format!("Failed to open grid database: {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "opened grid database");

    let http = provider::http_client(config).context("Failed to build HTTP client")?;
    let nws = Arc::new(provider::nws_from_config(config, http));
    Ok(ForecastService::new(Arc::new(store), nws.clone(), nws))
}

pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/hourly", get(hourly))
        .route("/point", get(point))
        .route("/locations", get(locations))
        .route("/cache", get(cache))
        .route("/aqi", get(aqi))
        .route("/search", get(search))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, bind: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let local = listener.local_addr()?;

    tracing::info!(%local, "HTTP server listening");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[derive(Debug)]
pub enum ApiError {
    Forecast(ForecastError),
    BadRequest(String),
    Unavailable(String),
    Upstream(anyhow::Error),
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        Self::Forecast(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Forecast(err) => {
                let status = match err {
                    ForecastError::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
                    ForecastError::UpstreamResolutionFailure(_)
                    | ForecastError::IncompleteSeries { .. }
                    | ForecastError::MalformedObservation { .. } => StatusCode::BAD_GATEWAY,
                    ForecastError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Upstream(err) => (StatusCode::BAD_GATEWAY, format!("{err:#}")),
        };

        if status.is_server_error() {
            tracing::warn!(%status, error = %message, "request failed");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Presence flag: absent is false, a bare `?flag` is true, and explicit
/// boolean spellings are honoured.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("" | "true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(other) => Err(serde::de::Error::custom(format!("invalid flag value {other:?}"))),
    }
}

#[derive(Debug, Deserialize)]
struct CoordinateQuery {
    latitude: Option<String>,
    longitude: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    imperial: bool,
    #[serde(default, deserialize_with = "flag")]
    cardinal: bool,
}

impl CoordinateQuery {
    fn coordinate(&self) -> Result<Coordinate, ForecastError> {
        match (&self.latitude, &self.longitude) {
            (Some(lat), Some(lon)) => Coordinate::parse(lat, lon),
            (lat, lon) => Err(ForecastError::invalid_coordinate(
                format!(
                    "{},{}",
                    lat.as_deref().unwrap_or_default(),
                    lon.as_deref().unwrap_or_default()
                ),
                "latitude and longitude are both required",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LocationsQuery {
    coords: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    imperial: bool,
}

#[derive(Debug, Deserialize)]
struct TextQuery {
    query: Option<String>,
}

impl TextQuery {
    fn required(&self) -> Result<&str, ApiError> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::BadRequest("query parameter is required".into()))
    }
}

async fn index() -> &'static str {
    USAGE
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn hourly(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CoordinateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let coordinate = q.coordinate()?;
    let options = ForecastOptions::from_flags(q.imperial, q.cardinal);
    let table = state.service.hourly(coordinate, options).await?;
    Ok(Json(table))
}

async fn point(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CoordinateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state.service.point(q.coordinate()?).await?;
    Ok(Json(identity))
}

async fn locations(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LocationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = q
        .coords
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("coords parameter is required".into()))?;
    let pairs: Vec<&str> = raw.split_whitespace().collect();
    if pairs.is_empty() {
        return Err(ApiError::BadRequest("coords parameter is empty".into()));
    }

    let units = if q.imperial { UnitSystem::Imperial } else { UnitSystem::Metric };
    let temperatures = state.service.current_temperatures(&pairs, units).await?;

    let body: BTreeMap<usize, f64> = temperatures.into_iter().enumerate().collect();
    Ok(Json(body))
}

async fn cache(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TextQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let places = state.service.store().search(q.required()?)?;
    let body: BTreeMap<_, _> = places.into_iter().enumerate().collect();
    Ok(Json(body))
}

async fn aqi(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CoordinateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .airvisual
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("air quality provider is not configured".into()))?;

    let coordinate = q.coordinate()?;
    let reading = client
        .nearest_aqi(coordinate)
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(reading))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TextQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .mapquest
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("geocoding provider is not configured".into()))?;

    let hits = client.search(q.required()?).await.map_err(ApiError::Upstream)?;
    let body: BTreeMap<_, _> = hits.into_iter().enumerate().collect();
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use chrono::{Duration, Utc};
    use gridcast_core::{
        GridIdentity, GridSeries, GridSeriesProvider, Parameter, PointResolver, RawObservation,
        model::PointMetadata,
    };
    use tower::ServiceExt;

    #[derive(Debug)]
    struct FakeNws;

    #[async_trait]
    impl PointResolver for FakeNws {
        async fn resolve_point(
            &self,
            _coordinate: Coordinate,
        ) -> Result<PointMetadata, ForecastError> {
            Ok(PointMetadata {
                grid_x: 32,
                grid_y: 34,
                grid_id: "OKX".into(),
                city: "New York".into(),
                state: "NY".into(),
                time_zone: "America/New_York".into(),
            })
        }
    }

    #[async_trait]
    impl GridSeriesProvider for FakeNws {
        async fn fetch_series(&self, _grid: &GridIdentity) -> Result<GridSeries, ForecastError> {
            let start = Utc::now() - Duration::minutes(10);
            let layer = |value: f64| {
                vec![RawObservation::new(format!("{}/PT30H", start.to_rfc3339()), Some(value))]
            };
            Ok(GridSeries::new()
                .with(Parameter::Temperature, layer(20.0))
                .with(Parameter::Dewpoint, layer(10.0))
                .with(Parameter::RelativeHumidity, layer(50.0))
                .with(Parameter::ApparentTemperature, layer(19.6))
                .with(Parameter::WindDirection, layer(90.0))
                .with(Parameter::WindSpeed, layer(16.09))
                .with(Parameter::ProbabilityOfPrecipitation, layer(5.0)))
        }
    }

    fn app() -> Router {
        let store = Arc::new(GridStore::in_memory().unwrap());
        let nws = Arc::new(FakeNws);
        let service = ForecastService::new(store, nws.clone(), nws);
        build_app(Arc::new(AppState::new(service, None, None)))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn hourly_returns_25_keyed_rows() {
        let app = app();
        let (status, body) = get_json(&app, "/hourly?latitude=40.7128&longitude=-74.006").await;

        assert_eq!(status, StatusCode::OK);
        let rows = body.as_object().unwrap();
        assert_eq!(rows.len(), 25);
        assert_eq!(body["0"]["temperature"], 20.0);
        assert_eq!(body["24"]["windDirection"], 90.0);
        assert_eq!(body["0"]["windSpeed"], 16.09);
    }

    #[tokio::test]
    async fn hourly_flags_switch_units_and_direction() {
        let app = app();
        let (status, body) =
            get_json(&app, "/hourly?latitude=40.71&longitude=-74&imperial&cardinal").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["0"]["temperature"], 68.0);
        assert_eq!(body["0"]["windDirection"], "E");
        assert!((body["0"]["windSpeed"].as_f64().unwrap() - 10.0).abs() < 1e-9);

        let (_, body) =
            get_json(&app, "/hourly?latitude=40.71&longitude=-74&imperial=false").await;
        assert_eq!(body["0"]["temperature"], 20.0);
    }

    #[tokio::test]
    async fn invalid_coordinate_is_bad_request() {
        let app = app();

        let (status, body) = get_json(&app, "/hourly?latitude=north&longitude=-74").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid coordinate"));

        let (status, _) = get_json(&app, "/point?latitude=40.71").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn point_then_cache_search() {
        let app = app();

        let (status, body) = get_json(&app, "/point?latitude=40.71&longitude=-74").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coords"], "40.71,-74.00");
        assert_eq!(body["gridId"], "OKX");

        let (status, body) = get_json(&app, "/cache?query=new+york").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["0"]["city"], "New York");
        assert_eq!(body["0"]["coords"], "40.71,-74.00");

        let (status, _) = get_json(&app, "/cache").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn locations_keeps_input_order() {
        let app = app();

        let (status, body) =
            get_json(&app, "/locations?coords=40.71,-74.00+41.88,-87.63&imperial").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["0"], 68.0);
        assert_eq!(body["1"], 68.0);

        let (status, body) = get_json(&app, "/locations?coords=40.71,-74.00+oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("position 1"));
    }

    #[tokio::test]
    async fn unconfigured_passthroughs_are_unavailable() {
        let app = app();

        let (status, _) = get_json(&app, "/aqi?latitude=40.71&longitude=-74").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = get_json(&app, "/search?query=Boston").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn index_and_health() {
        let app = app();
        let res = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let (status, _) = get_json(&app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
    }
}
