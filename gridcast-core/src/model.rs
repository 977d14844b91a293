use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};

use crate::{error::ForecastError, units};

/// Number of rows in a normalized table: the current hour plus the next 24.
pub const HOURS: usize = 25;

/// A latitude/longitude pair, rounded to two decimal places on construction.
///
/// Rounding is the spatial granularity of the service: raw inputs that round to
/// the same pair are the same location and share one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ForecastError> {
        let input = || format!("{latitude},{longitude}");

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ForecastError::invalid_coordinate(
                input(),
                "latitude must be a number between -90 and 90",
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ForecastError::invalid_coordinate(
                input(),
                "longitude must be a number between -180 and 180",
            ));
        }

        Ok(Self {
            latitude: round2(latitude),
            longitude: round2(longitude),
        })
    }

    /// Parse the two axes from their textual form, e.g. query parameters.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, ForecastError> {
        let input = || format!("{latitude},{longitude}");

        let lat = latitude.trim().parse::<f64>().map_err(|_| {
            ForecastError::invalid_coordinate(input(), "latitude is not a number")
        })?;
        let lon = longitude.trim().parse::<f64>().map_err(|_| {
            ForecastError::invalid_coordinate(input(), "longitude is not a number")
        })?;

        Self::new(lat, lon)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Cache key, e.g. `"40.71,-74.00"`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2},{:.2}", self.latitude, self.longitude)
    }
}

impl FromStr for Coordinate {
    type Err = ForecastError;

    /// Parse a `"lat,lon"` pair.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| ForecastError::invalid_coordinate(s, "expected \"latitude,longitude\""))?;

        if lon.contains(',') {
            return Err(ForecastError::invalid_coordinate(s, "too many axes"));
        }

        Self::parse(lat, lon)
    }
}

fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Collapse -0.0 so "-0.00" never becomes a distinct key.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Provider-assigned forecast grid cell for a rounded coordinate, plus descriptive
/// metadata. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridIdentity {
    #[serde(rename = "coords")]
    pub key: String,
    pub grid_x: i64,
    pub grid_y: i64,
    pub grid_id: String,
    pub city: String,
    pub state: String,
    pub time_zone: String,
}

/// Point-resolution result before it is bound to a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointMetadata {
    pub grid_x: i64,
    pub grid_y: i64,
    pub grid_id: String,
    pub city: String,
    pub state: String,
    pub time_zone: String,
}

impl PointMetadata {
    pub fn into_identity(self, key: String) -> GridIdentity {
        GridIdentity {
            key,
            grid_x: self.grid_x,
            grid_y: self.grid_y,
            grid_id: self.grid_id,
            city: self.city,
            state: self.state,
            time_zone: self.time_zone,
        }
    }
}

/// Weather parameters carried by the gridded series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parameter {
    Temperature,
    Dewpoint,
    RelativeHumidity,
    ApparentTemperature,
    WindDirection,
    WindSpeed,
    ProbabilityOfPrecipitation,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::Temperature,
        Parameter::Dewpoint,
        Parameter::RelativeHumidity,
        Parameter::ApparentTemperature,
        Parameter::WindDirection,
        Parameter::WindSpeed,
        Parameter::ProbabilityOfPrecipitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Dewpoint => "dewpoint",
            Parameter::RelativeHumidity => "relativeHumidity",
            Parameter::ApparentTemperature => "apparentTemperature",
            Parameter::WindDirection => "windDirection",
            Parameter::WindSpeed => "windSpeed",
            Parameter::ProbabilityOfPrecipitation => "probabilityOfPrecipitation",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Celsius, km/h.
    #[default]
    Metric,
    /// Fahrenheit, mph.
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindDirectionMode {
    /// Degrees out of 360, as provided.
    #[default]
    Degrees,
    /// Nearest of the eight compass points.
    Cardinal,
}

/// Output representation for a normalized table. Defaults to metric units and
/// numeric wind direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForecastOptions {
    pub units: UnitSystem,
    pub wind_direction: WindDirectionMode,
}

impl ForecastOptions {
    pub fn from_flags(imperial: bool, cardinal: bool) -> Self {
        Self {
            units: if imperial { UnitSystem::Imperial } else { UnitSystem::Metric },
            wind_direction: if cardinal {
                WindDirectionMode::Cardinal
            } else {
                WindDirectionMode::Degrees
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinal {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl fmt::Display for Cardinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Cardinal::N => "N",
            Cardinal::NE => "NE",
            Cardinal::E => "E",
            Cardinal::SE => "SE",
            Cardinal::S => "S",
            Cardinal::SW => "SW",
            Cardinal::W => "W",
            Cardinal::NW => "NW",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindDirection {
    Degrees(f64),
    Cardinal(Cardinal),
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindDirection::Degrees(d) => write!(f, "{d}"),
            WindDirection::Cardinal(c) => write!(f, "{c}"),
        }
    }
}

/// One hour of the normalized table. Fields stay `None` until the pass for
/// that parameter writes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dewpoint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparent_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<WindDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_of_precipitation: Option<f64>,
}

impl HourlyRow {
    /// Write the converted form of a raw upstream value into this row.
    pub fn fill(&mut self, parameter: Parameter, raw: f64, options: ForecastOptions) {
        match parameter {
            Parameter::Temperature => {
                self.temperature = Some(units::temperature(raw, options.units))
            }
            Parameter::Dewpoint => self.dewpoint = Some(units::temperature(raw, options.units)),
            Parameter::ApparentTemperature => {
                self.apparent_temperature = Some(units::temperature(raw, options.units))
            }
            Parameter::RelativeHumidity => self.relative_humidity = Some(raw),
            Parameter::WindDirection => {
                self.wind_direction = Some(units::wind_direction(raw, options.wind_direction))
            }
            Parameter::WindSpeed => self.wind_speed = Some(units::wind_speed(raw, options.units)),
            Parameter::ProbabilityOfPrecipitation => self.probability_of_precipitation = Some(raw),
        }
    }

    pub fn has(&self, parameter: Parameter) -> bool {
        match parameter {
            Parameter::Temperature => self.temperature.is_some(),
            Parameter::Dewpoint => self.dewpoint.is_some(),
            Parameter::RelativeHumidity => self.relative_humidity.is_some(),
            Parameter::ApparentTemperature => self.apparent_temperature.is_some(),
            Parameter::WindDirection => self.wind_direction.is_some(),
            Parameter::WindSpeed => self.wind_speed.is_some(),
            Parameter::ProbabilityOfPrecipitation => self.probability_of_precipitation.is_some(),
        }
    }
}

/// The 25-row hourly table. Serializes as an object keyed by hour offset.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyTable {
    rows: Vec<HourlyRow>,
}

impl HourlyTable {
    pub(crate) fn new(rows: Vec<HourlyRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[HourlyRow] {
        &self.rows
    }

    pub fn row(&self, hour: usize) -> Option<&HourlyRow> {
        self.rows.get(hour)
    }
}

impl Serialize for HourlyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.rows.iter().enumerate())
    }
}
