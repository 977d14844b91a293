//! Request-level composition: grid identity lookup, series fetch and
//! normalization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    cache::GridIdentityCache,
    error::ForecastError,
    model::{Coordinate, ForecastOptions, GridIdentity, HourlyTable, Parameter, UnitSystem},
    normalize::{current_value, normalize},
    provider::{GridSeriesProvider, PointResolver},
    store::GridStore,
    units,
};

#[derive(Debug)]
pub struct ForecastService {
    cache: GridIdentityCache,
    series: Arc<dyn GridSeriesProvider>,
}

impl ForecastService {
    pub fn new(
        store: Arc<GridStore>,
        resolver: Arc<dyn PointResolver>,
        series: Arc<dyn GridSeriesProvider>,
    ) -> Self {
        Self {
            cache: GridIdentityCache::new(store, resolver),
            series,
        }
    }

    pub fn store(&self) -> &Arc<GridStore> {
        self.cache.store()
    }

    /// Grid identity and place metadata for a coordinate.
    pub async fn point(&self, coordinate: Coordinate) -> Result<GridIdentity, ForecastError> {
        self.cache.resolve(coordinate).await
    }

    /// 25-hour table of all seven parameters starting at the current hour.
    pub async fn hourly(
        &self,
        coordinate: Coordinate,
        options: ForecastOptions,
    ) -> Result<HourlyTable, ForecastError> {
        self.hourly_at(coordinate, &Parameter::ALL, options, Utc::now()).await
    }

    pub async fn hourly_at(
        &self,
        coordinate: Coordinate,
        parameters: &[Parameter],
        options: ForecastOptions,
        now: DateTime<Utc>,
    ) -> Result<HourlyTable, ForecastError> {
        let grid = self.cache.resolve(coordinate).await?;
        let series = self.series.fetch_series(&grid).await?;
        normalize(&series, parameters, options, now)
    }

    /// Hour-0 temperature for each coordinate, in input order.
    ///
    /// Every coordinate is validated before any lookup, so one bad entry fails
    /// the batch without partial work. Repeated coordinates are fetched again.
    pub async fn current_temperatures(
        &self,
        coordinates: &[&str],
        unit_system: UnitSystem,
    ) -> Result<Vec<f64>, ForecastError> {
        self.current_temperatures_at(coordinates, unit_system, Utc::now()).await
    }

    pub async fn current_temperatures_at(
        &self,
        coordinates: &[&str],
        unit_system: UnitSystem,
        now: DateTime<Utc>,
    ) -> Result<Vec<f64>, ForecastError> {
        let parsed = coordinates
            .iter()
            .enumerate()
            .map(|(i, raw)| raw.parse::<Coordinate>().map_err(|e| e.at(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut temperatures = Vec::with_capacity(parsed.len());
        for coordinate in parsed {
            let grid = self.cache.resolve(coordinate).await?;
            let series = self.series.fetch_series(&grid).await?;
            let celsius = current_value(&series, Parameter::Temperature, now)?;
            debug!(key = %grid.key, celsius, "current temperature");
            temperatures.push(celsius);
        }

        if unit_system == UnitSystem::Imperial {
            for t in &mut temperatures {
                *t = units::celsius_to_fahrenheit(*t);
            }
        }

        Ok(temperatures)
    }
}
