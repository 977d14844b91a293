//! Core library for `gridcast`.
//!
//! This crate defines:
//! - The grid identity cache: rounded coordinate → forecast grid cell, memoized
//!   in SQLite
//! - The hourly series normalizer: run-length-encoded upstream series → a dense,
//!   unit-converted 25-hour table
//! - Upstream provider clients and configuration
//!
//! It is used by `gridcast-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod forecast;
pub mod model;
pub mod normalize;
pub mod observation;
pub mod provider;
pub mod store;
pub mod units;

pub use cache::GridIdentityCache;
pub use config::{Config, ProviderConfig};
pub use error::ForecastError;
pub use forecast::ForecastService;
pub use model::{
    Cardinal, Coordinate, ForecastOptions, GridIdentity, HOURS, HourlyRow, HourlyTable, Parameter,
    UnitSystem, WindDirection, WindDirectionMode,
};
pub use normalize::normalize;
pub use observation::{GridSeries, RawObservation};
pub use provider::{GridSeriesProvider, PointResolver, ProviderId};
pub use store::{CachedPlace, GridStore};
