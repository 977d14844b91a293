use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Local, Timelike};
use clap::{Parser, Subcommand};
use gridcast_core::{
    Config, Coordinate, ForecastOptions, GridIdentity, HourlyRow, HourlyTable, ProviderId,
    UnitSystem, WindDirection,
};
use inquire::{Password, PasswordDisplayMode};

use crate::server::{self, AppState};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "gridcast", version, about = "Hourly gridded forecasts for US coordinates")]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service.
    Serve {
        /// Listen address; overrides `[server] bind` from the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the 25-hour forecast for a coordinate.
    Hourly {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Fahrenheit and mph instead of Celsius and km/h.
        #[arg(long)]
        imperial: bool,

        /// Wind direction as a compass point.
        #[arg(long)]
        cardinal: bool,

        /// Print the table as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the forecast grid cell for a coordinate.
    Point {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Current temperature for each "lat,lon" pair, in order.
    Temps {
        #[arg(required = true, allow_hyphen_values = true)]
        coords: Vec<String>,

        #[arg(long)]
        imperial: bool,
    },

    /// Configure credentials for a passthrough provider.
    Configure {
        /// Provider short name: "airvisual" or "mapquest".
        provider: String,
    },

    /// Search previously resolved places by city or state.
    Search { query: String },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { bind } => {
                let config = Config::load()?;
                let bind = bind.unwrap_or_else(|| config.bind_address());
                let state = Arc::new(AppState::from_config(&config)?);
                server::serve(state, &bind).await?;
            }
            Command::Hourly {
                lat,
                lon,
                imperial,
                cardinal,
                json,
            } => {
                let config = Config::load()?;
                let service = server::service_from_config(&config)?;
                let coordinate = Coordinate::new(lat, lon)?;
                let options = ForecastOptions::from_flags(imperial, cardinal);

                let grid = service.point(coordinate).await?;
                let table = service.hourly(coordinate, options).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&table)?);
                } else {
                    print_hourly(&grid, &table, options);
                }
            }
            Command::Point { lat, lon } => {
                let config = Config::load()?;
                let service = server::service_from_config(&config)?;
                let grid = service.point(Coordinate::new(lat, lon)?).await?;

                println!("{}, {} ({})", grid.city, grid.state, grid.key);
                println!("  grid:      {} {},{}", grid.grid_id, grid.grid_x, grid.grid_y);
                println!("  time zone: {}", grid.time_zone);
            }
            Command::Temps { coords, imperial } => {
                let config = Config::load()?;
                let service = server::service_from_config(&config)?;
                let units = if imperial { UnitSystem::Imperial } else { UnitSystem::Metric };

                let pairs: Vec<&str> = coords.iter().map(String::as_str).collect();
                let temperatures = service.current_temperatures(&pairs, units).await?;

                for (pair, t) in pairs.iter().zip(temperatures) {
                    println!("{pair:<20} {t:>6.1}{}", temperature_unit(units));
                }
            }
            Command::Configure { provider } => configure(&provider)?,
            Command::Search { query } => {
                let config = Config::load()?;
                let service = server::service_from_config(&config)?;
                let places = service.store().search(&query)?;

                if places.is_empty() {
                    println!("No cached places match {query:?}.");
                }
                for place in places {
                    println!("{:<24} {:<4} {}", place.city, place.state, place.coords);
                }
            }
        }

        Ok(())
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if config.is_provider_configured(id) {
        println!("Provider '{id}' already has an API key; it will be replaced.");
    }

    let api_key = Password::new(&format!("API key for {id}:"))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key);
    config.save()?;

    println!("Saved API key for '{id}' to {}", Config::config_file_path()?.display());
    Ok(())
}

fn temperature_unit(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Metric => "°C",
        UnitSystem::Imperial => "°F",
    }
}

fn speed_unit(units: UnitSystem) -> &'static str {
    match units {
        UnitSystem::Metric => "km/h",
        UnitSystem::Imperial => "mph",
    }
}

fn print_hourly(grid: &GridIdentity, table: &HourlyTable, options: ForecastOptions) {
    let t_unit = temperature_unit(options.units);
    let start = Local::now();
    let start = start.with_minute(0).and_then(|t| t.with_second(0)).unwrap_or(start);

    println!("{}, {} ({}, grid {})", grid.city, grid.state, grid.key, grid.grid_id);
    println!(
        "{:<11} {:>7} {:>7} {:>7} {:>5} {:>6} {:>9} {:>5}",
        "hour",
        format!("temp{t_unit}"),
        format!("feel{t_unit}"),
        format!("dew{t_unit}"),
        "rh%",
        "wind",
        speed_unit(options.units),
        "pop%",
    );

    for (hour, row) in table.rows().iter().enumerate() {
        let at = start + Duration::hours(hour as i64);
        println!("{}", format_row(&at.format("%a %H:%M").to_string(), row));
    }
}

fn format_row(label: &str, row: &HourlyRow) -> String {
    let num = |v: Option<f64>| v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".into());
    let wind = match &row.wind_direction {
        Some(WindDirection::Degrees(d)) => format!("{d:.0}°"),
        Some(WindDirection::Cardinal(c)) => c.to_string(),
        None => "-".into(),
    };

    format!(
        "{:<11} {:>7} {:>7} {:>7} {:>5} {:>6} {:>9} {:>5}",
        label,
        num(row.temperature),
        num(row.apparent_temperature),
        num(row.dewpoint),
        num(row.relative_humidity),
        wind,
        num(row.wind_speed),
        num(row.probability_of_precipitation),
    )
}
