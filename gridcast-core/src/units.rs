//! Unit and representation conversions applied when a value is written into
//! an hourly row.

use crate::model::{Cardinal, UnitSystem, WindDirection, WindDirectionMode};

const KPH_PER_MPH: f64 = 1.609;

const COMPASS: [Cardinal; 9] = [
    Cardinal::N,
    Cardinal::NE,
    Cardinal::E,
    Cardinal::SE,
    Cardinal::S,
    Cardinal::SW,
    Cardinal::W,
    Cardinal::NW,
    Cardinal::N,
];

/// Celsius rounded to the nearest whole degree (ties to even), or unrounded
/// Fahrenheit.
pub fn temperature(celsius: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => celsius.round_ties_even(),
        UnitSystem::Imperial => celsius_to_fahrenheit(celsius),
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// km/h as provided, or mph.
pub fn wind_speed(kph: f64, units: UnitSystem) -> f64 {
    match units {
        UnitSystem::Metric => kph,
        UnitSystem::Imperial => kph / KPH_PER_MPH,
    }
}

pub fn wind_direction(degrees: f64, mode: WindDirectionMode) -> WindDirection {
    match mode {
        WindDirectionMode::Degrees => WindDirection::Degrees(degrees),
        WindDirectionMode::Cardinal => WindDirection::Cardinal(cardinal(degrees)),
    }
}

/// Nearest of the eight compass points, taken over whole degrees.
pub fn cardinal(degrees: f64) -> Cardinal {
    let sector = (degrees.rem_euclid(360.0).trunc() / 45.0).round() as usize;
    COMPASS[sector.min(COMPASS.len() - 1)]
}
