//! Hourly series normalization: expands run-length-encoded observations into
//! a dense 25-row table aligned on the current hour.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::ForecastError,
    model::{ForecastOptions, HOURS, HourlyRow, HourlyTable, Parameter},
    observation::{GridSeries, Observation, RawObservation},
};

/// Build the hourly table for `requested` parameters as seen from `now`.
///
/// Each parameter is expanded independently into the same rows. Every requested
/// parameter must cover all 25 hours; the first hole is reported as
/// [`ForecastError::IncompleteSeries`]. Malformed observations are logged and
/// skipped.
pub fn normalize(
    series: &GridSeries,
    requested: &[Parameter],
    options: ForecastOptions,
    now: DateTime<Utc>,
) -> Result<HourlyTable, ForecastError> {
    let mut rows = vec![HourlyRow::default(); HOURS];

    for &parameter in requested {
        let observations = series
            .get(parameter)
            .ok_or(ForecastError::IncompleteSeries { parameter, row: 0 })?;

        let filled = expand(&mut rows, parameter, observations, options, now);
        debug!(%parameter, filled, "expanded parameter");
    }

    for &parameter in requested {
        if let Some(row) = rows.iter().position(|r| !r.has(parameter)) {
            return Err(ForecastError::IncompleteSeries { parameter, row });
        }
    }

    Ok(HourlyTable::new(rows))
}

/// One parameter's pass. Returns how many rows were reached.
fn expand(
    rows: &mut [HourlyRow],
    parameter: Parameter,
    observations: &[RawObservation],
    options: ForecastOptions,
    now: DateTime<Utc>,
) -> usize {
    let mut next = 0;

    for raw in observations {
        if next == rows.len() {
            break;
        }

        let Some(obs) = parse_or_skip(parameter, raw) else {
            continue;
        };
        if obs.has_elapsed(now) {
            continue;
        }

        let end = (next + obs.hours as usize).min(rows.len());
        match obs.value {
            Some(value) => {
                for row in &mut rows[next..end] {
                    row.fill(parameter, value, options);
                }
            }
            // Still occupies its hours so later values stay aligned.
            None => debug!(%parameter, valid_time = %raw.valid_time, "observation has no value"),
        }
        next = end;
    }

    next
}

/// Raw value of the first observation still valid at `now` (hour 0).
pub fn current_value(
    series: &GridSeries,
    parameter: Parameter,
    now: DateTime<Utc>,
) -> Result<f64, ForecastError> {
    series
        .get(parameter)
        .unwrap_or_default()
        .iter()
        .filter_map(|raw| parse_or_skip(parameter, raw))
        .find(|obs| !obs.has_elapsed(now))
        .and_then(|obs| obs.value)
        .ok_or(ForecastError::IncompleteSeries { parameter, row: 0 })
}

fn parse_or_skip(parameter: Parameter, raw: &RawObservation) -> Option<Observation> {
    match Observation::parse(raw) {
        Ok(obs) => Some(obs),
        Err(err) => {
            warn!(%parameter, error = %err, "skipping malformed observation");
            None
        }
    }
}
