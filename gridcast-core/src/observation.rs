//! Upstream run-length-encoded observations.
//!
//! The gridded-series provider reports each value with an ISO-8601 interval,
//! `<start>/<duration>`, e.g. `2024-05-01T12:00:00+00:00/PT3H`: the value holds
//! for every hour of the duration.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ForecastError, model::Parameter};

/// An observation as delivered upstream, before its interval is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub valid_time: String,
    pub value: Option<f64>,
}

impl RawObservation {
    pub fn new(valid_time: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            valid_time: valid_time.into(),
            value,
        }
    }
}

/// Raw observation sequences for one grid cell, per parameter, each ordered by
/// start instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSeries {
    layers: BTreeMap<Parameter, Vec<RawObservation>>,
}

impl GridSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parameter: Parameter, observations: Vec<RawObservation>) {
        self.layers.insert(parameter, observations);
    }

    pub fn with(mut self, parameter: Parameter, observations: Vec<RawObservation>) -> Self {
        self.insert(parameter, observations);
        self
    }

    pub fn get(&self, parameter: Parameter) -> Option<&[RawObservation]> {
        self.layers.get(&parameter).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub start: DateTime<Utc>,
    pub hours: u32,
    pub value: Option<f64>,
}

impl Observation {
    pub fn parse(raw: &RawObservation) -> Result<Self, ForecastError> {
        let malformed = |reason: String| ForecastError::MalformedObservation {
            valid_time: raw.valid_time.clone(),
            reason,
        };

        let (start, duration) = raw
            .valid_time
            .split_once('/')
            .ok_or_else(|| malformed("expected \"<start>/<duration>\"".into()))?;

        let start = DateTime::parse_from_rfc3339(start)
            .map_err(|e| malformed(format!("bad start instant: {e}")))?
            .with_timezone(&Utc);

        let hours = parse_duration_hours(duration).map_err(malformed)?;

        Ok(Self {
            start,
            hours,
            value: raw.value,
        })
    }

    /// True once more than the validity duration has passed since `start`.
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.start > Duration::hours(i64::from(self.hours))
    }
}

/// Parse an ISO-8601 duration (`PT1H`, `PT12H`, `P1DT6H`, `P1W`) into a positive
/// whole number of hours. Year and month designators are ambiguous in length
/// and rejected.
pub fn parse_duration_hours(text: &str) -> Result<u32, String> {
    let body = text
        .strip_prefix('P')
        .ok_or_else(|| format!("duration {text:?} must start with 'P'"))?;

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    if date_part.is_empty() && time_part.is_none_or(str::is_empty) {
        return Err(format!("duration {text:?} has no components"));
    }

    let mut seconds = sum_components(date_part, &[('W', 604_800), ('D', 86_400)])?;
    if let Some(time) = time_part {
        if time.is_empty() {
            return Err(format!("duration {text:?} has an empty time part"));
        }
        seconds = seconds
            .checked_add(sum_components(time, &[('H', 3_600), ('M', 60), ('S', 1)])?)
            .ok_or_else(|| format!("duration {text:?} overflows"))?;
    }

    if seconds == 0 {
        return Err(format!("duration {text:?} must be positive"));
    }
    if seconds % 3_600 != 0 {
        return Err(format!("duration {text:?} is not a whole number of hours"));
    }

    u32::try_from(seconds / 3_600).map_err(|_| format!("duration {text:?} overflows"))
}

/// Sum `<digits><designator>` components; designators must appear in the order
/// given by `units`, each at most once.
fn sum_components(part: &str, units: &[(char, u64)]) -> Result<u64, String> {
    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut next = 0;

    for ch in part.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let offset = units[next..]
            .iter()
            .position(|(designator, _)| *designator == ch)
            .ok_or_else(|| format!("unexpected designator '{ch}'"))?;
        let (_, scale) = units[next + offset];
        next += offset + 1;

        let count: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{ch}'"))?;
        digits.clear();

        total = count
            .checked_mul(scale)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(|| "duration overflows".to_string())?;
    }

    if !digits.is_empty() {
        return Err(format!("number {digits} has no designator"));
    }

    Ok(total)
}
