use thiserror::Error;

use crate::model::Parameter;

/// Failures surfaced by the forecast core.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Invalid coordinate {input:?}{}: {reason}", at_position(.position))]
    InvalidCoordinate {
        input: String,
        /// Index of the offending entry when the coordinate came from a batch.
        position: Option<usize>,
        reason: String,
    },

    #[error("Upstream resolution failed: {0}")]
    UpstreamResolutionFailure(String),

    #[error("Incomplete series: no {parameter} value for hour {row}")]
    IncompleteSeries { parameter: Parameter, row: usize },

    #[error("Malformed observation {valid_time:?}: {reason}")]
    MalformedObservation { valid_time: String, reason: String },

    #[error("Grid store error: {0}")]
    Storage(String),
}

impl ForecastError {
    pub fn invalid_coordinate(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            input: input.into(),
            position: None,
            reason: reason.into(),
        }
    }

    /// Attach a batch position to an `InvalidCoordinate`; other variants pass through.
    pub fn at(self, index: usize) -> Self {
        match self {
            Self::InvalidCoordinate { input, reason, .. } => Self::InvalidCoordinate {
                input,
                position: Some(index),
                reason,
            },
            other => other,
        }
    }

    pub fn upstream(context: &str, err: impl std::fmt::Display) -> Self {
        Self::UpstreamResolutionFailure(format!("{context}: {err}"))
    }
}

impl From<rusqlite::Error> for ForecastError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

fn at_position(position: &Option<usize>) -> String {
    position.map(|p| format!(" at position {p}")).unwrap_or_default()
}
