use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("eccentricity {0} is outside [0, 1)")]
    Eccentricity(f64),
    #[error("mean motion must be positive (got {0} rev/day)")]
    MeanMotion(f64),
    #[error("non-finite value in field {0}")]
    NonFinite(&'static str),
    #[error("element set is {age_hours:.1} h from the requested epoch (limit {limit_hours:.1} h)")]
    Expired { age_hours: f64, limit_hours: f64 },
    #[error("requested epoch {requested} precedes element epoch {epoch}")]
    BeforeEpoch {
        requested: DateTime<Utc>,
        epoch: DateTime<Utc>,
    },
    #[error("invalid tle: {0}")]
    Tle(String),
    #[error("invalid record: {0}")]
    Record(String),
}
