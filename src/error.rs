use std::time::Duration;
use thiserror::Error;

use crate::catalog::DataError;
use crate::propagate::PropagateError;

/// Errors surfaced by engine queries.
///
/// Stale element sets are not an error: results carry a freshness flag
/// instead and work continues.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("{id} has decayed (altitude {altitude_km:.1} km)")]
    Decayed { id: String, altitude_km: f64 },
    #[error("propagation failed: {0}")]
    Propagation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("computation exceeded its {0:?} deadline")]
    ComputationTimeout(Duration),
    #[error("computation cancelled")]
    Cancelled,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<PropagateError> for EngineError {
    fn from(err: PropagateError) -> Self {
        match err {
            PropagateError::Data(e) => EngineError::Data(e),
            PropagateError::Numerical(msg) => EngineError::Propagation(msg),
        }
    }
}
