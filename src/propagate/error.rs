use thiserror::Error;

use crate::catalog::DataError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropagateError {
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("propagation error: {0}")]
    Numerical(String),
}

impl From<sgp4::Error> for PropagateError {
    fn from(err: sgp4::Error) -> Self {
        PropagateError::Numerical(err.to_string())
    }
}
