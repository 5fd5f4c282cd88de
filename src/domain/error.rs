use thiserror::Error;
use uuid::Uuid;

use crate::domain::experiment::ExperimentStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{operation} is not allowed while experiment is {status}")]
    InvalidState {
        operation: &'static str,
        status: ExperimentStatus,
    },

    #[error("insufficient data: collected {collected} views, required {required}")]
    InsufficientData { collected: i64, required: i64 },

    #[error("experiment or variant {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
