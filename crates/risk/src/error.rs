use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Insufficient data: {observations} observations, at least {required} required")]
    InsufficientData { observations: usize, required: usize },

    #[error("Risk model parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("A calculation error occurred: {0}")]
    Calculation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
