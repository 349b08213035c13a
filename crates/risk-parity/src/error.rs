use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskParityError {
    #[error("ERC did not converge after {iterations} iterations (risk contribution spread {spread:.3e}, tolerance {tolerance:.3e})")]
    Convergence {
        iterations: usize,
        spread: f64,
        tolerance: f64,
    },

    #[error("Covariance matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Asset {ticker} has non-positive variance ({variance})")]
    NonPositiveVariance { ticker: String, variance: f64 },

    #[error("Risk parity parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
