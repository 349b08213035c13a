use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Constraints are infeasible: {0}")]
    InfeasibleConstraints(String),

    #[error("Covariance is ill-conditioned: condition number {condition_number:.3e} exceeds {threshold:.3e}")]
    IllConditionedCovariance { condition_number: f64, threshold: f64 },

    #[error("Expected returns are required by the risk-aversion term or a return constraint")]
    MissingExpectedReturns,

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("QP solver failed: {0}")]
    Solver(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
