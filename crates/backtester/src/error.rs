use crate::params::RunParameters;
use chrono::NaiveDate;
use thiserror::Error;

/// Why a target portfolio could not be produced for a window.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Risk model error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] optimizer::OptimizerError),

    #[error("Risk parity error: {0}")]
    RiskParity(#[from] risk_parity::RiskParityError),

    #[error("Portfolio error: {0}")]
    Core(#[from] core_types::CoreError),
}

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Not enough history: {available} return periods available, {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error(
        "Rebalance on {date} failed twice in a row (window {window_start} to {window_end}, parameters {parameters}): {source}"
    )]
    RebalanceAborted {
        date: NaiveDate,
        window_start: NaiveDate,
        window_end: NaiveDate,
        parameters: RunParameters,
        #[source]
        source: AllocationError,
    },

    #[error("Simulation failed on {date} (parameters {parameters}): {source}")]
    SimulationFailed {
        date: NaiveDate,
        parameters: RunParameters,
        #[source]
        source: core_types::CoreError,
    },

    #[error("Invalid backtest configuration: {0}")]
    Configuration(String),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Risk model error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Portfolio error: {0}")]
    Core(#[from] core_types::CoreError),
}
