//! # Meridian Risk Model
//!
//! Turns a window of historical returns into the two inputs every allocator
//! consumes: a covariance matrix and (optionally) a vector of expected returns.
//!
//! ## Architectural Principles
//!
//! - **Pure:** estimation reads an immutable `ReturnMatrix` and returns new values.
//! - **Pluggable:** estimators sit behind the `CovarianceEstimator` and
//!   `ExpectedReturnEstimator` traits and are built by the `factory` from the
//!   configuration enums.
//! - **Walk-forward safe:** callers hand in the history they are allowed to see;
//!   the model only ever looks at its trailing `lookback` rows.

pub mod covariance;
pub mod error;
pub mod expected_returns;
pub mod factory;

pub use covariance::{EwmaCovariance, LedoitWolfCovariance, SampleCovariance};
pub use error::RiskError;
pub use expected_returns::{EwmaMean, SampleMean, ShrunkMean};
pub use factory::{create_covariance_estimator, create_expected_return_estimator};

use configuration::RiskModelConfig;
use core_types::{CovarianceMatrix, ReturnMatrix};
use nalgebra::{DMatrix, DVector};

/// Estimates an N x N covariance from a T x N window of returns.
///
/// The `Send + Sync` bounds let one model be used from the parallel sweep.
pub trait CovarianceEstimator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DMatrix<f64>, RiskError>;
}

/// Estimates per-period expected returns from a T x N window.
pub trait ExpectedReturnEstimator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DVector<f64>, RiskError>;
}

/// Covariance and expected-return estimation over a trailing window.
#[derive(Debug)]
pub struct RiskModel {
    covariance: Box<dyn CovarianceEstimator>,
    expected_returns: Box<dyn ExpectedReturnEstimator>,
}

impl RiskModel {
    /// Builds the estimators named in the configuration.
    pub fn new(config: &RiskModelConfig) -> Result<Self, RiskError> {
        Ok(Self {
            covariance: create_covariance_estimator(config.covariance)?,
            expected_returns: create_expected_return_estimator(config.expected_returns)?,
        })
    }

    pub fn from_estimators(
        covariance: Box<dyn CovarianceEstimator>,
        expected_returns: Box<dyn ExpectedReturnEstimator>,
    ) -> Self {
        Self { covariance, expected_returns }
    }

    /// Covariance of the trailing `lookback` rows of `returns` (all rows if fewer).
    ///
    /// Needs at least `assets + 1` observations in the window.
    pub fn estimate(
        &self,
        returns: &ReturnMatrix,
        lookback: usize,
    ) -> Result<CovarianceMatrix, RiskError> {
        let window = Self::window(returns, lookback)?;
        let matrix = self.covariance.estimate(window.values())?;
        tracing::debug!(
            estimator = self.covariance.name(),
            observations = window.periods(),
            assets = window.num_assets(),
            "Covariance estimated."
        );
        Ok(CovarianceMatrix::new(window.tickers().to_vec(), matrix)?)
    }

    /// Expected returns over the same trailing window, in ticker order.
    pub fn expected_returns(
        &self,
        returns: &ReturnMatrix,
        lookback: usize,
    ) -> Result<DVector<f64>, RiskError> {
        let window = Self::window(returns, lookback)?;
        let mu = self.expected_returns.estimate(window.values())?;
        if mu.iter().any(|m| !m.is_finite()) {
            return Err(RiskError::Calculation(
                "expected returns contain non-finite values".to_string(),
            ));
        }
        Ok(mu)
    }

    fn window(returns: &ReturnMatrix, lookback: usize) -> Result<ReturnMatrix, RiskError> {
        if lookback == 0 {
            return Err(RiskError::InvalidParameters(
                "lookback must be positive".to_string(),
            ));
        }
        let window = returns.tail(lookback);
        let required = window.num_assets() + 1;
        if window.periods() < required {
            return Err(RiskError::InsufficientData {
                observations: window.periods(),
                required,
            });
        }
        Ok(window)
    }
}
