use crate::covariance::{EwmaCovariance, LedoitWolfCovariance, SampleCovariance};
use crate::error::RiskError;
use crate::expected_returns::{EwmaMean, SampleMean, ShrunkMean};
use crate::{CovarianceEstimator, ExpectedReturnEstimator};
use configuration::{CovarianceMethod, ExpectedReturnMethod};

/// Creates the covariance estimator selected in the configuration.
pub fn create_covariance_estimator(
    method: CovarianceMethod,
) -> Result<Box<dyn CovarianceEstimator>, RiskError> {
    match method {
        CovarianceMethod::Sample => Ok(Box::new(SampleCovariance)),
        CovarianceMethod::Ewma { decay } => Ok(Box::new(EwmaCovariance::new(decay)?)),
        CovarianceMethod::LedoitWolf { intensity } => {
            Ok(Box::new(LedoitWolfCovariance::new(intensity)?))
        }
    }
}

/// Creates the expected-return estimator selected in the configuration.
pub fn create_expected_return_estimator(
    method: ExpectedReturnMethod,
) -> Result<Box<dyn ExpectedReturnEstimator>, RiskError> {
    match method {
        ExpectedReturnMethod::SampleMean => Ok(Box::new(SampleMean)),
        ExpectedReturnMethod::Ewma { decay } => Ok(Box::new(EwmaMean::new(decay)?)),
        ExpectedReturnMethod::Shrinkage { intensity } => Ok(Box::new(ShrunkMean::new(intensity)?)),
    }
}
