use crate::error::AllocationError;
use configuration::{AllocationConfig, AllocationMethod};
use core_types::{CovarianceMatrix, Portfolio, ReturnMatrix};
use nalgebra::DVector;
use optimizer::MeanVarianceOptimizer;
use risk::RiskModel;
use risk_parity::{
    EqualRiskContribution, HierarchicalRiskParity, RiskParityAllocator, inverse_variance_weights,
};

/// The seam between risk estimation and the simulation loop.
///
/// Anything that turns a covariance (and optionally expected returns) into
/// target weights can be backtested. The `Send + Sync` bounds are required
/// for allocators to be used inside the parallel sweep.
pub trait PortfolioAllocator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether `allocate` must be given expected returns.
    fn requires_expected_returns(&self) -> bool {
        false
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError>;
}

impl PortfolioAllocator for MeanVarianceOptimizer {
    fn name(&self) -> &'static str {
        "mean_variance"
    }

    fn requires_expected_returns(&self) -> bool {
        MeanVarianceOptimizer::requires_expected_returns(self)
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError> {
        Ok(self.optimize(covariance, expected_returns)?)
    }
}

impl PortfolioAllocator for EqualRiskContribution {
    fn name(&self) -> &'static str {
        RiskParityAllocator::name(self)
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        _expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError> {
        Ok(RiskParityAllocator::allocate(self, covariance)?)
    }
}

impl PortfolioAllocator for HierarchicalRiskParity {
    fn name(&self) -> &'static str {
        RiskParityAllocator::name(self)
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        _expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError> {
        Ok(RiskParityAllocator::allocate(self, covariance)?)
    }
}

/// 1/N across every asset. Ignores the covariance entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeightAllocator;

impl PortfolioAllocator for EqualWeightAllocator {
    fn name(&self) -> &'static str {
        "equal_weight"
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        _expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError> {
        Ok(Portfolio::equal_weight(covariance.tickers().to_vec())?)
    }
}

/// Weights proportional to `1 / σᵢ²`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseVarianceAllocator;

impl PortfolioAllocator for InverseVarianceAllocator {
    fn name(&self) -> &'static str {
        "inverse_variance"
    }

    fn allocate(
        &self,
        covariance: &CovarianceMatrix,
        _expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, AllocationError> {
        Ok(inverse_variance_weights(covariance)?)
    }
}

/// Creates the allocator selected by `config.method`.
///
/// Every `AllocationMethod` is handled here, so adding a variant without an
/// allocator fails to compile.
pub fn create_allocator(
    config: &AllocationConfig,
) -> Result<Box<dyn PortfolioAllocator>, AllocationError> {
    match config.method {
        AllocationMethod::MeanVariance => {
            Ok(Box::new(MeanVarianceOptimizer::new(&config.mean_variance)?))
        }
        AllocationMethod::Erc => Ok(Box::new(EqualRiskContribution::new(&config.risk_parity)?)),
        AllocationMethod::Hrp => Ok(Box::new(HierarchicalRiskParity::new(&config.risk_parity))),
        AllocationMethod::EqualWeight => Ok(Box::new(EqualWeightAllocator)),
        AllocationMethod::InverseVariance => Ok(Box::new(InverseVarianceAllocator)),
    }
}

/// Target weights from the trailing `lookback` rows of `window`.
///
/// Expected returns are only estimated when the allocator asks for them.
pub fn allocate_window(
    risk_model: &RiskModel,
    allocator: &dyn PortfolioAllocator,
    window: &ReturnMatrix,
    lookback: usize,
) -> Result<Portfolio, AllocationError> {
    let covariance = risk_model.estimate(window, lookback)?;
    let expected_returns = if allocator.requires_expected_returns() {
        Some(risk_model.expected_returns(window, lookback)?)
    } else {
        None
    };
    allocator.allocate(&covariance, expected_returns.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use configuration::MeanVarianceConfig;
    use optimizer::OptimizerError;

    fn covariance() -> CovarianceMatrix {
        CovarianceMatrix::from_row_slice(
            vec!["A".to_string(), "B".to_string()],
            &[0.04, 0.0, 0.0, 0.01],
        )
        .unwrap()
    }

    #[test]
    fn factory_builds_every_method() {
        for method in AllocationMethod::ALL {
            let config = AllocationConfig { method, ..AllocationConfig::default() };
            let allocator = create_allocator(&config).unwrap();
            assert_eq!(allocator.name(), method.to_string());
            let portfolio = allocator.allocate(&covariance(), None).unwrap();
            assert_relative_eq!(portfolio.invested_weight(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn baselines() {
        let equal = EqualWeightAllocator.allocate(&covariance(), None).unwrap();
        assert_eq!(equal.weights(), &[0.5, 0.5]);
        let inverse = InverseVarianceAllocator.allocate(&covariance(), None).unwrap();
        assert_relative_eq!(inverse.weights()[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(inverse.weights()[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn mean_variance_asks_for_expected_returns_only_when_needed() {
        let min_variance = create_allocator(&AllocationConfig::default()).unwrap();
        assert!(!min_variance.requires_expected_returns());

        let config = AllocationConfig {
            mean_variance: MeanVarianceConfig {
                risk_aversion: 1.0,
                ..MeanVarianceConfig::default()
            },
            ..AllocationConfig::default()
        };
        let tilted = create_allocator(&config).unwrap();
        assert!(tilted.requires_expected_returns());
        assert_eq!(
            tilted.allocate(&covariance(), None),
            Err(AllocationError::Optimizer(OptimizerError::MissingExpectedReturns))
        );
    }

    #[test]
    fn invalid_risk_parity_settings_are_rejected() {
        let mut config = AllocationConfig {
            method: AllocationMethod::Erc,
            ..AllocationConfig::default()
        };
        config.risk_parity.max_iterations = 0;
        assert!(matches!(
            create_allocator(&config),
            Err(AllocationError::RiskParity(_))
        ));
    }
}
