use crate::error::RiskParityError;
use crate::RiskParityAllocator;
use configuration::RiskParityConfig;
use core_types::{CoreError, CovarianceMatrix, Portfolio};
use nalgebra::DVector;

/// Equal Risk Contribution by cyclical coordinate descent.
///
/// Minimizes `½xᵀΣx − Σ bᵢ ln xᵢ` with `bᵢ = 1/N`, whose stationary point has
/// `xᵢ(Σx)ᵢ = bᵢ`: every asset contributes the same share of risk once `x`
/// is normalized. Each coordinate update is the positive root of
/// `Σᵢᵢxᵢ² + cᵢxᵢ − bᵢ = 0` with `cᵢ = Σ_{j≠i} Σᵢⱼxⱼ`.
#[derive(Debug, Clone, Copy)]
pub struct EqualRiskContribution {
    tolerance: f64,
    max_iterations: usize,
}

impl EqualRiskContribution {
    pub fn new(config: &RiskParityConfig) -> Result<Self, RiskParityError> {
        if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
            return Err(RiskParityError::InvalidParameters(format!(
                "tolerance must be positive, got {}",
                config.tolerance
            )));
        }
        if config.max_iterations == 0 {
            return Err(RiskParityError::InvalidParameters(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(Self {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
        })
    }
}

impl RiskParityAllocator for EqualRiskContribution {
    fn name(&self) -> &'static str {
        "erc"
    }

    fn allocate(&self, covariance: &CovarianceMatrix) -> Result<Portfolio, RiskParityError> {
        let n = covariance.dim();
        if !covariance.is_positive_definite() {
            return Err(RiskParityError::NotPositiveDefinite);
        }
        let sigma = covariance.matrix();
        let budget = 1.0 / n as f64;
        let mut x = DVector::from_element(n, budget);
        let mut spread = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            for i in 0..n {
                let s_ii = sigma[(i, i)];
                let c_i = sigma.row(i).transpose().dot(&x) - s_ii * x[i];
                x[i] = (-c_i + (c_i * c_i + 4.0 * s_ii * budget).sqrt()) / (2.0 * s_ii);
            }

            let weights: Vec<f64> = (&x / x.sum()).iter().copied().collect();
            let shares = relative_risk_contributions(covariance, &weights)?;
            spread = max_minus_min(&shares);
            if spread < self.tolerance {
                tracing::debug!(iteration, spread, "ERC converged.");
                return Ok(Portfolio::new(covariance.tickers().to_vec(), weights)?);
            }
        }

        Err(RiskParityError::Convergence {
            iterations: self.max_iterations,
            spread,
            tolerance: self.tolerance,
        })
    }
}

/// Absolute risk contributions `wᵢ(Σw)ᵢ`; they sum to `wᵀΣw`.
pub fn risk_contributions(
    covariance: &CovarianceMatrix,
    weights: &[f64],
) -> Result<Vec<f64>, RiskParityError> {
    if weights.len() != covariance.dim() {
        return Err(CoreError::DimensionMismatch {
            context: "risk contribution weights".to_string(),
            expected: covariance.dim(),
            actual: weights.len(),
        }
        .into());
    }
    let w = DVector::from_column_slice(weights);
    let marginal = covariance.matrix() * &w;
    Ok(w.iter().zip(marginal.iter()).map(|(wi, mi)| wi * mi).collect())
}

/// Risk contributions as fractions of total portfolio variance.
pub fn relative_risk_contributions(
    covariance: &CovarianceMatrix,
    weights: &[f64],
) -> Result<Vec<f64>, RiskParityError> {
    let contributions = risk_contributions(covariance, weights)?;
    let total: f64 = contributions.iter().sum();
    if !(total > 0.0) {
        return Err(RiskParityError::NotPositiveDefinite);
    }
    Ok(contributions.into_iter().map(|c| c / total).collect())
}

fn max_minus_min(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}
