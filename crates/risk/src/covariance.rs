use crate::error::RiskError;
use crate::CovarianceEstimator;
use nalgebra::{DMatrix, DVector};

/// Unbiased sample covariance (divides by `T - 1`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleCovariance;

impl CovarianceEstimator for SampleCovariance {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DMatrix<f64>, RiskError> {
        require_rows(window, 2)?;
        let centered = center(window, &column_means(window));
        Ok(centered.transpose() * &centered / (window.nrows() - 1) as f64)
    }
}

/// Exponentially weighted covariance in the RiskMetrics style.
///
/// Observation `k` of a `T`-row window gets weight proportional to
/// `decay^(T-1-k)`, so the most recent row counts the most.
#[derive(Debug, Clone, Copy)]
pub struct EwmaCovariance {
    decay: f64,
}

impl EwmaCovariance {
    pub fn new(decay: f64) -> Result<Self, RiskError> {
        if !(decay > 0.0 && decay < 1.0) {
            return Err(RiskError::InvalidParameters(format!(
                "EWMA decay must lie in (0, 1), got {}",
                decay
            )));
        }
        Ok(Self { decay })
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }
}

impl CovarianceEstimator for EwmaCovariance {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DMatrix<f64>, RiskError> {
        require_rows(window, 2)?;
        let weights = ewma_weights(window.nrows(), self.decay);
        let means = weighted_column_means(window, &weights);
        let mut centered = center(window, &means);
        for (k, mut row) in centered.row_iter_mut().enumerate() {
            row *= weights[k].sqrt();
        }
        Ok(centered.transpose() * &centered)
    }
}

/// Shrinks the sample covariance towards `μI`, `μ` being the average variance.
///
/// With no fixed intensity the Ledoit-Wolf (2004) optimal intensity is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedoitWolfCovariance {
    intensity: Option<f64>,
}

impl LedoitWolfCovariance {
    pub fn new(intensity: Option<f64>) -> Result<Self, RiskError> {
        if let Some(value) = intensity {
            if !(0.0..=1.0).contains(&value) {
                return Err(RiskError::InvalidParameters(format!(
                    "shrinkage intensity must lie in [0, 1], got {}",
                    value
                )));
            }
        }
        Ok(Self { intensity })
    }

    /// Optimal shrinkage intensity for the given window, in `[0, 1]`.
    pub fn optimal_intensity(window: &DMatrix<f64>) -> Result<f64, RiskError> {
        require_rows(window, 2)?;
        let t = window.nrows() as f64;
        let n = window.ncols() as f64;
        let centered = center(window, &column_means(window));

        // Maximum-likelihood covariance, the scale the estimator is derived on.
        let s = centered.transpose() * &centered / t;
        let mu = s.trace() / n;
        let s_norm_sq = s.norm_squared();

        let mut target_gap = s.clone();
        for i in 0..window.ncols() {
            target_gap[(i, i)] -= mu;
        }
        let delta = target_gap.norm_squared() / n;
        if delta <= 0.0 {
            return Ok(0.0);
        }

        let fourth_moment: f64 = centered
            .row_iter()
            .map(|row| row.norm_squared().powi(2))
            .sum::<f64>()
            / t;
        let beta = ((fourth_moment - s_norm_sq) / (n * t)).min(delta);

        Ok((beta / delta).clamp(0.0, 1.0))
    }
}

impl CovarianceEstimator for LedoitWolfCovariance {
    fn name(&self) -> &'static str {
        "ledoit_wolf"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DMatrix<f64>, RiskError> {
        let sample = SampleCovariance.estimate(window)?;
        let intensity = match self.intensity {
            Some(value) => value,
            None => Self::optimal_intensity(window)?,
        };
        let n = sample.nrows();
        let mu = sample.trace() / n as f64;
        tracing::debug!(intensity, mu, "Ledoit-Wolf shrinkage applied.");

        Ok(sample * (1.0 - intensity) + DMatrix::<f64>::identity(n, n) * (intensity * mu))
    }
}

/// Normalized weights `decay^(T-1-k)` for `k = 0..T`.
pub(crate) fn ewma_weights(rows: usize, decay: f64) -> DVector<f64> {
    let raw = DVector::from_fn(rows, |k, _| decay.powi((rows - 1 - k) as i32));
    let total = raw.sum();
    raw / total
}

pub(crate) fn column_means(window: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(window.ncols(), |j, _| window.column(j).mean())
}

pub(crate) fn weighted_column_means(window: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
    DVector::from_fn(window.ncols(), |j, _| window.column(j).dot(weights))
}

fn center(window: &DMatrix<f64>, means: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(window.nrows(), window.ncols(), |k, j| window[(k, j)] - means[j])
}

fn require_rows(window: &DMatrix<f64>, required: usize) -> Result<(), RiskError> {
    if window.nrows() < required {
        return Err(RiskError::InsufficientData {
            observations: window.nrows(),
            required,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn window() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            5,
            2,
            &[
                0.01, 0.02, //
                -0.02, 0.01, //
                0.03, -0.01, //
                0.00, 0.00, //
                -0.01, 0.03,
            ],
        )
    }

    #[test]
    fn sample_covariance_matches_hand_computation() {
        let cov = SampleCovariance.estimate(&window()).unwrap();
        // Means are 0.002 and 0.01.
        let a = [0.008, -0.022, 0.028, -0.002, -0.012];
        let b = [0.01, 0.0, -0.02, -0.01, 0.02];
        let var_a: f64 = a.iter().map(|x| x * x).sum::<f64>() / 4.0;
        let cov_ab: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum::<f64>() / 4.0;
        assert_relative_eq!(cov[(0, 0)], var_a, epsilon = 1e-15);
        assert_relative_eq!(cov[(0, 1)], cov_ab, epsilon = 1e-15);
        assert_relative_eq!(cov[(1, 0)], cov[(0, 1)]);
    }

    #[test]
    fn ewma_weights_favour_recent_rows() {
        let weights = ewma_weights(4, 0.5);
        assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-15);
        assert!(weights[3] > weights[2] && weights[2] > weights[0]);
        assert_relative_eq!(weights[3], 8.0 / 15.0, epsilon = 1e-15);
    }

    #[test]
    fn ewma_rejects_decay_outside_unit_interval() {
        assert!(EwmaCovariance::new(0.0).is_err());
        assert!(EwmaCovariance::new(1.0).is_err());
        assert!(EwmaCovariance::new(0.94).is_ok());
    }

    #[test]
    fn shrinkage_interpolates_between_sample_and_identity() {
        let sample = SampleCovariance.estimate(&window()).unwrap();

        let none = LedoitWolfCovariance::new(Some(0.0)).unwrap().estimate(&window()).unwrap();
        assert_relative_eq!(none, sample, epsilon = 1e-15);

        let full = LedoitWolfCovariance::new(Some(1.0)).unwrap().estimate(&window()).unwrap();
        let mu = sample.trace() / 2.0;
        assert_relative_eq!(full[(0, 0)], mu, epsilon = 1e-15);
        assert_relative_eq!(full[(0, 1)], 0.0);

        let intensity = LedoitWolfCovariance::optimal_intensity(&window()).unwrap();
        assert!((0.0..=1.0).contains(&intensity));
        assert!(LedoitWolfCovariance::new(Some(1.5)).is_err());
    }

    #[test]
    fn single_row_is_insufficient() {
        let single = DMatrix::from_row_slice(1, 2, &[0.01, 0.02]);
        assert!(matches!(
            SampleCovariance.estimate(&single),
            Err(RiskError::InsufficientData { observations: 1, required: 2 })
        ));
    }
}
