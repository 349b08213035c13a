use crate::covariance::{column_means, ewma_weights, weighted_column_means};
use crate::error::RiskError;
use crate::ExpectedReturnEstimator;
use nalgebra::{DMatrix, DVector};

/// Arithmetic mean of each column.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleMean;

impl ExpectedReturnEstimator for SampleMean {
    fn name(&self) -> &'static str {
        "sample_mean"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DVector<f64>, RiskError> {
        require_rows(window)?;
        Ok(column_means(window))
    }
}

/// Exponentially weighted mean, most recent observation heaviest.
#[derive(Debug, Clone, Copy)]
pub struct EwmaMean {
    decay: f64,
}

impl EwmaMean {
    pub fn new(decay: f64) -> Result<Self, RiskError> {
        if !(decay > 0.0 && decay < 1.0) {
            return Err(RiskError::InvalidParameters(format!(
                "EWMA decay must lie in (0, 1), got {}",
                decay
            )));
        }
        Ok(Self { decay })
    }
}

impl ExpectedReturnEstimator for EwmaMean {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DVector<f64>, RiskError> {
        require_rows(window)?;
        let weights = ewma_weights(window.nrows(), self.decay);
        Ok(weighted_column_means(window, &weights))
    }
}

/// Sample means pulled towards the cross-sectional grand mean:
/// `(1 - s)·m + s·mean(m)`.
#[derive(Debug, Clone, Copy)]
pub struct ShrunkMean {
    intensity: f64,
}

impl ShrunkMean {
    pub fn new(intensity: f64) -> Result<Self, RiskError> {
        if !(0.0..=1.0).contains(&intensity) {
            return Err(RiskError::InvalidParameters(format!(
                "shrinkage intensity must lie in [0, 1], got {}",
                intensity
            )));
        }
        Ok(Self { intensity })
    }
}

impl ExpectedReturnEstimator for ShrunkMean {
    fn name(&self) -> &'static str {
        "shrinkage"
    }

    fn estimate(&self, window: &DMatrix<f64>) -> Result<DVector<f64>, RiskError> {
        require_rows(window)?;
        let means = column_means(window);
        let grand_mean = means.mean();
        Ok(means.map(|m| (1.0 - self.intensity) * m + self.intensity * grand_mean))
    }
}

fn require_rows(window: &DMatrix<f64>) -> Result<(), RiskError> {
    if window.nrows() == 0 {
        return Err(RiskError::InsufficientData {
            observations: 0,
            required: 1,
        });
    }
    Ok(())
}
