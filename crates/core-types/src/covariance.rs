use crate::error::CoreError;
use crate::history::validate_tickers;
use nalgebra::{DMatrix, DVector};

/// Relative tolerance used when checking that an input matrix is symmetric.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// A symmetric N x N covariance matrix labelled with the tickers of its rows.
///
/// Positive semi-definiteness is not enforced here: the consumers that need it
/// (the optimizer, ERC) check the property they require and report it.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    tickers: Vec<String>,
    matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    pub fn new(tickers: Vec<String>, matrix: DMatrix<f64>) -> Result<Self, CoreError> {
        if !matrix.is_square() {
            return Err(CoreError::InvalidInput(
                "covariance".to_string(),
                format!("expected a square matrix, got {}x{}", matrix.nrows(), matrix.ncols()),
            ));
        }
        if matrix.nrows() != tickers.len() {
            return Err(CoreError::DimensionMismatch {
                context: "covariance size".to_string(),
                expected: tickers.len(),
                actual: matrix.nrows(),
            });
        }
        if tickers.is_empty() {
            return Err(CoreError::InvalidInput(
                "covariance".to_string(),
                "a covariance matrix needs at least one asset".to_string(),
            ));
        }
        validate_tickers(&tickers)?;
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidInput(
                "covariance".to_string(),
                "matrix contains non-finite values".to_string(),
            ));
        }

        let scale = matrix.amax().max(1.0);
        let n = matrix.nrows();
        for i in 0..n {
            for j in (i + 1)..n {
                if (matrix[(i, j)] - matrix[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(CoreError::InvalidInput(
                        "covariance".to_string(),
                        format!(
                            "matrix is not symmetric: [{},{}]={} but [{},{}]={}",
                            i, j, matrix[(i, j)], j, i, matrix[(j, i)]
                        ),
                    ));
                }
            }
        }
        if matrix.diagonal().iter().any(|v| *v < 0.0) {
            return Err(CoreError::InvalidInput(
                "covariance".to_string(),
                "variances must not be negative".to_string(),
            ));
        }

        // Remove round-off asymmetry so downstream factorizations see an exact mirror.
        let symmetric = (&matrix + matrix.transpose()) * 0.5;
        Ok(Self { tickers, matrix: symmetric })
    }

    /// Convenience constructor from a row-major slice.
    pub fn from_row_slice(tickers: Vec<String>, values: &[f64]) -> Result<Self, CoreError> {
        let n = tickers.len();
        if values.len() != n * n {
            return Err(CoreError::DimensionMismatch {
                context: "covariance entries".to_string(),
                expected: n * n,
                actual: values.len(),
            });
        }
        Self::new(tickers, DMatrix::from_row_slice(n, n, values))
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn dim(&self) -> usize {
        self.tickers.len()
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn variances(&self) -> DVector<f64> {
        self.matrix.diagonal()
    }

    pub fn volatilities(&self) -> DVector<f64> {
        self.variances().map(f64::sqrt)
    }

    /// Correlation matrix. Fails when an asset has zero variance.
    pub fn correlation(&self) -> Result<DMatrix<f64>, CoreError> {
        let vols = self.volatilities();
        if let Some(j) = vols.iter().position(|v| *v <= 0.0) {
            return Err(CoreError::InvalidInput(
                format!("variance of {}", self.tickers[j]),
                "correlation is undefined for a zero-variance asset".to_string(),
            ));
        }
        let n = self.dim();
        Ok(DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                (self.matrix[(i, j)] / (vols[i] * vols[j])).clamp(-1.0, 1.0)
            }
        }))
    }

    /// Ratio of the largest to the smallest eigenvalue; infinite when the
    /// smallest eigenvalue is not strictly positive.
    pub fn condition_number(&self) -> f64 {
        let eigenvalues = self.matrix.clone().symmetric_eigen().eigenvalues;
        let max = eigenvalues.max();
        let min = eigenvalues.min();
        if min <= 0.0 || !min.is_finite() {
            f64::INFINITY
        } else {
            max / min
        }
    }

    pub fn is_positive_definite(&self) -> bool {
        self.matrix.clone().cholesky().is_some()
    }

    /// `wᵀΣw` for weights in ticker order.
    pub fn portfolio_variance(&self, weights: &[f64]) -> Result<f64, CoreError> {
        if weights.len() != self.dim() {
            return Err(CoreError::DimensionMismatch {
                context: "portfolio weights".to_string(),
                expected: self.dim(),
                actual: weights.len(),
            });
        }
        let w = DVector::from_column_slice(weights);
        Ok(w.dot(&(&self.matrix * &w)))
    }

    /// Square sub-matrix over the given asset indices, in the given order.
    pub fn submatrix(&self, indices: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(indices.len(), indices.len(), |i, j| {
            self.matrix[(indices[i], indices[j])]
        })
    }

    /// Reorders rows and columns: position `k` of the result is asset `order[k]`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self, CoreError> {
        if order.len() != self.dim() {
            return Err(CoreError::DimensionMismatch {
                context: "permutation".to_string(),
                expected: self.dim(),
                actual: order.len(),
            });
        }
        let mut seen = vec![false; self.dim()];
        for &k in order {
            if k >= self.dim() || seen[k] {
                return Err(CoreError::InvalidInput(
                    "permutation".to_string(),
                    "order must contain every asset index exactly once".to_string(),
                ));
            }
            seen[k] = true;
        }
        Ok(Self {
            tickers: order.iter().map(|&k| self.tickers[k].clone()).collect(),
            matrix: self.submatrix(order),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tickers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("A{}", i)).collect()
    }

    #[test]
    fn rejects_asymmetric_and_negative_variance_input() {
        let asymmetric = CovarianceMatrix::from_row_slice(tickers(2), &[1.0, 0.2, 0.3, 1.0]);
        assert!(asymmetric.is_err());

        let negative = CovarianceMatrix::from_row_slice(tickers(2), &[-1.0, 0.0, 0.0, 1.0]);
        assert!(negative.is_err());
    }

    #[test]
    fn rejects_duplicate_tickers() {
        let labels = vec!["SPY".to_string(), "SPY".to_string()];
        let err = CovarianceMatrix::from_row_slice(labels, &[1.0, 0.0, 0.0, 1.0]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(..)));
    }

    #[test]
    fn correlation_and_condition_number() {
        let cov = CovarianceMatrix::from_row_slice(tickers(2), &[0.04, 0.01, 0.01, 0.01]).unwrap();
        let corr = cov.correlation().unwrap();
        assert_relative_eq!(corr[(0, 1)], 0.5, epsilon = 1e-12);
        assert!(cov.is_positive_definite());
        assert!(cov.condition_number().is_finite());

        let singular = CovarianceMatrix::from_row_slice(tickers(2), &[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(singular.condition_number() > 1e12);
        assert!(!singular.is_positive_definite());
    }

    #[test]
    fn permutation_moves_labels_with_entries() {
        let cov = CovarianceMatrix::from_row_slice(
            tickers(3),
            &[1.0, 0.1, 0.2, 0.1, 2.0, 0.3, 0.2, 0.3, 3.0],
        )
        .unwrap();
        let permuted = cov.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(permuted.tickers(), &["A2", "A0", "A1"]);
        assert_relative_eq!(permuted.matrix()[(0, 0)], 3.0);
        assert_relative_eq!(permuted.matrix()[(0, 1)], 0.2);
        assert_relative_eq!(permuted.matrix()[(1, 2)], 0.1);
        assert!(cov.permuted(&[0, 0, 1]).is_err());
    }

    #[test]
    fn portfolio_variance_is_quadratic_form() {
        let cov = CovarianceMatrix::from_row_slice(tickers(2), &[0.04, 0.01, 0.01, 0.09]).unwrap();
        let variance = cov.portfolio_variance(&[0.5, 0.5]).unwrap();
        assert_relative_eq!(variance, 0.25 * 0.04 + 0.25 * 0.09 + 2.0 * 0.25 * 0.01, epsilon = 1e-15);
        assert!(cov.portfolio_variance(&[1.0]).is_err());
    }
}
