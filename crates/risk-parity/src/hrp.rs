use crate::dendrogram::Dendrogram;
use crate::error::RiskParityError;
use crate::RiskParityAllocator;
use configuration::{BisectionMode, LinkageMethod, RiskParityConfig};
use core_types::{CovarianceMatrix, Portfolio};
use nalgebra::DMatrix;

/// Hierarchical Risk Parity (López de Prado, 2016).
///
/// 1. Correlation distance `d = sqrt(0.5 (1 - ρ))`.
/// 2. Agglomerative clustering into a [`Dendrogram`].
/// 3. Quasi-diagonal ordering of the leaves.
/// 4. Recursive bisection, splitting weight inversely to cluster variance.
///
/// The computation runs on a ticker-sorted copy of the covariance, so the
/// weight an asset receives does not depend on the column order it came in.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalRiskParity {
    linkage: LinkageMethod,
    bisection: BisectionMode,
}

impl HierarchicalRiskParity {
    pub fn new(config: &RiskParityConfig) -> Self {
        Self {
            linkage: config.linkage,
            bisection: config.bisection,
        }
    }

    /// Dendrogram and quasi-diagonal order for `covariance`, in the
    /// ticker-sorted index space. Exposed for reporting.
    pub fn cluster(
        &self,
        covariance: &CovarianceMatrix,
    ) -> Result<(CovarianceMatrix, Dendrogram), RiskParityError> {
        check_variances(covariance)?;
        let canonical = canonical(covariance)?;
        let correlation = canonical.correlation()?;
        let distances = correlation.map(|rho| (0.5 * (1.0 - rho)).max(0.0).sqrt());
        let dendrogram = Dendrogram::build(&distances, self.linkage)?;
        Ok((canonical, dendrogram))
    }

    fn bisect_dendrogram(&self, covariance: &CovarianceMatrix, tree: &Dendrogram) -> Vec<f64> {
        let mut weights = vec![0.0; covariance.dim()];
        let mut stack = vec![(tree.root(), 1.0)];
        while let Some((id, weight)) = stack.pop() {
            let node = tree.node(id);
            match (node.left, node.right) {
                (Some(left), Some(right)) => {
                    let alpha = left_share(
                        covariance,
                        &tree.leaves_under(left),
                        &tree.leaves_under(right),
                    );
                    stack.push((right, weight * (1.0 - alpha)));
                    stack.push((left, weight * alpha));
                }
                _ => weights[id] = weight,
            }
        }
        weights
    }

    fn bisect_midpoint(&self, covariance: &CovarianceMatrix, order: &[usize]) -> Vec<f64> {
        let mut weights = vec![0.0; covariance.dim()];
        let mut stack = vec![(0, order.len(), 1.0)];
        while let Some((start, end, weight)) = stack.pop() {
            if end - start == 1 {
                weights[order[start]] = weight;
                continue;
            }
            let mid = start + (end - start) / 2;
            let alpha = left_share(covariance, &order[start..mid], &order[mid..end]);
            stack.push((mid, end, weight * (1.0 - alpha)));
            stack.push((start, mid, weight * alpha));
        }
        weights
    }
}

impl RiskParityAllocator for HierarchicalRiskParity {
    fn name(&self) -> &'static str {
        "hrp"
    }

    fn allocate(&self, covariance: &CovarianceMatrix) -> Result<Portfolio, RiskParityError> {
        let (canonical, tree) = self.cluster(covariance)?;
        let canonical_weights = match self.bisection {
            BisectionMode::Dendrogram => self.bisect_dendrogram(&canonical, &tree),
            BisectionMode::Midpoint => self.bisect_midpoint(&canonical, &tree.leaf_order()),
        };
        tracing::debug!(
            assets = covariance.dim(),
            linkage = ?self.linkage,
            bisection = ?self.bisection,
            "HRP allocation computed."
        );

        // Map back from ticker-sorted positions to the caller's order.
        let mut weights = vec![0.0; covariance.dim()];
        for (k, ticker) in canonical.tickers().iter().enumerate() {
            if let Some(j) = covariance.index_of(ticker) {
                weights[j] = canonical_weights[k];
            }
        }
        Ok(Portfolio::new(covariance.tickers().to_vec(), weights)?)
    }
}

/// Weights proportional to `1 / σᵢ²`.
pub fn inverse_variance_weights(covariance: &CovarianceMatrix) -> Result<Portfolio, RiskParityError> {
    check_variances(covariance)?;
    let inverse: Vec<f64> = covariance.variances().iter().map(|v| 1.0 / v).collect();
    let total: f64 = inverse.iter().sum();
    let weights = inverse.iter().map(|v| v / total).collect();
    Ok(Portfolio::new(covariance.tickers().to_vec(), weights)?)
}

/// The same matrix with rows and columns sorted by ticker.
fn canonical(covariance: &CovarianceMatrix) -> Result<CovarianceMatrix, RiskParityError> {
    let mut order: Vec<usize> = (0..covariance.dim()).collect();
    order.sort_by(|&a, &b| covariance.tickers()[a].cmp(&covariance.tickers()[b]));
    Ok(covariance.permuted(&order)?)
}

fn check_variances(covariance: &CovarianceMatrix) -> Result<(), RiskParityError> {
    for (ticker, variance) in covariance.tickers().iter().zip(covariance.variances().iter()) {
        if !(*variance > 0.0) {
            return Err(RiskParityError::NonPositiveVariance {
                ticker: ticker.clone(),
                variance: *variance,
            });
        }
    }
    Ok(())
}

/// Variance of a cluster held with inverse-variance weights inside it.
fn cluster_variance(covariance: &CovarianceMatrix, members: &[usize]) -> f64 {
    let sub: DMatrix<f64> = covariance.submatrix(members);
    let inverse: Vec<f64> = members.iter().map(|&i| 1.0 / covariance.matrix()[(i, i)]).collect();
    let total: f64 = inverse.iter().sum();
    let w = nalgebra::DVector::from_iterator(members.len(), inverse.iter().map(|v| v / total));
    w.dot(&(&sub * &w))
}

/// Fraction of the parent's weight that goes to the left cluster.
fn left_share(covariance: &CovarianceMatrix, left: &[usize], right: &[usize]) -> f64 {
    let v_left = cluster_variance(covariance, left);
    let v_right = cluster_variance(covariance, right);
    1.0 - v_left / (v_left + v_right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn covariance(tickers: &[&str], values: &[f64]) -> CovarianceMatrix {
        CovarianceMatrix::from_row_slice(tickers.iter().map(|t| t.to_string()).collect(), values)
            .unwrap()
    }

    #[test]
    fn two_assets_split_by_inverse_variance() {
        let cov = covariance(&["A", "B"], &[0.04, 0.0, 0.0, 0.01]);
        let portfolio = HierarchicalRiskParity::default().allocate(&cov).unwrap();
        assert_relative_eq!(portfolio.weights()[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(portfolio.weights()[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn zero_variance_is_rejected() {
        let cov = covariance(&["A", "B"], &[0.04, 0.0, 0.0, 0.0]);
        assert!(matches!(
            HierarchicalRiskParity::default().allocate(&cov),
            Err(RiskParityError::NonPositiveVariance { ref ticker, .. }) if ticker == "B"
        ));
        assert!(inverse_variance_weights(&cov).is_err());
    }

    #[test]
    fn inverse_variance_helper() {
        let cov = covariance(&["A", "B", "C"], &[0.01, 0.0, 0.0, 0.0, 0.02, 0.0, 0.0, 0.0, 0.04]);
        let portfolio = inverse_variance_weights(&cov).unwrap();
        assert_relative_eq!(portfolio.weights()[0], 4.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(portfolio.weights()[2], 1.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn bisection_modes_agree_on_a_balanced_tree() {
        let values = [
            0.04, 0.03, 0.00, 0.00, //
            0.03, 0.04, 0.00, 0.00, //
            0.00, 0.00, 0.09, 0.06, //
            0.00, 0.00, 0.06, 0.09,
        ];
        let cov = covariance(&["A", "B", "C", "D"], &values);
        let dendrogram = HierarchicalRiskParity::new(&RiskParityConfig::default())
            .allocate(&cov)
            .unwrap();
        let midpoint = HierarchicalRiskParity::new(&RiskParityConfig {
            bisection: BisectionMode::Midpoint,
            ..RiskParityConfig::default()
        })
        .allocate(&cov)
        .unwrap();
        for (a, b) in dendrogram.weights().iter().zip(midpoint.weights()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        // The low-variance pair gets the larger share.
        assert!(dendrogram.weights()[0] > dendrogram.weights()[2]);
    }
}
