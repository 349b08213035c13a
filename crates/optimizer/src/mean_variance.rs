use crate::active_set::ActiveSetSolver;
use crate::constraints::LinearConstraints;
use crate::error::OptimizerError;
use crate::qp::{QpProblem, QpSolver};
use configuration::MeanVarianceConfig;
use core_types::{ConstraintSet, CoreError, CovarianceMatrix, Portfolio};
use nalgebra::DVector;

/// Violations above this after a successful solve indicate a solver defect.
const POST_SOLVE_TOLERANCE: f64 = 1e-7;

/// Solves `min wᵀΣw − λ·μᵀw` subject to a [`ConstraintSet`].
///
/// The covariance is checked, never repaired: an ill-conditioned matrix is
/// rejected before any solve is attempted.
#[derive(Debug)]
pub struct MeanVarianceOptimizer {
    risk_aversion: f64,
    max_condition_number: f64,
    constraints: ConstraintSet,
    solver: Box<dyn QpSolver>,
}

impl MeanVarianceOptimizer {
    /// Creates an optimizer backed by the active-set solver.
    pub fn new(config: &MeanVarianceConfig) -> Result<Self, OptimizerError> {
        Self::with_solver(config, Box::new(ActiveSetSolver::new(&config.solver)))
    }

    /// Creates an optimizer backed by any [`QpSolver`].
    pub fn with_solver(
        config: &MeanVarianceConfig,
        solver: Box<dyn QpSolver>,
    ) -> Result<Self, OptimizerError> {
        if !config.risk_aversion.is_finite() || config.risk_aversion < 0.0 {
            return Err(OptimizerError::InvalidConstraint(format!(
                "risk aversion must be a non-negative number, got {}",
                config.risk_aversion
            )));
        }
        Ok(Self {
            risk_aversion: config.risk_aversion,
            max_condition_number: config.max_condition_number,
            constraints: config.constraint_set(),
            solver,
        })
    }

    /// Expected returns are needed for a positive λ or a return floor.
    pub fn requires_expected_returns(&self) -> bool {
        self.risk_aversion > 0.0 || self.constraints.needs_expected_returns()
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn optimize(
        &self,
        covariance: &CovarianceMatrix,
        expected_returns: Option<&DVector<f64>>,
    ) -> Result<Portfolio, OptimizerError> {
        let n = covariance.dim();

        // --- 1. Validation ---
        if let Some(mu) = expected_returns {
            if mu.len() != n {
                return Err(CoreError::DimensionMismatch {
                    context: "expected returns".to_string(),
                    expected: n,
                    actual: mu.len(),
                }
                .into());
            }
        }
        if self.requires_expected_returns() && expected_returns.is_none() {
            return Err(OptimizerError::MissingExpectedReturns);
        }

        let condition_number = covariance.condition_number();
        if condition_number > self.max_condition_number {
            tracing::debug!(condition_number, threshold = self.max_condition_number, "Covariance rejected.");
            return Err(OptimizerError::IllConditionedCovariance {
                condition_number,
                threshold: self.max_condition_number,
            });
        }

        // --- 2. Build the QP: Q = 2Σ, c = −λμ ---
        let linear = LinearConstraints::compile(&self.constraints, covariance.tickers(), expected_returns)?;
        let q = covariance.matrix() * 2.0;
        let c = match expected_returns {
            Some(mu) if self.risk_aversion > 0.0 => mu * -self.risk_aversion,
            _ => DVector::zeros(n),
        };
        let problem = QpProblem::new(q, c)?
            .with_equalities(linear.a.clone(), linear.b.clone())?
            .with_inequalities(linear.g.clone(), linear.h.clone())?;

        // --- 3. Solve and verify ---
        let solution = self.solver.solve(&problem)?;
        let violation = linear.max_violation(&solution.x);
        if violation > POST_SOLVE_TOLERANCE {
            return Err(OptimizerError::Solver(format!(
                "solution violates the constraints by {:.3e}",
                violation
            )));
        }
        tracing::debug!(
            iterations = solution.iterations,
            objective = solution.objective,
            condition_number,
            "Mean-variance portfolio solved."
        );

        let tickers = covariance.tickers().to_vec();
        let weights: Vec<f64> = solution.x.iter().copied().collect();
        let portfolio = if self.constraints.fully_invested {
            Portfolio::new(tickers, weights)?
        } else {
            Portfolio::with_cash(tickers, weights)?
        };
        Ok(portfolio)
    }
}
