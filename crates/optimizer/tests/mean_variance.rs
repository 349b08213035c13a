use approx::assert_relative_eq;
use configuration::MeanVarianceConfig;
use core_types::{Constraint, CovarianceMatrix};
use nalgebra::{DMatrix, DVector};
use optimizer::{MeanVarianceOptimizer, OptimizerError};
use proptest::prelude::*;

fn tickers(n: usize) -> Vec<String> {
    ["SPY", "TLT", "GLD", "EFA", "VNQ"][..n]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

fn covariance(n: usize, values: &[f64]) -> CovarianceMatrix {
    CovarianceMatrix::from_row_slice(tickers(n), values).unwrap()
}

fn budget_only() -> MeanVarianceConfig {
    MeanVarianceConfig {
        constraints: vec![],
        ..MeanVarianceConfig::default()
    }
}

/// `Σ⁻¹1 / (1ᵀΣ⁻¹1)`
fn closed_form_min_variance(cov: &CovarianceMatrix) -> Vec<f64> {
    let inverse = cov.matrix().clone().try_inverse().unwrap();
    let raw = inverse * DVector::from_element(cov.dim(), 1.0);
    let total = raw.sum();
    raw.iter().map(|v| v / total).collect()
}

fn assert_weights(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_relative_eq!(*a, *e, epsilon = 1e-8);
    }
}

#[test]
fn min_variance_matches_closed_form_for_diagonal_covariance() {
    let cov = covariance(3, &[0.04, 0.0, 0.0, 0.0, 0.09, 0.0, 0.0, 0.0, 0.16]);
    let optimizer = MeanVarianceOptimizer::new(&budget_only()).unwrap();
    let portfolio = optimizer.optimize(&cov, None).unwrap();

    let inverse_variances = [1.0 / 0.04, 1.0 / 0.09, 1.0 / 0.16];
    let total: f64 = inverse_variances.iter().sum();
    let expected: Vec<f64> = inverse_variances.iter().map(|v| v / total).collect();
    assert_weights(portfolio.weights(), &expected);
    assert_weights(portfolio.weights(), &closed_form_min_variance(&cov));
}

#[test]
fn min_variance_matches_closed_form_for_correlated_covariances() {
    let two = covariance(2, &[0.04, 0.006, 0.006, 0.09]);
    let three = covariance(
        3,
        &[0.04, 0.006, -0.004, 0.006, 0.09, 0.012, -0.004, 0.012, 0.0625],
    );
    let optimizer = MeanVarianceOptimizer::new(&budget_only()).unwrap();

    let portfolio = optimizer.optimize(&two, None).unwrap();
    assert_weights(portfolio.weights(), &[0.084 / 0.118, 0.034 / 0.118]);

    let portfolio = optimizer.optimize(&three, None).unwrap();
    assert_weights(portfolio.weights(), &closed_form_min_variance(&three));
    assert_relative_eq!(portfolio.invested_weight(), 1.0, epsilon = 1e-10);
}

#[test]
fn long_only_binds_when_the_unconstrained_optimum_shorts() {
    // Unconstrained minimum variance is roughly (-0.57, 1.57).
    let cov = covariance(2, &[0.04, 0.018, 0.018, 0.01]);
    let optimizer = MeanVarianceOptimizer::new(&MeanVarianceConfig::default()).unwrap();
    let portfolio = optimizer.optimize(&cov, None).unwrap();
    assert_weights(portfolio.weights(), &[0.0, 1.0]);
}

#[test]
fn risk_aversion_tilts_towards_higher_expected_returns() {
    let cov = covariance(2, &[0.04, 0.0, 0.0, 0.04]);
    let mu = DVector::from_vec(vec![0.10, 0.02]);
    let config = MeanVarianceConfig {
        risk_aversion: 1.0,
        ..budget_only()
    };
    let optimizer = MeanVarianceOptimizer::new(&config).unwrap();
    assert!(optimizer.requires_expected_returns());

    // 0.08·(w1 − w2) = μ1 − μ2 together with w1 + w2 = 1.
    let portfolio = optimizer.optimize(&cov, Some(&mu)).unwrap();
    assert_weights(portfolio.weights(), &[1.0, 0.0]);

    assert_eq!(
        optimizer.optimize(&cov, None).unwrap_err(),
        OptimizerError::MissingExpectedReturns
    );
}

#[test]
fn minimum_return_floor_is_respected() {
    let cov = covariance(2, &[0.04, 0.0, 0.0, 0.04]);
    let mu = DVector::from_vec(vec![0.10, 0.02]);
    let config = MeanVarianceConfig {
        constraints: vec![Constraint::LongOnly, Constraint::MinExpectedReturn { target: 0.08 }],
        ..MeanVarianceConfig::default()
    };
    let optimizer = MeanVarianceOptimizer::new(&config).unwrap();
    let portfolio = optimizer.optimize(&cov, Some(&mu)).unwrap();
    assert_weights(portfolio.weights(), &[0.75, 0.25]);
}

#[test]
fn infeasible_bounds_are_reported() {
    let cov = covariance(3, &[0.04, 0.0, 0.0, 0.0, 0.09, 0.0, 0.0, 0.0, 0.16]);
    let config = MeanVarianceConfig {
        constraints: vec![Constraint::LongOnly, Constraint::MaxWeight { limit: 0.2 }],
        ..MeanVarianceConfig::default()
    };
    let optimizer = MeanVarianceOptimizer::new(&config).unwrap();
    assert!(matches!(
        optimizer.optimize(&cov, None),
        Err(OptimizerError::InfeasibleConstraints(_))
    ));

    let config = MeanVarianceConfig {
        constraints: vec![Constraint::LinearEquality {
            coefficients: tickers(3).into_iter().map(|t| (t, 1.0)).collect(),
            target: 0.5,
        }],
        ..MeanVarianceConfig::default()
    };
    let optimizer = MeanVarianceOptimizer::new(&config).unwrap();
    assert!(matches!(
        optimizer.optimize(&cov, None),
        Err(OptimizerError::InfeasibleConstraints(_))
    ));
}

#[test]
fn redundant_equalities_are_tolerated() {
    let cov = covariance(2, &[0.04, 0.006, 0.006, 0.09]);
    let config = MeanVarianceConfig {
        constraints: vec![Constraint::LinearEquality {
            coefficients: vec![("SPY".to_string(), 2.0), ("TLT".to_string(), 2.0)],
            target: 2.0,
        }],
        ..MeanVarianceConfig::default()
    };
    let portfolio = MeanVarianceOptimizer::new(&config).unwrap().optimize(&cov, None).unwrap();
    assert_weights(portfolio.weights(), &[0.084 / 0.118, 0.034 / 0.118]);
}

#[test]
fn duplicate_assets_are_ill_conditioned() {
    let cov = covariance(3, &[0.04, 0.04, 0.0, 0.04, 0.04, 0.0, 0.0, 0.0, 0.09]);
    let optimizer = MeanVarianceOptimizer::new(&MeanVarianceConfig::default()).unwrap();
    match optimizer.optimize(&cov, None) {
        Err(OptimizerError::IllConditionedCovariance { condition_number, threshold }) => {
            assert!(condition_number > threshold);
            assert_eq!(threshold, 1e10);
        }
        other => panic!("expected an ill-conditioned covariance, got {:?}", other),
    }
}

#[test]
fn cash_is_allowed_when_not_fully_invested() {
    let cov = covariance(2, &[0.04, 0.0, 0.0, 0.09]);
    let config = MeanVarianceConfig {
        fully_invested: false,
        ..MeanVarianceConfig::default()
    };
    let portfolio = MeanVarianceOptimizer::new(&config).unwrap().optimize(&cov, None).unwrap();
    assert!(portfolio.allows_cash());
    assert_relative_eq!(portfolio.cash_weight(), 1.0, epsilon = 1e-10);
}

fn covariance_strategy() -> impl Strategy<Value = CovarianceMatrix> {
    prop::collection::vec(-0.1..0.1f64, 16).prop_map(|values| {
        let b = DMatrix::from_row_slice(4, 4, &values);
        let sigma = &b * b.transpose() + DMatrix::identity(4, 4) * 0.01;
        CovarianceMatrix::new(tickers(4), sigma).unwrap()
    })
}

proptest! {
    #[test]
    fn bounded_solutions_sum_to_one_and_respect_bounds(
        cov in covariance_strategy(),
        mu in prop::collection::vec(-0.05..0.05f64, 4),
        risk_aversion in 0.0..2.0f64,
    ) {
        let config = MeanVarianceConfig {
            risk_aversion,
            constraints: vec![Constraint::LongOnly, Constraint::MaxWeight { limit: 0.4 }],
            ..MeanVarianceConfig::default()
        };
        let mu = DVector::from_vec(mu);
        let optimizer = MeanVarianceOptimizer::new(&config).unwrap();
        let portfolio = optimizer.optimize(&cov, Some(&mu)).unwrap();

        prop_assert!((portfolio.invested_weight() - 1.0).abs() <= 1e-6);
        for w in portfolio.weights() {
            prop_assert!(*w >= -1e-8 && *w <= 0.4 + 1e-8);
        }

        // Equal weights are feasible, so the optimum can be no worse.
        let objective = |w: &[f64]| {
            cov.portfolio_variance(w).unwrap()
                - risk_aversion * w.iter().zip(mu.iter()).map(|(a, b)| a * b).sum::<f64>()
        };
        prop_assert!(objective(portfolio.weights()) <= objective(&[0.25; 4]) + 1e-10);
    }
}
