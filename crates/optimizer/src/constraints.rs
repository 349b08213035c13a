use crate::error::OptimizerError;
use core_types::{Constraint, ConstraintSet, CoreError};
use nalgebra::{DMatrix, DVector};

/// A constraint set lowered to `A w = b` and `G w <= h` over a fixed asset order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub g: DMatrix<f64>,
    pub h: DVector<f64>,
}

impl LinearConstraints {
    /// Compiles `set` for the assets in `tickers`. Expected returns are only
    /// needed when the set contains a minimum-return constraint.
    pub fn compile(
        set: &ConstraintSet,
        tickers: &[String],
        expected_returns: Option<&DVector<f64>>,
    ) -> Result<Self, OptimizerError> {
        let n = tickers.len();
        let mut builder = RowBuilder::new(n);

        if set.fully_invested {
            builder.equality(vec![1.0; n], 1.0);
        }

        for constraint in set.iter() {
            match constraint {
                Constraint::LongOnly => {
                    for i in 0..n {
                        builder.inequality(unit(n, i, -1.0), 0.0);
                    }
                }
                Constraint::MaxWeight { limit } => {
                    check_finite(constraint, *limit)?;
                    for i in 0..n {
                        builder.inequality(unit(n, i, 1.0), *limit);
                    }
                }
                Constraint::MinWeight { limit } => {
                    check_finite(constraint, *limit)?;
                    for i in 0..n {
                        builder.inequality(unit(n, i, -1.0), -limit);
                    }
                }
                Constraint::AssetBounds { ticker, lower, upper } => {
                    let i = index_of(tickers, ticker)?;
                    if let (Some(l), Some(u)) = (lower, upper) {
                        if l > u {
                            return Err(OptimizerError::InvalidConstraint(format!(
                                "bounds for {} are inverted ({} > {})",
                                ticker, l, u
                            )));
                        }
                    }
                    if let Some(l) = lower {
                        check_finite(constraint, *l)?;
                        builder.inequality(unit(n, i, -1.0), -l);
                    }
                    if let Some(u) = upper {
                        check_finite(constraint, *u)?;
                        builder.inequality(unit(n, i, 1.0), *u);
                    }
                }
                Constraint::GroupMax { tickers: group, limit } => {
                    check_finite(constraint, *limit)?;
                    builder.inequality(group_row(tickers, group, 1.0)?, *limit);
                }
                Constraint::GroupMin { tickers: group, limit } => {
                    check_finite(constraint, *limit)?;
                    builder.inequality(group_row(tickers, group, -1.0)?, -limit);
                }
                Constraint::LinearInequality { coefficients, bound } => {
                    check_finite(constraint, *bound)?;
                    builder.inequality(coefficient_row(tickers, coefficients)?, *bound);
                }
                Constraint::LinearEquality { coefficients, target } => {
                    check_finite(constraint, *target)?;
                    builder.equality(coefficient_row(tickers, coefficients)?, *target);
                }
                Constraint::MinExpectedReturn { target } => {
                    check_finite(constraint, *target)?;
                    let mu = expected_returns.ok_or(OptimizerError::MissingExpectedReturns)?;
                    if mu.len() != n {
                        return Err(CoreError::DimensionMismatch {
                            context: "expected returns".to_string(),
                            expected: n,
                            actual: mu.len(),
                        }
                        .into());
                    }
                    builder.inequality(mu.iter().map(|m| -m).collect(), -target);
                }
            }
        }

        Ok(builder.finish())
    }

    pub fn num_equalities(&self) -> usize {
        self.a.nrows()
    }

    pub fn num_inequalities(&self) -> usize {
        self.g.nrows()
    }

    /// Largest violation over every row, 0 when `w` is feasible.
    pub fn max_violation(&self, w: &DVector<f64>) -> f64 {
        let equality = if self.a.nrows() == 0 {
            0.0
        } else {
            (&self.a * w - &self.b).amax()
        };
        let inequality = if self.g.nrows() == 0 {
            0.0
        } else {
            (&self.g * w - &self.h).max().max(0.0)
        };
        equality.max(inequality)
    }
}

struct RowBuilder {
    n: usize,
    equalities: Vec<(Vec<f64>, f64)>,
    inequalities: Vec<(Vec<f64>, f64)>,
}

impl RowBuilder {
    fn new(n: usize) -> Self {
        Self { n, equalities: Vec::new(), inequalities: Vec::new() }
    }

    fn equality(&mut self, row: Vec<f64>, rhs: f64) {
        self.equalities.push((row, rhs));
    }

    fn inequality(&mut self, row: Vec<f64>, rhs: f64) {
        self.inequalities.push((row, rhs));
    }

    fn finish(self) -> LinearConstraints {
        let (a, b) = to_matrices(self.n, &self.equalities);
        let (g, h) = to_matrices(self.n, &self.inequalities);
        LinearConstraints { a, b, g, h }
    }
}

fn to_matrices(n: usize, rows: &[(Vec<f64>, f64)]) -> (DMatrix<f64>, DVector<f64>) {
    let matrix = DMatrix::from_fn(rows.len(), n, |r, j| rows[r].0[j]);
    let rhs = DVector::from_fn(rows.len(), |r, _| rows[r].1);
    (matrix, rhs)
}

fn unit(n: usize, i: usize, value: f64) -> Vec<f64> {
    let mut row = vec![0.0; n];
    row[i] = value;
    row
}

fn index_of(tickers: &[String], ticker: &str) -> Result<usize, OptimizerError> {
    tickers
        .iter()
        .position(|t| t == ticker)
        .ok_or_else(|| CoreError::UnknownAsset(ticker.to_string()).into())
}

fn group_row(tickers: &[String], group: &[String], sign: f64) -> Result<Vec<f64>, OptimizerError> {
    if group.is_empty() {
        return Err(OptimizerError::InvalidConstraint(
            "group constraints need at least one ticker".to_string(),
        ));
    }
    let mut row = vec![0.0; tickers.len()];
    for ticker in group {
        row[index_of(tickers, ticker)?] = sign;
    }
    Ok(row)
}

fn coefficient_row(tickers: &[String], coefficients: &[(String, f64)]) -> Result<Vec<f64>, OptimizerError> {
    let mut row = vec![0.0; tickers.len()];
    for (ticker, coefficient) in coefficients {
        if !coefficient.is_finite() {
            return Err(OptimizerError::InvalidConstraint(format!(
                "coefficient for {} is not finite",
                ticker
            )));
        }
        row[index_of(tickers, ticker)?] += coefficient;
    }
    if row.iter().all(|c| *c == 0.0) {
        return Err(OptimizerError::InvalidConstraint(
            "linear constraint has no non-zero coefficient".to_string(),
        ));
    }
    Ok(row)
}

fn check_finite(constraint: &Constraint, value: f64) -> Result<(), OptimizerError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(OptimizerError::InvalidConstraint(format!(
            "{:?} has a non-finite limit",
            constraint
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tickers() -> Vec<String> {
        vec!["SPY".to_string(), "TLT".to_string(), "GLD".to_string()]
    }

    #[test]
    fn budget_and_long_only_rows() {
        let compiled = LinearConstraints::compile(&ConstraintSet::long_only(), &tickers(), None).unwrap();
        assert_eq!(compiled.num_equalities(), 1);
        assert_eq!(compiled.num_inequalities(), 3);
        assert_eq!(compiled.g[(1, 1)], -1.0);
        assert_eq!(compiled.h[1], 0.0);
    }

    #[test]
    fn cash_allowed_drops_the_budget_row() {
        let set = ConstraintSet::new().allow_cash();
        let compiled = LinearConstraints::compile(&set, &tickers(), None).unwrap();
        assert_eq!(compiled.num_equalities(), 0);
    }

    #[test]
    fn group_and_asset_bounds_resolve_tickers() {
        let set = ConstraintSet::new()
            .with(Constraint::GroupMax {
                tickers: vec!["SPY".to_string(), "GLD".to_string()],
                limit: 0.6,
            })
            .with(Constraint::AssetBounds {
                ticker: "TLT".to_string(),
                lower: Some(0.1),
                upper: None,
            });
        let compiled = LinearConstraints::compile(&set, &tickers(), None).unwrap();
        assert_eq!(compiled.g.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 1.0]);
        assert_eq!(compiled.h[0], 0.6);
        assert_eq!(compiled.g.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, -1.0, 0.0]);
        assert_eq!(compiled.h[1], -0.1);
    }

    #[test]
    fn unknown_tickers_and_missing_returns_are_reported() {
        let set = ConstraintSet::new().with(Constraint::AssetBounds {
            ticker: "QQQ".to_string(),
            lower: None,
            upper: Some(0.2),
        });
        assert_eq!(
            LinearConstraints::compile(&set, &tickers(), None).unwrap_err(),
            OptimizerError::Core(CoreError::UnknownAsset("QQQ".to_string()))
        );

        let set = ConstraintSet::new().with(Constraint::MinExpectedReturn { target: 0.01 });
        assert_eq!(
            LinearConstraints::compile(&set, &tickers(), None).unwrap_err(),
            OptimizerError::MissingExpectedReturns
        );
    }
}
