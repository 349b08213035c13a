use crate::error::OptimizerError;
use nalgebra::{DMatrix, DVector};

/// A convex quadratic program
///
/// ```text
/// minimize    ½ xᵀQx + cᵀx
/// subject to  A x  = b
///             G x <= h
/// ```
///
/// `A` and `G` may have zero rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QpProblem {
    pub q: DMatrix<f64>,
    pub c: DVector<f64>,
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    pub g: DMatrix<f64>,
    pub h: DVector<f64>,
}

impl QpProblem {
    /// An unconstrained problem; add rows with the `with_*` builders.
    pub fn new(q: DMatrix<f64>, c: DVector<f64>) -> Result<Self, OptimizerError> {
        let n = c.len();
        if q.nrows() != n || q.ncols() != n {
            return Err(OptimizerError::Solver(format!(
                "objective matrix is {}x{} but there are {} variables",
                q.nrows(),
                q.ncols(),
                n
            )));
        }
        Ok(Self {
            q,
            c,
            a: DMatrix::zeros(0, n),
            b: DVector::zeros(0),
            g: DMatrix::zeros(0, n),
            h: DVector::zeros(0),
        })
    }

    pub fn with_equalities(mut self, a: DMatrix<f64>, b: DVector<f64>) -> Result<Self, OptimizerError> {
        check_rows("equality", &a, &b, self.num_vars())?;
        self.a = a;
        self.b = b;
        Ok(self)
    }

    pub fn with_inequalities(mut self, g: DMatrix<f64>, h: DVector<f64>) -> Result<Self, OptimizerError> {
        check_rows("inequality", &g, &h, self.num_vars())?;
        self.g = g;
        self.h = h;
        Ok(self)
    }

    pub fn num_vars(&self) -> usize {
        self.c.len()
    }

    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.q * x)) + self.c.dot(x)
    }

    /// Largest violation `max(Gx - h)` of the inequality rows, 0 when there are none.
    pub fn max_inequality_violation(&self, x: &DVector<f64>) -> f64 {
        if self.g.nrows() == 0 {
            return 0.0;
        }
        (&self.g * x - &self.h).max().max(0.0)
    }

    /// Largest absolute residual `|Ax - b|` of the equality rows.
    pub fn max_equality_residual(&self, x: &DVector<f64>) -> f64 {
        if self.a.nrows() == 0 {
            return 0.0;
        }
        (&self.a * x - &self.b).amax()
    }
}

fn check_rows(kind: &str, m: &DMatrix<f64>, rhs: &DVector<f64>, n: usize) -> Result<(), OptimizerError> {
    if m.ncols() != n || m.nrows() != rhs.len() {
        return Err(OptimizerError::Solver(format!(
            "{} block is {}x{} with {} right-hand sides, expected {} columns",
            kind,
            m.nrows(),
            m.ncols(),
            rhs.len(),
            n
        )));
    }
    if m.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return Err(OptimizerError::InvalidConstraint(format!(
            "{} block contains non-finite values",
            kind
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    pub x: DVector<f64>,
    pub objective: f64,
    pub iterations: usize,
}

/// The seam between portfolio construction and the numerical backend.
pub trait QpSolver: Send + Sync + std::fmt::Debug {
    fn solve(&self, problem: &QpProblem) -> Result<QpSolution, OptimizerError>;
}
