use crate::error::OptimizerError;
use crate::qp::{QpProblem, QpSolution, QpSolver};
use configuration::SolverConfig;
use nalgebra::{DMatrix, DVector};

/// Proximal weight of the phase-1 objective; small so the slack term dominates.
const PHASE_ONE_PROXIMAL: f64 = 1e-4;

/// Rows whose residual after projection falls below this (relative) norm are
/// treated as linear combinations of earlier rows.
const RANK_TOLERANCE: f64 = 1e-10;

/// Primal active-set method for convex QPs.
///
/// Each iteration solves the equality-constrained subproblem on the current
/// working set through its KKT system. A step is either cut short by a
/// blocking inequality (which joins the working set) or completed, after which
/// the inequality with the most negative multiplier leaves the working set. A
/// feasible starting point comes from a slack-augmented phase-1 problem.
#[derive(Debug, Clone, Copy)]
pub struct ActiveSetSolver {
    max_iterations: usize,
    tolerance: f64,
    feasibility_tolerance: f64,
}

impl Default for ActiveSetSolver {
    fn default() -> Self {
        Self::new(&SolverConfig::default())
    }
}

impl ActiveSetSolver {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations.max(1),
            tolerance: config.tolerance,
            feasibility_tolerance: 1e-8,
        }
    }

    /// Finds a point satisfying every constraint, or reports that none exists.
    ///
    /// `full` is the problem as posed; `problem` is the same problem with
    /// redundant equality rows removed. Consistency is judged on `full`.
    fn feasible_start(
        &self,
        full: &QpProblem,
        problem: &QpProblem,
    ) -> Result<DVector<f64>, OptimizerError> {
        let n = problem.num_vars();

        // --- 1. Closest point to the equally weighted one satisfying Ax = b ---
        let reference = DVector::from_element(n, 1.0 / n as f64);
        let x0 = if full.a.nrows() == 0 {
            reference
        } else {
            let residual = &full.b - &full.a * &reference;
            let correction = full
                .a
                .clone()
                .svd(true, true)
                .solve(&residual, RANK_TOLERANCE)
                .map_err(|e| OptimizerError::Solver(e.to_string()))?;
            reference + correction
        };
        let equality_residual = full.max_equality_residual(&x0);
        if equality_residual > self.feasibility_tolerance {
            return Err(OptimizerError::InfeasibleConstraints(format!(
                "equality constraints are inconsistent (residual {:.3e})",
                equality_residual
            )));
        }

        let violation = problem.max_inequality_violation(&x0);
        if violation <= self.feasibility_tolerance {
            return Ok(x0);
        }

        // --- 2. Phase 1: minimize the slack s in Gx - s <= h, s >= 0 ---
        // Variables are (x, s). The proximal term keeps the KKT systems nonsingular.
        let p = problem.g.nrows();
        let m = problem.a.nrows();
        let q = DMatrix::identity(n + 1, n + 1) * PHASE_ONE_PROXIMAL;
        let mut c = DVector::zeros(n + 1);
        for j in 0..n {
            c[j] = -PHASE_ONE_PROXIMAL * x0[j];
        }
        c[n] = 1.0;

        let a = DMatrix::from_fn(m, n + 1, |i, j| if j < n { problem.a[(i, j)] } else { 0.0 });
        let g = DMatrix::from_fn(p + 1, n + 1, |i, j| match (i < p, j < n) {
            (true, true) => problem.g[(i, j)],
            (true, false) => -1.0,
            (false, true) => 0.0,
            (false, false) => -1.0,
        });
        let h = DVector::from_fn(p + 1, |i, _| if i < p { problem.h[i] } else { 0.0 });

        let phase_one = QpProblem::new(q, c)?
            .with_equalities(a, problem.b.clone())?
            .with_inequalities(g, h)?;

        let mut start = DVector::zeros(n + 1);
        start.rows_mut(0, n).copy_from(&x0);
        start[n] = violation;

        let (y, iterations) = self.iterate(&phase_one, start)?;
        let slack = y[n];
        tracing::debug!(iterations, slack, "Phase 1 finished.");
        if slack > self.feasibility_tolerance {
            return Err(OptimizerError::InfeasibleConstraints(format!(
                "no weight vector satisfies every constraint (minimum violation {:.3e})",
                slack
            )));
        }
        Ok(y.rows(0, n).into_owned())
    }

    /// Runs the active-set iterations from a feasible `x`.
    fn iterate(
        &self,
        problem: &QpProblem,
        mut x: DVector<f64>,
    ) -> Result<(DVector<f64>, usize), OptimizerError> {
        let m = problem.a.nrows();
        let mut working_set: Vec<usize> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let gradient = &problem.q * &x + &problem.c;
            let rows = stack_rows(&problem.a, &problem.g, &working_set);
            let (step, multipliers) = solve_kkt(&problem.q, &gradient, &rows)?;

            // --- Ratio test against inequalities outside the working set ---
            let step_norm = step.norm();
            let directions = &problem.g * &step;
            let levels = &problem.g * &x;
            let mut alpha = 1.0;
            let mut blocking = None;
            for i in 0..problem.g.nrows() {
                if working_set.contains(&i) {
                    continue;
                }
                let direction = directions[i];
                if direction <= RANK_TOLERANCE * problem.g.row(i).norm() * step_norm {
                    continue;
                }
                let slack = (problem.h[i] - levels[i]).max(0.0);
                let limit = slack / direction;
                if limit < alpha {
                    alpha = limit;
                    blocking = Some(i);
                }
            }

            x += &step * alpha;

            if let Some(i) = blocking {
                working_set.push(i);
                continue;
            }

            // --- Full step taken: x minimizes over the working set ---
            let most_negative = working_set
                .iter()
                .enumerate()
                .map(|(k, &row)| (k, row, multipliers[m + k]))
                .min_by(|a, b| a.2.total_cmp(&b.2));

            match most_negative {
                Some((k, _, multiplier)) if multiplier < -self.tolerance => {
                    working_set.remove(k);
                }
                _ => return Ok((x, iteration)),
            }
        }

        Err(OptimizerError::Solver(format!(
            "active-set method did not converge within {} iterations",
            self.max_iterations
        )))
    }
}

impl QpSolver for ActiveSetSolver {
    fn solve(&self, problem: &QpProblem) -> Result<QpSolution, OptimizerError> {
        let reduced = drop_dependent_equalities(problem);
        let start = self.feasible_start(problem, &reduced)?;
        let (x, iterations) = self.iterate(&reduced, start)?;

        if x.iter().any(|v| !v.is_finite()) {
            return Err(OptimizerError::Solver("solution contains non-finite values".to_string()));
        }
        let objective = reduced.objective(&x);
        tracing::debug!(
            iterations,
            objective,
            variables = reduced.num_vars(),
            equalities = reduced.a.nrows(),
            inequalities = reduced.g.nrows(),
            "Active-set solve converged."
        );
        Ok(QpSolution { x, objective, iterations })
    }
}

/// Equality rows followed by the working inequality rows.
fn stack_rows(a: &DMatrix<f64>, g: &DMatrix<f64>, working_set: &[usize]) -> DMatrix<f64> {
    let m = a.nrows();
    DMatrix::from_fn(m + working_set.len(), a.ncols(), |r, j| {
        if r < m { a[(r, j)] } else { g[(working_set[r - m], j)] }
    })
}

/// Solves `[Q Cᵀ; C 0] [p; z] = [-∇f; 0]`.
fn solve_kkt(
    q: &DMatrix<f64>,
    gradient: &DVector<f64>,
    rows: &DMatrix<f64>,
) -> Result<(DVector<f64>, DVector<f64>), OptimizerError> {
    let n = q.nrows();
    let k = rows.nrows();
    let mut kkt = DMatrix::zeros(n + k, n + k);
    kkt.view_mut((0, 0), (n, n)).copy_from(q);
    kkt.view_mut((0, n), (n, k)).copy_from(&rows.transpose());
    kkt.view_mut((n, 0), (k, n)).copy_from(rows);

    let mut rhs = DVector::zeros(n + k);
    for i in 0..n {
        rhs[i] = -gradient[i];
    }

    let solution = kkt
        .lu()
        .solve(&rhs)
        .ok_or_else(|| OptimizerError::Solver("KKT system is singular".to_string()))?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(OptimizerError::Solver("KKT system is numerically singular".to_string()));
    }
    Ok((solution.rows(0, n).into_owned(), solution.rows(n, k).into_owned()))
}

/// Removes equality rows that are linear combinations of earlier ones.
fn drop_dependent_equalities(problem: &QpProblem) -> QpProblem {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();
    for i in 0..problem.a.nrows() {
        let row = problem.a.row(i).transpose();
        let scale = row.norm();
        if scale == 0.0 {
            continue;
        }
        let mut residual = row.clone();
        for e in &basis {
            let projection = residual.dot(e);
            residual -= e * projection;
        }
        let residual_norm = residual.norm();
        if residual_norm > RANK_TOLERANCE * scale {
            basis.push(residual / residual_norm);
            kept.push(i);
        }
    }

    if kept.len() == problem.a.nrows() {
        return problem.clone();
    }
    let n = problem.num_vars();
    let mut reduced = problem.clone();
    reduced.a = DMatrix::from_fn(kept.len(), n, |r, j| problem.a[(kept[r], j)]);
    reduced.b = DVector::from_fn(kept.len(), |r, _| problem.b[kept[r]]);
    reduced
}
