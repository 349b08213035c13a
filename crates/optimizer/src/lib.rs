//! # Meridian Optimizer
//!
//! Mean-variance portfolio construction on top of a small quadratic
//! programming layer.
//!
//! - `qp`: the [`QpProblem`] description and the [`QpSolver`] seam.
//! - `active_set`: the default primal active-set backend with a phase-1
//!   feasibility search.
//! - `constraints`: lowering of declarative constraints to matrices.
//! - `mean_variance`: the [`MeanVarianceOptimizer`] itself.

pub mod active_set;
pub mod constraints;
pub mod error;
pub mod mean_variance;
pub mod qp;

pub use active_set::ActiveSetSolver;
pub use constraints::LinearConstraints;
pub use error::OptimizerError;
pub use mean_variance::MeanVarianceOptimizer;
pub use qp::{QpProblem, QpSolution, QpSolver};
