//! # Meridian Risk Parity
//!
//! Allocators that size positions by risk instead of by expected return:
//!
//! - [`EqualRiskContribution`]: every asset contributes the same share of
//!   portfolio variance.
//! - [`HierarchicalRiskParity`]: clusters assets by correlation and splits
//!   weight top-down through the resulting tree.
//! - [`inverse_variance_weights`]: the naive baseline both improve on.
//!
//! Every allocator is a pure function of the covariance it is given.

pub mod dendrogram;
pub mod erc;
pub mod error;
pub mod hrp;

pub use dendrogram::{ClusterNode, Dendrogram};
pub use erc::{EqualRiskContribution, relative_risk_contributions, risk_contributions};
pub use error::RiskParityError;
pub use hrp::{HierarchicalRiskParity, inverse_variance_weights};

use core_types::{CovarianceMatrix, Portfolio};

/// The shared contract of the risk-based allocators.
///
/// The `Send + Sync` bounds let allocators run inside the parallel sweep.
pub trait RiskParityAllocator: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Long-only, fully invested weights for the assets of `covariance`.
    fn allocate(&self, covariance: &CovarianceMatrix) -> Result<Portfolio, RiskParityError>;
}
