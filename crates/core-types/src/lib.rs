pub mod constraints;
pub mod covariance;
pub mod enums;
pub mod error;
pub mod history;
pub mod portfolio;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use constraints::{Constraint, ConstraintSet};
pub use covariance::CovarianceMatrix;
pub use enums::{AssetClass, GapPolicy, OrderSide, ReturnKind};
pub use error::CoreError;
pub use history::{PriceHistory, ReturnMatrix};
pub use portfolio::{Portfolio, WEIGHT_SUM_TOLERANCE};
pub use structs::Asset;
