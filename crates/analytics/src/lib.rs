//! # Meridian Analytics
//!
//! Summary statistics for a simulated return path: compounding, volatility,
//! drawdown, Sharpe and Calmar ratios, and turnover.
//!
//! ## Architectural Principles
//!
//! - **Decoupled:** knows nothing about allocators, risk models or backtest
//!   state. The input is a plain slice of [`PeriodOutcome`]s.
//! - **Stateless Calculation:** [`AnalyticsEngine::calculate`] is a pure
//!   function of its arguments, so identical paths always give identical
//!   reports.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: the calculator.
//! - `PeriodOutcome`: one simulated period (date, realized return, turnover).
//! - `PerformanceReport`: the serializable result.
//! - `AnalyticsError`: returned for empty or non-finite input.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::{PerformanceReport, PeriodOutcome};
