//! # Meridian Backtester
//!
//! Walk-forward simulation of an allocation policy over historical returns.
//!
//! ## Architectural Principles
//!
//! - **One seam:** every allocation policy sits behind [`PortfolioAllocator`],
//!   so mean-variance, risk-parity and naive baselines are simulated by the
//!   same loop.
//! - **No look-ahead:** weights for period `t` are estimated only from the
//!   returns of periods strictly before `t`.
//! - **Owned state:** the simulation cursor lives inside a single call to
//!   [`BacktestEngine::run`]; engines never share mutable state, which is what
//!   lets [`run_sweep`] fan runs out across threads.
//!
//! ## Public API
//!
//! - [`BacktestEngine`]: the state machine that produces a [`BacktestResult`].
//! - [`create_allocator`]: builds the configured [`PortfolioAllocator`].
//! - [`generate_trade_list`]: orders that move capital between two portfolios.
//! - [`run_sweep`]: parallel parameter grid, ranked by Sharpe ratio.

pub mod allocation;
pub mod engine;
pub mod error;
pub mod params;
pub mod result;
pub mod schedule;
pub mod sweep;
pub mod trades;

pub use allocation::{
    EqualWeightAllocator, InverseVarianceAllocator, PortfolioAllocator, allocate_window,
    create_allocator,
};
pub use engine::{BacktestEngine, EngineState};
pub use error::{AllocationError, BacktestError};
pub use params::RunParameters;
pub use result::{BacktestRecord, BacktestResult};
pub use schedule::RebalanceSchedule;
pub use sweep::{SweepOutcome, SweepPoint, parameter_grid, run_sweep};
pub use trades::{TradeInstruction, generate_trade_list};
