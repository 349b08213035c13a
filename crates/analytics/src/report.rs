use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The realized outcome of one simulated period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    pub date: NaiveDate,
    /// Return after transaction costs.
    pub realized_return: f64,
    pub turnover: f64,
}

/// A standardized summary of a backtest's performance.
///
/// Returns and drawdowns are fractions (0.05 is 5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Coverage
    pub periods: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    // II. Returns
    pub cumulative_return: f64,
    pub annualized_return: f64,
    pub best_period_return: f64,
    pub worst_period_return: f64,

    // III. Risk and Drawdown
    pub annualized_volatility: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: Option<f64>, // Option<> for cases with no stdev
    pub calmar_ratio: Option<f64>, // Option<> for cases with no drawdown

    // IV. Trading
    pub total_turnover: f64,
    pub average_turnover: f64,
}

impl PerformanceReport {
    /// Creates a new, zeroed-out PerformanceReport.
    pub fn new() -> Self {
        Self {
            periods: 0,
            start_date: None,
            end_date: None,
            cumulative_return: 0.0,
            annualized_return: 0.0,
            best_period_return: 0.0,
            worst_period_return: 0.0,
            annualized_volatility: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: None,
            calmar_ratio: None,
            total_turnover: 0.0,
            average_turnover: 0.0,
        }
    }
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self::new()
    }
}
