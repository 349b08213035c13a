use crate::error::BacktestError;
use crate::params::RunParameters;
use analytics::{AnalyticsEngine, PerformanceReport, PeriodOutcome};
use chrono::NaiveDate;
use configuration::ReportConfig;
use core_types::Portfolio;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One simulated period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRecord {
    pub date: NaiveDate,
    /// Weights held over the period, after any rebalance at its start.
    pub portfolio: Portfolio,
    /// Return of the held weights before costs.
    pub gross_return: f64,
    pub transaction_cost: f64,
    /// `gross_return - transaction_cost`.
    pub realized_return: f64,
    pub turnover: f64,
    pub rebalanced: bool,
    /// Set when a scheduled rebalance failed and the previous weights were kept.
    pub failure: Option<String>,
}

/// The append-only output of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    run_id: Uuid,
    parameters: RunParameters,
    tickers: Vec<String>,
    records: Vec<BacktestRecord>,
}

impl BacktestResult {
    pub(crate) fn new(run_id: Uuid, parameters: RunParameters, tickers: Vec<String>) -> Self {
        Self {
            run_id,
            parameters,
            tickers,
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: BacktestRecord) {
        self.records.push(record);
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.parameters
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn records(&self) -> &[BacktestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Weights held during the last simulated period.
    pub fn final_portfolio(&self) -> Option<&Portfolio> {
        self.records.last().map(|r| &r.portfolio)
    }

    /// Records whose scheduled rebalance failed.
    pub fn failures(&self) -> impl Iterator<Item = &BacktestRecord> {
        self.records.iter().filter(|r| r.failure.is_some())
    }

    /// Wealth after each period, starting from 1.
    pub fn equity_curve(&self) -> Vec<(NaiveDate, f64)> {
        let mut equity = 1.0;
        self.records
            .iter()
            .map(|r| {
                equity *= 1.0 + r.realized_return;
                (r.date, equity)
            })
            .collect()
    }

    pub fn cumulative_return(&self) -> f64 {
        self.records
            .iter()
            .map(|r| 1.0 + r.realized_return)
            .product::<f64>()
            - 1.0
    }

    pub fn total_turnover(&self) -> f64 {
        self.records.iter().map(|r| r.turnover).sum()
    }

    pub fn outcomes(&self) -> Vec<PeriodOutcome> {
        self.records
            .iter()
            .map(|r| PeriodOutcome {
                date: r.date,
                realized_return: r.realized_return,
                turnover: r.turnover,
            })
            .collect()
    }

    /// Summary statistics of the realized path.
    pub fn performance(&self, config: &ReportConfig) -> Result<PerformanceReport, BacktestError> {
        let engine = AnalyticsEngine::new();
        Ok(engine.calculate(&self.outcomes(), config.risk_free_rate, config.periods_per_year)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use configuration::RebalanceFrequency;

    fn result(returns: &[f64]) -> BacktestResult {
        let tickers = vec!["A".to_string()];
        let mut result = BacktestResult::new(
            Uuid::new_v4(),
            RunParameters {
                allocator: "equal_weight".to_string(),
                lookback: 2,
                rebalance: RebalanceFrequency::Never,
                transaction_cost_rate: 0.0,
            },
            tickers.clone(),
        );
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for (k, r) in returns.iter().enumerate() {
            result.push(BacktestRecord {
                date: start + chrono::Duration::days(k as i64),
                portfolio: Portfolio::equal_weight(tickers.clone()).unwrap(),
                gross_return: *r,
                transaction_cost: 0.0,
                realized_return: *r,
                turnover: if k == 0 { 1.0 } else { 0.0 },
                rebalanced: k == 0,
                failure: None,
            });
        }
        result
    }

    #[test]
    fn equity_curve_compounds_realized_returns() {
        let result = result(&[0.1, -0.1, 0.2]);
        let curve = result.equity_curve();
        assert_relative_eq!(curve[0].1, 1.1, epsilon = 1e-12);
        assert_relative_eq!(curve[2].1, 1.1 * 0.9 * 1.2, epsilon = 1e-12);
        assert_relative_eq!(result.cumulative_return(), 1.1 * 0.9 * 1.2 - 1.0, epsilon = 1e-12);
        assert_eq!(result.total_turnover(), 1.0);
        assert_eq!(result.failures().count(), 0);
    }

    #[test]
    fn performance_matches_analytics() {
        let result = result(&[0.01, 0.02, -0.01, 0.03]);
        let report = result.performance(&ReportConfig::default()).unwrap();
        assert_eq!(report.periods, 4);
        assert_relative_eq!(report.cumulative_return, result.cumulative_return(), epsilon = 1e-12);

        let empty = self::result(&[]);
        assert!(matches!(
            empty.performance(&ReportConfig::default()),
            Err(BacktestError::Analytics(_))
        ));
    }
}
