use crate::engine::BacktestEngine;
use crate::error::BacktestError;
use analytics::PerformanceReport;
use configuration::{AllocationMethod, Config, RebalanceFrequency, SweepConfig};
use core_types::ReturnMatrix;
use itertools::iproduct;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// One combination of the sweep grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub lookback: usize,
    pub method: AllocationMethod,
    pub rebalance: RebalanceFrequency,
    pub transaction_cost_rate: f64,
}

impl SweepPoint {
    /// `base` with this point's values substituted in.
    pub fn apply(&self, base: &Config) -> Config {
        let mut config = base.clone();
        config.risk_model.lookback = self.lookback;
        config.allocation.method = self.method;
        config.backtest.rebalance = self.rebalance.clone();
        config.backtest.transaction_cost_rate = self.transaction_cost_rate;
        config
    }
}

/// What one grid point produced. Exactly one of `report` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub point: SweepPoint,
    pub run_id: Option<Uuid>,
    pub report: Option<PerformanceReport>,
    pub error: Option<String>,
}

impl SweepOutcome {
    pub fn sharpe_ratio(&self) -> Option<f64> {
        self.report.as_ref().and_then(|r| r.sharpe_ratio)
    }
}

/// Every combination of the configured values, lookbacks varying slowest.
pub fn parameter_grid(sweep: &SweepConfig) -> Vec<SweepPoint> {
    iproduct!(
        sweep.lookbacks.iter(),
        sweep.methods.iter(),
        sweep.rebalance.iter(),
        sweep.transaction_cost_rates.iter()
    )
    .map(|(lookback, method, rebalance, rate)| SweepPoint {
        lookback: *lookback,
        method: *method,
        rebalance: rebalance.clone(),
        transaction_cost_rate: *rate,
    })
    .collect()
}

/// Runs every point of `base.sweep` over `returns` in parallel.
///
/// Each run builds its own risk model and allocator; only the returns are
/// shared. `on_complete` is called from worker threads as runs finish.
/// Outcomes come back ranked by Sharpe ratio, best first, with runs that
/// have no Sharpe ratio or failed at the end.
pub fn run_sweep<F>(returns: &ReturnMatrix, base: &Config, on_complete: F) -> Vec<SweepOutcome>
where
    F: Fn(&SweepOutcome) + Sync,
{
    let grid = parameter_grid(&base.sweep);
    tracing::info!(
        runs = grid.len(),
        threads = rayon::current_num_threads(),
        "Parameter sweep started."
    );

    let mut outcomes: Vec<SweepOutcome> = grid
        .into_par_iter()
        .map(|point| {
            let config = point.apply(base);
            let outcome = match run_point(returns, &config) {
                Ok((run_id, report)) => SweepOutcome {
                    point,
                    run_id: Some(run_id),
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(method = %point.method, lookback = point.lookback, error = %e, "Sweep run failed.");
                    SweepOutcome {
                        point,
                        run_id: None,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            on_complete(&outcome);
            outcome
        })
        .collect();

    rank(&mut outcomes);
    tracing::info!(
        completed = outcomes.iter().filter(|o| o.report.is_some()).count(),
        failed = outcomes.iter().filter(|o| o.error.is_some()).count(),
        "Parameter sweep finished."
    );
    outcomes
}

fn run_point(returns: &ReturnMatrix, config: &Config) -> Result<(Uuid, PerformanceReport), BacktestError> {
    let engine = BacktestEngine::new(config)?;
    let result = engine.run_returns(returns)?;
    let report = result.performance(&config.report)?;
    Ok((result.run_id(), report))
}

/// Best Sharpe first. The sort is stable, so ties keep grid order.
fn rank(outcomes: &mut [SweepOutcome]) {
    outcomes.sort_by(|a, b| match (a.sharpe_ratio(), b.sharpe_ratio()) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.report.is_none().cmp(&b.report.is_none()),
    });
}
