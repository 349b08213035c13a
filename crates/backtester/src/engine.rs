use crate::allocation::{PortfolioAllocator, allocate_window, create_allocator};
use crate::error::{AllocationError, BacktestError};
use crate::params::RunParameters;
use crate::result::{BacktestRecord, BacktestResult};
use crate::schedule::RebalanceSchedule;
use chrono::NaiveDate;
use configuration::{BacktestConfig, Config};
use core_types::{CoreError, Portfolio, PriceHistory, ReturnKind, ReturnMatrix};
use risk::RiskModel;
use uuid::Uuid;

/// Where the simulation cursor is within the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not enough trailing returns yet for a first estimate.
    AwaitingWindow,
    Rebalancing,
    Holding,
    Terminated,
}

/// Walk-forward simulation of one allocation policy.
///
/// At every scheduled period the engine estimates risk from the `lookback`
/// returns strictly before that period, asks the allocator for target
/// weights, pays `transaction_cost_rate × turnover` and then lets the weights
/// drift with asset returns until the next rebalance.
///
/// A failed rebalance keeps the previous weights (cash before the first
/// success) and is recorded on that period. A second consecutive failure
/// aborts the run with [`BacktestError::RebalanceAborted`].
#[derive(Debug)]
pub struct BacktestEngine {
    risk_model: RiskModel,
    allocator: Box<dyn PortfolioAllocator>,
    schedule: RebalanceSchedule,
    parameters: RunParameters,
}

impl BacktestEngine {
    /// Builds the risk model and allocator named in the configuration.
    pub fn new(config: &Config) -> Result<Self, BacktestError> {
        let risk_model = RiskModel::new(&config.risk_model)?;
        let allocator = create_allocator(&config.allocation)?;
        Self::from_parts(risk_model, allocator, config.risk_model.lookback, &config.backtest)
    }

    /// Assembles an engine around any allocator.
    pub fn from_parts(
        risk_model: RiskModel,
        allocator: Box<dyn PortfolioAllocator>,
        lookback: usize,
        backtest: &BacktestConfig,
    ) -> Result<Self, BacktestError> {
        // --- 1. Validation ---
        if lookback < 2 {
            return Err(BacktestError::Configuration(format!(
                "lookback must be at least 2, got {}",
                lookback
            )));
        }
        let rate = backtest.transaction_cost_rate;
        if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
            return Err(BacktestError::Configuration(format!(
                "transaction_cost_rate must lie in [0, 1), got {}",
                rate
            )));
        }

        let parameters = RunParameters {
            allocator: allocator.name().to_string(),
            lookback,
            rebalance: backtest.rebalance.clone(),
            transaction_cost_rate: rate,
        };
        Ok(Self {
            risk_model,
            allocator,
            schedule: RebalanceSchedule::new(backtest.rebalance.clone()),
            parameters,
        })
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.parameters
    }

    /// Converts `history` to returns of `kind` and runs the simulation over them.
    ///
    /// `kind` only shapes risk estimation. Portfolio accounting always uses
    /// simple returns, so both kinds simulate the same price path.
    pub fn run(
        &self,
        history: &PriceHistory,
        kind: ReturnKind,
    ) -> Result<BacktestResult, BacktestError> {
        let returns = history.returns(kind)?;
        self.run_returns(&returns)
    }

    /// Runs the simulation over every period that has a full trailing window.
    ///
    /// Estimators see the values in `returns` as they are. Growth, drift and
    /// costs use [`ReturnMatrix::simple_row`].
    pub fn run_returns(&self, returns: &ReturnMatrix) -> Result<BacktestResult, BacktestError> {
        let lookback = self.parameters.lookback;
        let periods = returns.periods();

        // --- 1. Validation ---
        let required = lookback + 1;
        if periods < required {
            return Err(BacktestError::InsufficientHistory {
                available: periods,
                required,
            });
        }
        if lookback < returns.num_assets() + 1 {
            return Err(BacktestError::Configuration(format!(
                "lookback {} is too short to estimate a covariance for {} assets",
                lookback,
                returns.num_assets()
            )));
        }

        // --- 2. Setup ---
        let run_id = Uuid::new_v4();
        let tickers = returns.tickers().to_vec();
        let rebalance_flags = self.schedule.flags(&returns.dates()[lookback..]);
        let mut result = BacktestResult::new(run_id, self.parameters.clone(), tickers.clone());
        let mut current = Portfolio::all_cash(tickers);
        let mut consecutive_failures = 0usize;
        let mut state = EngineState::AwaitingWindow;

        tracing::info!(
            %run_id,
            allocator = %self.parameters.allocator,
            lookback,
            rebalance = %self.parameters.rebalance,
            periods = periods - lookback,
            "Backtest started."
        );

        // --- 3. Simulation loop ---
        for t in 0..periods {
            if t < lookback {
                debug_assert_eq!(state, EngineState::AwaitingWindow);
                continue;
            }
            let date = returns.dates()[t];
            state = if rebalance_flags[t - lookback] {
                EngineState::Rebalancing
            } else {
                EngineState::Holding
            };

            let mut turnover = 0.0;
            let mut failure = None;
            if state == EngineState::Rebalancing {
                let window = returns.window(t, lookback);
                match allocate_window(&self.risk_model, self.allocator.as_ref(), &window, lookback) {
                    Ok(target) => {
                        turnover = current
                            .turnover(&target)
                            .map_err(|e| self.simulation_failed(date, e))?;
                        current = target;
                        consecutive_failures = 0;
                        tracing::debug!(%date, turnover, "Rebalanced.");
                    }
                    Err(source) => {
                        consecutive_failures += 1;
                        if consecutive_failures >= 2 {
                            return Err(self.abort(&window, date, source));
                        }
                        tracing::warn!(
                            %run_id,
                            %date,
                            error = %source,
                            "Rebalance failed; holding previous weights."
                        );
                        failure = Some(source.to_string());
                    }
                }
            }

            let asset_returns = returns.simple_row(t);
            let gross_return = current
                .period_return(&asset_returns)
                .map_err(|e| self.simulation_failed(date, e))?;
            let transaction_cost = self.parameters.transaction_cost_rate * turnover;
            result.push(BacktestRecord {
                date,
                portfolio: current.clone(),
                gross_return,
                transaction_cost,
                realized_return: gross_return - transaction_cost,
                turnover,
                rebalanced: state == EngineState::Rebalancing && failure.is_none(),
                failure,
            });

            current = current
                .drifted(&asset_returns)
                .map_err(|e| self.simulation_failed(date, e))?;
        }
        state = EngineState::Terminated;

        tracing::info!(
            %run_id,
            ?state,
            periods = result.len(),
            failures = result.failures().count(),
            cumulative_return = result.cumulative_return(),
            "Backtest finished."
        );
        Ok(result)
    }

    fn simulation_failed(&self, date: NaiveDate, source: CoreError) -> BacktestError {
        tracing::error!(
            %date,
            parameters = %self.parameters,
            error = %source,
            "Portfolio accounting failed; aborting backtest."
        );
        BacktestError::SimulationFailed {
            date,
            parameters: self.parameters.clone(),
            source,
        }
    }

    fn abort(
        &self,
        window: &ReturnMatrix,
        date: NaiveDate,
        source: AllocationError,
    ) -> BacktestError {
        let dates = window.dates();
        // A window always has `lookback` rows here, so it is never empty.
        let window_start = dates.first().copied().unwrap_or(date);
        let window_end = dates.last().copied().unwrap_or(date);
        tracing::error!(
            %date,
            %window_start,
            %window_end,
            parameters = %self.parameters,
            error = %source,
            "Second consecutive rebalance failure; aborting backtest."
        );
        BacktestError::RebalanceAborted {
            date,
            window_start,
            window_end,
            parameters: self.parameters.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use configuration::{AllocationMethod, RebalanceFrequency};
    use core_types::{Asset, CovarianceMatrix};
    use nalgebra::{DMatrix, DVector};

    const PATTERN: [[f64; 2]; 5] = [
        [0.010, 0.020],
        [-0.010, 0.005],
        [0.015, -0.010],
        [-0.005, -0.020],
        [0.002, 0.012],
    ];

    fn returns(periods: usize) -> ReturnMatrix {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..periods)
            .map(|k| start + chrono::Duration::days(k as i64))
            .collect();
        let values = DMatrix::from_fn(periods, 2, |t, j| PATTERN[t % 5][j]);
        ReturnMatrix::new(vec!["A".to_string(), "B".to_string()], dates, values).unwrap()
    }

    /// Three times long A, twice short B.
    #[derive(Debug)]
    struct LeveredAllocator;

    impl PortfolioAllocator for LeveredAllocator {
        fn name(&self) -> &'static str {
            "levered"
        }

        fn allocate(
            &self,
            covariance: &CovarianceMatrix,
            _expected_returns: Option<&DVector<f64>>,
        ) -> Result<Portfolio, AllocationError> {
            Ok(Portfolio::with_cash(covariance.tickers().to_vec(), vec![3.0, -2.0])?)
        }
    }

    fn engine(lookback: usize, rebalance: RebalanceFrequency, cost: f64) -> BacktestEngine {
        let mut config = Config::default();
        config.risk_model.lookback = lookback;
        config.backtest.rebalance = rebalance;
        config.backtest.transaction_cost_rate = cost;
        BacktestEngine::new(&config).unwrap()
    }

    #[test]
    fn history_shorter_than_window_is_rejected() {
        let engine = engine(10, RebalanceFrequency::Monthly, 0.0);
        assert!(matches!(
            engine.run_returns(&returns(10)),
            Err(BacktestError::InsufficientHistory { available: 10, required: 11 })
        ));
        assert_eq!(engine.run_returns(&returns(11)).unwrap().len(), 1);
    }

    #[test]
    fn window_too_short_for_asset_count() {
        let engine = engine(2, RebalanceFrequency::Monthly, 0.0);
        assert!(matches!(
            engine.run_returns(&returns(20)),
            Err(BacktestError::Configuration(_))
        ));
    }

    #[test]
    fn invalid_parameters() {
        let risk_model = RiskModel::new(&Default::default()).unwrap();
        let allocator = create_allocator(&Default::default()).unwrap();
        let backtest = BacktestConfig {
            transaction_cost_rate: -0.1,
            ..BacktestConfig::default()
        };
        assert!(matches!(
            BacktestEngine::from_parts(risk_model, allocator, 10, &backtest),
            Err(BacktestError::Configuration(_))
        ));
    }

    #[test]
    fn initial_rebalance_pays_for_full_turnover() {
        let engine = engine(5, RebalanceFrequency::EveryPeriods(5), 0.01);
        let result = engine.run_returns(&returns(20)).unwrap();
        assert_eq!(result.len(), 15);

        let first = &result.records()[0];
        assert!(first.rebalanced);
        assert!((first.turnover - 1.0).abs() < 1e-9);
        assert!((first.transaction_cost - 0.01).abs() < 1e-9);
        assert!((first.realized_return - (first.gross_return - 0.01)).abs() < 1e-15);

        let rebalances: Vec<usize> = result
            .records()
            .iter()
            .enumerate()
            .filter_map(|(k, r)| r.rebalanced.then_some(k))
            .collect();
        assert_eq!(rebalances, vec![0, 5, 10]);
        assert!(result.records().iter().filter(|r| !r.rebalanced).all(|r| r.turnover == 0.0));
        assert_eq!(result.parameters().allocator, "mean_variance");
    }

    #[test]
    fn log_and_simple_returns_simulate_the_same_prices() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut prices = vec![100.0, 50.0];
        let mut rows = vec![(start, prices.clone())];
        for t in 0..20 {
            for j in 0..2 {
                prices[j] *= 1.0 + PATTERN[t % 5][j] * 4.0;
            }
            rows.push((start + chrono::Duration::days(t as i64 + 1), prices.clone()));
        }
        let history =
            PriceHistory::from_rows(vec![Asset::new("A"), Asset::new("B")], rows).unwrap();

        let mut config = Config::default();
        config.risk_model.lookback = 5;
        config.allocation.method = AllocationMethod::EqualWeight;
        config.backtest.rebalance = RebalanceFrequency::Never;
        config.backtest.transaction_cost_rate = 0.0;
        let engine = BacktestEngine::new(&config).unwrap();

        let simple = engine.run(&history, ReturnKind::Simple).unwrap();
        let log = engine.run(&history, ReturnKind::Log).unwrap();
        assert_eq!(simple.len(), log.len());
        assert_relative_eq!(simple.cumulative_return(), log.cumulative_return(), epsilon = 1e-12);
        for (a, b) in simple.records().iter().zip(log.records()) {
            assert_relative_eq!(a.realized_return, b.realized_return, epsilon = 1e-12);
        }

        // Buy and hold: the portfolio grows with the average price relative.
        let last = history.len() - 1;
        let start_index = 5;
        let expected = 0.5 * (history.prices()[(last, 0)] / history.prices()[(start_index, 0)])
            + 0.5 * (history.prices()[(last, 1)] / history.prices()[(start_index, 1)])
            - 1.0;
        assert_relative_eq!(log.cumulative_return(), expected, epsilon = 1e-9);
    }

    #[test]
    fn wiped_out_portfolio_reports_date_and_parameters() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let periods = 7;
        let dates = (0..periods)
            .map(|k| start + chrono::Duration::days(k as i64))
            .collect();
        let crash_date = start + chrono::Duration::days(5);
        let values = DMatrix::from_fn(periods, 2, |t, j| match t {
            5 => [-0.5, 0.5][j],
            _ => PATTERN[t % 5][j],
        });
        let returns =
            ReturnMatrix::new(vec!["A".to_string(), "B".to_string()], dates, values).unwrap();

        let engine = BacktestEngine::from_parts(
            RiskModel::new(&Default::default()).unwrap(),
            Box::new(LeveredAllocator),
            5,
            &BacktestConfig::default(),
        )
        .unwrap();
        match engine.run_returns(&returns).unwrap_err() {
            BacktestError::SimulationFailed { date, parameters, source } => {
                assert_eq!(date, crash_date);
                assert_eq!(parameters.allocator, "levered");
                assert!(matches!(source, CoreError::InvalidPortfolio(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
