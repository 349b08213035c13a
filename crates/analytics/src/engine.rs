use crate::error::AnalyticsError;
use crate::report::{PerformanceReport, PeriodOutcome};

/// A stateless calculator for deriving performance metrics from a return series.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `periods` - The realized outcome of every simulated period, in date order.
    /// * `risk_free_rate` - Annual risk-free rate used by the Sharpe ratio.
    /// * `periods_per_year` - Number of periods in a year (252 for daily data).
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PerformanceReport` or an `AnalyticsError`.
    pub fn calculate(
        &self,
        periods: &[PeriodOutcome],
        risk_free_rate: f64,
        periods_per_year: u32,
    ) -> Result<PerformanceReport, AnalyticsError> {
        if periods.is_empty() {
            return Err(AnalyticsError::NotEnoughData {
                periods: 0,
                required: 1,
            });
        }
        if periods_per_year == 0 {
            return Err(AnalyticsError::Calculation(
                "periods_per_year must be positive".to_string(),
            ));
        }
        if let Some(bad) = periods
            .iter()
            .find(|p| !p.realized_return.is_finite() || !p.turnover.is_finite())
        {
            return Err(AnalyticsError::Calculation(format!(
                "non-finite return or turnover on {}",
                bad.date
            )));
        }

        let mut report = PerformanceReport::new();
        report.periods = periods.len();
        report.start_date = periods.first().map(|p| p.date);
        report.end_date = periods.last().map(|p| p.date);

        self.calculate_returns(periods, periods_per_year, &mut report);
        self.calculate_drawdown(periods, &mut report);
        self.calculate_ratios(periods, risk_free_rate, periods_per_year, &mut report);
        self.calculate_turnover(periods, &mut report);

        tracing::debug!(
            periods = report.periods,
            cumulative_return = report.cumulative_return,
            max_drawdown = report.max_drawdown,
            "Performance report calculated."
        );
        Ok(report)
    }

    /// Compounded and annualized returns plus the period extremes.
    fn calculate_returns(
        &self,
        periods: &[PeriodOutcome],
        periods_per_year: u32,
        report: &mut PerformanceReport,
    ) {
        let growth: f64 = periods.iter().map(|p| 1.0 + p.realized_return).product();
        report.cumulative_return = growth - 1.0;

        let years = periods.len() as f64 / periods_per_year as f64;
        report.annualized_return = if growth <= 0.0 {
            -1.0
        } else {
            growth.powf(1.0 / years) - 1.0
        };

        report.best_period_return = periods
            .iter()
            .map(|p| p.realized_return)
            .fold(f64::NEG_INFINITY, f64::max);
        report.worst_period_return = periods
            .iter()
            .map(|p| p.realized_return)
            .fold(f64::INFINITY, f64::min);
    }

    /// Maximum peak-to-trough loss of the equity curve, starting from 1.0.
    fn calculate_drawdown(&self, periods: &[PeriodOutcome], report: &mut PerformanceReport) {
        let mut equity = 1.0_f64;
        let mut peak_equity = 1.0_f64;
        let mut max_drawdown = 0.0_f64;

        for period in periods {
            equity *= 1.0 + period.realized_return;
            if equity > peak_equity {
                peak_equity = equity;
            }
            let drawdown = (peak_equity - equity) / peak_equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        report.max_drawdown = max_drawdown;
    }

    /// Calculates volatility and the ratio-based metrics like Sharpe and Calmar.
    fn calculate_ratios(
        &self,
        periods: &[PeriodOutcome],
        risk_free_rate: f64,
        periods_per_year: u32,
        report: &mut PerformanceReport,
    ) {
        // --- Calmar Ratio ---
        if report.max_drawdown > 0.0 {
            report.calmar_ratio = Some(report.annualized_return / report.max_drawdown);
        }

        // --- Volatility and Sharpe Ratio ---
        if periods.len() < 2 {
            report.sharpe_ratio = None;
            return;
        }

        let n = periods.len() as f64;
        let mean_return = periods.iter().map(|p| p.realized_return).sum::<f64>() / n;
        let variance = periods
            .iter()
            .map(|p| (p.realized_return - mean_return).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let std_dev = variance.sqrt();
        let annualization = (periods_per_year as f64).sqrt();
        report.annualized_volatility = std_dev * annualization;

        if std_dev > 0.0 {
            let periodic_risk_free = risk_free_rate / periods_per_year as f64;
            report.sharpe_ratio = Some((mean_return - periodic_risk_free) / std_dev * annualization);
        }
    }

    fn calculate_turnover(&self, periods: &[PeriodOutcome], report: &mut PerformanceReport) {
        report.total_turnover = periods.iter().map(|p| p.turnover).sum();
        report.average_turnover = report.total_turnover / periods.len() as f64;
    }
}
