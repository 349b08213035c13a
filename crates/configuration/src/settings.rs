use chrono::NaiveDate;
use core_types::{Constraint, ConstraintSet, GapPolicy, ReturnKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so a partial (or empty) TOML file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub risk_model: RiskModelConfig,
    pub allocation: AllocationConfig,
    pub backtest: BacktestConfig,
    pub report: ReportConfig,
    pub sweep: SweepConfig,
}

/// How raw price series are turned into returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub return_kind: ReturnKind,
    pub gap_policy: GapPolicy,
}

// ==============================================================================
// Risk model
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskModelConfig {
    /// Number of trailing return periods each estimate uses.
    pub lookback: usize,
    pub covariance: CovarianceMethod,
    pub expected_returns: ExpectedReturnMethod,
}

impl Default for RiskModelConfig {
    fn default() -> Self {
        Self {
            lookback: 252,
            covariance: CovarianceMethod::default(),
            expected_returns: ExpectedReturnMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceMethod {
    /// Unbiased sample covariance.
    #[default]
    Sample,
    /// Exponentially weighted covariance, most recent observation heaviest.
    Ewma { decay: f64 },
    /// Shrinkage towards a scaled identity. `None` picks the optimal intensity.
    LedoitWolf {
        #[serde(default)]
        intensity: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedReturnMethod {
    #[default]
    SampleMean,
    Ewma { decay: f64 },
    /// Sample means pulled towards their cross-sectional average.
    Shrinkage { intensity: f64 },
}

// ==============================================================================
// Allocation
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub method: AllocationMethod,
    pub mean_variance: MeanVarianceConfig,
    pub risk_parity: RiskParityConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    #[default]
    MeanVariance,
    Erc,
    Hrp,
    EqualWeight,
    InverseVariance,
}

impl AllocationMethod {
    pub const ALL: [AllocationMethod; 5] = [
        AllocationMethod::MeanVariance,
        AllocationMethod::Erc,
        AllocationMethod::Hrp,
        AllocationMethod::EqualWeight,
        AllocationMethod::InverseVariance,
    ];
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllocationMethod::MeanVariance => "mean_variance",
            AllocationMethod::Erc => "erc",
            AllocationMethod::Hrp => "hrp",
            AllocationMethod::EqualWeight => "equal_weight",
            AllocationMethod::InverseVariance => "inverse_variance",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanVarianceConfig {
    /// λ in `wᵀΣw − λ·μᵀw`. Zero gives the minimum-variance portfolio.
    pub risk_aversion: f64,
    /// Covariances above this condition number are rejected, not repaired.
    pub max_condition_number: f64,
    pub constraints: Vec<Constraint>,
    /// Adds the implicit `Σw = 1`. Turn off to allow cash or leverage.
    pub fully_invested: bool,
    pub solver: SolverConfig,
}

impl Default for MeanVarianceConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 0.0,
            max_condition_number: 1e10,
            constraints: vec![Constraint::LongOnly],
            fully_invested: true,
            solver: SolverConfig::default(),
        }
    }
}

impl MeanVarianceConfig {
    pub fn constraint_set(&self) -> ConstraintSet {
        ConstraintSet {
            constraints: self.constraints.clone(),
            fully_invested: self.fully_invested,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Feasibility and optimality tolerance.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1_000,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParityConfig {
    /// ERC stops once the spread of relative risk contributions falls below this.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub linkage: LinkageMethod,
    pub bisection: BisectionMode,
}

impl Default for RiskParityConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            linkage: LinkageMethod::default(),
            bisection: BisectionMode::default(),
        }
    }
}

/// Inter-cluster distance used by HRP clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    #[default]
    Single,
    Complete,
    Average,
}

/// How HRP splits an ordered cluster in two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BisectionMode {
    /// Split where the dendrogram does: into the two child clusters.
    #[default]
    Dendrogram,
    /// Split the quasi-diagonal order at its half.
    Midpoint,
}

// ==============================================================================
// Backtest, report and sweep
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub rebalance: RebalanceFrequency,
    /// Cost charged per unit of turnover, e.g. 0.001 is 10 bps.
    pub transaction_cost_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            rebalance: RebalanceFrequency::default(),
            transaction_cost_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// Allocate once and hold.
    Never,
    EveryPeriods(usize),
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
    /// First period on or after each listed date.
    Dates(Vec<NaiveDate>),
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Never => f.write_str("never"),
            RebalanceFrequency::EveryPeriods(n) => write!(f, "every_{}_periods", n),
            RebalanceFrequency::Weekly => f.write_str("weekly"),
            RebalanceFrequency::Monthly => f.write_str("monthly"),
            RebalanceFrequency::Quarterly => f.write_str("quarterly"),
            RebalanceFrequency::Yearly => f.write_str("yearly"),
            RebalanceFrequency::Dates(dates) => write!(f, "{}_dates", dates.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: f64,
    pub periods_per_year: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.0,
            periods_per_year: 252,
        }
    }
}

/// The parameter grid explored by a sweep: every combination is one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub lookbacks: Vec<usize>,
    pub methods: Vec<AllocationMethod>,
    pub rebalance: Vec<RebalanceFrequency>,
    pub transaction_cost_rates: Vec<f64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lookbacks: vec![63, 126, 252],
            methods: AllocationMethod::ALL.to_vec(),
            rebalance: vec![RebalanceFrequency::Monthly, RebalanceFrequency::Quarterly],
            transaction_cost_rates: vec![0.0, 0.001],
        }
    }
}

// ==============================================================================
// Validation
// ==============================================================================

impl Config {
    /// Checks every value the engine would otherwise reject mid-run.
    pub fn validate(&self) -> Result<(), String> {
        validate_lookback("risk_model.lookback", self.risk_model.lookback)?;
        match self.risk_model.covariance {
            CovarianceMethod::Sample => {}
            CovarianceMethod::Ewma { decay } => validate_decay("risk_model.covariance.decay", decay)?,
            CovarianceMethod::LedoitWolf { intensity } => {
                if let Some(intensity) = intensity {
                    validate_unit_interval("risk_model.covariance.intensity", intensity)?;
                }
            }
        }
        match self.risk_model.expected_returns {
            ExpectedReturnMethod::SampleMean => {}
            ExpectedReturnMethod::Ewma { decay } => {
                validate_decay("risk_model.expected_returns.decay", decay)?
            }
            ExpectedReturnMethod::Shrinkage { intensity } => {
                validate_unit_interval("risk_model.expected_returns.intensity", intensity)?
            }
        }

        let mv = &self.allocation.mean_variance;
        if !mv.risk_aversion.is_finite() || mv.risk_aversion < 0.0 {
            return Err(format!(
                "allocation.mean_variance.risk_aversion must be a non-negative number, got {}",
                mv.risk_aversion
            ));
        }
        if mv.max_condition_number.is_nan() || mv.max_condition_number <= 1.0 {
            return Err(format!(
                "allocation.mean_variance.max_condition_number must exceed 1, got {}",
                mv.max_condition_number
            ));
        }
        for constraint in &mv.constraints {
            validate_constraint(constraint)?;
        }
        validate_iterations("allocation.mean_variance.solver.max_iterations", mv.solver.max_iterations)?;
        validate_tolerance("allocation.mean_variance.solver.tolerance", mv.solver.tolerance)?;

        let rp = &self.allocation.risk_parity;
        validate_tolerance("allocation.risk_parity.tolerance", rp.tolerance)?;
        validate_iterations("allocation.risk_parity.max_iterations", rp.max_iterations)?;

        validate_rebalance("backtest.rebalance", &self.backtest.rebalance)?;
        validate_cost("backtest.transaction_cost_rate", self.backtest.transaction_cost_rate)?;

        if !self.report.risk_free_rate.is_finite() {
            return Err("report.risk_free_rate must be finite".to_string());
        }
        if self.report.periods_per_year == 0 {
            return Err("report.periods_per_year must be positive".to_string());
        }

        let sweep = &self.sweep;
        if sweep.lookbacks.is_empty()
            || sweep.methods.is_empty()
            || sweep.rebalance.is_empty()
            || sweep.transaction_cost_rates.is_empty()
        {
            return Err("sweep grids must each contain at least one value".to_string());
        }
        for lookback in &sweep.lookbacks {
            validate_lookback("sweep.lookbacks", *lookback)?;
        }
        for frequency in &sweep.rebalance {
            validate_rebalance("sweep.rebalance", frequency)?;
        }
        for rate in &sweep.transaction_cost_rates {
            validate_cost("sweep.transaction_cost_rates", *rate)?;
        }

        Ok(())
    }
}

fn validate_lookback(field: &str, lookback: usize) -> Result<(), String> {
    if lookback < 2 {
        return Err(format!("{} must be at least 2, got {}", field, lookback));
    }
    Ok(())
}

fn validate_decay(field: &str, decay: f64) -> Result<(), String> {
    if !(decay > 0.0 && decay < 1.0) {
        return Err(format!("{} must lie in (0, 1), got {}", field, decay));
    }
    Ok(())
}

fn validate_unit_interval(field: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} must lie in [0, 1], got {}", field, value));
    }
    Ok(())
}

fn validate_tolerance(field: &str, tolerance: f64) -> Result<(), String> {
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(format!("{} must be positive, got {}", field, tolerance));
    }
    Ok(())
}

fn validate_iterations(field: &str, iterations: usize) -> Result<(), String> {
    if iterations == 0 {
        return Err(format!("{} must be positive", field));
    }
    Ok(())
}

fn validate_cost(field: &str, rate: f64) -> Result<(), String> {
    if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
        return Err(format!("{} must lie in [0, 1), got {}", field, rate));
    }
    Ok(())
}

fn validate_rebalance(field: &str, frequency: &RebalanceFrequency) -> Result<(), String> {
    match frequency {
        RebalanceFrequency::EveryPeriods(0) => Err(format!("{} every_periods must be positive", field)),
        RebalanceFrequency::Dates(dates) if dates.is_empty() => {
            Err(format!("{} dates must not be empty", field))
        }
        _ => Ok(()),
    }
}

fn validate_constraint(constraint: &Constraint) -> Result<(), String> {
    let finite = |value: f64| -> Result<(), String> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(format!("constraint {:?} has a non-finite value", constraint))
        }
    };
    match constraint {
        Constraint::LongOnly => Ok(()),
        Constraint::MaxWeight { limit }
        | Constraint::MinWeight { limit }
        | Constraint::GroupMax { limit, .. }
        | Constraint::GroupMin { limit, .. } => finite(*limit),
        Constraint::AssetBounds { lower, upper, .. } => {
            lower.map_or(Ok(()), finite)?;
            upper.map_or(Ok(()), finite)?;
            match (lower, upper) {
                (Some(l), Some(u)) if l > u => Err(format!(
                    "constraint {:?} has a lower bound above its upper bound",
                    constraint
                )),
                _ => Ok(()),
            }
        }
        Constraint::LinearInequality { coefficients, bound } => {
            coefficients.iter().try_for_each(|(_, c)| finite(*c))?;
            finite(*bound)
        }
        Constraint::LinearEquality { coefficients, target } => {
            coefficients.iter().try_for_each(|(_, c)| finite(*c))?;
            finite(*target)
        }
        Constraint::MinExpectedReturn { target } => finite(*target),
    }
}
