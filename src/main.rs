use anyhow::{Context, Result, anyhow};
use backtester::{
    BacktestEngine, BacktestResult, SweepOutcome, allocate_window, create_allocator,
    generate_trade_list, run_sweep,
};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table};
use configuration::{AllocationMethod, Config, load_config};
use core_types::{CovarianceMatrix, Portfolio, PriceHistory, WEIGHT_SUM_TOLERANCE};
use indicatif::{ProgressBar, ProgressStyle};
use risk::RiskModel;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod loader;

/// The main entry point for the Meridian portfolio engine.
fn main() -> Result<()> {
    // Logs go to stderr so tables and JSON on stdout stay clean.
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Allocate(args) => handle_allocate(args),
        Commands::Backtest(args) => handle_backtest(args),
        Commands::Sweep(args) => handle_sweep(args),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Portfolio construction and walk-forward backtesting.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute target weights from the most recent window of prices.
    Allocate(AllocateArgs),
    /// Simulate the configured allocation policy over the whole price history.
    Backtest(BacktestArgs),
    /// Run every combination of the `[sweep]` grid in parallel.
    Sweep(SweepArgs),
}

#[derive(Parser)]
struct CommonArgs {
    /// Wide CSV of prices: `date,TICKER1,TICKER2,...`.
    #[arg(long, short)]
    prices: PathBuf,

    /// TOML configuration file. Defaults are used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Overrides `allocation.method` (mean_variance, erc, hrp, equal_weight, inverse_variance).
    #[arg(long, value_parser = parse_method)]
    method: Option<AllocationMethod>,

    /// Overrides `risk_model.lookback`.
    #[arg(long)]
    lookback: Option<usize>,

    /// Also write the full output as JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Parser)]
struct AllocateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Capital to turn into a trade list, e.g. 100000.
    #[arg(long)]
    capital: Option<Decimal>,

    /// JSON file with the portfolio currently held. All cash when omitted.
    #[arg(long)]
    current: Option<PathBuf>,

    /// Trades smaller than this notional are skipped.
    #[arg(long, default_value = "0")]
    min_notional: Decimal,
}

#[derive(Parser)]
struct BacktestArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser)]
struct SweepArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Number of ranked runs to print.
    #[arg(long, default_value_t = 10)]
    top: usize,
}

fn parse_method(value: &str) -> Result<AllocationMethod, String> {
    AllocationMethod::ALL
        .into_iter()
        .find(|m| m.to_string() == value)
        .ok_or_else(|| format!("unknown allocation method `{}`", value))
}

// ==============================================================================
// Shared Setup
// ==============================================================================

fn prepare(common: &CommonArgs) -> Result<(Config, PriceHistory)> {
    let mut config = match &common.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(method) = common.method {
        config.allocation.method = method;
    }
    if let Some(lookback) = common.lookback {
        config.risk_model.lookback = lookback;
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let history = loader::load_prices(&common.prices, config.data.gap_policy)?;
    Ok((config, history))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.3}", v))
}

// ==============================================================================
// Allocate Command Logic
// ==============================================================================

/// Each holding's share of portfolio variance. `None` when nothing is
/// invested, since an all-cash portfolio has no risk to split.
fn risk_shares(covariance: &CovarianceMatrix, portfolio: &Portfolio) -> Result<Option<Vec<f64>>> {
    if portfolio.nonzero_holdings(WEIGHT_SUM_TOLERANCE).is_empty() {
        return Ok(None);
    }
    Ok(Some(risk_parity::relative_risk_contributions(
        covariance,
        portfolio.weights(),
    )?))
}

#[derive(Serialize)]
struct AllocationOutput<'a> {
    method: AllocationMethod,
    portfolio: &'a Portfolio,
    trades: Vec<backtester::TradeInstruction>,
}

fn handle_allocate(args: AllocateArgs) -> Result<()> {
    let (config, history) = prepare(&args.common)?;
    let returns = history.returns(config.data.return_kind)?;
    let lookback = config.risk_model.lookback;

    let risk_model = RiskModel::new(&config.risk_model)?;
    let allocator = create_allocator(&config.allocation)?;
    let window = returns.tail(lookback);
    let portfolio = allocate_window(&risk_model, allocator.as_ref(), &window, lookback)
        .with_context(|| {
            format!(
                "Allocation with {} failed for the window ending {:?}",
                config.allocation.method,
                window.dates().last()
            )
        })?;

    let covariance = risk_model.estimate(&window, lookback)?;
    let shares = risk_shares(&covariance, &portfolio)?;
    let annualization = f64::from(config.report.periods_per_year);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Ticker", "Weight", "Volatility (ann.)", "Risk share"]);
    for (j, ticker) in portfolio.tickers().iter().enumerate() {
        table.add_row(vec![
            Cell::new(ticker),
            Cell::new(percent(portfolio.weights()[j])),
            Cell::new(percent((covariance.matrix()[(j, j)] * annualization).sqrt())),
            Cell::new(shares.as_ref().map_or_else(|| "-".to_string(), |s| percent(s[j]))),
        ]);
    }
    if portfolio.allows_cash() {
        table.add_row(vec![
            Cell::new("CASH"),
            Cell::new(percent(portfolio.cash_weight())),
            Cell::new("-"),
            Cell::new("-"),
        ]);
    }
    println!(
        "Allocation ({}, {} periods to {})",
        config.allocation.method,
        window.periods(),
        window.dates().last().map_or_else(String::new, |d| d.to_string())
    );
    println!("{}", table);

    let mut trades = Vec::new();
    if let Some(capital) = args.capital {
        let current = match &args.current {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                serde_json::from_reader::<_, Portfolio>(file)
                    .with_context(|| format!("Failed to parse portfolio in {}", path.display()))?
            }
            None => Portfolio::all_cash(portfolio.tickers().to_vec()),
        };
        trades = generate_trade_list(capital, &current, &portfolio, args.min_notional)?;

        let mut table = Table::new();
        table.set_header(vec!["Ticker", "Side", "Notional", "Weight change"]);
        for trade in &trades {
            table.add_row(vec![
                Cell::new(&trade.ticker),
                Cell::new(format!("{:?}", trade.side)),
                Cell::new(trade.notional),
                Cell::new(percent(trade.weight_delta)),
            ]);
        }
        println!("Trades for capital {}", capital);
        println!("{}", table);
    }

    if let Some(path) = &args.common.json {
        write_json(
            path,
            &AllocationOutput {
                method: config.allocation.method,
                portfolio: &portfolio,
                trades,
            },
        )?;
    }
    Ok(())
}

// ==============================================================================
// Backtest Command Logic
// ==============================================================================

#[derive(Serialize)]
struct BacktestOutput<'a> {
    report: &'a analytics::PerformanceReport,
    result: &'a BacktestResult,
}

fn handle_backtest(args: BacktestArgs) -> Result<()> {
    let (config, history) = prepare(&args.common)?;
    let engine = BacktestEngine::new(&config)?;
    let result = engine
        .run(&history, config.data.return_kind)
        .context("Backtest failed")?;
    let report = result.performance(&config.report)?;

    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    let rows = [
        ("Run", result.run_id().to_string()),
        ("Parameters", result.parameters().to_string()),
        ("Periods", report.periods.to_string()),
        ("Cumulative return", percent(report.cumulative_return)),
        ("Annualized return", percent(report.annualized_return)),
        ("Annualized volatility", percent(report.annualized_volatility)),
        ("Max drawdown", percent(report.max_drawdown)),
        ("Sharpe ratio", ratio(report.sharpe_ratio)),
        ("Calmar ratio", ratio(report.calmar_ratio)),
        ("Total turnover", format!("{:.3}", report.total_turnover)),
        ("Failed rebalances", result.failures().count().to_string()),
    ];
    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }
    println!("{}", table);

    for record in result.failures() {
        if let Some(message) = &record.failure {
            println!("Rebalance on {} kept previous weights: {}", record.date, message);
        }
    }

    if let Some(path) = &args.common.json {
        write_json(path, &BacktestOutput { report: &report, result: &result })?;
    }
    Ok(())
}

// ==============================================================================
// Sweep Command Logic
// ==============================================================================

fn handle_sweep(args: SweepArgs) -> Result<()> {
    let (config, history) = prepare(&args.common)?;
    let returns = history.returns(config.data.return_kind)?;
    let total = backtester::parameter_grid(&config.sweep).len();

    println!(
        "Running {} backtests on {} threads.",
        total,
        rayon::current_num_threads()
    );
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("=>-"),
    );
    let outcomes = run_sweep(&returns, &config, |_| progress_bar.inc(1));
    progress_bar.finish_with_message("Sweep complete.");

    print_sweep(&outcomes, args.top);

    if let Some(path) = &args.common.json {
        write_json(path, &outcomes)?;
    }
    Ok(())
}

fn print_sweep(outcomes: &[SweepOutcome], top: usize) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Rank", "Method", "Lookback", "Rebalance", "Cost", "Sharpe", "Return", "Max DD", "Turnover",
    ]);
    for (rank, outcome) in outcomes.iter().take(top).enumerate() {
        let point = &outcome.point;
        let mut row = vec![
            Cell::new(rank + 1),
            Cell::new(point.method),
            Cell::new(point.lookback),
            Cell::new(&point.rebalance),
            Cell::new(point.transaction_cost_rate),
        ];
        match (&outcome.report, &outcome.error) {
            (Some(report), _) => row.extend([
                Cell::new(ratio(report.sharpe_ratio)),
                Cell::new(percent(report.cumulative_return)),
                Cell::new(percent(report.max_drawdown)),
                Cell::new(format!("{:.2}", report.total_turnover)),
            ]),
            (None, error) => row.push(Cell::new(error.as_deref().unwrap_or("failed"))),
        }
        table.add_row(row);
    }
    println!("{}", table);

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    if failed > 0 {
        println!("{} of {} runs failed.", failed, outcomes.len());
    }
}
