use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    AllocationConfig, AllocationMethod, BacktestConfig, BisectionMode, Config, CovarianceMethod,
    DataConfig, ExpectedReturnMethod, LinkageMethod, MeanVarianceConfig, RebalanceFrequency,
    ReportConfig, RiskModelConfig, RiskParityConfig, SolverConfig, SweepConfig,
};

/// Loads and validates the configuration stored at `path`.
///
/// The file format is inferred from the extension (normally `.toml`). Sections
/// and fields that are missing fall back to their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;

    finish(builder.try_deserialize::<Config>()?)
}

/// Parses and validates configuration from a TOML string.
pub fn load_config_from_toml(contents: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(contents, config::FileFormat::Toml))
        .build()?;

    finish(builder.try_deserialize::<Config>()?)
}

fn finish(config: Config) -> Result<Config, ConfigError> {
    config.validate().map_err(ConfigError::ValidationError)?;
    tracing::debug!(
        lookback = config.risk_model.lookback,
        method = %config.allocation.method,
        rebalance = %config.backtest.rebalance,
        "Configuration loaded."
    );
    Ok(config)
}
