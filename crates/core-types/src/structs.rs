use crate::enums::AssetClass;
use serde::{Deserialize, Serialize};

/// A tradable instrument. Created once at ingestion time and referenced by
/// ticker everywhere else; it never owns price data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub asset_class: AssetClass,
}

impl Asset {
    /// Creates a stock with only a ticker, the common case for price files.
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            exchange: None,
            asset_class: AssetClass::Stock,
        }
    }

    pub fn with_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.ticker),
            None => write!(f, "{}", self.ticker),
        }
    }
}
