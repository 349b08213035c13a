use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Broad category an instrument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Stock,
    Bond,
    Etf,
    Currency,
}

/// How period returns are derived from consecutive prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    /// `p_t / p_{t-1} - 1`
    #[default]
    Simple,
    /// `ln(p_t / p_{t-1})`
    Log,
}

/// What to do with dates where some tickers have no observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Keep only dates on which every ticker has a price.
    DropIncomplete,
    /// Carry the last known price forward. Dates before every ticker has
    /// printed at least once are still dropped.
    #[default]
    ForwardFill,
}
