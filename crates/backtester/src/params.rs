use configuration::RebalanceFrequency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything that distinguishes one backtest run from another over the same data.
///
/// Displayed as compact JSON so an aborted run can be reproduced from its error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub allocator: String,
    pub lookback: usize,
    pub rebalance: RebalanceFrequency,
    pub transaction_cost_rate: f64,
}

impl fmt::Display for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_json() {
        let params = RunParameters {
            allocator: "erc".to_string(),
            lookback: 63,
            rebalance: RebalanceFrequency::EveryPeriods(5),
            transaction_cost_rate: 0.001,
        };
        let shown = params.to_string();
        assert!(shown.contains("\"allocator\":\"erc\""));
        assert!(shown.contains("\"every_periods\":5"));
        let parsed: RunParameters = serde_json::from_str(&shown).unwrap();
        assert_eq!(parsed, params);
    }
}
