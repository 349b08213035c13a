use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Weights of a fully invested portfolio must sum to one within this tolerance.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A weight vector indexed by ticker.
///
/// A fully invested portfolio sums to one. A portfolio created with
/// [`Portfolio::with_cash`] may hold the remainder `1 - Σw` in cash (or be
/// levered when that remainder is negative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PortfolioRecord")]
pub struct Portfolio {
    tickers: Vec<String>,
    weights: Vec<f64>,
    allows_cash: bool,
}

/// Wire form of [`Portfolio`]; deserialized input is validated before use.
#[derive(Deserialize)]
struct PortfolioRecord {
    tickers: Vec<String>,
    weights: Vec<f64>,
    #[serde(default)]
    allows_cash: bool,
}

impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = CoreError;

    fn try_from(record: PortfolioRecord) -> Result<Self, Self::Error> {
        if record.allows_cash {
            Portfolio::with_cash(record.tickers, record.weights)
        } else {
            Portfolio::new(record.tickers, record.weights)
        }
    }
}

impl Portfolio {
    /// Creates a fully invested portfolio.
    pub fn new(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self, CoreError> {
        let portfolio = Self { tickers, weights, allows_cash: false };
        portfolio.validate()?;
        Ok(portfolio)
    }

    /// Creates a portfolio whose weights need not sum to one.
    pub fn with_cash(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self, CoreError> {
        let portfolio = Self { tickers, weights, allows_cash: true };
        portfolio.validate()?;
        Ok(portfolio)
    }

    pub fn equal_weight(tickers: Vec<String>) -> Result<Self, CoreError> {
        if tickers.is_empty() {
            return Err(CoreError::InvalidPortfolio("no assets to allocate to".to_string()));
        }
        let w = 1.0 / tickers.len() as f64;
        let weights = vec![w; tickers.len()];
        Self::new(tickers, weights)
    }

    /// Everything in cash: the state before the first allocation.
    pub fn all_cash(tickers: Vec<String>) -> Self {
        let weights = vec![0.0; tickers.len()];
        Self { tickers, weights, allows_cash: true }
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.tickers.len() != self.weights.len() {
            return Err(CoreError::DimensionMismatch {
                context: "portfolio weights".to_string(),
                expected: self.tickers.len(),
                actual: self.weights.len(),
            });
        }
        if let Some(j) = self.weights.iter().position(|w| !w.is_finite()) {
            return Err(CoreError::InvalidPortfolio(format!(
                "weight of {} is not finite",
                self.tickers[j]
            )));
        }
        if !self.allows_cash {
            let total = self.invested_weight();
            if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(CoreError::InvalidPortfolio(format!(
                    "weights sum to {:.9}, expected 1 within {:e}",
                    total, WEIGHT_SUM_TOLERANCE
                )));
            }
        }
        Ok(())
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn allows_cash(&self) -> bool {
        self.allows_cash
    }

    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|j| self.weights[j])
    }

    /// Sum of asset weights.
    pub fn invested_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Residual held in cash, `1 - Σw`.
    pub fn cash_weight(&self) -> f64 {
        1.0 - self.invested_weight()
    }

    /// Holdings whose absolute weight exceeds `threshold`.
    pub fn nonzero_holdings(&self, threshold: f64) -> Vec<(&str, f64)> {
        self.tickers
            .iter()
            .zip(&self.weights)
            .filter(|(_, w)| w.abs() > threshold)
            .map(|(t, w)| (t.as_str(), *w))
            .collect()
    }

    /// L1 distance between the two weight vectors.
    pub fn turnover(&self, target: &Portfolio) -> Result<f64, CoreError> {
        self.check_same_assets(target)?;
        Ok(self
            .weights
            .iter()
            .zip(&target.weights)
            .map(|(a, b)| (a - b).abs())
            .sum())
    }

    /// Return of the portfolio over one period given per-asset returns. Cash earns nothing.
    pub fn period_return(&self, asset_returns: &[f64]) -> Result<f64, CoreError> {
        if asset_returns.len() != self.weights.len() {
            return Err(CoreError::DimensionMismatch {
                context: "asset returns".to_string(),
                expected: self.weights.len(),
                actual: asset_returns.len(),
            });
        }
        Ok(self.weights.iter().zip(asset_returns).map(|(w, r)| w * r).sum())
    }

    /// Weights after one period of market moves without trading:
    /// `w_i (1 + r_i) / (1 + r_p)`.
    pub fn drifted(&self, asset_returns: &[f64]) -> Result<Portfolio, CoreError> {
        let portfolio_return = self.period_return(asset_returns)?;
        let growth = 1.0 + portfolio_return;
        if growth <= 0.0 {
            return Err(CoreError::InvalidPortfolio(format!(
                "portfolio value wiped out by a period return of {}",
                portfolio_return
            )));
        }
        let weights = self
            .weights
            .iter()
            .zip(asset_returns)
            .map(|(w, r)| w * (1.0 + r) / growth)
            .collect();
        Ok(Self {
            tickers: self.tickers.clone(),
            weights,
            allows_cash: self.allows_cash,
        })
    }

    fn check_same_assets(&self, other: &Portfolio) -> Result<(), CoreError> {
        if self.tickers != other.tickers {
            return Err(CoreError::InvalidInput(
                "portfolio".to_string(),
                "portfolios are defined over different assets".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tickers() -> Vec<String> {
        vec!["AAPL".to_string(), "TSLA".to_string(), "MSFT".to_string()]
    }

    #[test]
    fn fully_invested_weights_must_sum_to_one() {
        assert!(Portfolio::new(tickers(), vec![0.3, 0.2, 0.5]).is_ok());
        let err = Portfolio::new(tickers(), vec![0.3, 0.2, 0.6]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPortfolio(_)));
    }

    #[test]
    fn deserialization_enforces_the_weight_invariant() {
        let valid: Portfolio =
            serde_json::from_str(r#"{"tickers":["A","B"],"weights":[0.4,0.6]}"#).unwrap();
        assert!(!valid.allows_cash());

        let short = serde_json::from_str::<Portfolio>(r#"{"tickers":["A","B"],"weights":[0.4,0.5]}"#);
        assert!(short.unwrap_err().to_string().contains("weights sum to"));

        let ragged = serde_json::from_str::<Portfolio>(r#"{"tickers":["A","B"],"weights":[1.0]}"#);
        assert!(ragged.is_err());

        let cash: Portfolio = serde_json::from_str(
            r#"{"tickers":["A","B"],"weights":[0.4,0.5],"allows_cash":true}"#,
        )
        .unwrap();
        assert_relative_eq!(cash.cash_weight(), 0.1, epsilon = 1e-12);
        let round_trip: Portfolio =
            serde_json::from_str(&serde_json::to_string(&cash).unwrap()).unwrap();
        assert_eq!(round_trip, cash);
    }

    #[test]
    fn cash_portfolio_reports_its_residual() {
        let portfolio = Portfolio::with_cash(tickers(), vec![0.3, 0.3, 0.0]).unwrap();
        assert_relative_eq!(portfolio.cash_weight(), 0.4, epsilon = 1e-12);
        assert_eq!(portfolio.nonzero_holdings(1e-4), vec![("AAPL", 0.3), ("TSLA", 0.3)]);
    }

    #[test]
    fn turnover_is_l1_distance() {
        let cash = Portfolio::all_cash(tickers());
        let target = Portfolio::new(tickers(), vec![0.2, 0.3, 0.5]).unwrap();
        assert_relative_eq!(cash.turnover(&target).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(target.turnover(&target).unwrap(), 0.0);

        let other = Portfolio::equal_weight(vec!["X".to_string()]).unwrap();
        assert!(target.turnover(&other).is_err());
    }

    #[test]
    fn drift_keeps_weights_summing_to_one() {
        let portfolio = Portfolio::new(tickers(), vec![0.5, 0.25, 0.25]).unwrap();
        let returns = [0.10, -0.20, 0.0];
        let drifted = portfolio.drifted(&returns).unwrap();
        let r_p = 0.05 - 0.05;
        assert_relative_eq!(portfolio.period_return(&returns).unwrap(), r_p, epsilon = 1e-12);
        assert_relative_eq!(drifted.weights()[0], 0.55, epsilon = 1e-12);
        assert_relative_eq!(drifted.weights()[1], 0.20, epsilon = 1e-12);
        assert_relative_eq!(drifted.invested_weight(), 1.0, epsilon = 1e-12);
    }
}
