use crate::error::BacktestError;
use core_types::{CoreError, OrderSide, Portfolio};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Weight deltas are rounded to this many places before being priced.
const WEIGHT_DECIMALS: u32 = 10;
/// Notionals are quoted in cents.
const NOTIONAL_DECIMALS: u32 = 2;

/// One order needed to move from the current to the target portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub ticker: String,
    pub side: OrderSide,
    /// Always positive; the direction is carried by `side`.
    pub notional: Decimal,
    /// `target - current` weight.
    pub weight_delta: f64,
}

/// Orders that rebalance `capital` from `current` to `target`.
///
/// Trades whose notional is below `min_notional` are skipped. Sells come
/// before buys so the cash they free is available; within a side the
/// portfolio's ticker order is kept.
pub fn generate_trade_list(
    capital: Decimal,
    current: &Portfolio,
    target: &Portfolio,
    min_notional: Decimal,
) -> Result<Vec<TradeInstruction>, BacktestError> {
    // --- 1. Validation ---
    if capital.is_sign_negative() {
        return Err(BacktestError::Configuration(format!(
            "capital must not be negative, got {}",
            capital
        )));
    }
    if current.tickers() != target.tickers() {
        return Err(CoreError::InvalidInput(
            "trade list".to_string(),
            "current and target portfolios hold different assets".to_string(),
        )
        .into());
    }

    // --- 2. Price every delta ---
    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for ((ticker, from), to) in current.tickers().iter().zip(current.weights()).zip(target.weights()) {
        let weight_delta = to - from;
        let magnitude = Decimal::from_f64_retain(weight_delta.abs())
            .ok_or_else(|| {
                CoreError::InvalidInput(ticker.clone(), format!("weight delta {} is not finite", weight_delta))
            })?
            .round_dp(WEIGHT_DECIMALS);
        let notional = capital
            .checked_mul(magnitude)
            .ok_or_else(|| {
                BacktestError::Configuration(format!("notional for {} overflows", ticker))
            })?
            .round_dp(NOTIONAL_DECIMALS);
        if notional.is_zero() || notional < min_notional {
            continue;
        }

        let trade = TradeInstruction {
            ticker: ticker.clone(),
            side: if weight_delta > 0.0 { OrderSide::Buy } else { OrderSide::Sell },
            notional,
            weight_delta,
        };
        match trade.side {
            OrderSide::Sell => sells.push(trade),
            OrderSide::Buy => buys.push(trade),
        }
    }

    tracing::debug!(sells = sells.len(), buys = buys.len(), %capital, "Trade list generated.");
    sells.extend(buys);
    Ok(sells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn portfolio(weights: &[f64]) -> Portfolio {
        Portfolio::with_cash(
            ["SPY", "TLT", "GLD"].iter().map(|t| t.to_string()).collect(),
            weights.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn sells_before_buys_with_rounded_notionals() {
        let current = portfolio(&[0.6, 0.4, 0.0]);
        let target = portfolio(&[0.5, 0.2, 0.3]);
        let trades = generate_trade_list(dec!(100000), &current, &target, dec!(0)).unwrap();

        let summary: Vec<(&str, OrderSide, Decimal)> = trades
            .iter()
            .map(|t| (t.ticker.as_str(), t.side, t.notional))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("SPY", OrderSide::Sell, dec!(10000.00)),
                ("TLT", OrderSide::Sell, dec!(20000.00)),
                ("GLD", OrderSide::Buy, dec!(30000.00)),
            ]
        );
        assert!(trades.iter().all(|t| t.notional > Decimal::ZERO));
        assert!((trades[2].weight_delta - 0.3).abs() < 1e-12);
    }

    #[test]
    fn unwinding_a_rebalance_flips_every_side() {
        let current = portfolio(&[0.6, 0.4, 0.0]);
        let target = portfolio(&[0.5, 0.2, 0.3]);
        let forward = generate_trade_list(dec!(50000), &current, &target, dec!(0)).unwrap();
        let backward = generate_trade_list(dec!(50000), &target, &current, dec!(0)).unwrap();

        assert_eq!(forward.len(), backward.len());
        for trade in &forward {
            let reverse = backward.iter().find(|t| t.ticker == trade.ticker).unwrap();
            assert_eq!(reverse.side, trade.side.opposite());
            assert_eq!(reverse.notional, trade.notional);
        }
    }

    #[test]
    fn small_and_zero_trades_are_skipped() {
        let current = portfolio(&[0.5, 0.3, 0.2]);
        let target = portfolio(&[0.5, 0.299, 0.201]);
        let trades = generate_trade_list(dec!(10000), &current, &target, dec!(50)).unwrap();
        assert!(trades.is_empty());

        let trades = generate_trade_list(dec!(10000), &current, &target, dec!(5)).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].notional, dec!(10.00));
    }

    #[test]
    fn from_cash_buys_everything() {
        let current = Portfolio::all_cash(vec!["SPY".to_string(), "TLT".to_string()]);
        let target = Portfolio::new(vec!["SPY".to_string(), "TLT".to_string()], vec![0.25, 0.75]).unwrap();
        let trades = generate_trade_list(dec!(1000), &current, &target, dec!(1)).unwrap();
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.side == OrderSide::Buy));
        assert_eq!(trades[1].notional, dec!(750.00));
    }

    #[test]
    fn rejects_negative_capital_and_mismatched_assets() {
        let current = portfolio(&[0.5, 0.5, 0.0]);
        let other = Portfolio::equal_weight(vec!["SPY".to_string()]).unwrap();
        assert!(matches!(
            generate_trade_list(dec!(-1), &current, &current, dec!(0)),
            Err(BacktestError::Configuration(_))
        ));
        assert!(matches!(
            generate_trade_list(dec!(1000), &current, &other, dec!(0)),
            Err(BacktestError::Core(_))
        ));
    }
}
