use crate::enums::{GapPolicy, ReturnKind};
use crate::error::CoreError;
use crate::structs::Asset;
use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// An immutable, dense panel of prices: one row per date, one column per asset.
///
/// Gap handling is the job of whoever builds the history (see [`PriceHistory::align`]);
/// once constructed every cell holds a finite, strictly positive price.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    assets: Vec<Asset>,
    dates: Vec<NaiveDate>,
    prices: DMatrix<f64>,
}

impl PriceHistory {
    /// Builds a history from a `dates.len() x assets.len()` price matrix.
    pub fn new(
        assets: Vec<Asset>,
        dates: Vec<NaiveDate>,
        prices: DMatrix<f64>,
    ) -> Result<Self, CoreError> {
        if assets.is_empty() {
            return Err(CoreError::InvalidInput(
                "assets".to_string(),
                "a price history needs at least one asset".to_string(),
            ));
        }
        let tickers: Vec<String> = assets.iter().map(|a| a.ticker.clone()).collect();
        validate_tickers(&tickers)?;
        if dates.is_empty() {
            return Err(CoreError::InvalidInput(
                "dates".to_string(),
                "a price history needs at least one observation".to_string(),
            ));
        }
        validate_dates(&dates)?;
        if prices.nrows() != dates.len() {
            return Err(CoreError::DimensionMismatch {
                context: "price rows".to_string(),
                expected: dates.len(),
                actual: prices.nrows(),
            });
        }
        if prices.ncols() != assets.len() {
            return Err(CoreError::DimensionMismatch {
                context: "price columns".to_string(),
                expected: assets.len(),
                actual: prices.ncols(),
            });
        }
        for (t, row) in prices.row_iter().enumerate() {
            for (j, price) in row.iter().enumerate() {
                if !price.is_finite() || *price <= 0.0 {
                    return Err(CoreError::InvalidInput(
                        format!("price of {} on {}", assets[j].ticker, dates[t]),
                        format!("expected a finite positive price, got {}", price),
                    ));
                }
            }
        }

        Ok(Self { assets, dates, prices })
    }

    /// Builds a history from `(date, prices)` rows, prices in asset order.
    pub fn from_rows(
        assets: Vec<Asset>,
        rows: Vec<(NaiveDate, Vec<f64>)>,
    ) -> Result<Self, CoreError> {
        let n = assets.len();
        let mut dates = Vec::with_capacity(rows.len());
        let mut data = Vec::with_capacity(rows.len() * n);
        for (date, row) in rows {
            if row.len() != n {
                return Err(CoreError::DimensionMismatch {
                    context: format!("price row for {}", date),
                    expected: n,
                    actual: row.len(),
                });
            }
            dates.push(date);
            data.extend(row);
        }
        let prices = DMatrix::from_row_slice(dates.len(), n, &data);
        Self::new(assets, dates, prices)
    }

    /// Aligns per-ticker series onto a common calendar (the union of all dates)
    /// according to `policy`.
    pub fn align(
        assets: Vec<Asset>,
        series: &BTreeMap<String, BTreeMap<NaiveDate, f64>>,
        policy: GapPolicy,
    ) -> Result<Self, CoreError> {
        for asset in &assets {
            if !series.contains_key(&asset.ticker) {
                return Err(CoreError::UnknownAsset(asset.ticker.clone()));
            }
        }

        let calendar: BTreeSet<NaiveDate> = assets
            .iter()
            .flat_map(|a| series[&a.ticker].keys().copied())
            .collect();

        let mut last_seen: Vec<Option<f64>> = vec![None; assets.len()];
        let mut rows = Vec::with_capacity(calendar.len());
        let mut dropped = 0usize;

        for date in calendar {
            let mut complete = true;
            let mut row = Vec::with_capacity(assets.len());
            for (j, asset) in assets.iter().enumerate() {
                let observed = series[&asset.ticker].get(&date).copied();
                if observed.is_some() {
                    last_seen[j] = observed;
                }
                let value = match policy {
                    GapPolicy::DropIncomplete => observed,
                    GapPolicy::ForwardFill => last_seen[j],
                };
                match value {
                    Some(price) => row.push(price),
                    None => complete = false,
                }
            }
            if complete {
                rows.push((date, row));
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            tracing::debug!(dropped, ?policy, "Dropped incomplete dates while aligning price series.");
        }

        Self::from_rows(assets, rows)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn tickers(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.ticker.clone()).collect()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn prices(&self) -> &DMatrix<f64> {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    /// Derives the return matrix. Each return is dated by the later of the two
    /// prices it spans, so the matrix has one row fewer than the history.
    pub fn returns(&self, kind: ReturnKind) -> Result<ReturnMatrix, CoreError> {
        if self.dates.len() < 2 {
            return Err(CoreError::InvalidInput(
                "price history".to_string(),
                "at least two observations are needed to compute returns".to_string(),
            ));
        }
        let periods = self.dates.len() - 1;
        let values = DMatrix::from_fn(periods, self.assets.len(), |t, j| {
            let ratio = self.prices[(t + 1, j)] / self.prices[(t, j)];
            match kind {
                ReturnKind::Simple => ratio - 1.0,
                ReturnKind::Log => ratio.ln(),
            }
        });
        Ok(ReturnMatrix::new(self.tickers(), self.dates[1..].to_vec(), values)?.with_kind(kind))
    }
}

/// Per-period asset returns, `periods x assets`, dense.
///
/// The matrix remembers whether it holds simple or log returns. Estimators
/// consume the values as they are; portfolio accounting goes through
/// [`ReturnMatrix::simple_row`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    values: DMatrix<f64>,
    kind: ReturnKind,
}

impl ReturnMatrix {
    pub fn new(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        values: DMatrix<f64>,
    ) -> Result<Self, CoreError> {
        validate_tickers(&tickers)?;
        validate_dates(&dates)?;
        if values.nrows() != dates.len() {
            return Err(CoreError::DimensionMismatch {
                context: "return rows".to_string(),
                expected: dates.len(),
                actual: values.nrows(),
            });
        }
        if values.ncols() != tickers.len() {
            return Err(CoreError::DimensionMismatch {
                context: "return columns".to_string(),
                expected: tickers.len(),
                actual: values.ncols(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidInput(
                "returns".to_string(),
                "return matrix contains non-finite values".to_string(),
            ));
        }
        Ok(Self { tickers, dates, values, kind: ReturnKind::Simple })
    }

    /// Marks the values as returns of `kind`. [`ReturnMatrix::new`] assumes simple returns.
    pub fn with_kind(mut self, kind: ReturnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn periods(&self) -> usize {
        self.dates.len()
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    /// Asset returns of period `t`, in ticker order.
    pub fn row(&self, t: usize) -> Vec<f64> {
        self.values.row(t).iter().copied().collect()
    }

    /// Simple returns of period `t`, converting log returns with `exp(r) - 1`.
    pub fn simple_row(&self, t: usize) -> Vec<f64> {
        let row = self.values.row(t);
        match self.kind {
            ReturnKind::Simple => row.iter().copied().collect(),
            ReturnKind::Log => row.iter().map(|r| r.exp_m1()).collect(),
        }
    }

    /// The trailing `lookback` periods strictly before `end_exclusive`.
    /// Shorter when fewer periods are available.
    pub fn window(&self, end_exclusive: usize, lookback: usize) -> ReturnMatrix {
        let end = end_exclusive.min(self.periods());
        let start = end.saturating_sub(lookback);
        Self {
            tickers: self.tickers.clone(),
            dates: self.dates[start..end].to_vec(),
            values: self.values.rows(start, end - start).into_owned(),
            kind: self.kind,
        }
    }

    /// The last `lookback` periods (all of them when fewer are available).
    pub fn tail(&self, lookback: usize) -> ReturnMatrix {
        self.window(self.periods(), lookback)
    }
}

pub(crate) fn validate_tickers(tickers: &[String]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(tickers.len());
    for ticker in tickers {
        if ticker.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "ticker".to_string(),
                "tickers must not be empty".to_string(),
            ));
        }
        if !seen.insert(ticker.as_str()) {
            return Err(CoreError::InvalidInput(
                "ticker".to_string(),
                format!("duplicate ticker '{}'", ticker),
            ));
        }
    }
    Ok(())
}

fn validate_dates(dates: &[NaiveDate]) -> Result<(), CoreError> {
    if let Some(pair) = dates.windows(2).find(|w| w[1] <= w[0]) {
        return Err(CoreError::InvalidInput(
            "dates".to_string(),
            format!("dates must be strictly increasing ({} is followed by {})", pair[0], pair[1]),
        ));
    }
    Ok(())
}
