use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use core_types::{Asset, GapPolicy, PriceHistory};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads a wide price file: a `date` column followed by one column per ticker.
///
/// Empty cells are gaps and are resolved by `policy`.
pub fn load_prices(path: &Path, policy: GapPolicy) -> Result<PriceHistory> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open price file {}", path.display()))?;
    read_prices(file, policy).with_context(|| format!("Failed to load prices from {}", path.display()))
}

pub fn read_prices<R: Read>(reader: R, policy: GapPolicy) -> Result<PriceHistory> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    // --- 1. Header ---
    let headers = csv.headers().context("Missing header row")?.clone();
    let mut columns = headers.iter();
    match columns.next() {
        Some(first) if first.eq_ignore_ascii_case("date") => {}
        _ => bail!("The first column must be `date`"),
    }
    let tickers: Vec<String> = columns.map(str::to_string).collect();
    if tickers.is_empty() {
        bail!("No ticker columns found");
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
        bail!("Ticker `{}` appears more than once", duplicate);
    }

    // --- 2. Rows ---
    let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> =
        tickers.iter().map(|t| (t.clone(), BTreeMap::new())).collect();
    for (line, record) in csv.records().enumerate() {
        // Line 1 is the header.
        let line = line + 2;
        let record = record.with_context(|| format!("Malformed CSV on line {}", line))?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .with_context(|| format!("Invalid date `{}` on line {}", raw_date, line))?;

        for (ticker, cell) in tickers.iter().zip(record.iter().skip(1)) {
            if cell.is_empty() {
                continue;
            }
            let price: f64 = cell
                .parse()
                .with_context(|| format!("Invalid price `{}` for {} on line {}", cell, ticker, line))?;
            let prices = series.entry(ticker.clone()).or_default();
            if prices.insert(date, price).is_some() {
                bail!("Date {} appears more than once (line {})", date, line);
            }
        }
    }

    // --- 3. Alignment ---
    let assets = tickers.iter().map(Asset::new).collect();
    let history = PriceHistory::align(assets, &series, policy)?;
    tracing::info!(
        assets = history.num_assets(),
        observations = history.len(),
        ?policy,
        "Price history loaded."
    );
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PRICES: &str = "\
date,SPY,TLT
2024-01-02,470.0,98.0
2024-01-03,468.5,
2024-01-04,467.0,97.5
2024-01-05,469.0,97.8
";

    #[test]
    fn forward_fill_keeps_every_date() {
        let history = read_prices(PRICES.as_bytes(), GapPolicy::ForwardFill).unwrap();
        assert_eq!(history.tickers(), vec!["SPY".to_string(), "TLT".to_string()]);
        assert_eq!(history.len(), 4);
        assert_eq!(history.prices()[(1, 1)], 98.0);
    }

    #[test]
    fn drop_incomplete_removes_gaps() {
        let history = read_prices(PRICES.as_bytes(), GapPolicy::DropIncomplete).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.dates()[1], NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PRICES.as_bytes()).unwrap();
        let history = load_prices(file.path(), GapPolicy::ForwardFill).unwrap();
        assert_eq!(history.num_assets(), 2);

        let missing = load_prices(Path::new("/definitely/not/here.csv"), GapPolicy::ForwardFill);
        assert!(missing.unwrap_err().to_string().contains("Failed to open"));
    }

    #[test]
    fn malformed_files_are_rejected() {
        let bad_header = "day,SPY\n2024-01-02,1.0\n";
        assert!(read_prices(bad_header.as_bytes(), GapPolicy::ForwardFill).is_err());

        let duplicate_ticker = "date,SPY,SPY\n2024-01-02,1.0,1.0\n";
        assert!(read_prices(duplicate_ticker.as_bytes(), GapPolicy::ForwardFill).is_err());

        let bad_price = "date,SPY\n2024-01-02,abc\n";
        let err = read_prices(bad_price.as_bytes(), GapPolicy::ForwardFill).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let repeated_date = "date,SPY\n2024-01-02,1.0\n2024-01-02,1.1\n";
        assert!(read_prices(repeated_date.as_bytes(), GapPolicy::ForwardFill).is_err());

        let negative = "date,SPY\n2024-01-02,-1.0\n2024-01-03,1.0\n";
        assert!(read_prices(negative.as_bytes(), GapPolicy::ForwardFill).is_err());
    }
}
