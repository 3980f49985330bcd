//! File-backed bar source: one CSV per symbol.
//!
//! The first column (or a column named `date`) holds the bar date. Price
//! columns are matched case-insensitively against a few common spellings,
//! so exports such as `CLOSING PRICE` or `closing_price` load unchanged.

use crate::handler::BarSource;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use replay_core::{Bar, BarTime, Error, Result};
use std::path::PathBuf;
use tracing::debug;

const DATE_NAMES: &[&str] = &["date", "datetime", "trade_date", "tarih", "timestamp"];
const OPEN_NAMES: &[&str] = &["open", "opening_price", "open_price", "acilis_fiyati"];
const HIGH_NAMES: &[&str] = &["high", "highest_price", "high_price"];
const LOW_NAMES: &[&str] = &["low", "lowest_price", "low_price"];
const CLOSE_NAMES: &[&str] = &["close", "closing_price", "close_price", "kapanis_fiyati"];
const VOLUME_NAMES: &[&str] = &["volume", "total_traded_volume", "traded_volume"];

/// Reads `<dir>/<symbol>.csv`.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    /// Create a source rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file holding `symbol`.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    /// Parse bars from any CSV reader.
    pub fn read_bars<R: std::io::Read>(reader: R, label: &str) -> Result<Vec<Bar>> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let layout = ColumnLayout::from_headers(rdr.headers()?, label)?;

        let mut bars = Vec::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            // Header is line 1.
            let line = row + 2;
            match layout.parse(&record, label, line)? {
                Some(bar) => bars.push(bar),
                None => debug!(symbol = label, line, "skipping row without a close"),
            }
        }
        Ok(bars)
    }
}

impl BarSource for CsvBarSource {
    fn load(&self, symbol: &str) -> Result<Vec<Bar>> {
        let path = self.path_for(symbol);
        let file = std::fs::File::open(&path).map_err(|e| {
            Error::data(format!("cannot open {} for {symbol}: {e}", path.display()))
        })?;
        Self::read_bars(file, symbol)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.dir.display())
    }
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct ColumnLayout {
    date: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
}

impl ColumnLayout {
    fn from_headers(headers: &StringRecord, label: &str) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));

        // Unnamed first column is the date index of a pandas-style export.
        let date = find(DATE_NAMES).unwrap_or(0);
        let close = find(CLOSE_NAMES)
            .ok_or_else(|| Error::data(format!("{label}: no closing price column in header")))?;

        Ok(Self {
            date,
            open: find(OPEN_NAMES),
            high: find(HIGH_NAMES),
            low: find(LOW_NAMES),
            close,
            volume: find(VOLUME_NAMES),
        })
    }

    fn parse(&self, record: &StringRecord, label: &str, line: usize) -> Result<Option<Bar>> {
        let raw_date = record.get(self.date).unwrap_or("").trim();
        let timestamp = parse_date(raw_date)
            .ok_or_else(|| Error::data(format!("{label}:{line}: bad date '{raw_date}'")))?;

        let close = match parse_number(record, Some(self.close), label, line)? {
            Some(close) => close,
            None => return Ok(None),
        };
        let open = parse_number(record, self.open, label, line)?.unwrap_or(close);
        let high = parse_number(record, self.high, label, line)?.unwrap_or(close);
        let low = parse_number(record, self.low, label, line)?.unwrap_or(close);
        let volume = parse_number(record, self.volume, label, line)?.unwrap_or(0.0);

        Ok(Some(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }))
    }
}

fn parse_number(
    record: &StringRecord,
    column: Option<usize>,
    label: &str,
    line: usize,
) -> Result<Option<f64>> {
    let Some(raw) = column.and_then(|c| record.get(c)).map(str::trim) else {
        return Ok(None);
    };
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| Error::data(format!("{label}:{line}: bad number '{raw}'")))
}

/// Lowercase, and collapse anything that is not alphanumeric into `_`.
fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Accepts ISO dates, ISO datetimes (time dropped), `dd/mm/yyyy` and `yyyymmdd`.
pub(crate) fn parse_date(raw: &str) -> Option<BarTime> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y%m%d", "%d.%m.%Y"];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}
