//! Data handler: reveals one bar per symbol per step.
//!
//! All tables are loaded once, aligned onto the union calendar and split at
//! the start date. The replay segment is then walked one calendar date at a
//! time; every step appends the revealed bar to the symbol's "latest" view
//! and queues a single `Market` event.

use crate::calendar::{normalize, AlignedSeries, Calendar};
use crate::csv_source::CsvBarSource;
use crate::sqlite_source::SqliteBarSource;
use replay_core::config::{DataConfig, DataSource};
use replay_core::{Bar, BarTime, Error, Event, EventQueue, Result, Symbol};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Anything that can produce the raw bar table of a symbol.
pub trait BarSource {
    /// Load every stored bar for `symbol`, in any order.
    fn load(&self, symbol: &str) -> Result<Vec<Bar>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Read access to replayed market data plus the step operation.
pub trait DataHandler {
    /// Traded symbols, in processing order.
    fn symbols(&self) -> &[Symbol];

    /// Up to `n` most recently revealed bars for `symbol`, oldest first.
    ///
    /// Fewer when less history has been revealed; empty for an unknown
    /// symbol or before the symbol's first observation.
    fn get_latest_bars(&self, symbol: &str, n: usize) -> &[Bar];

    /// Most recently revealed bar for `symbol`.
    fn latest_bar(&self, symbol: &str) -> Option<&Bar> {
        self.get_latest_bars(symbol, 1).last()
    }

    /// Advance every symbol by one calendar step and queue a `Market` event.
    ///
    /// Once the replay calendar is exhausted the feed flips
    /// `continue_backtest` to false and queues nothing.
    fn update_bars(&mut self, events: &mut EventQueue);

    /// Whether another `update_bars` call can reveal a bar.
    fn continue_backtest(&self) -> bool;

    /// Calendar date of the last revealed step.
    fn current_time(&self) -> Option<BarTime>;

    /// Configured start date (last historical date), if any.
    fn start_date(&self) -> Option<BarTime>;

    /// Pre-start segment for `symbol`, aligned to the calendar.
    fn historical_bars(&self, symbol: &str) -> &[Option<Bar>];
}

/// Replays pre-loaded bar tables.
#[derive(Debug)]
pub struct HistoricDataHandler {
    symbols: Vec<Symbol>,
    start_date: Option<BarTime>,
    /// Replay dates, strictly after the start date.
    calendar: Vec<BarTime>,
    replay: HashMap<Symbol, AlignedSeries>,
    historical: HashMap<Symbol, AlignedSeries>,
    latest: HashMap<Symbol, Vec<Bar>>,
    /// Index of the next calendar date to reveal.
    cursor: usize,
    continue_backtest: bool,
}

impl HistoricDataHandler {
    /// Build a handler from in-memory tables, one per symbol.
    pub fn from_tables(
        symbols: Vec<Symbol>,
        mut tables: HashMap<Symbol, Vec<Bar>>,
        start_date: Option<BarTime>,
    ) -> Result<Self> {
        if symbols.is_empty() {
            return Err(Error::data("no symbols to replay"));
        }
        let mut seen = HashSet::new();
        for symbol in &symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(Error::data(format!("symbol {symbol} listed twice")));
            }
        }

        let mut normalized: Vec<Vec<Bar>> = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let bars = tables
                .remove(symbol)
                .ok_or_else(|| Error::data(format!("no bar table for {symbol}")))?;
            if bars.is_empty() {
                return Err(Error::data(format!("bar table for {symbol} is empty")));
            }
            normalized.push(normalize(bars));
        }

        let calendar = Calendar::union(normalized.iter().map(Vec::as_slice));
        let split = calendar.split_point(start_date);
        if split >= calendar.len() {
            return Err(Error::insufficient_data(format!(
                "no bars after start date {}",
                start_date.map(|d| d.to_string()).unwrap_or_default()
            )));
        }

        let mut replay = HashMap::with_capacity(symbols.len());
        let mut historical = HashMap::with_capacity(symbols.len());
        let mut latest = HashMap::with_capacity(symbols.len());
        for (symbol, bars) in symbols.iter().zip(&normalized) {
            let mut aligned = calendar.align(bars);
            let replayed = aligned.split_off(split);
            latest.insert(symbol.clone(), Vec::with_capacity(replayed.len()));
            replay.insert(symbol.clone(), replayed);
            historical.insert(symbol.clone(), aligned);
        }

        let replay_dates = calendar.dates()[split..].to_vec();
        info!(
            symbols = symbols.len(),
            historical_bars = split,
            replay_bars = replay_dates.len(),
            first = %replay_dates[0],
            "aligned bar tables"
        );

        Ok(Self {
            symbols,
            start_date,
            calendar: replay_dates,
            replay,
            historical,
            latest,
            cursor: 0,
            continue_backtest: true,
        })
    }

    /// Load every symbol from a source, then build the handler.
    pub fn from_source(
        source: &dyn BarSource,
        symbols: Vec<Symbol>,
        start_date: Option<BarTime>,
    ) -> Result<Self> {
        info!(source = %source.describe(), symbols = ?symbols, "loading bars");
        let mut tables = HashMap::with_capacity(symbols.len());
        for symbol in &symbols {
            let bars = source.load(symbol)?;
            debug!(%symbol, rows = bars.len(), "loaded bar table");
            tables.insert(symbol.clone(), bars);
        }
        Self::from_tables(symbols, tables, start_date)
    }

    /// Build from the data section of a run configuration.
    pub fn from_config(config: &DataConfig) -> Result<Self> {
        let symbols = config.symbols.clone();
        match &config.source {
            DataSource::Csv { dir } => {
                Self::from_source(&CsvBarSource::new(dir), symbols, config.start_date)
            }
            DataSource::Sqlite {
                path,
                table,
                columns,
            } => {
                let source = SqliteBarSource::open(path, table, columns)?;
                Self::from_source(&source, symbols, config.start_date)
            }
        }
    }

    /// Replay dates, strictly after the start date.
    pub fn replay_calendar(&self) -> &[BarTime] {
        &self.calendar
    }
}

impl DataHandler for HistoricDataHandler {
    fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    fn get_latest_bars(&self, symbol: &str, n: usize) -> &[Bar] {
        match self.latest.get(symbol) {
            Some(bars) => &bars[bars.len().saturating_sub(n)..],
            None => &[],
        }
    }

    fn update_bars(&mut self, events: &mut EventQueue) {
        if self.cursor >= self.calendar.len() {
            self.continue_backtest = false;
            return;
        }

        for symbol in &self.symbols {
            let revealed = self.replay.get(symbol).and_then(|series| series[self.cursor].as_ref());
            if let (Some(bar), Some(view)) = (revealed, self.latest.get_mut(symbol)) {
                view.push(bar.clone());
            }
        }
        self.cursor += 1;
        if self.cursor >= self.calendar.len() {
            self.continue_backtest = false;
        }

        events.push(Event::Market);
    }

    fn continue_backtest(&self) -> bool {
        self.continue_backtest
    }

    fn current_time(&self) -> Option<BarTime> {
        self.cursor.checked_sub(1).map(|i| self.calendar[i])
    }

    fn start_date(&self) -> Option<BarTime> {
        self.start_date
    }

    fn historical_bars(&self, symbol: &str) -> &[Option<Bar>] {
        self.historical.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }
}
