//! Position and holdings bookkeeping shared by every portfolio.
//!
//! Tracks signed positions, cash, cumulative commission, and appends one
//! positions snapshot and one holdings snapshot per replayed bar.

use replay_core::{BarTime, Error, FillEvent, Result, Symbol};
use replay_data::DataHandler;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Signed position per symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Bar date; `None` for an opening snapshot without a start date.
    pub timestamp: Option<BarTime>,
    pub positions: BTreeMap<Symbol, f64>,
}

/// Cash and mark-to-market value at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    /// Bar date; `None` for an opening snapshot without a start date.
    pub timestamp: Option<BarTime>,
    /// Cash net of every fill cost and commission paid so far.
    pub cash: f64,
    /// Per-symbol cash buckets. Empty unless the portfolio sizes by bucket.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocations: BTreeMap<Symbol, f64>,
    /// Commission paid since the start of the run.
    pub commission: f64,
    /// Position x latest close per symbol.
    pub values: BTreeMap<Symbol, f64>,
    pub total: f64,
}

impl HoldingsSnapshot {
    /// Cash before commission deductions.
    ///
    /// `gross_cash() + market_value() - commission == total` holds for every
    /// marked snapshot.
    pub fn gross_cash(&self) -> f64 {
        self.cash + self.commission
    }

    /// Sum of the mark-to-market values.
    pub fn market_value(&self) -> f64 {
        self.values.values().sum()
    }
}

/// Position tracker for a replay.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    symbols: Vec<Symbol>,
    initial_capital: f64,
    /// Current signed position per symbol.
    positions: HashMap<Symbol, f64>,
    /// Current per-symbol cash buckets (greedy sizing only).
    buckets: Option<HashMap<Symbol, f64>>,
    cash: f64,
    commission: f64,
    total: f64,
    all_positions: Vec<PositionSnapshot>,
    all_holdings: Vec<HoldingsSnapshot>,
}

impl PositionTracker {
    /// Create a tracker and record the opening snapshot.
    ///
    /// `buckets`, when given, splits the capital per symbol; fills then
    /// draw on their symbol's bucket as well as on the shared cash.
    pub fn new(
        symbols: &[Symbol],
        initial_capital: f64,
        start: Option<BarTime>,
        buckets: Option<HashMap<Symbol, f64>>,
    ) -> Self {
        let positions: HashMap<Symbol, f64> = symbols.iter().map(|s| (s.clone(), 0.0)).collect();
        let mut tracker = Self {
            symbols: symbols.to_vec(),
            initial_capital,
            positions,
            buckets,
            cash: initial_capital,
            commission: 0.0,
            total: initial_capital,
            all_positions: Vec::new(),
            all_holdings: Vec::new(),
        };
        let values = symbols.iter().map(|s| (s.clone(), 0.0)).collect();
        tracker.record(start, values);
        tracker
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Current signed position in `symbol` (0 when unknown).
    pub fn position(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Current positions, in symbol order.
    pub fn current_positions(&self) -> Vec<(Symbol, f64)> {
        self.symbols
            .iter()
            .map(|s| (s.clone(), self.position(s)))
            .collect()
    }

    /// Current cash bucket of `symbol`, if the portfolio sizes by bucket.
    pub fn bucket(&self, symbol: &str) -> Option<f64> {
        self.buckets.as_ref()?.get(symbol).copied()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    /// Running total: last marked total adjusted by fills since.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn positions_history(&self) -> &[PositionSnapshot] {
        &self.all_positions
    }

    pub fn holdings_history(&self) -> &[HoldingsSnapshot] {
        &self.all_holdings
    }

    /// Book a fill against positions, cash and commission.
    pub fn apply_fill(&mut self, fill: &FillEvent) -> Result<()> {
        let position = self
            .positions
            .get_mut(&fill.symbol)
            .ok_or_else(|| Error::portfolio(format!("fill for unknown symbol {}", fill.symbol)))?;

        let sign = fill.side.sign();
        *position += sign * fill.quantity;

        let cost = sign * fill.fill_cost;
        let outflow = cost + fill.commission;
        self.cash -= outflow;
        self.commission += fill.commission;
        self.total -= outflow;
        if let Some(bucket) = self
            .buckets
            .as_mut()
            .and_then(|buckets| buckets.get_mut(&fill.symbol))
        {
            *bucket -= outflow;
        }
        Ok(())
    }

    /// Mark every position at its latest revealed close and record the
    /// snapshots for the bar just revealed.
    pub fn mark(&mut self, data: &dyn DataHandler) {
        let values: BTreeMap<Symbol, f64> = self
            .symbols
            .iter()
            .map(|s| {
                let close = data.latest_bar(s).map(|b| b.close).unwrap_or(0.0);
                (s.clone(), self.position(s) * close)
            })
            .collect();
        self.record(data.current_time(), values);
    }

    fn record(&mut self, timestamp: Option<BarTime>, values: BTreeMap<Symbol, f64>) {
        self.total = self.cash + values.values().sum::<f64>();

        self.all_positions.push(PositionSnapshot {
            timestamp,
            positions: self
                .positions
                .iter()
                .map(|(s, q)| (s.clone(), *q))
                .collect(),
        });
        self.all_holdings.push(HoldingsSnapshot {
            timestamp,
            cash: self.cash,
            allocations: self
                .buckets
                .iter()
                .flatten()
                .map(|(s, b)| (s.clone(), *b))
                .collect(),
            commission: self.commission,
            values,
            total: self.total,
        });
    }
}
