//! Portfolios: turn signals into sized orders and book the resulting fills.
//!
//! - Naive: a fixed lot per order, cash is not checked
//! - Greedy: capital split into per-symbol cash buckets, each order spends
//!   its symbol's whole bucket at the latest close
//! - Optimized: greedy sizing with buckets fixed by the allocation search

use crate::optimizer::{AllocationSearch, SearchConfig};
use crate::position::{HoldingsSnapshot, PositionSnapshot, PositionTracker};
use replay_core::config::{PortfolioConfig, PortfolioKind};
use replay_core::{
    Direction, Error, Event, EventQueue, FillEvent, OrderEvent, OrderSide, Result, SignalEvent,
    Symbol,
};
use replay_data::DataHandler;
use std::collections::HashMap;
use tracing::{debug, info};

/// Sizes orders from signals and keeps the books.
pub trait Portfolio {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Turn a signal into at most one order.
    fn update_signal(&mut self, signal: &SignalEvent, data: &dyn DataHandler, events: &mut EventQueue);

    /// Book a fill.
    fn update_fill(&mut self, fill: &FillEvent) -> Result<()>;

    /// Record the snapshots for the bar just revealed.
    fn update_time_index(&mut self, data: &dyn DataHandler);

    /// Positions, cash and history.
    fn tracker(&self) -> &PositionTracker;

    /// Allocation search behind the buckets, if any.
    fn allocation(&self) -> Option<&AllocationSearch> {
        None
    }

    fn initial_capital(&self) -> f64 {
        self.tracker().initial_capital()
    }

    fn positions_history(&self) -> &[PositionSnapshot] {
        self.tracker().positions_history()
    }

    fn holdings_history(&self) -> &[HoldingsSnapshot] {
        self.tracker().holdings_history()
    }
}

/// Order for `signal` given the current signed `position`.
///
/// Entries need a flat position and a positive finite quantity; exits
/// unwind whatever is held. Every other combination yields no order.
pub fn order_for(
    signal: &SignalEvent,
    position: f64,
    quantity: impl FnOnce() -> f64,
) -> Option<OrderEvent> {
    let (side, quantity) = match signal.direction {
        Direction::Long if position == 0.0 => (OrderSide::Buy, quantity()),
        Direction::Short if position == 0.0 => (OrderSide::Sell, quantity()),
        Direction::Exit if position > 0.0 => (OrderSide::Sell, position.abs()),
        Direction::Exit if position < 0.0 => (OrderSide::Buy, position.abs()),
        _ => return None,
    };
    if !(quantity.is_finite() && quantity > 0.0) {
        debug!(%signal, quantity, "no order: quantity not positive");
        return None;
    }
    Some(OrderEvent::market(&signal.symbol, quantity, side, signal.timestamp))
}

fn queue_order(order: Option<OrderEvent>, signal: &SignalEvent, events: &mut EventQueue) {
    match order {
        Some(order) => {
            debug!(%order, "order");
            events.push(Event::Order(order));
        }
        None => debug!(%signal, "signal dropped"),
    }
}

/// Fixed lot per order.
#[derive(Debug, Clone)]
pub struct NaivePortfolio {
    tracker: PositionTracker,
    lot_size: f64,
}

impl NaivePortfolio {
    pub fn new(data: &dyn DataHandler, initial_capital: f64, lot_size: f64) -> Self {
        Self {
            tracker: PositionTracker::new(data.symbols(), initial_capital, data.start_date(), None),
            lot_size,
        }
    }
}

impl Portfolio for NaivePortfolio {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn update_signal(&mut self, signal: &SignalEvent, _data: &dyn DataHandler, events: &mut EventQueue) {
        let position = self.tracker.position(&signal.symbol);
        let order = order_for(signal, position, || self.lot_size);
        queue_order(order, signal, events);
    }

    fn update_fill(&mut self, fill: &FillEvent) -> Result<()> {
        self.tracker.apply_fill(fill)
    }

    fn update_time_index(&mut self, data: &dyn DataHandler) {
        self.tracker.mark(data);
    }

    fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }
}

/// Spends each symbol's cash bucket in full on an entry.
#[derive(Debug, Clone)]
pub struct GreedyPortfolio {
    tracker: PositionTracker,
    allocation: Option<AllocationSearch>,
}

impl GreedyPortfolio {
    /// Capital split evenly between symbols.
    pub fn equal_cash(data: &dyn DataHandler, initial_capital: f64) -> Self {
        let share = initial_capital / data.symbols().len() as f64;
        let buckets = data.symbols().iter().map(|s| (s.clone(), share)).collect();
        Self {
            tracker: PositionTracker::new(
                data.symbols(),
                initial_capital,
                data.start_date(),
                Some(buckets),
            ),
            allocation: None,
        }
    }

    /// Capital split by a max-Sharpe search over the historical segment.
    pub fn optimized(
        data: &dyn DataHandler,
        initial_capital: f64,
        search: &SearchConfig,
    ) -> Result<Self> {
        let history: Vec<_> = data
            .symbols()
            .iter()
            .map(|s| data.historical_bars(s))
            .collect();
        let allocation = AllocationSearch::run(data.symbols(), &history, search)?;
        let buckets: HashMap<Symbol, f64> = allocation.allocate(initial_capital);
        info!(buckets = ?buckets, "optimized cash buckets");

        Ok(Self {
            tracker: PositionTracker::new(
                data.symbols(),
                initial_capital,
                data.start_date(),
                Some(buckets),
            ),
            allocation: Some(allocation),
        })
    }
}

impl Portfolio for GreedyPortfolio {
    fn name(&self) -> &'static str {
        if self.allocation.is_some() {
            "optimized"
        } else {
            "greedy"
        }
    }

    fn update_signal(&mut self, signal: &SignalEvent, data: &dyn DataHandler, events: &mut EventQueue) {
        let position = self.tracker.position(&signal.symbol);
        let order = order_for(signal, position, || {
            let bucket = self.tracker.bucket(&signal.symbol).unwrap_or(0.0);
            let close = data.latest_bar(&signal.symbol).map(|b| b.close).unwrap_or(0.0);
            bucket / close
        });
        queue_order(order, signal, events);
    }

    fn update_fill(&mut self, fill: &FillEvent) -> Result<()> {
        self.tracker.apply_fill(fill)
    }

    fn update_time_index(&mut self, data: &dyn DataHandler) {
        self.tracker.mark(data);
    }

    fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    fn allocation(&self) -> Option<&AllocationSearch> {
        self.allocation.as_ref()
    }
}

/// Build the configured portfolio over the handler's symbols.
pub fn build_portfolio(config: &PortfolioConfig, data: &dyn DataHandler) -> Result<Box<dyn Portfolio>> {
    if data.symbols().is_empty() {
        return Err(Error::portfolio("portfolio needs at least one symbol"));
    }
    let portfolio: Box<dyn Portfolio> = match config.kind {
        PortfolioKind::Naive => Box::new(NaivePortfolio::new(
            data,
            config.initial_capital,
            config.lot_size,
        )),
        PortfolioKind::Greedy => Box::new(GreedyPortfolio::equal_cash(data, config.initial_capital)),
        PortfolioKind::Optimized => Box::new(GreedyPortfolio::optimized(
            data,
            config.initial_capital,
            &SearchConfig {
                simulations: config.simulations,
                seed: config.seed,
                trading_days: config.trading_days,
            },
        )?),
    };
    Ok(portfolio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use replay_core::{Bar, BarTime};
    use replay_data::HistoricDataHandler;

    fn day(d: u32) -> BarTime {
        NaiveDate::from_ymd_opt(2016, 1, d).unwrap()
    }

    fn handler(closes: &[(&str, &[f64])], start: Option<BarTime>) -> HistoricDataHandler {
        let symbols = closes.iter().map(|(s, _)| s.to_string()).collect();
        let tables = closes
            .iter()
            .map(|(s, c)| {
                let bars = c
                    .iter()
                    .enumerate()
                    .map(|(i, &close)| Bar::from_close(day(i as u32 + 1), close))
                    .collect();
                (s.to_string(), bars)
            })
            .collect();
        HistoricDataHandler::from_tables(symbols, tables, start).unwrap()
    }

    fn signal(symbol: &str, direction: Direction) -> SignalEvent {
        SignalEvent::new(symbol, day(1), direction)
    }

    fn step(data: &mut HistoricDataHandler) {
        let mut events = EventQueue::new();
        data.update_bars(&mut events);
    }

    fn drain_orders(events: &mut EventQueue) -> Vec<OrderEvent> {
        let mut orders = Vec::new();
        while let Some(event) = events.pop() {
            if let Event::Order(order) = event {
                orders.push(order);
            }
        }
        orders
    }

    #[test]
    fn test_order_table() {
        let cases = [
            (Direction::Long, 0.0, Some((OrderSide::Buy, 7.0))),
            (Direction::Short, 0.0, Some((OrderSide::Sell, 7.0))),
            (Direction::Exit, 30.0, Some((OrderSide::Sell, 30.0))),
            (Direction::Exit, -30.0, Some((OrderSide::Buy, 30.0))),
            (Direction::Exit, 0.0, None),
            (Direction::Long, 5.0, None),
            (Direction::Short, -5.0, None),
        ];
        for (direction, position, expected) in cases {
            let order = order_for(&signal("A", direction), position, || 7.0);
            assert_eq!(
                order.map(|o| (o.side, o.quantity)),
                expected,
                "{direction} at {position}"
            );
        }
    }

    #[test]
    fn test_non_positive_quantity_yields_no_order() {
        assert!(order_for(&signal("A", Direction::Long), 0.0, || 0.0).is_none());
        assert!(order_for(&signal("A", Direction::Long), 0.0, || f64::INFINITY).is_none());
        assert!(order_for(&signal("A", Direction::Long), 0.0, || f64::NAN).is_none());
    }

    #[test]
    fn test_naive_uses_lot_size() {
        let mut data = handler(&[("A", &[10.0, 11.0])], None);
        step(&mut data);
        let mut portfolio = NaivePortfolio::new(&data, 1000.0, 100.0);
        let mut events = EventQueue::new();

        portfolio.update_signal(&signal("A", Direction::Long), &data, &mut events);
        let orders = drain_orders(&mut events);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, 100.0);
        assert_eq!(orders[0].side, OrderSide::Buy);
    }

    #[test]
    fn test_greedy_spends_bucket() {
        let mut data = handler(&[("A", &[10.0, 11.0]), ("B", &[20.0, 21.0])], None);
        step(&mut data);
        let mut portfolio = GreedyPortfolio::equal_cash(&data, 1000.0);
        assert_eq!(portfolio.tracker().bucket("A"), Some(500.0));

        let mut events = EventQueue::new();
        portfolio.update_signal(&signal("B", Direction::Long), &data, &mut events);
        let orders = drain_orders(&mut events);
        assert!((orders[0].quantity - 25.0).abs() < 1e-10);
        assert_eq!(portfolio.name(), "greedy");
    }

    #[test]
    fn test_greedy_without_price_emits_nothing() {
        let data = handler(&[("A", &[10.0])], None);
        let mut portfolio = GreedyPortfolio::equal_cash(&data, 1000.0);
        let mut events = EventQueue::new();

        portfolio.update_signal(&signal("A", Direction::Long), &data, &mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_time_index_marks_at_latest_close() {
        let mut data = handler(&[("A", &[10.0, 12.0])], Some(day(1)));
        let mut portfolio = NaivePortfolio::new(&data, 1000.0, 10.0);
        let fill = FillEvent::new(day(1), "A", "SIMULATED", 10.0, OrderSide::Buy, 100.0, None);
        portfolio.update_fill(&fill).unwrap();

        step(&mut data);
        portfolio.update_time_index(&data);

        let holdings = portfolio.holdings_history();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].timestamp, Some(day(1)));
        let last = &holdings[1];
        assert_eq!(last.timestamp, Some(day(2)));
        assert!((last.values["A"] - 120.0).abs() < 1e-10);
        assert!((last.total - (1000.0 - 105.0 + 120.0)).abs() < 1e-10);
        assert_eq!(portfolio.positions_history()[1].positions["A"], 10.0);
    }

    #[test]
    fn test_optimized_needs_history() {
        let data = handler(&[("A", &[10.0, 11.0, 12.0])], None);
        let config = PortfolioConfig {
            kind: PortfolioKind::Optimized,
            simulations: 10,
            ..PortfolioConfig::default()
        };
        let result = build_portfolio(&config, &data);
        assert!(matches!(result, Err(Error::InsufficientData(_))));
    }

    #[test]
    fn test_optimized_buckets_sum_to_capital() {
        let closes: &[f64] = &[10.0, 10.4, 10.1, 10.9, 11.2, 11.0, 11.5];
        let other: &[f64] = &[5.0, 5.1, 5.3, 5.2, 5.4, 5.6, 5.5];
        let data = handler(&[("A", closes), ("B", other)], Some(day(5)));
        let config = PortfolioConfig {
            kind: PortfolioKind::Optimized,
            initial_capital: 1000.0,
            simulations: 50,
            ..PortfolioConfig::default()
        };
        let portfolio = build_portfolio(&config, &data).unwrap();

        assert_eq!(portfolio.name(), "optimized");
        let opening = &portfolio.holdings_history()[0];
        let allocated: f64 = opening.allocations.values().sum();
        assert!((allocated - 1000.0).abs() < 1e-9);
        assert_eq!(portfolio.allocation().unwrap().weights.len(), 50);
    }
}
