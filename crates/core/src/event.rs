//! Events that drive the backtest, and the FIFO queue that carries them.
//!
//! Each event is produced by exactly one component and consumed by exactly
//! one other:
//! - `Market`: data handler -> strategy and portfolio
//! - `Signal`: strategy -> portfolio
//! - `Order`: portfolio -> execution
//! - `Fill`: execution -> portfolio

use crate::types::{BarTime, Direction, OrderKind, OrderSide, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Commission charged per unit when a fill does not carry its own.
pub const COMMISSION_PER_UNIT: f64 = 0.05;

/// Floor applied to the default commission.
pub const MIN_COMMISSION: f64 = 5.0;

/// Default commission for a fill of `quantity` units.
#[inline]
pub fn default_commission(quantity: f64) -> f64 {
    (quantity * COMMISSION_PER_UNIT).max(MIN_COMMISSION)
}

/// A trading opinion from a strategy, not yet sized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: Symbol,
    pub timestamp: BarTime,
    pub direction: Direction,
}

impl SignalEvent {
    pub fn new(symbol: impl Into<Symbol>, timestamp: BarTime, direction: Direction) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            direction,
        }
    }
}

impl fmt::Display for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signal: symbol={}, direction={}, date={}",
            self.symbol, self.direction, self.timestamp
        )
    }
}

/// An instruction to transact, produced by a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub symbol: Symbol,
    pub kind: OrderKind,
    /// Unsigned quantity; the side carries the sign.
    pub quantity: f64,
    pub side: OrderSide,
    pub timestamp: BarTime,
}

impl OrderEvent {
    /// Create a market order.
    pub fn market(
        symbol: impl Into<Symbol>,
        quantity: f64,
        side: OrderSide,
        timestamp: BarTime,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind: OrderKind::Market,
            quantity,
            side,
            timestamp,
        }
    }
}

impl fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order: symbol={}, kind={}, quantity={}, side={}",
            self.symbol, self.kind, self.quantity, self.side
        )
    }
}

/// A completed transaction reported by the execution simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub timestamp: BarTime,
    pub symbol: Symbol,
    /// Venue the fill is attributed to.
    pub venue: String,
    pub quantity: f64,
    pub side: OrderSide,
    /// Notional value of the fill (price x quantity), unsigned.
    pub fill_cost: f64,
    pub commission: f64,
}

impl FillEvent {
    /// Create a fill. Without an explicit commission the default
    /// `max(quantity * 0.05, 5.0)` applies.
    pub fn new(
        timestamp: BarTime,
        symbol: impl Into<Symbol>,
        venue: impl Into<String>,
        quantity: f64,
        side: OrderSide,
        fill_cost: f64,
        commission: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            venue: venue.into(),
            quantity,
            side,
            fill_cost,
            commission: commission.unwrap_or_else(|| default_commission(quantity)),
        }
    }
}

impl fmt::Display for FillEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fill: symbol={}, side={}, quantity={}, cost={:.2}, commission={:.2}, venue={}",
            self.symbol, self.side, self.quantity, self.fill_cost, self.commission, self.venue
        )
    }
}

/// Event flowing through the dispatch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A new bar is the latest bar for every symbol.
    Market,
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
}

impl Event {
    /// Short name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Market => "MARKET",
            Event::Signal(_) => "SIGNAL",
            Event::Order(_) => "ORDER",
            Event::Fill(_) => "FILL",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Market => f.write_str("Market"),
            Event::Signal(signal) => signal.fmt(f),
            Event::Order(order) => order.fmt(f),
            Event::Fill(fill) => fill.fmt(f),
        }
    }
}

/// Single-threaded FIFO queue shared by every component of a run.
///
/// The engine owns it and lends it mutably to whichever component is
/// currently handling an event.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at the back.
    #[inline]
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Take the oldest event, if any.
    #[inline]
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the queue is drained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day() -> BarTime {
        NaiveDate::from_ymd_opt(2016, 1, 4).unwrap()
    }

    #[test]
    fn test_default_commission_floor() {
        // 10 * 0.05 = 0.5 -> floored to 5
        let fill = FillEvent::new(day(), "ASELS.E", "SIM", 10.0, OrderSide::Buy, 100.0, None);
        assert!((fill.commission - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_commission_per_unit() {
        // 1000 * 0.05 = 50
        let fill = FillEvent::new(day(), "ASELS.E", "SIM", 1000.0, OrderSide::Sell, 9000.0, None);
        assert!((fill.commission - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_commission_wins() {
        let fill = FillEvent::new(day(), "ASELS.E", "SIM", 1000.0, OrderSide::Buy, 9000.0, Some(1.5));
        assert_eq!(fill.commission, 1.5);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = EventQueue::new();
        queue.push(Event::Market);
        queue.push(Event::Signal(SignalEvent::new("A", day(), Direction::Long)));
        queue.push(Event::Order(OrderEvent::market("A", 100.0, OrderSide::Buy, day())));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().map(|e| e.kind()), Some("MARKET"));
        assert_eq!(queue.pop().map(|e| e.kind()), Some("SIGNAL"));
        assert_eq!(queue.pop().map(|e| e.kind()), Some("ORDER"));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_signal_display() {
        let signal = SignalEvent::new("GSRAY.E", day(), Direction::Exit);
        assert_eq!(
            signal.to_string(),
            "Signal: symbol=GSRAY.E, direction=EXIT, date=2016-01-04"
        );
    }
}
