//! Core data types for the bar-replay backtester.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar date a bar (and everything derived from it) is stamped with.
pub type BarTime = NaiveDate;

/// Trading symbol (e.g., "ASELS.E").
pub type Symbol = String;

/// One period's OHLCV record for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar date.
    pub timestamp: BarTime,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Total volume.
    pub volume: f64,
}

impl Bar {
    /// Create a bar that only knows its closing price.
    ///
    /// Open, high and low collapse onto the close; volume is zero.
    pub fn from_close(timestamp: BarTime, close: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    /// Copy of this bar re-stamped with another date (used by forward-fill).
    #[inline]
    pub fn restamped(&self, timestamp: BarTime) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Directional opinion carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Open a long position.
    Long,
    /// Open a short position.
    Short,
    /// Flatten whatever is open.
    Exit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Exit => "EXIT",
        })
    }
}

/// Side of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Get sign: +1 for buy, -1 for sell.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        })
    }
}

/// Order type. The simulator only knows market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    #[default]
    Market,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => f.write_str("MARKET"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> BarTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bar_from_close() {
        let bar = Bar::from_close(date(2016, 1, 4), 12.5);
        assert_eq!(bar.open, 12.5);
        assert_eq!(bar.high, 12.5);
        assert_eq!(bar.low, 12.5);
        assert_eq!(bar.volume, 0.0);
    }

    #[test]
    fn test_restamped_keeps_prices() {
        let bar = Bar::from_close(date(2016, 1, 4), 12.5);
        let filled = bar.restamped(date(2016, 1, 5));
        assert_eq!(filled.timestamp, date(2016, 1, 5));
        assert_eq!(filled.close, 12.5);
    }

    #[test]
    fn test_order_side_sign() {
        assert_eq!(OrderSide::Buy.sign(), 1.0);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
    }

    #[test]
    fn test_display_matches_wire_names() {
        assert_eq!(Direction::Exit.to_string(), "EXIT");
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
        assert_eq!(OrderKind::Market.to_string(), "MARKET");
        assert_eq!(serde_json::to_string(&Direction::Long).unwrap(), "\"LONG\"");
    }
}
