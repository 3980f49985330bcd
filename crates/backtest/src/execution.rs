//! Simulated execution.
//!
//! Every market order fills in full at the symbol's latest close, with the
//! default commission schedule.

use replay_core::{
    BarTime, Error, Event, EventQueue, FillEvent, OrderEvent, OrderSide, Result, Symbol,
};
use replay_data::DataHandler;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Turns orders into fills.
pub trait ExecutionHandler {
    /// Fill `order` and queue the resulting `Fill` event.
    fn execute_order(
        &mut self,
        order: &OrderEvent,
        data: &dyn DataHandler,
        events: &mut EventQueue,
    ) -> Result<()>;

    /// Every fill produced so far, per symbol.
    fn fill_history(&self) -> &BTreeMap<Symbol, Vec<FillRecord>>;
}

/// One executed fill, as kept in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub timestamp: BarTime,
    pub side: OrderSide,
    pub quantity: f64,
    /// Fill price per unit.
    pub price: f64,
    pub commission: f64,
}

/// Fills at the latest close with no slippage.
#[derive(Debug, Clone)]
pub struct SimulatedExecutionHandler {
    venue: String,
    fills: BTreeMap<Symbol, Vec<FillRecord>>,
}

impl SimulatedExecutionHandler {
    /// Create a handler stamping `venue` on every fill.
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            fills: BTreeMap::new(),
        }
    }

    /// Total number of fills across symbols.
    pub fn fill_count(&self) -> usize {
        self.fills.values().map(Vec::len).sum()
    }
}

impl Default for SimulatedExecutionHandler {
    fn default() -> Self {
        Self::new("SIMULATED")
    }
}

impl ExecutionHandler for SimulatedExecutionHandler {
    fn execute_order(
        &mut self,
        order: &OrderEvent,
        data: &dyn DataHandler,
        events: &mut EventQueue,
    ) -> Result<()> {
        let bar = data.latest_bar(&order.symbol).ok_or_else(|| {
            Error::execution(format!("no price revealed for {} yet", order.symbol))
        })?;

        let price = bar.close;
        let fill = FillEvent::new(
            bar.timestamp,
            &order.symbol,
            &self.venue,
            order.quantity,
            order.side,
            price * order.quantity,
            None,
        );

        self.fills
            .entry(order.symbol.clone())
            .or_default()
            .push(FillRecord {
                timestamp: fill.timestamp,
                side: fill.side,
                quantity: fill.quantity,
                price,
                commission: fill.commission,
            });

        debug!(%fill, "fill");
        events.push(Event::Fill(fill));
        Ok(())
    }

    fn fill_history(&self) -> &BTreeMap<Symbol, Vec<FillRecord>> {
        &self.fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use replay_core::Bar;
    use replay_data::HistoricDataHandler;
    use std::collections::HashMap;

    fn day(d: u32) -> BarTime {
        NaiveDate::from_ymd_opt(2016, 1, d).unwrap()
    }

    fn handler() -> HistoricDataHandler {
        HistoricDataHandler::from_tables(
            vec!["ASELS.E".to_string()],
            HashMap::from([(
                "ASELS.E".to_string(),
                vec![Bar::from_close(day(4), 10.0), Bar::from_close(day(5), 11.0)],
            )]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_fill_at_latest_close() {
        let mut data = handler();
        let mut events = EventQueue::new();
        data.update_bars(&mut events);
        events.pop();

        let mut execution = SimulatedExecutionHandler::default();
        let order = OrderEvent::market("ASELS.E", 100.0, OrderSide::Buy, day(4));
        execution.execute_order(&order, &data, &mut events).unwrap();

        let Some(Event::Fill(fill)) = events.pop() else {
            panic!("expected a fill");
        };
        assert_eq!(fill.venue, "SIMULATED");
        assert_eq!(fill.quantity, 100.0);
        assert!((fill.fill_cost - 1000.0).abs() < 1e-10);
        assert!((fill.commission - 5.0).abs() < 1e-10);

        let history = &execution.fill_history()["ASELS.E"];
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 10.0);
        assert_eq!(execution.fill_count(), 1);
    }

    #[test]
    fn test_large_order_commission_scales() {
        let mut data = handler();
        let mut events = EventQueue::new();
        data.update_bars(&mut events);
        events.pop();

        let mut execution = SimulatedExecutionHandler::new("BIST");
        let order = OrderEvent::market("ASELS.E", 1000.0, OrderSide::Sell, day(4));
        execution.execute_order(&order, &data, &mut events).unwrap();

        let Some(Event::Fill(fill)) = events.pop() else {
            panic!("expected a fill");
        };
        assert!((fill.commission - 50.0).abs() < 1e-10);
        assert_eq!(fill.venue, "BIST");
    }

    #[test]
    fn test_order_before_any_bar_is_an_error() {
        let data = handler();
        let mut events = EventQueue::new();
        let mut execution = SimulatedExecutionHandler::default();
        let order = OrderEvent::market("ASELS.E", 1.0, OrderSide::Buy, day(4));

        let result = execution.execute_order(&order, &data, &mut events);
        assert!(matches!(result, Err(Error::Execution(_))));
        assert!(events.is_empty());
    }
}
