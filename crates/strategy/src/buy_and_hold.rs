//! Buy-and-hold: go long on the first bar of each symbol and never exit.

use crate::{LongFlags, Strategy};
use replay_core::{Direction, Event, EventQueue, Symbol};
use replay_data::DataHandler;

/// Emits exactly one LONG per symbol, on its first revealed bar.
#[derive(Debug, Clone)]
pub struct BuyAndHoldStrategy {
    symbols: Vec<Symbol>,
    bought: LongFlags,
}

impl BuyAndHoldStrategy {
    pub fn new(symbols: &[Symbol]) -> Self {
        Self {
            symbols: symbols.to_vec(),
            bought: LongFlags::new(symbols),
        }
    }
}

impl Strategy for BuyAndHoldStrategy {
    fn name(&self) -> &'static str {
        "buy_and_hold"
    }

    fn calculate_signals(&mut self, event: &Event, data: &dyn DataHandler, events: &mut EventQueue) {
        if !matches!(event, Event::Market) {
            return;
        }
        for symbol in &self.symbols {
            if !self.bought.is_long(symbol) && data.latest_bar(symbol).is_some() {
                self.bought.emit(symbol, Direction::Long, data, events);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{feed, run};
    use replay_core::{EventQueue, SignalEvent};

    #[test]
    fn test_single_long_on_first_bar() {
        let mut data = feed("ASELS.E", &[10.0, 11.0, 9.0, 12.0, 13.0]);
        let mut strategy = BuyAndHoldStrategy::new(&["ASELS.E".to_string()]);

        let signals = run(&mut strategy, &mut data);
        assert_eq!(signals.len(), 5);
        assert_eq!(signals[0].len(), 1);
        assert_eq!(signals[0][0].direction, Direction::Long);
        assert!(signals[1..].iter().all(Vec::is_empty));
    }

    #[test]
    fn test_ignores_non_market_events() {
        let mut data = feed("ASELS.E", &[10.0]);
        let mut events = EventQueue::new();
        data.update_bars(&mut events);
        events.pop();

        let mut strategy = BuyAndHoldStrategy::new(&["ASELS.E".to_string()]);
        let other = Event::Signal(SignalEvent::new(
            "ASELS.E",
            data.current_time().unwrap(),
            Direction::Long,
        ));
        strategy.calculate_signals(&other, &data, &mut events);
        assert!(events.is_empty());
    }
}
