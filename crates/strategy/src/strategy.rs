//! The strategy trait and the factory that builds one from configuration.

use crate::{
    BuyAndHoldStrategy, DualMovingAverageStrategy, MovingAverageStrategy, RibbonStrategy,
};
use replay_core::config::StrategyKind;
use replay_core::{Direction, Event, EventQueue, Result, SignalEvent, Symbol};
use replay_data::DataHandler;
use std::collections::HashMap;
use tracing::debug;

/// Turns newly revealed bars into trading signals.
pub trait Strategy {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// React to an event. Only `Market` events produce signals; everything
    /// else is ignored.
    fn calculate_signals(&mut self, event: &Event, data: &dyn DataHandler, events: &mut EventQueue);
}

/// Per-symbol "currently long" flags shared by every strategy.
#[derive(Debug, Clone, Default)]
pub struct LongFlags {
    long: HashMap<Symbol, bool>,
}

impl LongFlags {
    /// Every symbol starts flat.
    pub fn new(symbols: &[Symbol]) -> Self {
        Self {
            long: symbols.iter().map(|s| (s.clone(), false)).collect(),
        }
    }

    pub fn is_long(&self, symbol: &str) -> bool {
        self.long.get(symbol).copied().unwrap_or(false)
    }

    /// Queue a signal stamped with the latest bar's date and flip the flag.
    pub fn emit(
        &mut self,
        symbol: &str,
        direction: Direction,
        data: &dyn DataHandler,
        events: &mut EventQueue,
    ) {
        let Some(bar) = data.latest_bar(symbol) else {
            return;
        };
        let signal = SignalEvent::new(symbol, bar.timestamp, direction);
        debug!(%signal, "signal");
        events.push(Event::Signal(signal));
        self.long
            .insert(symbol.to_string(), direction == Direction::Long);
    }
}

/// Build the configured strategy for `symbols`.
pub fn build_strategy(kind: &StrategyKind, symbols: &[Symbol]) -> Result<Box<dyn Strategy>> {
    kind.validate()?;
    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::BuyAndHold => Box::new(BuyAndHoldStrategy::new(symbols)),
        StrategyKind::Sma { window } => Box::new(MovingAverageStrategy::new(symbols, *window)),
        StrategyKind::DualSma {
            short_window,
            long_window,
        } => Box::new(DualMovingAverageStrategy::new(
            symbols,
            *short_window,
            *long_window,
        )?),
        StrategyKind::Ribbon { windows } => Box::new(RibbonStrategy::new(symbols, windows.clone())?),
    };
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<Symbol> {
        vec!["ASELS.E".to_string()]
    }

    #[test]
    fn test_build_each_kind() {
        let kinds = [
            (StrategyKind::BuyAndHold, "buy_and_hold"),
            (StrategyKind::Sma { window: 5 }, "sma"),
            (
                StrategyKind::DualSma {
                    short_window: 5,
                    long_window: 20,
                },
                "dual_sma",
            ),
            (StrategyKind::default_ribbon(), "ribbon"),
        ];
        for (kind, name) in kinds {
            let strategy = build_strategy(&kind, &symbols()).unwrap();
            assert_eq!(strategy.name(), name);
        }
    }

    #[test]
    fn test_build_rejects_bad_windows() {
        let kind = StrategyKind::DualSma {
            short_window: 20,
            long_window: 20,
        };
        assert!(build_strategy(&kind, &symbols()).is_err());
        assert!(build_strategy(&StrategyKind::Ribbon { windows: vec![] }, &symbols()).is_err());
    }

    #[test]
    fn test_long_flags_start_flat() {
        let flags = LongFlags::new(&symbols());
        assert!(!flags.is_long("ASELS.E"));
        assert!(!flags.is_long("UNKNOWN"));
    }
}
