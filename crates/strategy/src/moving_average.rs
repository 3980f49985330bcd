//! Moving-average crossover strategies.
//!
//! - Single SMA: the latest close against one moving average
//! - Dual SMA: a short moving average against a long one
//!
//! Both stay silent until enough bars are revealed to fill the longest
//! window, and only signal on a change of state (flat -> long or
//! long -> flat).

use crate::rolling::sma;
use crate::{LongFlags, Strategy};
use replay_core::{Direction, Error, Event, EventQueue, Result, Symbol};
use replay_data::DataHandler;

/// Latest close against its `window`-bar mean.
#[derive(Debug, Clone)]
pub struct MovingAverageStrategy {
    symbols: Vec<Symbol>,
    window: usize,
    bought: LongFlags,
}

impl MovingAverageStrategy {
    pub fn new(symbols: &[Symbol], window: usize) -> Self {
        Self {
            symbols: symbols.to_vec(),
            window,
            bought: LongFlags::new(symbols),
        }
    }
}

impl Strategy for MovingAverageStrategy {
    fn name(&self) -> &'static str {
        "sma"
    }

    fn calculate_signals(&mut self, event: &Event, data: &dyn DataHandler, events: &mut EventQueue) {
        if !matches!(event, Event::Market) {
            return;
        }
        for symbol in &self.symbols {
            let bars = data.get_latest_bars(symbol, self.window);
            let (Some(mean), Some(last)) = (sma(bars, self.window), bars.last()) else {
                continue;
            };
            let long = self.bought.is_long(symbol);
            if last.close > mean && !long {
                self.bought.emit(symbol, Direction::Long, data, events);
            } else if last.close < mean && long {
                self.bought.emit(symbol, Direction::Exit, data, events);
            }
        }
    }
}

/// Short mean against long mean.
#[derive(Debug, Clone)]
pub struct DualMovingAverageStrategy {
    symbols: Vec<Symbol>,
    short_window: usize,
    long_window: usize,
    bought: LongFlags,
}

impl DualMovingAverageStrategy {
    /// Fails unless `0 < short_window < long_window`.
    pub fn new(symbols: &[Symbol], short_window: usize, long_window: usize) -> Result<Self> {
        if short_window == 0 || short_window >= long_window {
            return Err(Error::strategy(format!(
                "dual SMA needs 0 < short_window < long_window, got {short_window} and {long_window}"
            )));
        }
        Ok(Self {
            symbols: symbols.to_vec(),
            short_window,
            long_window,
            bought: LongFlags::new(symbols),
        })
    }
}

impl Strategy for DualMovingAverageStrategy {
    fn name(&self) -> &'static str {
        "dual_sma"
    }

    fn calculate_signals(&mut self, event: &Event, data: &dyn DataHandler, events: &mut EventQueue) {
        if !matches!(event, Event::Market) {
            return;
        }
        for symbol in &self.symbols {
            let bars = data.get_latest_bars(symbol, self.long_window);
            let (Some(short), Some(long_mean)) =
                (sma(bars, self.short_window), sma(bars, self.long_window))
            else {
                continue;
            };
            let long = self.bought.is_long(symbol);
            if short > long_mean && !long {
                self.bought.emit(symbol, Direction::Long, data, events);
            } else if short < long_mean && long {
                self.bought.emit(symbol, Direction::Exit, data, events);
            }
        }
    }
}
