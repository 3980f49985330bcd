//! Moving-average ribbon.
//!
//! The latest close is compared against a set of moving averages. A strict
//! majority above the ribbon opens a long; a strict majority below closes
//! it. Ties with a mean count for neither side.

use crate::rolling::{count_above_below, sma_ribbon};
use crate::{LongFlags, Strategy};
use replay_core::{Direction, Error, Event, EventQueue, Result, Symbol};
use replay_data::DataHandler;

#[derive(Debug, Clone)]
pub struct RibbonStrategy {
    symbols: Vec<Symbol>,
    windows: Vec<usize>,
    longest: usize,
    bought: LongFlags,
}

impl RibbonStrategy {
    pub fn new(symbols: &[Symbol], windows: Vec<usize>) -> Result<Self> {
        let longest = windows.iter().copied().max().unwrap_or(0);
        if longest == 0 || windows.contains(&0) {
            return Err(Error::strategy("ribbon needs non-empty, non-zero windows"));
        }
        Ok(Self {
            symbols: symbols.to_vec(),
            windows,
            longest,
            bought: LongFlags::new(symbols),
        })
    }

    /// Means needed on one side to signal: `floor(n / 2) + 1`.
    pub fn threshold(&self) -> usize {
        self.windows.len() / 2 + 1
    }
}

impl Strategy for RibbonStrategy {
    fn name(&self) -> &'static str {
        "ribbon"
    }

    fn calculate_signals(&mut self, event: &Event, data: &dyn DataHandler, events: &mut EventQueue) {
        if !matches!(event, Event::Market) {
            return;
        }
        let threshold = self.threshold();
        for symbol in &self.symbols {
            let bars = data.get_latest_bars(symbol, self.longest);
            let (Some(means), Some(last)) = (sma_ribbon(bars, &self.windows), bars.last()) else {
                continue;
            };
            let (above, below) = count_above_below(last.close, &means);
            let long = self.bought.is_long(symbol);
            if above >= threshold && !long {
                self.bought.emit(symbol, Direction::Long, data, events);
            } else if below >= threshold && long {
                self.bought.emit(symbol, Direction::Exit, data, events);
            }
        }
    }
}
