//! Backtest engine.
//!
//! Replays the data feed one bar at a time and drains the event queue after
//! every bar, routing each event to the component that consumes it:
//! - `Market` -> strategy, then portfolio time index
//! - `Signal` -> portfolio
//! - `Order` -> execution
//! - `Fill` -> portfolio

use crate::execution::{ExecutionHandler, FillRecord, SimulatedExecutionHandler};
use crate::optimizer::AllocationSearch;
use crate::performance::{build_equity_curve, EquityPoint, PerformanceSummary};
use crate::portfolio::{build_portfolio, Portfolio};
use crate::position::{HoldingsSnapshot, PositionSnapshot};
use replay_core::config::PerformanceConfig;
use replay_core::{BarTime, Config, Event, EventQueue, Result, Symbol};
use replay_data::{DataHandler, HistoricDataHandler};
use replay_strategy::{build_strategy, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Events dispatched per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCounts {
    pub market: usize,
    pub signal: usize,
    pub order: usize,
    pub fill: usize,
}

impl DispatchCounts {
    fn record(&mut self, event: &Event) {
        match event {
            Event::Market => self.market += 1,
            Event::Signal(_) => self.signal += 1,
            Event::Order(_) => self.order += 1,
            Event::Fill(_) => self.fill += 1,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub portfolio: String,
    pub symbols: Vec<Symbol>,
    pub start_date: Option<BarTime>,
    pub summary: PerformanceSummary,
    pub equity_curve: Vec<EquityPoint>,
    pub holdings: Vec<HoldingsSnapshot>,
    pub positions: Vec<PositionSnapshot>,
    pub fills: BTreeMap<Symbol, Vec<FillRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationSearch>,
    pub events: DispatchCounts,
}

/// One configured run.
pub struct Backtest {
    data: Box<dyn DataHandler>,
    strategy: Box<dyn Strategy>,
    portfolio: Box<dyn Portfolio>,
    execution: Box<dyn ExecutionHandler>,
    performance: PerformanceConfig,
    events: EventQueue,
    counts: DispatchCounts,
}

impl Backtest {
    /// Assemble a run from ready-made components.
    pub fn new(
        data: Box<dyn DataHandler>,
        strategy: Box<dyn Strategy>,
        portfolio: Box<dyn Portfolio>,
        execution: Box<dyn ExecutionHandler>,
        performance: PerformanceConfig,
    ) -> Self {
        Self {
            data,
            strategy,
            portfolio,
            execution,
            performance,
            events: EventQueue::new(),
            counts: DispatchCounts::default(),
        }
    }

    /// Validate `config`, load the bars and build every component.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let data = HistoricDataHandler::from_config(&config.data)?;
        Self::with_data(config, Box::new(data))
    }

    /// Build the configured components around an already loaded feed.
    pub fn with_data(config: &Config, data: Box<dyn DataHandler>) -> Result<Self> {
        let strategy = build_strategy(&config.strategy.kind, data.symbols())?;
        let portfolio = build_portfolio(&config.portfolio, data.as_ref())?;
        let execution = Box::new(SimulatedExecutionHandler::new(&config.execution.venue));
        Ok(Self::new(
            data,
            strategy,
            portfolio,
            execution,
            config.performance.clone(),
        ))
    }

    /// Replay every bar and summarize the run.
    pub fn run(&mut self) -> Result<BacktestReport> {
        info!(
            strategy = self.strategy.name(),
            portfolio = self.portfolio.name(),
            symbols = ?self.data.symbols(),
            "starting backtest"
        );

        while self.data.continue_backtest() {
            self.data.update_bars(&mut self.events);
            while let Some(event) = self.events.pop() {
                self.dispatch(event)?;
            }
        }

        let report = self.report();
        info!(
            bars = self.counts.market,
            signals = self.counts.signal,
            fills = self.counts.fill,
            final_total = report.summary.final_total,
            "backtest finished"
        );
        Ok(report)
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        self.counts.record(&event);
        match &event {
            Event::Market => {
                debug!(date = ?self.data.current_time(), "market");
                self.strategy
                    .calculate_signals(&event, self.data.as_ref(), &mut self.events);
                self.portfolio.update_time_index(self.data.as_ref());
            }
            Event::Signal(signal) => {
                self.portfolio
                    .update_signal(signal, self.data.as_ref(), &mut self.events);
            }
            Event::Order(order) => {
                self.execution
                    .execute_order(order, self.data.as_ref(), &mut self.events)?;
            }
            Event::Fill(fill) => {
                self.portfolio.update_fill(fill)?;
            }
        }
        Ok(())
    }

    /// Report of the bars replayed so far.
    pub fn report(&self) -> BacktestReport {
        let holdings = self.portfolio.holdings_history();
        BacktestReport {
            strategy: self.strategy.name().to_string(),
            portfolio: self.portfolio.name().to_string(),
            symbols: self.data.symbols().to_vec(),
            start_date: self.data.start_date(),
            summary: PerformanceSummary::from_holdings(
                holdings,
                self.portfolio.initial_capital(),
                &self.performance,
            ),
            equity_curve: build_equity_curve(holdings),
            holdings: holdings.to_vec(),
            positions: self.portfolio.positions_history().to_vec(),
            fills: self.execution.fill_history().clone(),
            allocation: self.portfolio.allocation().cloned(),
            events: self.counts,
        }
    }

    pub fn portfolio(&self) -> &dyn Portfolio {
        self.portfolio.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use replay_core::config::{PortfolioKind, StrategyKind};
    use replay_core::Bar;
    use std::collections::HashMap;

    fn feed(closes: &[f64]) -> HistoricDataHandler {
        let start = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(start + chrono::Days::new(i as u64), c))
            .collect();
        HistoricDataHandler::from_tables(
            vec!["ASELS.E".to_string()],
            HashMap::from([("ASELS.E".to_string(), bars)]),
            None,
        )
        .unwrap()
    }

    fn config(kind: StrategyKind, portfolio: PortfolioKind) -> Config {
        let mut config = Config::default();
        config.data.symbols = vec!["ASELS.E".to_string()];
        config.strategy.kind = kind;
        config.portfolio.kind = portfolio;
        config.portfolio.initial_capital = 1000.0;
        config
    }

    #[test]
    fn test_one_market_event_per_bar() {
        let cfg = config(StrategyKind::BuyAndHold, PortfolioKind::Naive);
        let mut backtest = Backtest::with_data(&cfg, Box::new(feed(&[1.0, 2.0, 3.0]))).unwrap();
        let report = backtest.run().unwrap();

        assert_eq!(report.events.market, 3);
        assert_eq!(report.events.signal, 1);
        assert_eq!(report.events.order, 1);
        assert_eq!(report.events.fill, 1);
        assert_eq!(report.holdings.len(), 4);
        assert_eq!(report.positions.len(), 4);
    }

    #[test]
    fn test_greedy_round_trip_costs_commission() {
        // Close 4 above its 2-bar mean on bar 1, close 1 below it on bar 3.
        let cfg = config(StrategyKind::Sma { window: 2 }, PortfolioKind::Greedy);
        let mut backtest =
            Backtest::with_data(&cfg, Box::new(feed(&[2.0, 4.0, 4.0, 1.0]))).unwrap();
        let report = backtest.run().unwrap();

        let fills = &report.fills["ASELS.E"];
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].quantity, 250.0);

        // Bought 250 at 4, sold 250 at 1, 12.5 commission each way.
        let tracker = backtest.portfolio().tracker();
        assert_eq!(tracker.position("ASELS.E"), 0.0);
        let expected = 1000.0 - 250.0 * 4.0 + 250.0 * 1.0 - 2.0 * 12.5;
        assert!((tracker.cash() - expected).abs() < 1e-9);
        assert!((tracker.commission() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_names_components() {
        let cfg = config(StrategyKind::default_ribbon(), PortfolioKind::Naive);
        let mut backtest = Backtest::with_data(&cfg, Box::new(feed(&[1.0; 5]))).unwrap();
        let report = backtest.run().unwrap();

        assert_eq!(report.strategy, "ribbon");
        assert_eq!(report.portfolio, "naive");
        assert!(report.fills.is_empty());
        assert!(report.allocation.is_none());
    }
}
