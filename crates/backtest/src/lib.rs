//! Backtesting engine for the bar-replay backtester.
//!
//! This crate provides:
//! - Portfolios that size orders and keep positions and holdings
//! - Max-Sharpe allocation search over the historical segment
//! - Simulated execution at the latest close
//! - Performance statistics (equity curve, Sharpe, drawdowns)
//! - The event dispatch loop and run export

pub mod engine;
pub mod execution;
pub mod export;
pub mod optimizer;
pub mod performance;
pub mod portfolio;
pub mod position;

pub use engine::{Backtest, BacktestReport, DispatchCounts};
pub use execution::{ExecutionHandler, FillRecord, SimulatedExecutionHandler};
pub use export::export_report;
pub use optimizer::{AllocationSearch, SearchConfig};
pub use performance::{EquityPoint, PerformanceSummary};
pub use portfolio::{build_portfolio, GreedyPortfolio, NaivePortfolio, Portfolio};
pub use position::{HoldingsSnapshot, PositionSnapshot, PositionTracker};
