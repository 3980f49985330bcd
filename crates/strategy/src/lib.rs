//! Signal generation for the bar-replay backtester.
//!
//! This crate handles:
//! - The `Strategy` trait every signal generator implements
//! - Moving averages over the latest revealed bars
//! - Buy-and-hold, single SMA, dual SMA and ribbon strategies
//! - Building the configured strategy as a trait object

pub mod buy_and_hold;
pub mod moving_average;
pub mod ribbon;
pub mod rolling;
pub mod strategy;

pub use buy_and_hold::BuyAndHoldStrategy;
pub use moving_average::{DualMovingAverageStrategy, MovingAverageStrategy};
pub use ribbon::RibbonStrategy;
pub use strategy::{build_strategy, LongFlags, Strategy};
