//! Core types and configuration for the bar-replay backtester.
//!
//! This crate provides shared types used across all other crates:
//! - Bars and per-bar portfolio records
//! - Events and the event queue that connects the engine's components
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, EventQueue, FillEvent, OrderEvent, SignalEvent};
pub use types::*;
