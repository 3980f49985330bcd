//! Bar loading and replay for the bar-replay backtester.
//!
//! This crate handles:
//! - Loading per-symbol bar tables (CSV files, SQLite tables, in-memory)
//! - Aligning every symbol onto a shared calendar with forward-fill
//! - Splitting the calendar into a historical segment and a replay segment
//! - Revealing one bar per symbol at a time through the `DataHandler` trait

pub mod calendar;
pub mod csv_source;
pub mod handler;
pub mod sqlite_source;

pub use calendar::{AlignedSeries, Calendar};
pub use csv_source::CsvBarSource;
pub use handler::{BarSource, DataHandler, HistoricDataHandler};
pub use sqlite_source::SqliteBarSource;
