//! Query-backed bar source: rows of a SQLite table.

use crate::csv_source::parse_date;
use crate::handler::BarSource;
use replay_core::config::SqlColumns;
use replay_core::{Bar, Error, Result};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

/// Loads one symbol at a time with
/// `SELECT date, open, high, low, close, volume FROM <table> WHERE symbol = ? ORDER BY date`.
pub struct SqliteBarSource {
    conn: Connection,
    table: String,
    query: String,
}

impl SqliteBarSource {
    /// Open a database file read-only.
    pub fn open(path: impl AsRef<Path>, table: &str, columns: &SqlColumns) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::database(format!("cannot open {}: {e}", path.display())))?;
        Self::from_connection(conn, table, columns)
    }

    /// Wrap an existing connection (e.g. an in-memory database).
    pub fn from_connection(conn: Connection, table: &str, columns: &SqlColumns) -> Result<Self> {
        let query = build_query(table, columns)?;
        debug!(%query, "prepared bar query");
        Ok(Self {
            conn,
            table: table.to_string(),
            query,
        })
    }
}

impl BarSource for SqliteBarSource {
    fn load(&self, symbol: &str) -> Result<Vec<Bar>> {
        let mut stmt = self
            .conn
            .prepare_cached(&self.query)
            .map_err(|e| Error::database(e.to_string()))?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            })
            .map_err(|e| Error::database(e.to_string()))?;

        let mut bars = Vec::new();
        for row in rows {
            let (raw_date, open, high, low, close, volume) =
                row.map_err(|e| Error::database(e.to_string()))?;
            let timestamp = parse_date(raw_date.trim()).ok_or_else(|| {
                Error::data(format!("{}: bad date '{raw_date}' for {symbol}", self.table))
            })?;
            let Some(close) = close else {
                continue;
            };
            bars.push(Bar {
                timestamp,
                open: open.unwrap_or(close),
                high: high.unwrap_or(close),
                low: low.unwrap_or(close),
                close,
                volume: volume.unwrap_or(0.0),
            });
        }
        Ok(bars)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.table)
    }
}

/// Identifiers are interpolated into SQL, so only plain names pass.
fn check_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(Error::config(format!("invalid SQL identifier '{name}'")))
    }
}

fn column_expr(column: Option<&String>) -> Result<String> {
    match column {
        Some(name) => Ok(format!("\"{}\"", check_identifier(name)?)),
        None => Ok("NULL".to_string()),
    }
}

fn build_query(table: &str, columns: &SqlColumns) -> Result<String> {
    let table = check_identifier(table)?;
    let date = check_identifier(&columns.date)?;
    let symbol = check_identifier(&columns.symbol)?;
    let close = check_identifier(&columns.close)?;

    Ok(format!(
        "SELECT CAST(\"{date}\" AS TEXT), {open}, {high}, {low}, \"{close}\", {volume} \
         FROM \"{table}\" WHERE \"{symbol}\" = ?1 ORDER BY \"{date}\"",
        open = column_expr(columns.open.as_ref())?,
        high = column_expr(columns.high.as_ref())?,
        low = column_expr(columns.low.as_ref())?,
        volume = column_expr(columns.volume.as_ref())?,
    ))
}
