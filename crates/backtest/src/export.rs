//! Persist a finished run to a directory.
//!
//! Files written:
//! - `report.json`: the full report
//! - `holdings.csv`: one row per holdings snapshot
//! - `positions.csv`: one row per positions snapshot
//! - `fills.csv`: one row per fill
//! - `allocation.csv`: one row per simulated allocation (optimized runs only)

use crate::engine::BacktestReport;
use replay_core::Result;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write every export file for `report` into `dir`, creating it if needed.
///
/// Returns the paths written.
pub fn export_report(report: &BacktestReport, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();

    let path = dir.join("report.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), report)?;
    written.push(path);

    let path = dir.join("holdings.csv");
    write_holdings(report, &path)?;
    written.push(path);

    let path = dir.join("positions.csv");
    write_positions(report, &path)?;
    written.push(path);

    let path = dir.join("fills.csv");
    write_fills(report, &path)?;
    written.push(path);

    if report.allocation.is_some() {
        let path = dir.join("allocation.csv");
        write_allocation(report, &path)?;
        written.push(path);
    }

    info!(dir = %dir.display(), files = written.len(), "exported run");
    Ok(written)
}

fn date_cell(date: Option<replay_core::BarTime>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

fn write_holdings(report: &BacktestReport, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let bucketed = report.holdings.iter().any(|h| !h.allocations.is_empty());

    let mut header = vec!["timestamp".to_string()];
    header.extend(report.symbols.iter().cloned());
    if bucketed {
        header.extend(report.symbols.iter().map(|s| format!("{s}_cash")));
    }
    header.extend(["cash", "commission", "total"].map(String::from));
    wtr.write_record(&header)?;

    for h in &report.holdings {
        let mut row = vec![date_cell(h.timestamp)];
        row.extend(
            report
                .symbols
                .iter()
                .map(|s| h.values.get(s).copied().unwrap_or(0.0).to_string()),
        );
        if bucketed {
            row.extend(
                report
                    .symbols
                    .iter()
                    .map(|s| h.allocations.get(s).copied().unwrap_or(0.0).to_string()),
            );
        }
        row.push(h.cash.to_string());
        row.push(h.commission.to_string());
        row.push(h.total.to_string());
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_positions(report: &BacktestReport, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["timestamp".to_string()];
    header.extend(report.symbols.iter().cloned());
    wtr.write_record(&header)?;

    for p in &report.positions {
        let mut row = vec![date_cell(p.timestamp)];
        row.extend(
            report
                .symbols
                .iter()
                .map(|s| p.positions.get(s).copied().unwrap_or(0.0).to_string()),
        );
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(serde::Serialize)]
struct FillRow<'a> {
    symbol: &'a str,
    timestamp: replay_core::BarTime,
    side: replay_core::OrderSide,
    quantity: f64,
    price: f64,
    commission: f64,
}

fn write_fills(report: &BacktestReport, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut any = false;
    for (symbol, fills) in &report.fills {
        for f in fills {
            wtr.serialize(FillRow {
                symbol,
                timestamp: f.timestamp,
                side: f.side,
                quantity: f.quantity,
                price: f.price,
                commission: f.commission,
            })?;
            any = true;
        }
    }
    if !any {
        wtr.write_record(["symbol", "timestamp", "side", "quantity", "price", "commission"])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_allocation(report: &BacktestReport, path: &Path) -> Result<()> {
    let Some(search) = &report.allocation else {
        return Ok(());
    };
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header: Vec<String> = ["simulation", "returns", "volatility", "sharpe"]
        .map(String::from)
        .to_vec();
    header.extend(search.symbols.iter().map(|s| format!("w_{s}")));
    wtr.write_record(&header)?;

    for (i, weights) in search.weights.iter().enumerate() {
        let mut row = vec![
            i.to_string(),
            search.returns[i].to_string(),
            search.volatilities[i].to_string(),
            search.sharpe[i].to_string(),
        ];
        row.extend(weights.iter().map(f64::to_string));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
