//! Configuration structures for the bar-replay backtester.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for a backtest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bar source and replay window.
    pub data: DataConfig,
    /// Signal generator.
    pub strategy: StrategyConfig,
    /// Position sizing and bookkeeping.
    pub portfolio: PortfolioConfig,
    /// Simulated execution.
    pub execution: ExecutionConfig,
    /// Performance statistics.
    pub performance: PerformanceConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check cross-field invariants before a run.
    pub fn validate(&self) -> Result<()> {
        if self.data.symbols.is_empty() {
            return Err(Error::config("at least one symbol is required"));
        }
        if self.data.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::config("symbols must not be blank"));
        }
        self.strategy.kind.validate()?;

        let portfolio = &self.portfolio;
        if !(portfolio.initial_capital.is_finite() && portfolio.initial_capital > 0.0) {
            return Err(Error::config("initial_capital must be positive"));
        }
        if !(portfolio.lot_size.is_finite() && portfolio.lot_size > 0.0) {
            return Err(Error::config("lot_size must be positive"));
        }
        if portfolio.kind == PortfolioKind::Optimized {
            if portfolio.simulations == 0 {
                return Err(Error::config("simulations must be at least 1"));
            }
            if self.data.start_date.is_none() {
                return Err(Error::config(
                    "the optimized portfolio needs a start_date to carve out its historical segment",
                ));
            }
        }
        if self.performance.periods == 0 {
            return Err(Error::config("performance periods must be at least 1"));
        }
        Ok(())
    }
}

/// Where bars come from and which part of them is replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Traded symbols, in the order they are processed every bar.
    pub symbols: Vec<String>,
    /// Bar source.
    pub source: DataSource,
    /// Last date of the historical segment; replay starts on the next
    /// calendar date. `None` replays everything.
    pub start_date: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            source: DataSource::Csv {
                dir: PathBuf::from("data/symbols"),
            },
            start_date: None,
        }
    }
}

/// Bar source variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// One `<symbol>.csv` per symbol in a directory.
    Csv { dir: PathBuf },
    /// Rows of a SQLite table.
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default)]
        columns: SqlColumns,
    },
}

fn default_table() -> String {
    "bars".to_string()
}

/// Column mapping for the SQLite source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlColumns {
    pub symbol: String,
    pub date: String,
    pub close: String,
    /// Optional columns fall back to the close (prices) or zero (volume).
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub volume: Option<String>,
}

impl Default for SqlColumns {
    fn default() -> Self {
        Self {
            symbol: "symbol".to_string(),
            date: "date".to_string(),
            close: "close".to_string(),
            open: Some("open".to_string()),
            high: Some("high".to_string()),
            low: Some("low".to_string()),
            volume: Some("volume".to_string()),
        }
    }
}

/// Strategy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
}

/// Signal generation policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Go long once per symbol and hold.
    #[default]
    BuyAndHold,
    /// Latest close against one moving average.
    Sma { window: usize },
    /// Short moving average against a long one.
    DualSma {
        short_window: usize,
        long_window: usize,
    },
    /// Latest close against a ribbon of moving averages.
    Ribbon { windows: Vec<usize> },
}

impl StrategyKind {
    /// Default ribbon: 10, 20, ..., 60.
    pub fn default_ribbon() -> Self {
        StrategyKind::Ribbon {
            windows: (1..=6).map(|i| i * 10).collect(),
        }
    }

    /// Check window invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            StrategyKind::BuyAndHold => Ok(()),
            StrategyKind::Sma { window } => {
                if *window == 0 {
                    return Err(Error::config("sma window must be at least 1"));
                }
                Ok(())
            }
            StrategyKind::DualSma {
                short_window,
                long_window,
            } => {
                if *short_window == 0 {
                    return Err(Error::config("short_window must be at least 1"));
                }
                if short_window >= long_window {
                    return Err(Error::config(format!(
                        "short_window ({short_window}) must be below long_window ({long_window})"
                    )));
                }
                Ok(())
            }
            StrategyKind::Ribbon { windows } => {
                if windows.is_empty() {
                    return Err(Error::config("ribbon needs at least one window"));
                }
                if windows.contains(&0) {
                    return Err(Error::config("ribbon windows must be at least 1"));
                }
                Ok(())
            }
        }
    }
}

/// Portfolio sizing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioKind {
    /// Fixed lot per order.
    #[default]
    Naive,
    /// Capital split evenly per symbol, each bucket fully deployed.
    Greedy,
    /// Buckets sized by a max-Sharpe Monte-Carlo allocation search.
    Optimized,
}

/// Portfolio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub kind: PortfolioKind,
    /// Starting capital.
    pub initial_capital: f64,
    /// Units per order for the naive portfolio.
    pub lot_size: f64,
    /// Random weight vectors drawn by the allocation search.
    pub simulations: usize,
    /// Seed for the allocation search.
    pub seed: u64,
    /// Trading days per year used to annualize the allocation search.
    pub trading_days: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            kind: PortfolioKind::Naive,
            initial_capital: 100_000.0,
            lot_size: 100.0,
            simulations: 5000,
            seed: 101,
            trading_days: 252.0,
        }
    }
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Venue stamped on every simulated fill.
    pub venue: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            venue: "SIMULATED".to_string(),
        }
    }
}

/// Performance statistics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Periods per year for Sharpe annualization.
    pub periods: u32,
    /// Risk-free return per period.
    pub risk_free_rate: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            periods: 252,
            risk_free_rate: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_symbols() -> Config {
        let mut config = Config::default();
        config.data.symbols = vec!["ASELS.E".to_string(), "FENER.E".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.portfolio.initial_capital, 100_000.0);
        assert_eq!(config.portfolio.lot_size, 100.0);
        assert_eq!(config.portfolio.simulations, 5000);
        assert_eq!(config.performance.periods, 252);
        assert_eq!(config.execution.venue, "SIMULATED");
        assert_eq!(config.strategy.kind, StrategyKind::BuyAndHold);
    }

    #[test]
    fn test_validate_requires_symbols() {
        assert!(Config::default().validate().is_err());
        assert!(config_with_symbols().validate().is_ok());
    }

    #[test]
    fn test_validate_dual_sma_ordering() {
        let mut config = config_with_symbols();
        config.strategy.kind = StrategyKind::DualSma {
            short_window: 50,
            long_window: 20,
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_optimized_needs_start_date() {
        let mut config = config_with_symbols();
        config.portfolio.kind = PortfolioKind::Optimized;
        assert!(config.validate().is_err());

        config.data.start_date = NaiveDate::from_ymd_opt(2015, 12, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_json() {
        let raw = r#"{
            "data": {
                "symbols": ["ASELS.E"],
                "source": {"type": "sqlite", "path": "bist.db"},
                "start_date": "2015-12-01"
            },
            "strategy": {"kind": {"type": "dual_sma", "short_window": 10, "long_window": 30}},
            "portfolio": {"kind": "greedy", "initial_capital": 50000.0}
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();

        assert_eq!(config.data.symbols, vec!["ASELS.E"]);
        match &config.data.source {
            DataSource::Sqlite { table, columns, .. } => {
                assert_eq!(table, "bars");
                assert_eq!(columns.close, "close");
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(config.portfolio.kind, PortfolioKind::Greedy);
        assert_eq!(config.portfolio.lot_size, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_ribbon_windows() {
        assert_eq!(
            StrategyKind::default_ribbon(),
            StrategyKind::Ribbon {
                windows: vec![10, 20, 30, 40, 50, 60]
            }
        );
    }
}
