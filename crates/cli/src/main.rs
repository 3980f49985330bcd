//! bar-replay CLI: configure, run and export one backtest.
//!
//! Settings come from an optional JSON config file; flags override it.
//!
//! ```text
//! bar-replay --symbols ASELS.E,FENER.E --csv-dir data/symbols \
//!     --strategy dual-sma --short-window 10 --long-window 30 \
//!     --portfolio greedy --capital 100000 --export results/run1
//! ```

mod logging;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use logging::{init_logging, LogFormat};
use replay_backtest::{export_report, Backtest};
use replay_core::config::{DataSource, PortfolioKind, SqlColumns, StrategyKind};
use replay_core::Config;
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(
    name = "bar-replay",
    about = "Event-driven bar-replay backtester",
    version
)]
struct Cli {
    /// JSON config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated symbols, e.g. ASELS.E,FENER.E.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Directory holding one <symbol>.csv per symbol.
    #[arg(long, conflicts_with = "sqlite")]
    csv_dir: Option<PathBuf>,

    /// SQLite database holding every symbol's bars.
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// Table to read from the SQLite database.
    #[arg(long, requires = "sqlite")]
    table: Option<String>,

    /// Last date of the historical segment (YYYY-MM-DD); replay starts after it.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Signal generator.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Moving-average window for `sma`.
    #[arg(long)]
    window: Option<usize>,

    /// Short window for `dual-sma`.
    #[arg(long)]
    short_window: Option<usize>,

    /// Long window for `dual-sma`.
    #[arg(long)]
    long_window: Option<usize>,

    /// Comma-separated windows for `ribbon`.
    #[arg(long, value_delimiter = ',')]
    ribbon_windows: Vec<usize>,

    /// Position sizing.
    #[arg(long, value_enum)]
    portfolio: Option<PortfolioArg>,

    /// Initial capital.
    #[arg(long)]
    capital: Option<f64>,

    /// Units per order for the naive portfolio.
    #[arg(long)]
    lot_size: Option<f64>,

    /// Random allocations drawn by the optimized portfolio.
    #[arg(long)]
    simulations: Option<usize>,

    /// Seed for the allocation search.
    #[arg(long)]
    seed: Option<u64>,

    /// Directory to write the report, holdings, positions and fills into.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the summary as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log output format. `RUST_LOG` controls the level.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    BuyAndHold,
    Sma,
    DualSma,
    Ribbon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PortfolioArg {
    Naive,
    Greedy,
    Optimized,
}

impl From<PortfolioArg> for PortfolioKind {
    fn from(arg: PortfolioArg) -> Self {
        match arg {
            PortfolioArg::Naive => PortfolioKind::Naive,
            PortfolioArg::Greedy => PortfolioKind::Greedy,
            PortfolioArg::Optimized => PortfolioKind::Optimized,
        }
    }
}

const DEFAULT_SMA_WINDOW: usize = 20;
const DEFAULT_SHORT_WINDOW: usize = 10;
const DEFAULT_LONG_WINDOW: usize = 30;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, Level::INFO);

    let config = build_config(&cli)?;
    let mut backtest = Backtest::from_config(&config).context("failed to set up backtest")?;
    let report = backtest.run().context("backtest failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        println!(
            "{} / {} on {}",
            report.strategy,
            report.portfolio,
            report.symbols.join(", ")
        );
        print!("{}", report.summary);
    }

    if let Some(dir) = &cli.export {
        let written = export_report(&report, dir)
            .with_context(|| format!("failed to export to {}", dir.display()))?;
        info!(files = written.len(), dir = %dir.display(), "export complete");
    }
    Ok(())
}

/// Load the config file, if any, and apply flag overrides.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if !cli.symbols.is_empty() {
        config.data.symbols = cli.symbols.clone();
    }
    if let Some(dir) = &cli.csv_dir {
        config.data.source = DataSource::Csv { dir: dir.clone() };
    }
    if let Some(path) = &cli.sqlite {
        config.data.source = DataSource::Sqlite {
            path: path.clone(),
            table: cli.table.clone().unwrap_or_else(|| "bars".to_string()),
            columns: SqlColumns::default(),
        };
    }
    if cli.start_date.is_some() {
        config.data.start_date = cli.start_date;
    }

    config.strategy.kind = strategy_kind(cli, &config.strategy.kind);

    let portfolio = &mut config.portfolio;
    if let Some(kind) = cli.portfolio {
        portfolio.kind = kind.into();
    }
    if let Some(capital) = cli.capital {
        portfolio.initial_capital = capital;
    }
    if let Some(lot) = cli.lot_size {
        portfolio.lot_size = lot;
    }
    if let Some(simulations) = cli.simulations {
        portfolio.simulations = simulations;
    }
    if let Some(seed) = cli.seed {
        portfolio.seed = seed;
    }

    Ok(config)
}

/// Strategy from `--strategy`, or the configured one with any window flags applied.
fn strategy_kind(cli: &Cli, configured: &StrategyKind) -> StrategyKind {
    let ribbon = (!cli.ribbon_windows.is_empty()).then(|| cli.ribbon_windows.clone());

    match (cli.strategy, configured) {
        (Some(StrategyArg::BuyAndHold), _) => StrategyKind::BuyAndHold,
        (Some(StrategyArg::Sma), _) => StrategyKind::Sma {
            window: cli.window.unwrap_or(DEFAULT_SMA_WINDOW),
        },
        (Some(StrategyArg::DualSma), _) => StrategyKind::DualSma {
            short_window: cli.short_window.unwrap_or(DEFAULT_SHORT_WINDOW),
            long_window: cli.long_window.unwrap_or(DEFAULT_LONG_WINDOW),
        },
        (Some(StrategyArg::Ribbon), _) => match ribbon {
            Some(windows) => StrategyKind::Ribbon { windows },
            None => StrategyKind::default_ribbon(),
        },
        (None, StrategyKind::Sma { window }) => StrategyKind::Sma {
            window: cli.window.unwrap_or(*window),
        },
        (
            None,
            StrategyKind::DualSma {
                short_window,
                long_window,
            },
        ) => StrategyKind::DualSma {
            short_window: cli.short_window.unwrap_or(*short_window),
            long_window: cli.long_window.unwrap_or(*long_window),
        },
        (None, StrategyKind::Ribbon { windows }) => StrategyKind::Ribbon {
            windows: ribbon.unwrap_or_else(|| windows.clone()),
        },
        (None, other) => other.clone(),
    }
}
