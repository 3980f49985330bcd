//! Performance statistics over a holdings history.
//!
//! Calculates per-bar returns, the compounded equity curve, an annualized
//! Sharpe ratio, drawdowns and a printable summary.

use crate::position::HoldingsSnapshot;
use replay_core::config::PerformanceConfig;
use replay_core::BarTime;
use serde::{Deserialize, Deserializer, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use tracing::warn;

/// Equity curve point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Option<BarTime>,
    pub total: f64,
    /// Return against the previous point (0 for the first).
    pub returns: f64,
    /// Compounded growth of one unit of capital.
    pub equity: f64,
    /// High-water mark minus equity.
    pub drawdown: f64,
}

/// Drawdown statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawdowns {
    /// Per-point drawdown.
    pub series: Vec<f64>,
    pub max_drawdown: f64,
    /// Longest run of consecutive points below the high-water mark.
    pub max_duration: usize,
}

/// Per-period returns of a series of totals.
///
/// The first return is 0, as is any return following a zero total. The
/// first one is a placeholder that keeps the series aligned with `totals`;
/// statistics over returns skip it.
pub fn returns(totals: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(totals.len());
    for (i, &total) in totals.iter().enumerate() {
        let r = match i.checked_sub(1).map(|p| totals[p]) {
            Some(prev) if prev != 0.0 => total / prev - 1.0,
            _ => 0.0,
        };
        out.push(r);
    }
    out
}

/// Cumulative product of `1 + r`.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |equity, r| {
            *equity *= 1.0 + r;
            Some(*equity)
        })
        .collect()
}

/// Annualized Sharpe ratio: `sqrt(periods) * mean(r - rf) / std(r - rf)`.
///
/// Uses the population standard deviation. A zero deviation gives a signed
/// infinity (NaN for a zero mean); fewer than two returns give NaN.
pub fn sharpe_ratio(returns: &[f64], periods: u32, risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return f64::NAN;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_rate).collect();
    let mean = excess.iter().mean();
    let std = excess.iter().population_std_dev();

    if std > 0.0 {
        f64::from(periods).sqrt() * mean / std
    } else {
        warn!(mean, "returns have zero volatility");
        if mean > 0.0 {
            f64::INFINITY
        } else if mean < 0.0 {
            f64::NEG_INFINITY
        } else {
            f64::NAN
        }
    }
}

/// Drawdown against the running high-water mark.
pub fn drawdowns(equity: &[f64]) -> Drawdowns {
    let mut series = Vec::with_capacity(equity.len());
    let mut hwm = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0_f64;
    let mut run = 0;
    let mut max_duration = 0;

    for &e in equity {
        hwm = hwm.max(e);
        let dd = hwm - e;
        series.push(dd);
        max_drawdown = max_drawdown.max(dd);
        if dd > 0.0 {
            run += 1;
            max_duration = max_duration.max(run);
        } else {
            run = 0;
        }
    }

    Drawdowns {
        series,
        max_drawdown,
        max_duration,
    }
}

/// Build the equity curve points of a holdings history.
pub fn build_equity_curve(holdings: &[HoldingsSnapshot]) -> Vec<EquityPoint> {
    let totals: Vec<f64> = holdings.iter().map(|h| h.total).collect();
    let rets = returns(&totals);
    let equity = equity_curve(&rets);
    let dd = drawdowns(&equity);

    holdings
        .iter()
        .zip(rets)
        .zip(equity)
        .zip(dd.series)
        .map(|(((h, r), e), d)| EquityPoint {
            timestamp: h.timestamp,
            total: h.total,
            returns: r,
            equity: e,
            drawdown: d,
        })
        .collect()
}

/// JSON has no NaN or infinity; `serde_json` writes them as `null`, read
/// back here as NaN.
pub(crate) fn nullable_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Vector form of [`nullable_f64`].
pub(crate) fn nullable_f64_vec<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<f64>, D::Error> {
    let values = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Headline statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_capital: f64,
    pub final_total: f64,
    /// Final equity minus one.
    pub total_return: f64,
    /// Written as `null` when not finite.
    #[serde(deserialize_with = "nullable_f64")]
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// In bars.
    pub drawdown_duration: usize,
    pub bars: usize,
}

impl PerformanceSummary {
    /// Summarize a holdings history.
    pub fn from_holdings(
        holdings: &[HoldingsSnapshot],
        initial_capital: f64,
        config: &PerformanceConfig,
    ) -> Self {
        let totals: Vec<f64> = holdings.iter().map(|h| h.total).collect();
        let rets = returns(&totals);
        let equity = equity_curve(&rets);
        let dd = drawdowns(&equity);

        Self {
            initial_capital,
            final_total: totals.last().copied().unwrap_or(initial_capital),
            total_return: equity.last().map(|e| e - 1.0).unwrap_or(0.0),
            // The opening point has no prior total, so it carries no return.
            sharpe_ratio: sharpe_ratio(
                rets.get(1..).unwrap_or(&[]),
                config.periods,
                config.risk_free_rate,
            ),
            max_drawdown: dd.max_drawdown,
            drawdown_duration: dd.max_duration,
            bars: holdings.len().saturating_sub(1),
        }
    }

    /// Labelled lines, in display order.
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Initial Capital", format!("{:.2}", self.initial_capital)),
            ("Final Total", format!("{:.2}", self.final_total)),
            ("Total Return", format!("{:.2}%", self.total_return * 100.0)),
            ("Sharpe Ratio", format!("{:.2}", self.sharpe_ratio)),
            ("Max Drawdown", format!("{:.2}%", self.max_drawdown * 100.0)),
            ("Drawdown Duration", self.drawdown_duration.to_string()),
            ("Bars", self.bars.to_string()),
        ]
    }
}

impl fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.lines() {
            writeln!(f, "{label:<20}{value:>16}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn holdings(totals: &[f64]) -> Vec<HoldingsSnapshot> {
        totals
            .iter()
            .map(|&total| HoldingsSnapshot {
                timestamp: None,
                cash: total,
                allocations: BTreeMap::new(),
                commission: 0.0,
                values: BTreeMap::new(),
                total,
            })
            .collect()
    }

    #[test]
    fn test_returns_and_equity() {
        let rets = returns(&[100.0, 110.0, 99.0]);
        assert_eq!(rets[0], 0.0);
        assert_relative_eq!(rets[1], 0.1, epsilon = 1e-12);
        assert_relative_eq!(rets[2], -0.1, epsilon = 1e-12);

        let equity = equity_curve(&rets);
        assert_relative_eq!(equity[0], 1.0);
        assert_relative_eq!(equity[2], 0.99, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_previous_total_gives_zero_return() {
        let rets = returns(&[0.0, 50.0]);
        assert_eq!(rets, vec![0.0, 0.0]);
    }

    #[test]
    fn test_sharpe_known_value() {
        // mean 0.01, population std 0.01 -> sqrt(4) * 1
        let sharpe = sharpe_ratio(&[0.0, 0.02, 0.0, 0.02], 4, 0.0);
        assert_relative_eq!(sharpe, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe_sentinels() {
        assert_eq!(sharpe_ratio(&[0.25, 0.25, 0.25], 252, 0.0), f64::INFINITY);
        assert_eq!(sharpe_ratio(&[-0.01, -0.01], 252, 0.0), f64::NEG_INFINITY);
        assert!(sharpe_ratio(&[0.0, 0.0, 0.0], 252, 0.0).is_nan());
        assert!(sharpe_ratio(&[0.05], 252, 0.0).is_nan());
    }

    #[test]
    fn test_drawdown_and_duration() {
        let dd = drawdowns(&[1.0, 1.1, 1.0, 0.9, 1.2, 1.1, 1.3]);
        assert_relative_eq!(dd.max_drawdown, 0.2, epsilon = 1e-12);
        assert_eq!(dd.max_duration, 2);
        assert_eq!(dd.series[0], 0.0);
        assert_eq!(dd.series[4], 0.0);
    }

    #[test]
    fn test_summary() {
        let history = holdings(&[100.0, 110.0, 99.0, 121.0]);
        let summary = PerformanceSummary::from_holdings(&history, 100.0, &PerformanceConfig::default());

        assert_relative_eq!(summary.final_total, 121.0);
        assert_relative_eq!(summary.total_return, 0.21, epsilon = 1e-12);
        assert_relative_eq!(summary.max_drawdown, 0.11, epsilon = 1e-12);
        assert_eq!(summary.drawdown_duration, 1);
        assert_eq!(summary.bars, 3);

        let text = summary.to_string();
        assert!(text.contains("Total Return"));
        assert!(text.contains("21.00%"));
    }

    #[test]
    fn test_summary_sharpe_skips_opening_point() {
        let history = holdings(&[100.0, 110.0, 99.0, 121.0]);
        let summary = PerformanceSummary::from_holdings(&history, 100.0, &PerformanceConfig::default());

        // Returns 0.1, -0.1, 0.2222; the opening point contributes nothing.
        let expected = sharpe_ratio(&[0.1, -0.1, 22.0 / 99.0], 252, 0.0);
        assert_relative_eq!(summary.sharpe_ratio, expected, epsilon = 1e-9);
        assert_relative_eq!(summary.sharpe_ratio, 8.8534, epsilon = 1e-4);
    }

    #[test]
    fn test_single_bar_sharpe_is_undefined() {
        let history = holdings(&[100.0, 105.0]);
        let summary = PerformanceSummary::from_holdings(&history, 100.0, &PerformanceConfig::default());
        assert!(summary.sharpe_ratio.is_nan());
    }

    #[test]
    fn test_undefined_sharpe_survives_json() {
        let history = holdings(&[100.0, 100.0, 100.0]);
        let summary = PerformanceSummary::from_holdings(&history, 100.0, &PerformanceConfig::default());
        assert!(summary.sharpe_ratio.is_nan());

        let raw = serde_json::to_string(&summary).unwrap();
        assert!(raw.contains("\"sharpe_ratio\":null"));
        let parsed: PerformanceSummary = serde_json::from_str(&raw).unwrap();
        assert!(parsed.sharpe_ratio.is_nan());
    }

    #[test]
    fn test_equity_curve_points() {
        let points = build_equity_curve(&holdings(&[100.0, 90.0, 100.0]));
        assert_eq!(points.len(), 3);
        assert_relative_eq!(points[1].drawdown, 0.1, epsilon = 1e-12);
        assert_relative_eq!(points[2].equity, 1.0, epsilon = 1e-12);
    }
}
