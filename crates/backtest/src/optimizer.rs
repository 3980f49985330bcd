//! Monte-Carlo allocation search over the historical segment.
//!
//! Random weight vectors are scored by annualized return over annualized
//! volatility of the symbols' daily log returns; the best-scoring vector
//! fixes how the initial capital is split between symbols.
//!
//! Key choices:
//! - Each weight component is drawn in (0, 1] before normalization, so no
//!   vector sums to zero.
//! - Only dates where every symbol is defined on both sides contribute a
//!   return row.
//! - Covariance is the sample covariance, annualized like the means.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use replay_core::{Bar, Error, Result, Symbol};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use tracing::{info, warn};

/// Parameters of one search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Weight vectors to draw.
    pub simulations: usize,
    /// Seed for the weight draws.
    pub seed: u64,
    /// Periods per year used to annualize mean and covariance.
    pub trading_days: f64,
}

/// Every simulated allocation plus the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSearch {
    pub symbols: Vec<Symbol>,
    /// One normalized weight vector per simulation, in symbol order.
    pub weights: Vec<Vec<f64>>,
    /// Annualized expected log return per simulation.
    pub returns: Vec<f64>,
    /// Annualized volatility per simulation.
    pub volatilities: Vec<f64>,
    /// Return over volatility per simulation.
    #[serde(deserialize_with = "crate::performance::nullable_f64_vec")]
    pub sharpe: Vec<f64>,
    /// Index of the max-Sharpe simulation; `None` when every Sharpe value
    /// was undefined and equal weights were used instead.
    pub best: Option<usize>,
}

impl AllocationSearch {
    /// Run the search over aligned historical bars, one series per symbol.
    pub fn run(
        symbols: &[Symbol],
        history: &[&[Option<Bar>]],
        config: &SearchConfig,
    ) -> Result<Self> {
        if symbols.is_empty() || symbols.len() != history.len() {
            return Err(Error::portfolio("allocation search needs one history per symbol"));
        }
        if config.simulations == 0 {
            return Err(Error::config("allocation search needs at least one simulation"));
        }

        let returns = log_return_rows(history);
        if returns.len() < 2 {
            return Err(Error::insufficient_data(format!(
                "allocation search needs at least 2 historical return rows, got {}",
                returns.len()
            )));
        }

        let n = symbols.len();
        let columns: Vec<Vec<f64>> = (0..n)
            .map(|i| returns.iter().map(|row| row[i]).collect())
            .collect();
        let means: Vec<f64> = columns
            .iter()
            .map(|c| c.iter().mean() * config.trading_days)
            .collect();
        let mut cov = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let c = columns[i].iter().covariance(columns[j].iter()) * config.trading_days;
                cov[i][j] = c;
                cov[j][i] = c;
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut search = Self {
            symbols: symbols.to_vec(),
            weights: Vec::with_capacity(config.simulations),
            returns: Vec::with_capacity(config.simulations),
            volatilities: Vec::with_capacity(config.simulations),
            sharpe: Vec::with_capacity(config.simulations),
            best: None,
        };

        for _ in 0..config.simulations {
            let mut weights: Vec<f64> = (0..n).map(|_| 1.0 - rng.gen::<f64>()).collect();
            let sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= sum);

            let ret: f64 = weights.iter().zip(&means).map(|(w, m)| w * m).sum();
            let variance: f64 = (0..n)
                .flat_map(|i| (0..n).map(move |j| (i, j)))
                .map(|(i, j)| weights[i] * cov[i][j] * weights[j])
                .sum();
            let vol = variance.max(0.0).sqrt();

            search.weights.push(weights);
            search.returns.push(ret);
            search.volatilities.push(vol);
            search.sharpe.push(ratio(ret, vol));
        }

        search.best = search
            .sharpe
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_nan())
            .max_by_key(|(_, s)| OrderedFloat(**s))
            .map(|(i, _)| i);

        match search.best {
            Some(best) => info!(
                simulations = config.simulations,
                rows = returns.len(),
                sharpe = search.sharpe[best],
                weights = ?search.weights[best],
                "optimal allocation"
            ),
            None => warn!("every simulated Sharpe ratio is undefined, using equal weights"),
        }
        Ok(search)
    }

    /// Weights of the winning simulation, or equal weights as a fallback.
    pub fn best_weights(&self) -> Vec<f64> {
        match self.best {
            Some(i) => self.weights[i].clone(),
            None => vec![1.0 / self.symbols.len() as f64; self.symbols.len()],
        }
    }

    /// Split `capital` according to the winning weights.
    pub fn allocate(&self, capital: f64) -> HashMap<Symbol, f64> {
        self.symbols
            .iter()
            .cloned()
            .zip(self.best_weights())
            .map(|(s, w)| (s, w * capital))
            .collect()
    }
}

/// Return over volatility; a zero volatility maps to a signed infinity, or
/// NaN for a zero return.
fn ratio(ret: f64, vol: f64) -> f64 {
    if vol > 0.0 {
        ret / vol
    } else if ret > 0.0 {
        f64::INFINITY
    } else if ret < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

/// Daily log returns on dates where every symbol is defined (and positive)
/// on both the previous and the current date.
fn log_return_rows(history: &[&[Option<Bar>]]) -> Vec<Vec<f64>> {
    let len = history.iter().map(|h| h.len()).min().unwrap_or(0);
    (1..len)
        .filter_map(|t| {
            history
                .iter()
                .map(|series| match (&series[t - 1], &series[t]) {
                    (Some(prev), Some(cur)) if prev.close > 0.0 && cur.close > 0.0 => {
                        Some((cur.close / prev.close).ln())
                    }
                    _ => None,
                })
                .collect::<Option<Vec<f64>>>()
        })
        .collect()
}
