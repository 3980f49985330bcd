//! Moving averages over the latest revealed bars.
//!
//! The data handler hands out the most recent bars oldest first, so every
//! mean here is taken over the tail of a slice.

use replay_core::Bar;

/// Mean close of the last `window` bars.
///
/// Returns `None` while fewer than `window` bars are available or for a
/// zero window.
pub fn sma(bars: &[Bar], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let tail = &bars[bars.len() - window..];
    let sum: f64 = tail.iter().map(|b| b.close).sum();
    Some(sum / window as f64)
}

/// Means for each window, in the given order.
///
/// Returns `None` unless every window has enough bars.
pub fn sma_ribbon(bars: &[Bar], windows: &[usize]) -> Option<Vec<f64>> {
    windows.iter().map(|&w| sma(bars, w)).collect()
}

/// How many means `price` sits strictly above and strictly below.
pub fn count_above_below(price: f64, means: &[f64]) -> (usize, usize) {
    means.iter().fold((0, 0), |(above, below), &mean| {
        if price > mean {
            (above + 1, below)
        } else if price < mean {
            (above, below + 1)
        } else {
            (above, below)
        }
    })
}
