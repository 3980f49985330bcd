//! Shared replay calendar and forward-fill alignment.
//!
//! Every symbol is reindexed onto the union of all symbols' dates. A date
//! without a row takes the most recent earlier row (forward-fill); dates
//! before a symbol's first row stay undefined.

use replay_core::{Bar, BarTime};
use std::collections::BTreeSet;

/// One optional bar per calendar date. `None` only appears before the
/// symbol's first observation.
pub type AlignedSeries = Vec<Option<Bar>>;

/// Ordered, de-duplicated set of dates the replay advances through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calendar {
    dates: Vec<BarTime>,
}

impl Calendar {
    /// Build the union calendar of several bar tables.
    pub fn union<'a>(tables: impl IntoIterator<Item = &'a [Bar]>) -> Self {
        let dates: BTreeSet<BarTime> = tables
            .into_iter()
            .flat_map(|bars| bars.iter().map(|b| b.timestamp))
            .collect();
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Calendar over an explicit list of dates (sorted and de-duplicated).
    pub fn from_dates(dates: impl IntoIterator<Item = BarTime>) -> Self {
        let dates: BTreeSet<BarTime> = dates.into_iter().collect();
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Dates in ascending order.
    pub fn dates(&self) -> &[BarTime] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Reindex a normalized bar table onto this calendar with forward-fill.
    ///
    /// Filled entries are copies of the last known bar re-stamped with the
    /// calendar date. Runs in one linear pass over both sequences.
    pub fn align(&self, bars: &[Bar]) -> AlignedSeries {
        let mut aligned = Vec::with_capacity(self.dates.len());
        let mut next = 0;
        let mut last: Option<&Bar> = None;

        for &date in &self.dates {
            while next < bars.len() && bars[next].timestamp <= date {
                last = Some(&bars[next]);
                next += 1;
            }
            aligned.push(last.map(|bar| {
                if bar.timestamp == date {
                    bar.clone()
                } else {
                    bar.restamped(date)
                }
            }));
        }

        aligned
    }

    /// Number of leading dates that belong to the historical segment.
    ///
    /// The boundary date itself is historical; replay starts strictly after
    /// it. Without a start date nothing is historical.
    pub fn split_point(&self, start_date: Option<BarTime>) -> usize {
        match start_date {
            Some(start) => self.dates.partition_point(|&d| d <= start),
            None => 0,
        }
    }
}

/// Sort a raw table by date and drop duplicate dates, keeping the last row
/// seen for each date.
pub fn normalize(mut bars: Vec<Bar>) -> Vec<Bar> {
    // Stable sort keeps source order among equal dates, so "last" is the
    // last row read.
    bars.sort_by_key(|b| b.timestamp);

    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
            _ => out.push(bar),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> BarTime {
        NaiveDate::from_ymd_opt(2016, 1, d).unwrap()
    }

    fn bars(points: &[(u32, f64)]) -> Vec<Bar> {
        points.iter().map(|&(d, c)| Bar::from_close(day(d), c)).collect()
    }

    #[test]
    fn test_union_calendar() {
        let a = bars(&[(4, 1.0), (6, 1.0)]);
        let b = bars(&[(5, 2.0), (6, 2.0), (7, 2.0)]);
        let calendar = Calendar::union([a.as_slice(), b.as_slice()]);

        assert_eq!(calendar.dates(), &[day(4), day(5), day(6), day(7)]);
    }

    #[test]
    fn test_forward_fill_non_overlapping() {
        // A trades on 4 and 5, B on 6 and 7: disjoint calendars.
        let a = bars(&[(4, 10.0), (5, 11.0)]);
        let b = bars(&[(6, 20.0), (7, 21.0)]);
        let calendar = Calendar::union([a.as_slice(), b.as_slice()]);

        let aligned_a = calendar.align(&a);
        let aligned_b = calendar.align(&b);
        assert_eq!(aligned_a.len(), 4);
        assert_eq!(aligned_b.len(), 4);

        // A is defined everywhere from its first observation on.
        let closes_a: Vec<Option<f64>> = aligned_a.iter().map(|b| b.as_ref().map(|b| b.close)).collect();
        assert_eq!(closes_a, vec![Some(10.0), Some(11.0), Some(11.0), Some(11.0)]);

        // B's only undefined region is its leading gap.
        let closes_b: Vec<Option<f64>> = aligned_b.iter().map(|b| b.as_ref().map(|b| b.close)).collect();
        assert_eq!(closes_b, vec![None, None, Some(20.0), Some(21.0)]);
    }

    #[test]
    fn test_filled_bars_are_restamped() {
        let a = bars(&[(4, 10.0)]);
        let calendar = Calendar::from_dates([day(4), day(5)]);
        let aligned = calendar.align(&a);

        let filled = aligned[1].as_ref().unwrap();
        assert_eq!(filled.timestamp, day(5));
        assert_eq!(filled.close, 10.0);
    }

    #[test]
    fn test_split_point_is_inclusive_historical() {
        let calendar = Calendar::from_dates([day(4), day(5), day(6), day(7)]);

        assert_eq!(calendar.split_point(None), 0);
        assert_eq!(calendar.split_point(Some(day(5))), 2);
        assert_eq!(calendar.split_point(Some(day(1))), 0);
        assert_eq!(calendar.split_point(Some(day(30))), 4);
    }

    #[test]
    fn test_normalize_sorts_and_keeps_last_duplicate() {
        let raw = bars(&[(6, 3.0), (4, 1.0), (6, 4.0), (5, 2.0)]);
        let clean = normalize(raw);

        let closes: Vec<f64> = clean.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 4.0]);
    }
}
