//! Market breadth: share of constituents trading above their moving average

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::stats::rolling_mean;
use crate::types::DailySeries;

/// Percent (0-100) of constituents whose close is above their own `window`-day SMA,
/// on each date where at least one constituent has both a close and an SMA.
pub fn percent_above_sma(constituents: &[DailySeries], window: usize) -> DailySeries {
    // date -> (above, valid)
    let mut counts: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();

    for series in constituents {
        let sma = rolling_mean(&series.values, window);
        for ((date, close), avg) in series.dates.iter().zip(&series.values).zip(sma) {
            let Some(avg) = avg else {
                continue;
            };
            let entry = counts.entry(*date).or_default();
            entry.1 += 1;
            if *close > avg {
                entry.0 += 1;
            }
        }
    }

    let (dates, values) = counts
        .into_iter()
        .filter(|(_, (_, valid))| *valid > 0)
        .map(|(date, (above, valid))| (date, above as f64 / valid as f64 * 100.0))
        .unzip();
    DailySeries { dates, values }
}

/// Restrict `index` to the breadth dates (inner join), returning (index, breadth)
pub fn align_with_index(index: &DailySeries, breadth: &DailySeries) -> (DailySeries, DailySeries) {
    let lookup: HashMap<NaiveDate, f64> = breadth
        .dates
        .iter()
        .copied()
        .zip(breadth.values.iter().copied())
        .collect();
    let mut idx = DailySeries::default();
    let mut br = DailySeries::default();
    for (d, v) in index.dates.iter().zip(&index.values) {
        if let Some(b) = lookup.get(d) {
            idx.dates.push(*d);
            idx.values.push(*v);
            br.dates.push(*d);
            br.values.push(*b);
        }
    }
    (idx, br)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(start: NaiveDate, values: &[f64]) -> DailySeries {
        DailySeries::from_pairs(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (start + chrono::Duration::days(i as i64), *v)),
        )
    }

    #[test]
    fn test_percent_above_sma() {
        let d0 = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let rising = series(d0, &[1.0, 2.0, 3.0, 4.0]);
        let falling = series(d0, &[4.0, 3.0, 2.0, 1.0]);
        // Starts late: only has an SMA on the last date
        let late = series(d0 + chrono::Duration::days(1), &[5.0, 5.0, 6.0]);

        let breadth = percent_above_sma(&[rising, falling, late], 3);
        assert_eq!(breadth.dates.len(), 2);
        // Day 3: rising above, falling below -> 50%
        assert_eq!(breadth.values[0], 50.0);
        // Day 4: rising and late above, falling below -> 2/3
        assert!((breadth.values[1] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_equal_to_sma_is_not_above() {
        let d0 = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let flat = series(d0, &[1.0, 1.0, 1.0]);
        let breadth = percent_above_sma(&[flat], 3);
        assert_eq!(breadth.values, vec![0.0]);
    }

    #[test]
    fn test_align_with_index() {
        let d0 = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let index = series(d0, &[100.0, 101.0, 102.0]);
        let breadth = series(d0 + chrono::Duration::days(1), &[40.0, 60.0, 80.0]);
        let (idx, br) = align_with_index(&index, &breadth);
        assert_eq!(idx.values, vec![101.0, 102.0]);
        assert_eq!(br.values, vec![40.0, 60.0]);
    }
}
