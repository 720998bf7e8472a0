//! Volume-at-price histogram and value area

use crate::error::AnalyticsError;
use crate::types::Bar;

const DEFAULT_TICK: f64 = 0.1;

/// Minimum price increment for a display name
pub fn tick_size(name: &str) -> f64 {
    match name {
        "GC" => 0.1,
        "SI" => 0.005,
        "ES" | "NQ" => 0.25,
        "TSLA" | "AAPL" | "NVDA" | "CRS" => 0.01,
        "BTCUSD" => 1.0,
        "ETHUSD" => 0.5,
        n if n.starts_with("HSI") && n.len() > 3 && n[3..].bytes().all(|b| b.is_ascii_digit()) => 1.0,
        _ => DEFAULT_TICK,
    }
}

/// Bin width: a fixed number of ticks per bin keeps granularity comparable across instruments
pub fn bin_size(name: &str, ticks_per_bin: f64) -> f64 {
    tick_size(name) * ticks_per_bin
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub bin_size: f64,
    /// Bin midpoints, ascending
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl Histogram {
    /// Volume-weighted close histogram over `[floor(min), ceil(max)]` in `bin_size` steps.
    /// Bins are half-open except the last, which includes its upper edge.
    pub fn build(bars: &[Bar], bin_size: f64) -> Result<Self, AnalyticsError> {
        if !(bin_size > 0.0) {
            return Err(AnalyticsError::Empty("bin size"));
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).filter(|c| c.is_finite()).collect();
        if closes.is_empty() {
            return Err(AnalyticsError::Empty("closes"));
        }
        let min = closes.iter().copied().fold(f64::INFINITY, f64::min);
        let max = closes.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let p_min = (min / bin_size).floor() * bin_size;
        let p_max = (max / bin_size).ceil() * bin_size;
        let n_bins = (((p_max - p_min) / bin_size).round() as usize).max(1);
        let edges: Vec<f64> = (0..=n_bins).map(|i| p_min + i as f64 * bin_size).collect();

        let mut volumes = vec![0.0; n_bins];
        for bar in bars {
            if !bar.close.is_finite() || !bar.volume.is_finite() {
                continue;
            }
            let upper = edges.partition_point(|e| *e <= bar.close);
            if upper == 0 {
                continue;
            }
            let idx = (upper - 1).min(n_bins - 1);
            volumes[idx] += bar.volume;
        }

        let prices = edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        Ok(Self {
            bin_size,
            prices,
            volumes,
        })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    /// Point of control: the first bin with the largest volume
    pub fn poc_idx(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.volumes.iter().enumerate() {
            if *v > self.volumes[best] {
                best = i;
            }
        }
        best
    }

    /// Bin whose midpoint is closest to `price` (first on ties)
    pub fn nearest_idx(&self, price: f64) -> usize {
        let mut best = 0;
        let mut best_d = f64::INFINITY;
        for (i, p) in self.prices.iter().enumerate() {
            let d = (p - price).abs();
            if d < best_d {
                best = i;
                best_d = d;
            }
        }
        best
    }

    /// Expand from the POC toward the heavier neighbour (below wins ties) until
    /// `fraction` of total volume is covered. Returns inclusive bin indices.
    pub fn value_area(&self, fraction: f64) -> (usize, usize) {
        let n = self.volumes.len();
        if n == 0 {
            return (0, 0);
        }
        let target = self.total_volume() * fraction;
        let poc = self.poc_idx();
        let (mut low, mut high) = (poc, poc);
        let mut covered = self.volumes[poc];

        while covered < target && (low > 0 || high < n - 1) {
            let below = if low > 0 { self.volumes[low - 1] } else { 0.0 };
            let above = if high < n - 1 { self.volumes[high + 1] } else { 0.0 };
            if below >= above && low > 0 {
                low -= 1;
                covered += self.volumes[low];
            } else if high < n - 1 {
                high += 1;
                covered += self.volumes[high];
            } else {
                break;
            }
        }
        (low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64, volume: f64) -> Bar {
        Bar {
            ts: Utc.with_ymd_and_hms(2025, 3, 3, 14, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn test_bin_sizes() {
        assert!((bin_size("GC", 15.0) - 1.5).abs() < 1e-12);
        assert!((bin_size("NQ", 15.0) - 3.75).abs() < 1e-12);
        assert!((bin_size("SI", 15.0) - 0.075).abs() < 1e-12);
        assert!((bin_size("HSI2512", 15.0) - 15.0).abs() < 1e-12);
        assert!((bin_size("NIY", 15.0) - 1.5).abs() < 1e-12);
        assert!((bin_size("HSI", 15.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_histogram_edges_and_weights() {
        let bars = vec![bar(100.2, 5.0), bar(101.9, 3.0), bar(103.0, 2.0), bar(100.0, 1.0)];
        let h = Histogram::build(&bars, 1.0).unwrap();
        // Edges 100..103 -> three bins, 103.0 falls in the last (closed) bin
        assert_eq!(h.prices, vec![100.5, 101.5, 102.5]);
        assert_eq!(h.volumes, vec![6.0, 3.0, 2.0]);
        assert_eq!(h.total_volume(), 11.0);
        assert_eq!(h.poc_idx(), 0);
        assert_eq!(h.nearest_idx(102.9), 2);
    }

    #[test]
    fn test_single_price_gets_one_bin() {
        let h = Histogram::build(&[bar(50.0, 4.0)], 0.5).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h.volumes, vec![4.0]);
        assert!(Histogram::build(&[], 0.5).is_err());
    }

    #[test]
    fn test_value_area_expansion() {
        let h = Histogram {
            bin_size: 1.0,
            prices: vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5],
            volumes: vec![1.0, 4.0, 10.0, 4.0, 2.0, 1.0],
        };
        // Tie at the POC neighbours goes below first
        assert_eq!(h.value_area(0.5), (1, 2));
        // 70% of 22 = 15.4: 10 + 4 (below) + 4 (above)
        assert_eq!(h.value_area(0.7), (1, 3));
        assert_eq!(h.value_area(1.0), (0, 5));
    }
}
