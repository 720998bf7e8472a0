//! Scrollable display window and per-bin rows

use serde::Serialize;
use std::collections::HashMap;

use super::histogram::Histogram;
use super::peaks::{Peak, PEAK_COLOR};

pub const VALUE_AREA_COLOR: &str = "#FFD700";
pub const NORMAL_COLOR: &str = "white";

/// Bins on either side of spot that may be scrolled into view
pub const MAX_OFFSET_BINS: usize = 450;
/// Bins visible at once
pub const WINDOW_BINS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayWindow {
    pub spot_idx: usize,
    pub min_allowed_idx: usize,
    pub max_allowed_idx: usize,
    pub initial_low_idx: usize,
    pub initial_high_idx: usize,
    pub window_bins: usize,
    /// Scroll position of the initial view, in bins from the bottom of the allowed range
    pub initial_offset: usize,
    pub max_offset: usize,
    pub scroll_range: PriceRange,
    pub initial_range: PriceRange,
}

impl DisplayWindow {
    /// Center a `window_bins` view on spot, clamped to `max_offset_bins` either side
    pub fn around_spot(hist: &Histogram, spot_idx: usize, max_offset_bins: usize, window_bins: usize) -> Self {
        let n = hist.len();
        let last = n.saturating_sub(1);
        let spot_idx = spot_idx.min(last);
        let min_allowed_idx = spot_idx.saturating_sub(max_offset_bins);
        let max_allowed_idx = (spot_idx + max_offset_bins).min(last);
        let allowed = if n == 0 { 0 } else { max_allowed_idx - min_allowed_idx + 1 };

        let window = window_bins.min(allowed);
        let half = window / 2;
        let mut low = spot_idx.saturating_sub(half).max(min_allowed_idx);
        let mut high = if window > 0 { low + window - 1 } else { min_allowed_idx };
        if window > 0 && high > max_allowed_idx {
            high = max_allowed_idx;
            low = (high + 1).saturating_sub(window).max(min_allowed_idx);
        }

        let price = |i: usize| hist.prices.get(i).copied().unwrap_or(0.0);
        Self {
            spot_idx,
            min_allowed_idx,
            max_allowed_idx,
            initial_low_idx: low,
            initial_high_idx: high,
            window_bins: window,
            initial_offset: low - min_allowed_idx,
            max_offset: allowed - window,
            scroll_range: PriceRange {
                lower: price(min_allowed_idx),
                upper: price(max_allowed_idx),
            },
            initial_range: PriceRange {
                lower: price(low),
                upper: price(high),
            },
        }
    }

    pub fn contains_price(&self, price: f64) -> bool {
        self.scroll_range.lower <= price && price <= self.scroll_range.upper
    }

    /// Bin prices in the scrollable range, ascending
    pub fn allowed_prices(&self, hist: &Histogram) -> Vec<f64> {
        if hist.is_empty() {
            return Vec::new();
        }
        hist.prices[self.min_allowed_idx..=self.max_allowed_idx].to_vec()
    }

    /// Tick spacing: about 0.2% of the mid price, at least 1
    pub fn tick_spacing(&self) -> f64 {
        let mid = (self.scroll_range.lower + self.scroll_range.upper) / 2.0;
        ((mid * 0.002 + 0.5).floor()).max(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRow {
    pub price: f64,
    pub volume: f64,
    pub color: String,
    pub hover: String,
    pub is_peak: bool,
}

/// `1234567.4` -> `1,234,567`
pub fn thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

/// Rows for the allowed range, highest price first. Peaks are red, bins inside
/// the value area gold and the rest white.
pub fn profile_rows(
    hist: &Histogram,
    window: &DisplayWindow,
    peaks: &[Peak],
    value_area: (f64, f64),
) -> Vec<ProfileRow> {
    if hist.is_empty() {
        return Vec::new();
    }
    let peak_colors: HashMap<usize, &str> = peaks.iter().map(|p| (p.idx, PEAK_COLOR)).collect();
    let (val, vah) = value_area;
    let mut rows: Vec<ProfileRow> = (window.min_allowed_idx..=window.max_allowed_idx)
        .map(|i| {
            let (price, volume) = (hist.prices[i], hist.volumes[i]);
            let (color, is_peak) = match peak_colors.get(&i) {
                Some(c) => (*c, true),
                None if val <= price && price <= vah => (VALUE_AREA_COLOR, false),
                None => (NORMAL_COLOR, false),
            };
            ProfileRow {
                price,
                volume,
                color: color.to_string(),
                hover: format!("Price: ${:.2}<br>Volume: {}", price, thousands(volume)),
                is_peak,
            }
        })
        .collect();
    rows.reverse();
    rows
}
