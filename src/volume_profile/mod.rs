//! Volume profile over the last N sessions of minute bars
//!
//! Bars are binned by close price, the value area grows out of the point of
//! control, and peaks are picked and balanced around spot. The result carries
//! everything the dashboard needs to draw and scroll the chart.

mod figure;
pub mod histogram;
pub mod peaks;
pub mod session;
pub mod window;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::info;

use crate::error::AnalyticsError;
use crate::types::Bar;

pub use histogram::{bin_size, tick_size, Histogram};
pub use peaks::{detect_peaks, Peak, PeakParams, PeakSelection, PEAK_COLOR};
pub use session::{select_sessions, session_zone, SessionWindow};
pub use window::{profile_rows, thousands, DisplayWindow, PriceRange, ProfileRow, MAX_OFFSET_BINS, WINDOW_BINS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileParams {
    pub n_days: usize,
    pub ticks_per_bin: f64,
    pub value_area_fraction: f64,
    /// Wall clock that decides which calendar day a bar belongs to
    pub zone: Tz,
    pub peaks: PeakParams,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            n_days: 20,
            ticks_per_bin: 15.0,
            value_area_fraction: 1.0,
            zone: chrono_tz::UTC,
            peaks: PeakParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeProfile {
    /// Display name, e.g. `GC` or `BTCUSD`
    pub name: String,
    pub n_days: usize,
    pub dates: Vec<NaiveDate>,
    pub last_bar: DateTime<Utc>,
    pub bin_size: f64,
    pub spot_price: f64,
    pub poc_price: f64,
    pub val_price: f64,
    pub vah_price: f64,
    pub total_volume: f64,
    /// Largest bin volume inside the scrollable range
    pub max_volume: f64,
    /// Rows of the scrollable range, highest price first
    pub rows: Vec<ProfileRow>,
    /// Peaks inside the scrollable range, highest price first
    pub peaks: Vec<Peak>,
    pub window: DisplayWindow,
    pub allowed_prices: Vec<f64>,
    pub rescore_triggered: bool,
    pub up_peaks_initial: usize,
    pub dn_peaks_initial: usize,
}

/// Build the profile for `name` from raw minute bars.
///
/// `crypto` switches session selection to calendar days, counted on the
/// `params.zone` wall clock.
pub fn build_profile(
    name: &str,
    bars: &[Bar],
    crypto: bool,
    params: &ProfileParams,
) -> Result<VolumeProfile, AnalyticsError> {
    let sessions = select_sessions(bars, crypto, params.n_days, params.zone).ok_or(AnalyticsError::Empty("sessions"))?;
    let last = sessions.bars.last().ok_or(AnalyticsError::Empty("sessions"))?;
    let (spot_price, last_bar) = (last.close, last.ts);

    let hist = Histogram::build(&sessions.bars, bin_size(name, params.ticks_per_bin))?;
    let poc_idx = hist.poc_idx();
    let (va_low, va_high) = hist.value_area(params.value_area_fraction);
    let (val_price, vah_price) = (hist.prices[va_low], hist.prices[va_high]);

    let selection = detect_peaks(&hist, spot_price, &params.peaks);
    let window = DisplayWindow::around_spot(&hist, hist.nearest_idx(spot_price), MAX_OFFSET_BINS, WINDOW_BINS);
    let peaks: Vec<Peak> = selection
        .peaks
        .iter()
        .copied()
        .filter(|p| window.contains_price(p.price))
        .collect();
    let rows = profile_rows(&hist, &window, &peaks, (val_price, vah_price));
    let max_volume = rows.iter().map(|r| r.volume).fold(0.0, f64::max);

    info!(
        name,
        days = sessions.dates.len(),
        bins = hist.len(),
        peaks = peaks.len(),
        rescore = selection.rescore_triggered,
        "📊 Volume profile built"
    );

    Ok(VolumeProfile {
        name: name.to_string(),
        n_days: params.n_days,
        dates: sessions.dates,
        last_bar,
        bin_size: hist.bin_size,
        spot_price,
        poc_price: hist.prices[poc_idx],
        val_price,
        vah_price,
        total_volume: hist.total_volume(),
        max_volume,
        allowed_prices: window.allowed_prices(&hist),
        rows,
        peaks,
        window,
        rescore_triggered: selection.rescore_triggered,
        up_peaks_initial: selection.up_initial,
        dn_peaks_initial: selection.dn_initial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Three weekdays of minute bars oscillating around 2000 with a heavy node at 2030
    fn gold_bars() -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
        let mut bars = Vec::new();
        for day in 0..3 {
            for m in 0..600 {
                let ts = start + Duration::days(day) + Duration::minutes(m);
                let close = 1980.0 + (m % 60) as f64;
                let volume = if (close - 2030.0).abs() < 1.0 { 50.0 } else { 1.0 };
                bars.push(Bar { ts, open: close, high: close, low: close, close, volume });
            }
        }
        bars
    }

    #[test]
    fn test_build_profile_basics() {
        let bars = gold_bars();
        let params = ProfileParams { n_days: 2, ..Default::default() };
        let vp = build_profile("GC", &bars, false, &params).unwrap();
        assert_eq!(vp.dates.len(), 2);
        assert!((vp.bin_size - 1.5).abs() < 1e-12);
        // Last close of the day cycle: m = 599 -> 1980 + 59
        assert_eq!(vp.spot_price, 2039.0);
        assert!((vp.poc_price - 2030.0).abs() <= vp.bin_size);
        assert!(vp.val_price <= vp.poc_price && vp.poc_price <= vp.vah_price);
        assert!(vp.rows.windows(2).all(|w| w[0].price > w[1].price));
        assert!(vp.peaks.iter().all(|p| vp.window.contains_price(p.price)));
        assert_eq!(vp.allowed_prices.len(), vp.rows.len());
    }

    #[test]
    fn test_figure_shape() {
        let vp = build_profile("GC", &gold_bars(), false, &ProfileParams::default()).unwrap();
        let fig = vp.figure();
        assert_eq!(fig["data"].as_array().map(|a| a.len()), Some(3));
        assert_eq!(fig["data"][0]["orientation"], "h");
        assert_eq!(fig["data"][2]["text"][0], "SPOT");
        let title = fig["layout"]["title"].as_str().unwrap();
        assert!(title.starts_with("GC - 20 Day Volume Profile"));
        assert!(title.ends_with("$2039.00"));
    }

    #[test]
    fn test_default_value_area_spans_all_traded_bins() {
        let params = ProfileParams::default();
        assert_eq!(params.value_area_fraction, 1.0);
        assert_eq!(params.zone, chrono_tz::UTC);

        let vp = build_profile("GC", &gold_bars(), false, &params).unwrap();
        // Closes run 1980..=2039 every day, so the area covers the whole range
        assert!((vp.val_price - 1980.0).abs() <= vp.bin_size);
        assert!((vp.vah_price - 2039.0).abs() <= vp.bin_size);
    }

    #[test]
    fn test_no_sessions_is_an_error() {
        let err = build_profile("GC", &[], false, &ProfileParams::default()).unwrap_err();
        assert_eq!(err, AnalyticsError::Empty("sessions"));
    }
}
