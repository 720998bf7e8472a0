//! Intraday volatility zones: average bar range by local clock time

use chrono::FixedOffset;
use serde::Serialize;
use std::collections::BTreeMap;

use super::stats::quantile;
use crate::error::AnalyticsError;
use crate::types::Bar;

pub const HUNT_COLOR: &str = "#c0392b";
pub const TRAP_COLOR: &str = "#95a5a6";
pub const NEUTRAL_COLOR: &str = "#f39c12";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSlot {
    /// Local clock time, "HH:MM"
    pub time: String,
    pub avg_range: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradayZones {
    pub slots: Vec<ZoneSlot>,
    /// Median of slot averages; at or below is the trap zone
    pub trap_threshold: f64,
    /// 80th percentile; at or above is the hunt zone
    pub hunt_threshold: f64,
    pub best_time: String,
}

/// Group bar ranges by `HH:MM` in `offset` local time and classify each slot
pub fn intraday_zones(bars: &[Bar], offset: &FixedOffset) -> Result<IntradayZones, AnalyticsError> {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for bar in bars.iter().filter(|b| b.high > 0.0 && b.low.is_finite()) {
        let key = bar.ts.with_timezone(offset).format("%H:%M").to_string();
        let entry = groups.entry(key).or_insert((0.0, 0));
        entry.0 += bar.range();
        entry.1 += 1;
    }

    let averages: Vec<(String, f64)> = groups
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect();
    let values: Vec<f64> = averages.iter().map(|(_, v)| *v).collect();
    if values.is_empty() || values.iter().sum::<f64>() == 0.0 {
        return Err(AnalyticsError::Empty("intraday ranges"));
    }

    let trap = quantile(&values, 0.5).ok_or(AnalyticsError::Empty("intraday ranges"))?;
    let hunt = quantile(&values, 0.8).ok_or(AnalyticsError::Empty("intraday ranges"))?;

    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| *v > b) {
            best = Some((i, *v));
        }
    }
    let best_time = best.map(|(i, _)| averages[i].0.clone()).unwrap_or_default();

    let slots = averages
        .into_iter()
        .map(|(time, avg_range)| {
            let color = if avg_range >= hunt {
                HUNT_COLOR
            } else if avg_range <= trap {
                TRAP_COLOR
            } else {
                NEUTRAL_COLOR
            };
            ZoneSlot {
                time,
                avg_range,
                color,
            }
        })
        .collect();

    Ok(IntradayZones {
        slots,
        trap_threshold: trap,
        hunt_threshold: hunt,
        best_time,
    })
}
