//! Core types used throughout the report generators
//!
//! Bars, sampling intervals, daily series and symbol helpers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One OHLCV bar, stamped with its open time in UTC
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Sort by timestamp and keep the first bar for each duplicate timestamp
pub fn dedup_bars(bars: &mut Vec<Bar>) {
    bars.sort_by_key(|b| b.ts);
    bars.dedup_by_key(|b| b.ts);
}

/// Sort by timestamp and keep the last bar for each duplicate timestamp.
/// Local minute files append corrections, so the later row wins there.
pub fn dedup_bars_keep_last(bars: &mut Vec<Bar>) {
    bars.sort_by_key(|b| b.ts);
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars.drain(..) {
        match out.last_mut() {
            Some(last) if last.ts == bar.ts => *last = bar,
            _ => out.push(bar),
        }
    }
    *bars = out;
}

/// Sampling interval for bar requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min15,
    Min60,
    Day1,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Day1
    }
}

impl Interval {
    pub fn yahoo_code(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min15 => "15m",
            Interval::Min60 => "60m",
            Interval::Day1 => "1d",
        }
    }

    pub fn binance_code(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min15 => "15m",
            Interval::Min60 => "1h",
            Interval::Day1 => "1d",
        }
    }

    pub fn deribit_resolution(&self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min15 => "15",
            Interval::Min60 => "60",
            Interval::Day1 => "1D",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::Min1 => 60_000,
            Interval::Min15 => 15 * 60_000,
            Interval::Min60 => 60 * 60_000,
            Interval::Day1 => 24 * 60 * 60_000,
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Some(Interval::Min1),
            "15m" => Some(Interval::Min15),
            "60m" | "1h" => Some(Interval::Min60),
            "1d" => Some(Interval::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.yahoo_code())
    }
}

/// Date-indexed values, ascending by date, one value per date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DailySeries {
    /// Build from unordered pairs; later duplicates win and non-finite values are dropped
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut map: std::collections::BTreeMap<NaiveDate, f64> = Default::default();
        for (d, v) in pairs {
            if v.is_finite() {
                map.insert(d, v);
            }
        }
        let (dates, values) = map.into_iter().unzip();
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.dates.last()?, *self.values.last()?))
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    /// Keep the last `n` points
    pub fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    /// Simple returns; the first date has no return and is dropped
    pub fn pct_change(&self) -> Self {
        let mut out = Self::default();
        for i in 1..self.len() {
            let prev = self.values[i - 1];
            if prev != 0.0 {
                let r = self.values[i] / prev - 1.0;
                if r.is_finite() {
                    out.dates.push(self.dates[i]);
                    out.values.push(r);
                }
            }
        }
        out
    }

    /// Inner join on date
    pub fn align(&self, other: &DailySeries) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
        let lookup: HashMap<NaiveDate, f64> = other
            .dates
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        let mut dates = Vec::new();
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (d, v) in self.dates.iter().zip(&self.values) {
            if let Some(o) = lookup.get(d) {
                dates.push(*d);
                left.push(*v);
                right.push(*o);
            }
        }
        (dates, left, right)
    }
}

/// Binance pair for a Yahoo-style crypto symbol
pub fn crypto_pair(symbol: &str) -> Option<&'static str> {
    match symbol.to_uppercase().as_str() {
        "BTC-USD" => Some("BTCUSDT"),
        "ETH-USD" => Some("ETHUSDT"),
        _ => None,
    }
}

/// Deribit perpetual for a Yahoo-style crypto symbol
pub fn deribit_instrument(symbol: &str) -> Option<&'static str> {
    match symbol.to_uppercase().as_str() {
        "BTC-USD" => Some("BTC-PERPETUAL"),
        "ETH-USD" => Some("ETH-PERPETUAL"),
        _ => None,
    }
}

pub fn is_crypto(symbol: &str) -> bool {
    crypto_pair(symbol).is_some()
}

/// Short display name: "BTC-USD" -> "BTCUSD", "GC=F" -> "GC", "^HSI" -> "HSI"
pub fn display_name(symbol: &str) -> String {
    if is_crypto(symbol) {
        return symbol.replace('-', "").to_uppercase();
    }
    let base = symbol.split('=').next().unwrap_or(symbol);
    base.trim_start_matches('^').to_string()
}

/// Identifier-safe name for DOM ids and JS variables
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
