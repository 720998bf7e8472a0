//! Local minute-bar CSV files for contracts without a public intraday feed
//!
//! Expected columns: `timestamp,close_price,minute_volume`. Naive timestamps are
//! exchange-local (UTC+8).

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc, Weekday};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::BarSource;
use crate::error::{SourceError, SourceResult};
use crate::types::{dedup_bars_keep_last, Bar, Interval};

const PROVIDER: &str = "LocalCsv";
const LOCAL_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Deserialize)]
struct MinuteRow {
    timestamp: String,
    close_price: Option<f64>,
    #[serde(default)]
    minute_volume: Option<f64>,
}

fn parse_timestamp(raw: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];
    FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Load a minute CSV: duplicates keep the last row, weekend rows (local time) are dropped
pub fn load_minute_csv(path: &Path) -> SourceResult<Vec<Bar>> {
    let offset = FixedOffset::east_opt(LOCAL_OFFSET_SECS).ok_or_else(|| SourceError::decode(PROVIDER, "bad offset"))?;
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SourceError::decode(PROVIDER, format!("{}: {}", path.display(), e)))?;

    let mut bars = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<MinuteRow>() {
        let row = row.map_err(|e| SourceError::decode(PROVIDER, format!("{}: {}", path.display(), e)))?;
        let (Some(ts), Some(close)) = (parse_timestamp(&row.timestamp, &offset), row.close_price) else {
            skipped += 1;
            continue;
        };
        let weekday = ts.with_timezone(&offset).weekday();
        if matches!(weekday, Weekday::Sat | Weekday::Sun) {
            continue;
        }
        bars.push(Bar {
            ts,
            open: close,
            high: close,
            low: close,
            close,
            volume: row.minute_volume.unwrap_or(0.0),
        });
    }

    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "Skipped unparseable minute rows");
    }

    dedup_bars_keep_last(&mut bars);
    Ok(bars)
}

/// A symbol backed by a local minute file
#[derive(Debug, Clone)]
pub struct LocalMinuteFile {
    pub symbol: String,
    pub path: PathBuf,
}

#[async_trait]
impl BarSource for LocalMinuteFile {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval: Interval,
    ) -> SourceResult<Vec<Bar>> {
        if !symbol.eq_ignore_ascii_case(&self.symbol) {
            return Err(SourceError::UnsupportedSymbol {
                provider: PROVIDER,
                symbol: symbol.to_string(),
            });
        }
        if !self.path.exists() {
            return Err(SourceError::Io {
                path: self.path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "minute file not found"),
            });
        }
        let mut bars = load_minute_csv(&self.path)?;
        bars.retain(|b| b.ts >= start && b.ts < end);
        if bars.is_empty() {
            return Err(SourceError::empty(PROVIDER, symbol));
        }
        Ok(bars)
    }
}
