//! Daily true-range regime: today's High-Low against its recent average

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use super::stats::{mean, rolling_mean};
use crate::error::AnalyticsError;
use crate::types::Bar;

/// Daily High/Low/Close
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DailyRange {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DailyRange {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeStatus {
    Active,
    Quiet,
}

impl RangeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RangeStatus::Active => "ACTIVE (Volatile)",
            RangeStatus::Quiet => "QUIET",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RangeStatus::Active => "#c0392b",
            RangeStatus::Quiet => "#7f8c8d",
        }
    }
}

pub const ABOVE_AVG_COLOR: &str = "#e74c3c";
pub const BELOW_AVG_COLOR: &str = "#bdc3c7";

/// One row of the range report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeRow {
    pub date: NaiveDate,
    pub range: f64,
    pub sma: Option<f64>,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeReport {
    pub rows: Vec<RangeRow>,
    /// Mean range over the reported rows
    pub average: f64,
    pub current: f64,
    pub status: RangeStatus,
}

impl RangeReport {
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// Aggregate intraday bars into calendar days (in `offset` local time):
/// max High, min Low, last Close
pub fn aggregate_daily(bars: &[Bar], offset: &FixedOffset) -> Vec<DailyRange> {
    let mut days: BTreeMap<NaiveDate, DailyRange> = BTreeMap::new();
    let mut sorted: Vec<&Bar> = bars.iter().collect();
    sorted.sort_by_key(|b| b.ts);
    for bar in sorted {
        let date = bar.ts.with_timezone(offset).date_naive();
        days.entry(date)
            .and_modify(|d| {
                d.high = d.high.max(bar.high);
                d.low = d.low.min(bar.low);
                d.close = bar.close;
            })
            .or_insert(DailyRange {
                date,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            });
    }
    days.into_values().collect()
}

/// Range with SMA over all days, then the last `lookback` rows against their mean
pub fn range_report(days: &[DailyRange], sma_window: usize, lookback: usize) -> Result<RangeReport, AnalyticsError> {
    if days.is_empty() {
        return Err(AnalyticsError::Empty("daily ranges"));
    }
    let ranges: Vec<f64> = days.iter().map(|d| d.range()).collect();
    let sma = rolling_mean(&ranges, sma_window);

    let start = days.len().saturating_sub(lookback);
    let window = &ranges[start..];
    let average = mean(window).ok_or(AnalyticsError::Empty("range window"))?;
    let current = *window.last().ok_or(AnalyticsError::Empty("range window"))?;

    let rows = (start..days.len())
        .map(|i| RangeRow {
            date: days[i].date,
            range: ranges[i],
            sma: sma[i],
            color: if ranges[i] < average {
                BELOW_AVG_COLOR
            } else {
                ABOVE_AVG_COLOR
            },
        })
        .collect();

    Ok(RangeReport {
        rows,
        average,
        current,
        status: if current > average {
            RangeStatus::Active
        } else {
            RangeStatus::Quiet
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(h: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            ts: Utc.with_ymd_and_hms(2025, 6, 2, h, 0, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    fn day(i: u32, range: f64) -> DailyRange {
        DailyRange {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            high: 100.0 + range,
            low: 100.0,
            close: 100.0,
        }
    }

    #[test]
    fn test_aggregate_daily_groups_by_local_date() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let bars = vec![bar(1, 10.0, 8.0, 9.0), bar(5, 12.0, 9.0, 11.0), bar(3, 11.0, 7.0, 10.0)];
        let days = aggregate_daily(&bars, &utc);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].high, 12.0);
        assert_eq!(days[0].low, 7.0);
        assert_eq!(days[0].close, 11.0);

        // 20:00 UTC on the same day is the next day in UTC+8
        let hk = FixedOffset::east_opt(8 * 3600).unwrap();
        let bars = vec![bar(1, 10.0, 8.0, 9.0), bar(20, 12.0, 9.0, 11.0)];
        assert_eq!(aggregate_daily(&bars, &hk).len(), 2);
    }

    #[test]
    fn test_range_report_status() {
        let mut days: Vec<DailyRange> = (0..35).map(|i| day(i, 10.0)).collect();
        days.push(day(35, 40.0));
        let report = range_report(&days, 5, 30).unwrap();
        assert_eq!(report.rows.len(), 30);
        assert_eq!(report.current, 40.0);
        assert!((report.average - 11.0).abs() < 1e-9);
        assert_eq!(report.status, RangeStatus::Active);
        assert_eq!(report.rows[0].color, BELOW_AVG_COLOR);
        assert_eq!(report.rows[29].color, ABOVE_AVG_COLOR);
        assert_eq!(report.rows[29].sma, Some(16.0));
    }

    #[test]
    fn test_range_report_quiet_and_short_history() {
        let days: Vec<DailyRange> = vec![day(0, 10.0), day(1, 5.0)];
        let report = range_report(&days, 5, 30).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.status, RangeStatus::Quiet);
        assert!(report.rows.iter().all(|r| r.sma.is_none()));
        assert!(range_report(&[], 5, 30).is_err());
    }
}
