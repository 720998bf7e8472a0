//! Fixed-offset run schedule

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::time::Duration;
use tracing::debug;

use crate::config::ScheduleConfig;

/// Candidates are searched this many days ahead
const SEARCH_DAYS: i64 = 8;

#[derive(Debug, Clone)]
pub struct Schedule {
    run_times: Vec<NaiveTime>,
    weekdays: Vec<u32>,
    offset: FixedOffset,
    sleep_chunk: Duration,
}

impl Schedule {
    pub fn from_config(cfg: &ScheduleConfig) -> Result<Self> {
        let mut run_times = cfg
            .run_times
            .iter()
            .map(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").with_context(|| format!("Invalid run time '{}'", t)))
            .collect::<Result<Vec<_>>>()?;
        run_times.sort();
        run_times.dedup();
        if run_times.is_empty() {
            bail!("schedule.run_times is empty");
        }
        if let Some(bad) = cfg.weekdays.iter().find(|d| !(1..=7).contains(*d)) {
            bail!("Invalid ISO weekday {}", bad);
        }
        let offset = FixedOffset::east_opt(cfg.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset {}h", cfg.utc_offset_hours))?;

        Ok(Self {
            run_times,
            weekdays: cfg.weekdays.clone(),
            offset,
            sleep_chunk: Duration::from_secs(cfg.sleep_chunk_secs.max(1)),
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// First scheduled instant at or after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        let local = now.with_timezone(&self.offset);
        for day_delta in 0..SEARCH_DAYS {
            let date = local.date_naive() + ChronoDuration::days(day_delta);
            if !self.weekdays.contains(&date.weekday().number_from_monday()) {
                continue;
            }
            for time in &self.run_times {
                let Some(candidate) = self.offset.from_local_datetime(&date.and_time(*time)).single() else {
                    continue;
                };
                if candidate >= local {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Wait of at most one chunk toward `target`
    pub fn next_sleep(&self, now: DateTime<Utc>, target: DateTime<FixedOffset>) -> Option<Duration> {
        let remaining = target.with_timezone(&Utc) - now;
        if remaining <= ChronoDuration::zero() {
            return None;
        }
        let remaining = remaining.to_std().ok()?;
        Some(remaining.min(self.sleep_chunk))
    }

    /// Sleep in chunks so clock jumps are noticed
    pub async fn sleep_until(&self, target: DateTime<FixedOffset>) {
        while let Some(wait) = self.next_sleep(Utc::now(), target) {
            debug!(target = %target, wait_secs = wait.as_secs(), "Waiting for next run");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Schedule {
        let cfg = ScheduleConfig {
            run_times: vec!["23:30".into(), "09:00".into(), "22:30".into()],
            weekdays: vec![1, 2, 3, 4, 5, 6],
            utc_offset_hours: 8,
            max_attempts: 10,
            retry_delay_secs: 5,
            sleep_chunk_secs: 60,
        };
        Schedule::from_config(&cfg).unwrap()
    }

    fn hkt(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_next_run_same_day() {
        // Monday 10:00 HKT -> Monday 22:30
        let next = schedule().next_run_after(hkt(2025, 3, 3, 10, 0)).unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2025-03-03 22:30");
    }

    #[test]
    fn test_exact_time_counts() {
        let next = schedule().next_run_after(hkt(2025, 3, 3, 9, 0)).unwrap();
        assert_eq!(next.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn test_sunday_is_skipped() {
        // Saturday 23:45 HKT -> Monday 09:00
        let next = schedule().next_run_after(hkt(2025, 3, 8, 23, 45)).unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2025-03-10 09:00");
    }

    #[test]
    fn test_sleep_is_chunked() {
        let s = schedule();
        let now = hkt(2025, 3, 3, 10, 0);
        let target = s.next_run_after(now).unwrap();
        assert_eq!(s.next_sleep(now, target), Some(Duration::from_secs(60)));
        let close = target.with_timezone(&Utc) - ChronoDuration::seconds(10);
        assert_eq!(s.next_sleep(close, target), Some(Duration::from_secs(10)));
        assert_eq!(s.next_sleep(target.with_timezone(&Utc), target), None);
    }

    #[test]
    fn test_bad_time_rejected() {
        let cfg = ScheduleConfig {
            run_times: vec!["25:00".into()],
            weekdays: vec![1],
            utc_offset_hours: 8,
            max_attempts: 1,
            retry_delay_secs: 0,
            sleep_chunk_secs: 60,
        };
        assert!(Schedule::from_config(&cfg).is_err());
    }
}
