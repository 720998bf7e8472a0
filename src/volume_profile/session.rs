//! Session selection: which minute bars belong to the last N trading days

use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;

use crate::types::{dedup_bars, is_crypto, Bar};

/// Bars of the selected sessions and their distinct dates
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWindow {
    pub bars: Vec<Bar>,
    pub dates: Vec<NaiveDate>,
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Calendar that assigns bars to session dates.
///
/// Crypto exchanges are bucketed by New York date, local minute files by
/// their Hong Kong wall clock, and Yahoo bars by UTC date.
pub fn session_zone(symbol: &str, local_file: bool) -> Tz {
    if local_file {
        chrono_tz::Asia::Hong_Kong
    } else if is_crypto(symbol) {
        chrono_tz::America::New_York
    } else {
        chrono_tz::UTC
    }
}

/// Keep the last `n_days` trading dates, counted in `zone`.
///
/// Crypto trades every day. Other instruments lose Saturday bars, count only
/// weekdays as trading dates, and keep Sunday bars inside the selected span
/// (the Sunday evening futures open belongs to the following week).
pub fn select_sessions(bars: &[Bar], crypto: bool, n_days: usize, zone: Tz) -> Option<SessionWindow> {
    let day = |b: &Bar| b.ts.with_timezone(&zone).date_naive();

    let mut bars = bars.to_vec();
    dedup_bars(&mut bars);
    if !crypto {
        bars.retain(|b| day(b).weekday() != Weekday::Sat);
    }

    let all_dates: BTreeSet<NaiveDate> = bars.iter().map(day).collect();
    let trading: Vec<NaiveDate> = all_dates
        .iter()
        .copied()
        .filter(|d| crypto || is_weekday(*d))
        .collect();

    let start = trading.len().saturating_sub(n_days);
    let selected = &trading[start..];
    let (&first, &last) = (selected.first()?, selected.last()?);

    let mut keep: BTreeSet<NaiveDate> = selected.iter().copied().collect();
    if !crypto {
        keep.extend(
            all_dates
                .iter()
                .copied()
                .filter(|d| d.weekday() == Weekday::Sun && *d >= first && *d <= last),
        );
    }

    bars.retain(|b| keep.contains(&day(b)));
    if bars.is_empty() {
        return None;
    }
    let dates: Vec<NaiveDate> = bars
        .iter()
        .map(day)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    Some(SessionWindow { bars, dates })
}
