//! Refresh VOLATILITY_360D / MU_1D in the sector list

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use super::fetch_closes_many;
use crate::analytics::vol_and_mu;
use crate::analytics::volatility::TRADING_DAYS_PER_YEAR;
use crate::config::AppConfig;
use crate::persistence::SectorList;
use crate::sources::YahooClient;
use crate::types::DailySeries;

/// Two years comfortably covers the 252 closes the estimate uses
const HISTORY_RANGE: &str = "2y";

/// Annualized vol and mean daily return per ticker from the last year of closes.
/// Tickers with too little history are left out.
pub fn compute_metrics(closes: &HashMap<String, DailySeries>) -> HashMap<String, (f64, f64)> {
    let mut out = HashMap::new();
    for (ticker, series) in closes {
        let tail = series.tail(TRADING_DAYS_PER_YEAR);
        match vol_and_mu(&tail.values) {
            Ok(stats) => {
                out.insert(ticker.clone(), (stats.vol_pct, stats.mu_pct));
            }
            Err(e) => warn!(ticker = %ticker, error = %e, "Volatility not computed"),
        }
    }
    out
}

/// Recompute the metrics and write them back into the list file.
/// Returns how many tickers received values.
pub async fn refresh_volatility(cfg: &AppConfig, yahoo: &YahooClient) -> Result<usize> {
    let path = Path::new(&cfg.heatmap.sector_file);
    let mut list = SectorList::load(path)?;
    let tickers = list.tickers();
    if tickers.is_empty() {
        bail!("No tickers found in {}", path.display());
    }
    info!(count = tickers.len(), "📥 Fetching closes for volatility refresh");

    let closes = fetch_closes_many(yahoo, &tickers, HISTORY_RANGE, true, cfg.breadth.concurrency).await;
    let metrics = compute_metrics(&closes);
    list.set_vol_metrics(&metrics);
    list.save(path)?;

    info!(updated = metrics.len(), total = tickers.len(), "💾 Volatility metrics saved");
    Ok(metrics.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series(n: usize, step: f64) -> DailySeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        DailySeries::from_pairs((0..n).map(|i| {
            let wiggle = if i % 2 == 0 { step } else { -step };
            (start + Duration::days(i as i64), 100.0 + wiggle)
        }))
    }

    #[test]
    fn test_short_history_is_skipped() {
        let mut closes = HashMap::new();
        closes.insert("XLK".to_string(), series(300, 1.0));
        closes.insert("NEW".to_string(), series(40, 1.0));
        let metrics = compute_metrics(&closes);
        assert!(metrics.contains_key("XLK"));
        assert!(!metrics.contains_key("NEW"));
        let (vol, _) = metrics["XLK"];
        assert!(vol > 0.0);
    }
}
