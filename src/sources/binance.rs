//! Binance REST klines client
//!
//! Paginates `/api/v3/klines` across mirror endpoints, optionally through a proxy.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;

use super::{build_http_client, status_error, with_retries, BarSource};
use crate::config::SourcesConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::{crypto_pair, dedup_bars, Bar, Interval};

const PROVIDER: &str = "Binance";
const PAGE_LIMIT: usize = 1000;

/// Parsed kline row with its close time (ms)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kline {
    pub close_time: i64,
    pub bar: Bar,
}

/// Parse response: array of arrays
/// [[open_time, open, high, low, close, volume, close_time, ...], ...]
pub fn parse_klines(klines: Vec<Vec<serde_json::Value>>) -> Vec<Kline> {
    klines
        .into_iter()
        .filter_map(|kline| {
            if kline.len() < 7 {
                return None;
            }

            let open_time = kline[0].as_i64()?;
            let open: f64 = kline[1].as_str()?.parse().ok()?;
            let high: f64 = kline[2].as_str()?.parse().ok()?;
            let low: f64 = kline[3].as_str()?.parse().ok()?;
            let close: f64 = kline[4].as_str()?.parse().ok()?;
            let volume: f64 = kline[5].as_str()?.parse().ok()?;
            let close_time = kline[6].as_i64()?;

            Some(Kline {
                close_time,
                bar: Bar {
                    ts: Utc.timestamp_millis_opt(open_time).single()?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct BinanceKlines {
    http: reqwest::Client,
    endpoints: Vec<String>,
    page_pause: Duration,
    proxied: bool,
}

impl BinanceKlines {
    pub fn new(cfg: &SourcesConfig) -> SourceResult<Self> {
        let proxy = cfg.binance_proxy.as_deref().filter(|p| !p.trim().is_empty());
        Ok(Self {
            http: build_http_client(cfg, proxy)?,
            endpoints: cfg.binance_endpoints.clone(),
            page_pause: Duration::from_millis(cfg.binance_page_pause_ms),
            proxied: proxy.is_some(),
        })
    }

    /// One page, trying each endpoint in order
    async fn fetch_page(
        &self,
        pair: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> SourceResult<Vec<Kline>> {
        let mut last_err = SourceError::empty(PROVIDER, pair);

        for endpoint in &self.endpoints {
            let query = [
                ("symbol", pair.to_string()),
                ("interval", interval.binance_code().to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            let query = &query;

            let result = with_retries(5, Duration::from_millis(300), move || async move {
                let response = self
                    .http
                    .get(endpoint)
                    .query(query)
                    .send()
                    .await
                    .map_err(|source| SourceError::Http {
                        provider: PROVIDER,
                        source,
                    })?;

                if !response.status().is_success() {
                    return Err(status_error(PROVIDER, pair, response.status()));
                }

                let klines: Vec<Vec<serde_json::Value>> = response
                    .json()
                    .await
                    .map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;
                Ok(parse_klines(klines))
            })
            .await;

            match result {
                Ok(rows) => return Ok(rows),
                Err(e @ SourceError::GeoBlocked { .. }) => {
                    if !self.proxied {
                        tracing::warn!(
                            endpoint = %endpoint,
                            "⚠️ Binance blocked this region (HTTP 451); set sources.binance_proxy to route through a proxy"
                        );
                    }
                    last_err = e;
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Binance endpoint failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// Paginated klines for a Binance pair over `[start_ms, end_ms]`
    pub async fn fetch_klines(
        &self,
        pair: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> SourceResult<Vec<Bar>> {
        tracing::info!(pair = %pair, interval = %interval, "📥 Fetching klines from Binance...");

        let bars = paginate_klines(pair, interval, start_ms, end_ms, PAGE_LIMIT, self.page_pause, move |from, to| {
            self.fetch_page(pair, interval, from, to)
        })
        .await?;

        tracing::info!(pair = %pair, count = bars.len(), "✅ Klines fetched");
        Ok(bars)
    }
}

/// Walk `[start_ms, end_ms]` in pages of `page_limit` klines.
///
/// Stops on an empty or short page, when the cursor stops advancing, or past
/// `end_ms`. A failing page ends the walk with whatever was already fetched;
/// it is only an error when nothing was.
pub async fn paginate_klines<F, Fut>(
    pair: &str,
    interval: Interval,
    start_ms: i64,
    end_ms: i64,
    page_limit: usize,
    pause: Duration,
    mut fetch_page: F,
) -> SourceResult<Vec<Bar>>
where
    F: FnMut(i64, i64) -> Fut,
    Fut: Future<Output = SourceResult<Vec<Kline>>>,
{
    let step = page_limit as i64 * interval.duration_ms();
    let mut cursor = start_ms;
    let mut bars = Vec::new();

    while cursor <= end_ms {
        let page_end = (cursor + step - 1).min(end_ms);
        let rows = match fetch_page(cursor, page_end).await {
            Ok(rows) => rows,
            Err(e) if bars.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    pair = %pair,
                    fetched = bars.len(),
                    error = %e,
                    "⚠️ Kline page failed, keeping earlier pages"
                );
                break;
            }
        };
        let Some(last) = rows.last().copied() else {
            break;
        };

        let page_len = rows.len();
        bars.extend(rows.into_iter().map(|k| k.bar));

        let next = last.close_time + 1;
        if page_len < page_limit || next <= cursor {
            break;
        }
        cursor = next;
        tokio::time::sleep(pause).await;
    }

    dedup_bars(&mut bars);
    Ok(bars)
}

#[async_trait]
impl BarSource for BinanceKlines {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> SourceResult<Vec<Bar>> {
        let pair = crypto_pair(symbol).ok_or_else(|| SourceError::UnsupportedSymbol {
            provider: PROVIDER,
            symbol: symbol.to_string(),
        })?;
        let mut bars = self
            .fetch_klines(pair, interval, start.timestamp_millis(), end.timestamp_millis() - 1)
            .await?;
        bars.retain(|b| b.ts >= start && b.ts < end);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_klines_skips_malformed_rows() {
        let raw: Vec<Vec<serde_json::Value>> = vec![
            vec![
                json!(1_700_000_000_000i64),
                json!("100.5"),
                json!("101.0"),
                json!("99.5"),
                json!("100.0"),
                json!("12.5"),
                json!(1_700_000_059_999i64),
            ],
            vec![json!(1_700_000_060_000i64), json!("x")],
            vec![
                json!(1_700_000_060_000i64),
                json!(1.0),
                json!("1"),
                json!("1"),
                json!("1"),
                json!("1"),
                json!(1_700_000_119_999i64),
            ],
        ];
        let rows = parse_klines(raw);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close_time, 1_700_000_059_999);
        assert_eq!(rows[0].bar.close, 100.0);
        assert_eq!(rows[0].bar.volume, 12.5);
        assert_eq!(rows[0].bar.ts.timestamp_millis(), 1_700_000_000_000);
    }

    const MINUTE_MS: i64 = 60_000;

    /// `n` consecutive minute klines starting at `from`
    fn page(from: i64, n: usize) -> Vec<Kline> {
        (0..n as i64)
            .map(|i| {
                let open = from + i * MINUTE_MS;
                Kline {
                    close_time: open + MINUTE_MS - 1,
                    bar: Bar {
                        ts: Utc.timestamp_millis_opt(open).unwrap(),
                        open: 1.0,
                        high: 1.0,
                        low: 1.0,
                        close: 1.0,
                        volume: 1.0,
                    },
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_page() {
        let calls = std::cell::Cell::new(0);
        let bars = paginate_klines("BTCUSDT", Interval::Min1, 0, 100 * MINUTE_MS, 4, Duration::ZERO, |from, _| {
            calls.set(calls.get() + 1);
            let n = if calls.get() == 1 { 4 } else { 2 };
            async move { Ok(page(from, n)) }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(bars.len(), 6);
        assert_eq!(bars[4].ts.timestamp_millis(), 4 * MINUTE_MS);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_end() {
        let mut ranges = Vec::new();
        let end = 8 * MINUTE_MS - 1;
        let bars = paginate_klines("BTCUSDT", Interval::Min1, 0, end, 4, Duration::ZERO, |from, to| {
            ranges.push((from, to));
            async move { Ok(page(from, 4)) }
        })
        .await
        .unwrap();
        assert_eq!(ranges, vec![(0, 4 * MINUTE_MS - 1), (4 * MINUTE_MS, end)]);
        assert_eq!(bars.len(), 8);
    }

    #[tokio::test]
    async fn test_failed_page_keeps_earlier_pages() {
        let calls = std::cell::Cell::new(0);
        let bars = paginate_klines("BTCUSDT", Interval::Min1, 0, 100 * MINUTE_MS, 4, Duration::ZERO, |from, _| {
            calls.set(calls.get() + 1);
            let first = calls.get() == 1;
            async move {
                if first {
                    Ok(page(from, 4))
                } else {
                    Err(SourceError::empty(PROVIDER, "BTCUSDT"))
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(bars.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_first_page_is_an_error() {
        let result = paginate_klines("BTCUSDT", Interval::Min1, 0, 100 * MINUTE_MS, 4, Duration::ZERO, |_, _| async {
            Err(SourceError::empty(PROVIDER, "BTCUSDT"))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_symbol() {
        let cfg = crate::config::AppConfig::from_defaults().unwrap();
        let client = BinanceKlines::new(&cfg.sources).unwrap();
        let now = Utc::now();
        let err = client
            .fetch_bars("GC=F", now, now, Interval::Min1)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedSymbol { .. }));
    }
}
