//! Yahoo Finance chart API client
//!
//! Daily and intraday OHLCV via `/v8/finance/chart/{symbol}`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{build_http_client, status_error, with_retries, BarSource};
use crate::config::SourcesConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::{dedup_bars, Bar, DailySeries, Interval};

const PROVIDER: &str = "Yahoo";
/// Yahoo serves at most 7 days of 1m bars per request
const INTRADAY_BATCH_DAYS: i64 = 7;

/// Requested time span
#[derive(Debug, Clone)]
pub enum ChartWindow {
    /// Relative range such as `5d`, `3mo`, `2y`
    Range(String),
    /// Absolute window
    Between(DateTime<Utc>, DateTime<Utc>),
}

/// Parsed chart response
#[derive(Debug, Clone)]
pub struct Chart {
    pub symbol: String,
    pub currency: Option<String>,
    /// Exchange offset from UTC in seconds
    pub gmt_offset_secs: i32,
    pub bars: Vec<Bar>,
    /// Adjusted closes aligned with `bars` (raw close where unavailable)
    pub adj_closes: Vec<f64>,
}

impl Chart {
    pub fn exchange_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.gmt_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    /// Closes keyed by exchange-local date
    pub fn daily_closes(&self, adjusted: bool) -> DailySeries {
        let offset = self.exchange_offset();
        let pairs = self.bars.iter().zip(&self.adj_closes).map(|(bar, adj)| {
            let date = bar.ts.with_timezone(&offset).date_naive();
            (date, if adjusted { *adj } else { bar.close })
        });
        DailySeries::from_pairs(pairs)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteArrays>,
    #[serde(default)]
    adjclose: Vec<AdjCloseArrays>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteArrays {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseArrays {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn pick(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten().filter(|v| v.is_finite())
}

/// Parse a chart API response body; rows without a close are dropped
pub fn parse_chart(symbol: &str, body: &str) -> SourceResult<Chart> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;

    if let Some(err) = envelope.chart.error {
        return Err(SourceError::decode(
            PROVIDER,
            format!("{} ({}): {}", symbol, err.code, err.description),
        ));
    }

    let result = envelope
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| SourceError::empty(PROVIDER, symbol))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adj = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    let mut adj_closes = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = pick(&quote.close, i) else {
            continue;
        };
        let Some(ts) = Utc.timestamp_opt(ts, 0).single() else {
            continue;
        };
        bars.push(Bar {
            ts,
            open: pick(&quote.open, i).unwrap_or(close),
            high: pick(&quote.high, i).unwrap_or(close),
            low: pick(&quote.low, i).unwrap_or(close),
            close,
            volume: pick(&quote.volume, i).unwrap_or(0.0),
        });
        adj_closes.push(pick(&adj, i).unwrap_or(close));
    }

    Ok(Chart {
        symbol: if result.meta.symbol.is_empty() {
            symbol.to_string()
        } else {
            result.meta.symbol
        },
        currency: result.meta.currency,
        gmt_offset_secs: result.meta.gmtoffset,
        bars,
        adj_closes,
    })
}

/// Percent-encode a ticker for use as a path segment ("^GSPC" -> "%5EGSPC")
fn encode_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for b in symbol.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: String,
    max_intraday_days: i64,
}

impl YahooClient {
    pub fn new(cfg: &SourcesConfig) -> SourceResult<Self> {
        Ok(Self {
            http: build_http_client(cfg, None)?,
            base_url: cfg.yahoo_chart_url.trim_end_matches('/').to_string(),
            max_intraday_days: 29,
        })
    }

    pub fn with_max_intraday_days(mut self, days: i64) -> Self {
        self.max_intraday_days = days;
        self
    }

    /// Fetch a single chart request
    pub async fn chart(
        &self,
        symbol: &str,
        window: &ChartWindow,
        interval: Interval,
    ) -> SourceResult<Chart> {
        let url = format!("{}/{}", self.base_url, encode_symbol(symbol));
        let mut query: Vec<(&str, String)> = vec![
            ("interval", interval.yahoo_code().to_string()),
            ("includePrePost", "false".to_string()),
            ("events", "div,splits".to_string()),
        ];
        match window {
            ChartWindow::Range(range) => query.push(("range", range.clone())),
            ChartWindow::Between(start, end) => {
                query.push(("period1", start.timestamp().to_string()));
                query.push(("period2", end.timestamp().to_string()));
            }
        }

        let (url, query) = (&url, &query);
        with_retries(3, Duration::from_millis(300), move || async move {
            let response = self
                .http
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|source| SourceError::Http {
                    provider: PROVIDER,
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(status_error(PROVIDER, symbol, status));
            }

            let body = response.text().await.map_err(|source| SourceError::Http {
                provider: PROVIDER,
                source,
            })?;
            parse_chart(symbol, &body)
        })
        .await
    }

    /// Daily closes over a relative range
    pub async fn daily_closes(&self, symbol: &str, range: &str, adjusted: bool) -> SourceResult<DailySeries> {
        let chart = self
            .chart(symbol, &ChartWindow::Range(range.to_string()), Interval::Day1)
            .await?;
        let series = chart.daily_closes(adjusted);
        if series.is_empty() {
            return Err(SourceError::empty(PROVIDER, symbol));
        }
        Ok(series)
    }

    /// Intraday bars in 7-day batches; the window start is clamped to the provider horizon
    pub async fn intraday_batched(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> SourceResult<Vec<Bar>> {
        let horizon = Utc::now() - ChronoDuration::days(self.max_intraday_days);
        let mut cursor = start.max(horizon);
        let mut bars = Vec::new();

        while cursor < end {
            let batch_end = (cursor + ChronoDuration::days(INTRADAY_BATCH_DAYS)).min(end);
            match self
                .chart(symbol, &ChartWindow::Between(cursor, batch_end), interval)
                .await
            {
                Ok(chart) => bars.extend(chart.bars),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, from = %cursor, to = %batch_end, error = %e, "Intraday batch failed");
                }
            }
            cursor = batch_end;
        }

        dedup_bars(&mut bars);
        bars.retain(|b| b.ts >= start && b.ts < end);
        if bars.is_empty() {
            return Err(SourceError::empty(PROVIDER, symbol));
        }
        Ok(bars)
    }

    /// Latest close, retrying up to `max_attempts` with `min(5, 2^attempt)` second waits
    pub async fn latest_close(&self, symbol: &str, max_attempts: u32) -> SourceResult<f64> {
        let mut last_err = SourceError::empty(PROVIDER, symbol);
        for attempt in 0..max_attempts.max(1) {
            match self
                .chart(symbol, &ChartWindow::Range("5d".to_string()), Interval::Day1)
                .await
            {
                Ok(chart) => match chart.bars.last() {
                    Some(bar) => return Ok(bar.close),
                    None => last_err = SourceError::empty(PROVIDER, symbol),
                },
                Err(e) => last_err = e,
            }
            if attempt + 1 < max_attempts {
                let wait = 2u64.pow(attempt).min(5);
                tracing::debug!(symbol = %symbol, attempt = attempt + 1, wait_secs = wait, "Quote fetch failed, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl BarSource for YahooClient {
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
        if interval == Interval::Min1 {
            return self.intraday_batched(symbol, start, end, interval).await;
        }
        let mut bars = self
            .chart(symbol, &ChartWindow::Between(start, end), interval)
            .await?
            .bars;
        dedup_bars(&mut bars);
        Ok(bars)
    }
}
