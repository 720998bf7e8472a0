//! Deribit TradingView chart data (perpetuals), used as the crypto fallback

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{build_http_client, status_error, with_retries, BarSource};
use crate::config::SourcesConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::{deribit_instrument, dedup_bars, Bar, Interval};

const PROVIDER: &str = "Deribit";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    result: Option<ChartArrays>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartArrays {
    #[serde(default)]
    ticks: Vec<i64>,
    #[serde(default)]
    open: Vec<f64>,
    #[serde(default)]
    high: Vec<f64>,
    #[serde(default)]
    low: Vec<f64>,
    #[serde(default)]
    close: Vec<f64>,
    #[serde(default)]
    volume: Vec<f64>,
}

/// Parse a chart response; every column must match `ticks` in length
fn parse_chart_response(symbol: &str, body: &str) -> SourceResult<Vec<Bar>> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;
    let data = response.result.unwrap_or_default();
    let n = data.ticks.len();
    if n == 0 {
        return Err(SourceError::empty(PROVIDER, symbol));
    }

    for (name, len) in [
        ("open", data.open.len()),
        ("high", data.high.len()),
        ("low", data.low.len()),
        ("close", data.close.len()),
        ("volume", data.volume.len()),
    ] {
        if len != n {
            return Err(SourceError::decode(
                PROVIDER,
                format!("column {} has {} values, expected {}", name, len, n),
            ));
        }
    }

    let mut bars: Vec<Bar> = (0..n)
        .filter_map(|i| {
            Some(Bar {
                ts: Utc.timestamp_millis_opt(data.ticks[i]).single()?,
                open: data.open[i],
                high: data.high[i],
                low: data.low[i],
                close: data.close[i],
                volume: data.volume[i],
            })
        })
        .collect();
    dedup_bars(&mut bars);
    Ok(bars)
}

#[derive(Debug, Clone)]
pub struct DeribitChart {
    http: reqwest::Client,
    url: String,
}

impl DeribitChart {
    pub fn new(cfg: &SourcesConfig) -> SourceResult<Self> {
        Ok(Self {
            http: build_http_client(cfg, None)?,
            url: cfg.deribit_url.clone(),
        })
    }
}

#[async_trait]
impl BarSource for DeribitChart {
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
        let instrument = deribit_instrument(symbol).ok_or_else(|| SourceError::UnsupportedSymbol {
            provider: PROVIDER,
            symbol: symbol.to_string(),
        })?;

        let query = [
            ("instrument_name", instrument.to_string()),
            ("start_timestamp", start.timestamp_millis().to_string()),
            ("end_timestamp", end.timestamp_millis().to_string()),
            ("resolution", interval.deribit_resolution().to_string()),
        ];
        let query = &query;

        let body = with_retries(5, Duration::from_millis(300), move || async move {
            let response = self
                .http
                .get(&self.url)
                .query(query)
                .send()
                .await
                .map_err(|source| SourceError::Http {
                    provider: PROVIDER,
                    source,
                })?;
            if !response.status().is_success() {
                return Err(status_error(PROVIDER, symbol, response.status()));
            }
            response.text().await.map_err(|source| SourceError::Http {
                provider: PROVIDER,
                source,
            })
        })
        .await?;

        let mut bars = parse_chart_response(symbol, &body)?;
        bars.retain(|b| b.ts >= start && b.ts < end);
        Ok(bars)
    }
}
