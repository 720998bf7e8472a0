//! Market data sources (Yahoo, Binance, Deribit, local CSV, Ken French library)

mod binance;
mod deribit;
mod french;
mod local;
mod yahoo;

pub use binance::BinanceKlines;
pub use deribit::DeribitChart;
pub use french::{parse_french_csv, FactorFrame, FrenchLibrary};
pub use local::{load_minute_csv, LocalMinuteFile};
pub use yahoo::{parse_chart, Chart, ChartWindow, YahooClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::config::SourcesConfig;
use crate::error::{SourceError, SourceResult};
use crate::types::{Bar, Interval};

/// Trait for bar providers
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch bars with open time in `[start, end)`, ascending and deduplicated
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> SourceResult<Vec<Bar>>;
}

/// Tries each source in order and returns the first non-empty result
pub struct FallbackSource {
    sources: Vec<Box<dyn BarSource>>,
}

impl FallbackSource {
    pub fn new(sources: Vec<Box<dyn BarSource>>) -> Self {
        Self { sources }
    }

    /// Binance first, Deribit second
    pub fn crypto(cfg: &SourcesConfig) -> SourceResult<Self> {
        Ok(Self::new(vec![
            Box::new(BinanceKlines::new(cfg)?),
            Box::new(DeribitChart::new(cfg)?),
        ]))
    }
}

#[async_trait]
impl BarSource for FallbackSource {
    fn name(&self) -> &'static str {
        "Fallback"
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> SourceResult<Vec<Bar>> {
        let mut last_err = None;
        for source in &self.sources {
            match source.fetch_bars(symbol, start, end, interval).await {
                Ok(bars) if !bars.is_empty() => {
                    tracing::info!(
                        source = source.name(),
                        symbol = %symbol,
                        count = bars.len(),
                        "Bars fetched"
                    );
                    return Ok(bars);
                }
                Ok(_) => {
                    tracing::warn!(source = source.name(), symbol = %symbol, "Source returned no bars");
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), symbol = %symbol, error = %e, "Source failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| SourceError::empty("Fallback", symbol)))
    }
}

/// Shared HTTP client builder
pub fn build_http_client(cfg: &SourcesConfig, proxy: Option<&str>) -> SourceResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .user_agent(cfg.user_agent.clone());

    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url).map_err(|source| SourceError::Http {
            provider: "proxy",
            source,
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|source| SourceError::Http {
        provider: "client",
        source,
    })
}

/// Retry transient failures with exponential back-off (`base * 2^attempt`)
pub async fn with_retries<T, F, Fut>(attempts: u32, base: Duration, mut op: F) -> SourceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = base * 2u32.pow(attempt);
                tracing::debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "Retrying request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a non-success HTTP status to a `SourceError`
pub(crate) fn status_error(provider: &'static str, symbol: &str, status: reqwest::StatusCode) -> SourceError {
    if status.as_u16() == 451 {
        SourceError::GeoBlocked {
            provider,
            symbol: symbol.to_string(),
        }
    } else {
        SourceError::Status {
            provider,
            symbol: symbol.to_string(),
            status: status.as_u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StaticSource {
        name: &'static str,
        bars: Vec<Bar>,
        fail: bool,
    }

    #[async_trait]
    impl BarSource for StaticSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_bars(
            &self,
            symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _interval: Interval,
        ) -> SourceResult<Vec<Bar>> {
            if self.fail {
                return Err(SourceError::empty(self.name, symbol));
            }
            Ok(self.bars.clone())
        }
    }

    fn bar() -> Bar {
        Bar {
            ts: Utc::now(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    #[tokio::test]
    async fn test_fallback_skips_failed_and_empty_sources() {
        let chain = FallbackSource::new(vec![
            Box::new(StaticSource { name: "a", bars: vec![], fail: true }),
            Box::new(StaticSource { name: "b", bars: vec![], fail: false }),
            Box::new(StaticSource { name: "c", bars: vec![bar()], fail: false }),
        ]);
        let now = Utc::now();
        let bars = chain.fetch_bars("BTC-USD", now, now, Interval::Min1).await.unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_reports_last_error() {
        let chain = FallbackSource::new(vec![Box::new(StaticSource {
            name: "a",
            bars: vec![],
            fail: true,
        })]);
        let now = Utc::now();
        let err = chain.fetch_bars("ETH-USD", now, now, Interval::Min1).await.unwrap_err();
        assert!(matches!(err, SourceError::Empty { provider: "a", .. }));
    }

    #[tokio::test]
    async fn test_with_retries_retries_transient_only() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: SourceResult<u32> = with_retries(3, Duration::from_millis(1), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(SourceError::Status {
                        provider: "t",
                        symbol: "X".into(),
                        status: 503,
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: SourceResult<u32> = with_retries(3, Duration::from_millis(1), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(SourceError::Status {
                    provider: "t",
                    symbol: "X".into(),
                    status: 404,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
