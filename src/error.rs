//! Error types shared by the data sources and analytics layers.
//!
//! Report generators and the pipeline use `anyhow` on top of these.

use thiserror::Error;

/// Failures from market data providers.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status} for {symbol}")]
    Status {
        provider: &'static str,
        symbol: String,
        status: u16,
    },

    #[error("{provider} refused the request for {symbol} from this region (HTTP 451)")]
    GeoBlocked {
        provider: &'static str,
        symbol: String,
    },

    #[error("Failed to decode {provider} payload: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} returned no data for {symbol}")]
    Empty {
        provider: &'static str,
        symbol: String,
    },

    #[error("{provider} does not support symbol {symbol}")]
    UnsupportedSymbol {
        provider: &'static str,
        symbol: String,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub fn decode(provider: &'static str, reason: impl Into<String>) -> Self {
        SourceError::Decode {
            provider,
            reason: reason.into(),
        }
    }

    pub fn empty(provider: &'static str, symbol: &str) -> Self {
        SourceError::Empty {
            provider,
            symbol: symbol.to_string(),
        }
    }

    /// True for failures worth retrying against the same provider.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http { source, .. } => source.is_timeout() || source.is_connect(),
            SourceError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// Failures from pure computations over fetched series.
#[derive(Debug, Error, PartialEq)]
pub enum AnalyticsError {
    #[error("insufficient data: need {needed}, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("empty input: {0}")]
    Empty(&'static str),

    #[error("singular design matrix")]
    Singular,
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
