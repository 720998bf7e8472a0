//! USD/HKD rate for the dashboard header

use tracing::{info, warn};

use super::html_escape;
use crate::sources::YahooClient;

const SYMBOL: &str = "HKD=X";
const MAX_ATTEMPTS: u32 = 5;

/// Latest close, or `None` once every attempt has failed
pub async fn latest_rate(yahoo: &YahooClient) -> Option<f64> {
    match yahoo.latest_close(SYMBOL, MAX_ATTEMPTS).await {
        Ok(rate) => {
            info!(rate, "💱 USD/HKD fetched");
            Some(rate)
        }
        Err(e) => {
            warn!(error = %e, "USD/HKD unavailable");
            None
        }
    }
}

/// Header banner; empty when the rate is unknown
pub fn banner(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("<div class=\"fx-banner\">{}</div>", html_escape(&format!("1 USD = {:.4} HKD", r))),
        None => String::new(),
    }
}
