//! Implied volatility gauges: VIX, Skew rank, VVIX and the VIX term structure

use anyhow::{bail, Result};
use tracing::{info, warn};

use super::{html_escape, page, ReportArtifact};
use crate::analytics::implied::{round2, Gauge};
use crate::analytics::stats::percentile_rank;
use crate::config::AppConfig;
use crate::sources::YahooClient;

pub const KEY: &str = "implied";
pub const TITLE: &str = "Implied Parameters";

const QUOTE_ATTEMPTS: u32 = 3;

/// Gauge values, `None` where the quote was unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub vix: Option<f64>,
    pub skew_rank: Option<f64>,
    pub vvix: Option<f64>,
    pub term_structure: Option<f64>,
}

impl Readings {
    pub fn get(&self, gauge: Gauge) -> Option<f64> {
        match gauge {
            Gauge::Vix => self.vix,
            Gauge::SkewRank => self.skew_rank,
            Gauge::Vvix => self.vvix,
            Gauge::TermStructure => self.term_structure,
        }
    }

    pub fn is_empty(&self) -> bool {
        Gauge::ALL.iter().all(|g| self.get(*g).is_none())
    }
}

/// Percentile of the latest value among the positive closes of the window
pub fn skew_rank(closes: &[f64]) -> Option<f64> {
    let current = *closes.last()?;
    let history: Vec<f64> = closes.iter().copied().filter(|v| *v > 0.0).collect();
    percentile_rank(&history, current)
}

fn row(gauge: Gauge, value: Option<f64>) -> String {
    let (shown, marker, insight) = match value {
        Some(v) => (format!("{:.2}", v), format!("{:.1}", gauge.bar_pct(v)), Some(gauge.insight(v))),
        None => ("n/a".to_string(), String::new(), None),
    };
    let marker_html = if marker.is_empty() {
        String::new()
    } else {
        format!("<div class=\"marker\" style=\"left: {}%;\">▼</div>", marker)
    };
    let text_html = match insight {
        Some(i) => format!(
            "<div class=\"col-text\" style=\"border-left: 3px solid {c};\"><div class=\"status-title\" style=\"color: {c};\">{t}</div><div class=\"status-desc\">{d}</div></div>",
            c = i.color,
            t = html_escape(i.title),
            d = html_escape(i.description),
        ),
        None => "<div class=\"col-text\"></div>".to_string(),
    };
    format!(
        "<div class=\"row\">\
         <div class=\"col-label\"><span class=\"label-text\">{label}</span><span class=\"info\" title=\"{def}\">i</span></div>\
         <div class=\"col-chart\"><div class=\"value\">{shown}</div><div class=\"bar-container\"><div class=\"gradient-bar\"></div>{marker}</div></div>\
         {text}</div>",
        label = gauge.label(),
        def = html_escape(gauge.definition()),
        shown = shown,
        marker = marker_html,
        text = text_html,
    )
}

pub fn render(readings: &Readings) -> String {
    let rows: String = Gauge::ALL.iter().map(|g| row(*g, readings.get(*g))).collect();
    let style = r#"
body { background-color: #0b0e14; color: #ffffff; }
.panel { background-color: #131722; border: 1px solid #2a2e39; border-radius: 8px; padding: 30px; max-width: 850px; margin: 0 auto; }
.panel h2 { text-align: center; color: #e1e3e6; }
.row { display: flex; align-items: center; margin-bottom: 25px; }
.col-label { width: 130px; display: flex; align-items: center; }
.label-text { font-weight: 700; font-size: 16px; color: #b2b5be; margin-right: 8px; }
.info { width: 18px; height: 18px; border-radius: 50%; background: #2a2e39; color: #787b86; font-size: 12px; text-align: center; cursor: help; }
.col-chart { width: 300px; margin-right: 30px; }
.value { font-size: 20px; font-weight: bold; margin-bottom: 6px; }
.bar-container { position: relative; height: 8px; }
.gradient-bar { height: 100%; border-radius: 4px; background: linear-gradient(90deg, #42a5f5 0%, #66bb6a 35%, #ffca28 65%, #ef5350 100%); }
.marker { position: absolute; top: -16px; transform: translateX(-50%); font-size: 12px; }
.col-text { flex: 1; padding-left: 15px; }
.status-title { font-weight: 700; font-size: 15px; margin-bottom: 4px; }
.status-desc { font-size: 13px; color: #b2b5be; line-height: 1.5; }
"#;
    let body = format!("<div class=\"panel\"><h2>Market Implied Parameters</h2>{}</div>", rows);
    page(TITLE, style, &body)
}

async fn latest(yahoo: &YahooClient, symbol: &str) -> Option<f64> {
    match yahoo.latest_close(symbol, QUOTE_ATTEMPTS).await {
        Ok(v) if v > 0.0 => Some(v),
        Ok(_) => None,
        Err(e) => {
            warn!(symbol, error = %e, "Quote unavailable");
            None
        }
    }
}

pub async fn fetch_readings(cfg: &AppConfig, yahoo: &YahooClient) -> Readings {
    let vix = latest(yahoo, "^VIX").await;
    let vvix = latest(yahoo, "^VVIX").await;
    let vix3m = latest(yahoo, "^VIX3M").await;
    let skew_rank = match yahoo.daily_closes("^SKEW", &cfg.implied.skew_range, false).await {
        Ok(series) => skew_rank(&series.values),
        Err(e) => {
            warn!(error = %e, "Skew history unavailable");
            None
        }
    };
    Readings {
        vix: vix.map(round2),
        skew_rank: skew_rank.map(round2),
        vvix: vvix.map(round2),
        term_structure: vix.zip(vix3m).map(|(a, b)| round2(round2(a) - b)),
    }
}

pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let readings = fetch_readings(cfg, yahoo).await;
    if readings.is_empty() {
        bail!("No implied volatility quotes available");
    }
    info!(?readings, "📊 Implied parameters fetched");
    Ok(ReportArtifact::new(KEY, TITLE, render(&readings)))
}
