//! Factor exposure batch over the stock list

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, warn};

use super::{fetch_closes_many, html_escape, page, ReportArtifact};
use crate::analytics::colors::zscore_color;
use crate::analytics::{fit_factors, FitParams};
use crate::config::{AppConfig, FactorsConfig};
use crate::persistence::{read_ticker_list, write_factor_csv, FactorRecord};
use crate::sources::{FrenchLibrary, YahooClient};

pub const KEY: &str = "factors";
pub const TITLE: &str = "Stock Factor Exposures";

pub fn fit_params(cfg: &FactorsConfig) -> FitParams {
    FitParams {
        min_days: cfg.min_days,
        max_days: cfg.max_days,
        rolling_window: cfg.rolling_window,
        trend_months: cfg.trend_months,
    }
}

/// Scores are centred on 5; color by distance from neutral
fn score_cell(score: f64) -> String {
    match zscore_color(score - 5.0, 5.0) {
        Some(bg) => format!("<td style=\"background-color:{};\">{:.1}</td>", bg, score),
        None => format!("<td>{:.1}</td>", score),
    }
}

pub fn render(records: &[FactorRecord]) -> String {
    let mut body = String::from("<h1>Stock Factor Exposures</h1>\n<table>\n<thead><tr>");
    for h in [
        "Ticker", "Date", "Obs", "Beta", "Size", "Value", "Momentum", "Quality", "Alpha", "Mkt", "SMB", "HML",
        "Mom", "RMW", "Baskets", "Beta Trend",
    ] {
        body.push_str(&format!("<th>{}</th>", h));
    }
    body.push_str("</tr></thead>\n<tbody>\n");
    for r in records {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td>",
            html_escape(&r.ticker),
            html_escape(&r.date),
            r.observations
        ));
        for s in [r.beta_score, r.size_score, r.value_score, r.momentum_score, r.quality_score] {
            body.push_str(&score_cell(s));
        }
        for b in [r.alpha, r.beta_mkt, r.beta_smb, r.beta_hml, r.beta_mom, r.beta_rmw] {
            body.push_str(&format!("<td>{:.3}</td>", b));
        }
        body.push_str(&format!(
            "<td style=\"text-align:left;\">{}</td><td class=\"trend\">{}</td></tr>\n",
            html_escape(&r.baskets),
            html_escape(&r.beta_trend)
        ));
    }
    body.push_str("</tbody></table>");
    page(TITLE, ".trend { font-family: monospace; font-size: 11px; }", &body)
}

/// Fit every listed stock, write the CSV and return the rendered table
pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let tickers = read_ticker_list(Path::new(&cfg.factors.stock_file))?;
    if tickers.is_empty() {
        bail!("No tickers in {}", cfg.factors.stock_file);
    }

    let french = FrenchLibrary::new(&cfg.sources)?;
    let factors = french
        .daily_factors()
        .await
        .context("Failed loading Fama-French factors")?;

    info!(count = tickers.len(), "📥 Fetching stock closes for factor fit");
    let closes = fetch_closes_many(
        yahoo,
        &tickers,
        &cfg.factors.history_range,
        true,
        cfg.breadth.concurrency,
    )
    .await;

    let params = fit_params(&cfg.factors);
    let mut records = Vec::new();
    for ticker in &tickers {
        let Some(series) = closes.get(ticker) else {
            continue;
        };
        match fit_factors(series, &factors, &params) {
            Ok(fit) => records.push(FactorRecord::from_fit(ticker, &fit)),
            Err(e) => warn!(ticker = %ticker, error = %e, "Factor fit skipped"),
        }
    }
    if records.is_empty() {
        bail!("No stock had enough history for a factor fit");
    }

    let path = cfg.output_dir().join(&cfg.factors.output_file);
    write_factor_csv(&path, &records)?;
    info!(fitted = records.len(), total = tickers.len(), "✅ Factor batch complete");

    Ok(ReportArtifact::new(KEY, TITLE, render(&records)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FactorRecord {
        FactorRecord {
            ticker: "NVDA".into(),
            date: "2025-03-07".into(),
            observations: 756,
            beta_score: 9.0,
            size_score: 5.0,
            value_score: 2.0,
            momentum_score: 8.0,
            quality_score: 6.0,
            alpha: 0.0012,
            beta_mkt: 1.8,
            beta_smb: 0.0,
            beta_hml: -0.75,
            beta_mom: 0.75,
            beta_rmw: 0.25,
            baskets: "Aggressive (High Beta); High Growth".into(),
            beta_trend: "1.70,1.80".into(),
        }
    }

    #[test]
    fn test_render_table() {
        let html = render(&[record()]);
        assert!(html.contains("<td>NVDA</td>"));
        assert!(html.contains("<td>1.800</td>"));
        assert!(html.contains("Aggressive (High Beta); High Growth"));
        // neutral score has no background
        assert!(html.contains("<td>5.0</td>"));
        assert!(html.contains("style=\"background-color:#"));
    }

    #[test]
    fn test_fit_params_from_config() {
        let cfg = AppConfig::from_defaults().unwrap();
        let p = fit_params(&cfg.factors);
        assert_eq!(p.min_days, 126);
        assert_eq!(p.rolling_window, 252);
    }
}
