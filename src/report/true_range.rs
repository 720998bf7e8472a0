//! Daily true-range cards for the major indices and gold

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{caption_html, html_escape, page, plotly_chart, ReportArtifact};
use crate::analytics::true_range::{aggregate_daily, range_report, RangeReport, RangeStatus};
use crate::config::AppConfig;
use crate::sources::{ChartWindow, YahooClient};
use crate::types::Interval;

pub const KEY: &str = "true_range";
pub const TITLE: &str = "Index Volatility";

const AVG_LINE_COLOR: &str = "blue";
const SMA_LINE_COLOR: &str = "black";

pub fn nice_name(symbol: &str) -> String {
    match symbol {
        "^HSI" => "Hang Seng Index (HSI)".to_string(),
        "^GSPC" => "S&P 500 (SPX)".to_string(),
        "^NDX" => "Nasdaq 100 (NDX)".to_string(),
        "GC=F" => "Gold Futures (Gold)".to_string(),
        other => other.to_string(),
    }
}

/// Futures trade around the clock; their daily bar misses part of the session
fn uses_hourly_bars(symbol: &str) -> bool {
    symbol.ends_with("=F")
}

pub fn caption(nice: &str, report: &RangeReport) -> String {
    let date = report
        .last_date()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let status = match report.status {
        RangeStatus::Active => "⚠️ Active/Volatile",
        RangeStatus::Quiet => "✅ Quiet",
    };
    format!(
        "📊 {} Volatility Report\n📅 Date: {}\n📉 Current Range: {}\n📏 30-Day Avg: {}\n📢 {}",
        nice, date, report.current as i64, report.average as i64, status
    )
}

pub fn figure(nice: &str, report: &RangeReport, sma_window: usize) -> Value {
    let dates: Vec<String> = report.rows.iter().map(|r| r.date.to_string()).collect();
    let ranges: Vec<f64> = report.rows.iter().map(|r| r.range).collect();
    json!({
        "data": [
            {
                "type": "bar",
                "x": dates,
                "y": ranges,
                "marker": {"color": report.rows.iter().map(|r| r.color).collect::<Vec<_>>(), "opacity": 0.85},
                "text": ranges.iter().map(|r| (*r as i64).to_string()).collect::<Vec<_>>(),
                "textposition": "outside",
                "name": "True Range",
            },
            {
                "type": "scatter",
                "mode": "lines",
                "x": [dates.first(), dates.last()],
                "y": [report.average, report.average],
                "line": {"color": AVG_LINE_COLOR, "dash": "dash", "width": 2},
                "name": format!("{}-Day Avg", report.rows.len()),
            },
            {
                "type": "scatter",
                "mode": "lines+markers",
                "x": dates,
                "y": report.rows.iter().map(|r| r.sma).collect::<Vec<_>>(),
                "line": {"color": SMA_LINE_COLOR, "width": 2.5},
                "marker": {"size": 4},
                "name": format!("SMA{}", sma_window),
            },
        ],
        "layout": {
            "title": format!("{} Volatility - Last {} Days", nice, report.rows.len()),
            "yaxis": {"title": "True Range (High - Low)"},
            "xaxis": {"type": "category", "tickangle": -45},
            "plot_bgcolor": "white",
            "height": 520,
            "showlegend": true,
            "legend": {"orientation": "h", "y": -0.25},
        },
    })
}

pub fn card(symbol: &str, report: &RangeReport, sma_window: usize) -> String {
    let nice = nice_name(symbol);
    let div_id = format!("tr-{}", crate::types::safe_name(symbol));
    format!(
        "<div class=\"card\"><h2>{title}</h2>\
         <span class=\"badge\" style=\"background:{color};\">Status: {status}</span>\
         {chart}<p class=\"caption\">{caption}</p></div>",
        title = html_escape(&format!("{} ({})", nice, symbol)),
        color = report.status.color(),
        status = report.status.label(),
        chart = plotly_chart(&div_id, &figure(&nice, report, sma_window)),
        caption = caption_html(&caption(&nice, report)),
    )
}

async fn load_report(cfg: &AppConfig, yahoo: &YahooClient, symbol: &str) -> Result<RangeReport> {
    let (window, interval) = if uses_hourly_bars(symbol) {
        ("59d", Interval::Min60)
    } else {
        ("60d", Interval::Day1)
    };
    let chart = yahoo
        .chart(symbol, &ChartWindow::Range(window.to_string()), interval)
        .await
        .with_context(|| format!("Failed fetching bars for {}", symbol))?;
    let days = aggregate_daily(&chart.bars, &chart.exchange_offset());
    Ok(range_report(&days, cfg.true_range.sma_window, cfg.true_range.lookback)?)
}

pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let mut cards = Vec::new();
    for symbol in &cfg.true_range.symbols {
        match load_report(cfg, yahoo, symbol).await {
            Ok(report) => {
                info!(symbol = %symbol, current = report.current, average = report.average, status = report.status.label(), "📊 True range computed");
                cards.push(card(symbol, &report, cfg.true_range.sma_window));
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "True range skipped"),
        }
    }
    if cards.is_empty() {
        bail!("No true range data for any symbol");
    }

    let style = ".badge { display: inline-block; padding: 4px 10px; border-radius: 6px; color: #fff; font-weight: bold; }";
    let body = format!("<h1>Volatility Report</h1>\n{}", cards.join("\n"));
    Ok(ReportArtifact::new(KEY, TITLE, page(TITLE, style, &body)))
}
