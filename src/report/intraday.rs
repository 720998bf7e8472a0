//! "Hunt vs Trap" intraday volatility zones

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{caption_html, html_escape, page, plotly_chart, ReportArtifact};
use crate::analytics::intraday::{intraday_zones, IntradayZones};
use crate::config::AppConfig;
use crate::sources::{ChartWindow, YahooClient};
use crate::types::{safe_name, Interval};

pub const KEY: &str = "trading_time";
pub const TITLE: &str = "Intraday Trading Zones";

const TIMEZONE_LABEL: &str = "Asia/Hong_Kong";
const HKT_OFFSET_SECS: i32 = 8 * 3600;

/// Display name and market description
pub fn describe(symbol: &str) -> (String, &'static str) {
    match symbol {
        "GC=F" => ("Gold (GC Futures)".to_string(), "24h Global Market"),
        "NQ=F" => ("Nasdaq 100 (NQ Futures)".to_string(), "US Tech Giants"),
        "^HSI" => ("Hang Seng Index (Spot)".to_string(), "HK Market (Day Only)"),
        other => (other.to_string(), ""),
    }
}

pub fn caption(symbol: &str, zones: &IntradayZones) -> String {
    let (nice, _) = describe(symbol);
    let note = if symbol.contains("HSI") {
        "(Note: spot index data, day session 09:30-16:00 only)\n"
    } else {
        ""
    };
    format!(
        "🔥 {nice} Intraday Volatility Guide\n\
         🕒 Timezone: {tz}\n\
         🎯 Best Hunting Time: {best}\n\
         {note}\n\
         🟥 Red Bars (Hunt Zone - Top 20%):\n\
         Prime hours. Momentum is strong, breakouts follow through and targets get hit.\n\n\
         ⬜ Grey Bars (Trap Zone - Bottom 50%):\n\
         Dead time. Ranges are too narrow to cover the spread and directionless chop sweeps stops.",
        nice = nice,
        tz = TIMEZONE_LABEL,
        best = zones.best_time,
        note = note,
    )
}

pub fn figure(symbol: &str, zones: &IntradayZones) -> Value {
    let (nice, _) = describe(symbol);
    let times: Vec<&str> = zones.slots.iter().map(|s| s.time.as_str()).collect();
    // Sparse sessions get a label every 30 minutes, round-the-clock ones every hour
    let label_every = if times.len() < 40 { 2 } else { 4 };
    let tick_vals: Vec<&str> = times.iter().step_by(label_every).copied().collect();
    json!({
        "data": [
            {
                "type": "bar",
                "x": times,
                "y": zones.slots.iter().map(|s| s.avg_range).collect::<Vec<_>>(),
                "marker": {"color": zones.slots.iter().map(|s| s.color).collect::<Vec<_>>(), "opacity": 0.9},
                "name": "Avg 15m Range",
            },
            {
                "type": "scatter",
                "mode": "lines",
                "x": [times.first(), times.last()],
                "y": [zones.trap_threshold, zones.trap_threshold],
                "line": {"color": "gray", "dash": "dot", "width": 1.5},
                "name": "Trap Zone Limit (Median)",
            },
            {
                "type": "scatter",
                "mode": "lines",
                "x": [times.first(), times.last()],
                "y": [zones.hunt_threshold, zones.hunt_threshold],
                "line": {"color": "#c0392b", "dash": "dot", "width": 1.5},
                "name": "Hunt Zone (Top 20%)",
            },
        ],
        "layout": {
            "title": format!("{} \"Hunt vs Trap\" Zones ({})", nice, TIMEZONE_LABEL),
            "xaxis": {
                "title": format!("Time of Day ({})", TIMEZONE_LABEL),
                "type": "category",
                "tickvals": tick_vals,
                "tickangle": -45,
            },
            "yaxis": {"title": "Avg 15m Range (Points)"},
            "plot_bgcolor": "white",
            "height": 520,
            "legend": {"orientation": "h", "y": -0.3},
        },
    })
}

fn card(symbol: &str, zones: &IntradayZones) -> String {
    let (nice, market) = describe(symbol);
    format!(
        "<div class=\"card\"><h2>{title}</h2><p class=\"desc\">{market}</p>{chart}<p class=\"caption\">{caption}</p></div>",
        title = html_escape(&nice),
        market = html_escape(market),
        chart = plotly_chart(&format!("tt-{}", safe_name(symbol)), &figure(symbol, zones)),
        caption = caption_html(&caption(symbol, zones)),
    )
}

async fn load_zones(cfg: &AppConfig, yahoo: &YahooClient, symbol: &str, hkt: &FixedOffset) -> Result<IntradayZones> {
    let chart = yahoo
        .chart(symbol, &ChartWindow::Range(cfg.intraday.history_range.clone()), Interval::Min15)
        .await
        .with_context(|| format!("Failed fetching 15m bars for {}", symbol))?;
    Ok(intraday_zones(&chart.bars, hkt)?)
}

pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let hkt = FixedOffset::east_opt(HKT_OFFSET_SECS).context("Invalid HKT offset")?;
    let mut cards = Vec::new();
    for symbol in &cfg.intraday.symbols {
        match load_zones(cfg, yahoo, symbol, &hkt).await {
            Ok(zones) => {
                info!(symbol = %symbol, slots = zones.slots.len(), best = %zones.best_time, "📊 Intraday zones computed");
                cards.push(card(symbol, &zones));
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "Intraday zones skipped"),
        }
    }
    if cards.is_empty() {
        bail!("No intraday data for any symbol");
    }
    let body = format!("<h1>{}</h1>\n{}", TITLE, cards.join("\n"));
    Ok(ReportArtifact::new(KEY, TITLE, page(TITLE, "", &body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::intraday::{ZoneSlot, HUNT_COLOR, TRAP_COLOR};

    fn zones() -> IntradayZones {
        IntradayZones {
            slots: vec![
                ZoneSlot { time: "09:30".into(), avg_range: 10.0, color: HUNT_COLOR },
                ZoneSlot { time: "09:45".into(), avg_range: 4.0, color: TRAP_COLOR },
            ],
            trap_threshold: 7.0,
            hunt_threshold: 8.8,
            best_time: "09:30".into(),
        }
    }

    #[test]
    fn test_hsi_caption_has_session_note() {
        let text = caption("^HSI", &zones());
        assert!(text.starts_with("🔥 Hang Seng Index (Spot) Intraday Volatility Guide"));
        assert!(text.contains("🎯 Best Hunting Time: 09:30"));
        assert!(text.contains("day session 09:30-16:00"));
        assert!(!caption("GC=F", &zones()).contains("day session"));
    }

    #[test]
    fn test_figure_threshold_lines() {
        let fig = figure("NQ=F", &zones());
        assert_eq!(fig["data"][1]["y"][0], 7.0);
        assert_eq!(fig["data"][2]["y"][0], 8.8);
        assert_eq!(fig["data"][0]["marker"]["color"][0], HUNT_COLOR);
        assert_eq!(fig["layout"]["xaxis"]["tickvals"], json!(["09:30"]));
    }
}
