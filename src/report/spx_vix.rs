//! SPX vs VIX daily change scatter, last five sessions highlighted

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use tracing::info;

use super::{page, plotly_chart, ReportArtifact};
use crate::config::AppConfig;
use crate::sources::YahooClient;
use crate::types::DailySeries;

pub const KEY: &str = "spx_vix";
pub const TITLE: &str = "SPX vs VIX";

const SPX: &str = "^GSPC";
const VIX: &str = "^VIX";
const RANGE: &str = "6mo";
/// Calendar days shown, counted back from the latest common date
const LOOKBACK_DAYS: i64 = 100;
const MIN_POINTS: usize = 5;

const HIGHLIGHT_COLORS: [&str; 5] = ["#ffff66", "#ffaa33", "#ff6600", "#ff3300", "#cc0000"];
const HIGHLIGHT_LABELS: [&str; 5] = ["-4 days", "-3 days", "-2 days", "-1 day", "Latest"];
const BASE_COLOR: &str = "lightgray";

/// Paired daily percent changes
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePairs {
    pub dates: Vec<NaiveDate>,
    pub spx: Vec<f64>,
    pub vix: Vec<f64>,
}

/// Inner-join the daily % changes of both series over the last `lookback_days`
pub fn pair_changes(spx: &DailySeries, vix: &DailySeries, lookback_days: i64) -> Result<ChangePairs> {
    let (dates, s, v) = spx.pct_change().align(&vix.pct_change());
    let Some(last) = dates.last().copied() else {
        bail!("No overlapping SPX/VIX days");
    };
    let cutoff = last - Duration::days(lookback_days);
    let start = dates.partition_point(|d| *d < cutoff);
    if dates.len() - start < MIN_POINTS {
        bail!("Only {} overlapping SPX/VIX days, need {}", dates.len() - start, MIN_POINTS);
    }
    Ok(ChangePairs {
        dates: dates[start..].to_vec(),
        spx: s[start..].iter().map(|x| x * 100.0).collect(),
        vix: v[start..].iter().map(|x| x * 100.0).collect(),
    })
}

pub fn figure(pairs: &ChangePairs) -> Value {
    let n = pairs.dates.len();
    let split = n.saturating_sub(MIN_POINTS);
    let mut data = vec![json!({
        "type": "scatter",
        "mode": "markers",
        "x": &pairs.spx[..split],
        "y": &pairs.vix[..split],
        "text": pairs.dates[..split].iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        "marker": {"color": BASE_COLOR, "size": 8, "opacity": 0.6},
        "name": "Earlier",
        "hovertemplate": "%{text}<br>SPX %{x:.2f}%<br>VIX %{y:.2f}%<extra></extra>",
    })];
    for (k, i) in (split..n).enumerate() {
        data.push(json!({
            "type": "scatter",
            "mode": "markers+text",
            "x": [pairs.spx[i]],
            "y": [pairs.vix[i]],
            "text": [pairs.dates[i].format("%m-%d").to_string()],
            "textposition": "top center",
            "marker": {"color": HIGHLIGHT_COLORS[k], "size": 14, "line": {"color": "black", "width": 1}},
            "name": HIGHLIGHT_LABELS[k],
        }));
    }

    json!({
        "data": data,
        "layout": {
            "title": "SPX vs VIX Daily % Changes (Past ~3 Months)<br>Last 5 Trading Days Highlighted",
            "xaxis": {"title": "S&P 500 Daily % Change", "zeroline": true},
            "yaxis": {"title": "VIX Daily % Change", "zeroline": true},
            "plot_bgcolor": "white",
            "height": 650,
            "legend": {"orientation": "h", "y": -0.15},
        },
    })
}

pub async fn generate(_cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    info!("📥 Fetching SPX and VIX closes");
    let spx = yahoo
        .daily_closes(SPX, RANGE, false)
        .await
        .context("Failed fetching SPX closes")?;
    let vix = yahoo
        .daily_closes(VIX, RANGE, false)
        .await
        .context("Failed fetching VIX closes")?;

    let pairs = pair_changes(&spx, &vix, LOOKBACK_DAYS)?;
    let body = format!("<div class=\"card\">{}</div>", plotly_chart("spx-vix", &figure(&pairs)));
    Ok(ReportArtifact::new(KEY, TITLE, page(TITLE, "", &body)))
}
