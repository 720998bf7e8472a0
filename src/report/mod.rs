//! HTML report generators
//!
//! Each generator fetches what it needs, runs the analytics and renders a
//! self-contained HTML page. Charts are Plotly figures serialized as JSON.

pub mod breadth;
pub mod factors;
pub mod heatmap;
pub mod implied;
pub mod intraday;
pub mod spx_vix;
pub mod true_range;
pub mod usdhkd;
pub mod vol_refresh;
pub mod volume_profile;

use anyhow::{Context, Result};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::SourceResult;
use crate::sources::YahooClient;
use crate::types::DailySeries;

pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const BASE_STYLE: &str = r#"
body { margin: 0; padding: 16px 24px 32px; font-family: "Segoe UI", "Helvetica Neue", Arial, sans-serif; background: #ffffff; color: #2c3e50; }
h1 { font-size: 22px; margin: 8px 0 16px; }
h2 { font-size: 18px; margin: 0 0 12px; }
.card { margin-bottom: 24px; padding: 20px; background: #fff; border-radius: 12px; box-shadow: 0 8px 24px rgba(0,0,0,0.08); }
.caption { margin-top: 16px; line-height: 1.5; }
.desc { font-style: italic; color: #7f8c8d; }
table { border-collapse: collapse; font-size: 13px; }
th, td { border: 1px solid #ddd; padding: 6px 8px; text-align: center; white-space: nowrap; }
th { background: #f0f0f0; }
"#;

/// One rendered report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportArtifact {
    /// Stable section key, also the file stem
    pub key: String,
    pub title: String,
    pub html: String,
}

impl ReportArtifact {
    pub fn new(key: impl Into<String>, title: impl Into<String>, html: String) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            html,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.html", self.key)
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed creating {}", dir.display()))?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.html)
            .with_context(|| format!("Failed writing report {}", path.display()))?;
        Ok(path)
    }
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape, then turn newlines into `<br>`
pub fn caption_html(text: &str) -> String {
    html_escape(text).replace('\n', "<br>")
}

/// Full HTML document with the shared style and the Plotly script
pub fn page(title: &str, extra_style: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <script src=\"{cdn}\"></script>\n<style>{base}{extra}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = html_escape(title),
        cdn = PLOTLY_CDN,
        base = BASE_STYLE,
        extra = extra_style,
        body = body,
    )
}

/// Container div plus the script drawing `figure` (`{data, layout}`) into it
pub fn plotly_chart(div_id: &str, figure: &Value) -> String {
    let data = figure.get("data").cloned().unwrap_or(Value::Array(Vec::new()));
    let layout = figure.get("layout").cloned().unwrap_or(Value::Object(Default::default()));
    // `</` inside JSON strings would close the script tag
    let data = data.to_string().replace("</", "<\\/");
    let layout = layout.to_string().replace("</", "<\\/");
    format!(
        "<div id=\"{id}\" class=\"chart\"></div>\n<script>Plotly.newPlot(\"{id}\", {data}, {layout}, {{responsive: true}});</script>",
        id = html_escape(div_id),
        data = data,
        layout = layout,
    )
}

/// Signed percent with two decimals
pub fn fmt_pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

/// Daily closes for many tickers, `concurrency` requests in flight. Tickers
/// that fail are logged and left out.
pub async fn fetch_closes_many(
    yahoo: &YahooClient,
    tickers: &[String],
    range: &str,
    adjusted: bool,
    concurrency: usize,
) -> HashMap<String, DailySeries> {
    let results: Vec<(String, SourceResult<DailySeries>)> = stream::iter(tickers.iter().cloned())
        .map(|ticker| async move {
            let series = yahoo.daily_closes(&ticker, range, adjusted).await;
            (ticker, series)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut out = HashMap::new();
    let mut skipped = Vec::new();
    for (ticker, result) in results {
        match result {
            Ok(series) => {
                out.insert(ticker, series);
            }
            Err(e) => {
                debug!(ticker = %ticker, error = %e, "Close history unavailable");
                skipped.push(ticker);
            }
        }
    }
    if !skipped.is_empty() {
        skipped.sort();
        warn!(count = skipped.len(), tickers = ?skipped, "Skipped tickers without data");
    }
    out
}
