//! Market breadth charts for the Nasdaq 100 and the Hang Seng Index

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

use super::{fetch_closes_many, page, plotly_chart, ReportArtifact};
use crate::analytics::breadth::{align_with_index, percent_above_sma};
use crate::config::AppConfig;
use crate::persistence::read_ticker_list;
use crate::sources::YahooClient;
use crate::types::DailySeries;

const INDEX_COLOR: &str = "black";
const BREADTH_COLOR: &str = "#d32f2f";

/// One breadth market: constituent list plus its index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Nasdaq100,
    HangSeng,
}

impl Market {
    pub fn key(&self) -> &'static str {
        match self {
            Market::Nasdaq100 => "nq_breadth",
            Market::HangSeng => "hsi_breadth",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Market::Nasdaq100 => "Nasdaq 100 Market Breadth",
            Market::HangSeng => "Hang Seng Index Market Breadth",
        }
    }

    fn list_and_index<'a>(&self, cfg: &'a AppConfig) -> (&'a str, &'a str) {
        match self {
            Market::Nasdaq100 => (&cfg.breadth.nq_file, &cfg.breadth.nq_index),
            Market::HangSeng => (&cfg.breadth.hsi_file, &cfg.breadth.hsi_index),
        }
    }
}

/// Index on the left axis, breadth percent on a 0-100 right axis
pub fn figure(title: &str, index: &DailySeries, breadth: &DailySeries, sma_window: usize) -> Value {
    let dates = |s: &DailySeries| s.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>();
    json!({
        "data": [
            {
                "type": "scatter",
                "mode": "lines",
                "x": dates(index),
                "y": &index.values,
                "name": "Index",
                "line": {"color": INDEX_COLOR, "width": 1.3},
            },
            {
                "type": "scatter",
                "mode": "lines",
                "x": dates(breadth),
                "y": &breadth.values,
                "name": format!("% Above SMA{}", sma_window),
                "yaxis": "y2",
                "line": {"color": BREADTH_COLOR, "width": 1.6},
            },
        ],
        "layout": {
            "title": title,
            "xaxis": {"type": "date"},
            "yaxis": {"title": "Index Level"},
            "yaxis2": {
                "title": "Breadth (%)",
                "overlaying": "y",
                "side": "right",
                "range": [0, 100],
                "ticksuffix": "%",
                "color": BREADTH_COLOR,
            },
            "plot_bgcolor": "#fafafa",
            "height": 620,
            "legend": {"orientation": "h", "y": -0.12},
        },
    })
}

pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient, market: Market) -> Result<ReportArtifact> {
    let (list_file, index_symbol) = market.list_and_index(cfg);
    let tickers = read_ticker_list(Path::new(list_file))?;
    if tickers.is_empty() {
        bail!("No constituents in {}", list_file);
    }
    info!(market = market.key(), count = tickers.len(), "📥 Fetching constituent closes");

    let range = &cfg.breadth.history_range;
    let closes = fetch_closes_many(yahoo, &tickers, range, true, cfg.breadth.concurrency).await;
    if closes.is_empty() {
        bail!("No constituent data for {}", market.title());
    }
    let index = yahoo
        .daily_closes(index_symbol, range, false)
        .await
        .with_context(|| format!("Failed fetching index {}", index_symbol))?;

    let constituents: Vec<DailySeries> = closes.into_values().collect();
    let breadth = percent_above_sma(&constituents, cfg.breadth.sma_window);
    let (index, breadth) = align_with_index(&index, &breadth);
    if breadth.is_empty() {
        bail!("Breadth and index share no dates");
    }
    info!(market = market.key(), days = breadth.len(), latest = ?breadth.last(), "✅ Breadth built");

    let fig = figure(market.title(), &index, &breadth, cfg.breadth.sma_window);
    let body = format!("<div class=\"card\">{}</div>", plotly_chart(market.key(), &fig));
    Ok(ReportArtifact::new(market.key(), market.title(), page(market.title(), "", &body)))
}
