//! Sector ETF daily return heatmap

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

use super::{fetch_closes_many, html_escape, page, ReportArtifact};
use crate::analytics::colors::{contrast_text, return_color, zscore_color};
use crate::analytics::{zs_5d, zs_live};
use crate::config::AppConfig;
use crate::persistence::{write_heatmap_csv, HeatmapRow, SectorList, MU_COLUMN, VOL_COLUMN};
use crate::sources::YahooClient;
use crate::types::DailySeries;

pub const KEY: &str = "etf_heatmap";
pub const TITLE: &str = "ETF Sector Heatmap";
pub const EXPORT_FILE: &str = "etf_sector_heatmap.csv";

/// Dates newest first, one row per ticker
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapTable {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<HeatmapRow>,
}

impl HeatmapTable {
    pub fn date_labels(&self) -> Vec<String> {
        self.dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
    }
}

/// Lay out the last `display_days` return dates (any ticker with a value counts)
/// and attach labels plus z-scores from the list's VOLATILITY_360D / MU_1D.
pub fn build_table(list: &SectorList, closes: &HashMap<String, DailySeries>, display_days: usize) -> HeatmapTable {
    let tickers: Vec<String> = list
        .tickers()
        .into_iter()
        .filter(|t| closes.contains_key(t))
        .collect();
    let returns: HashMap<&str, DailySeries> = tickers
        .iter()
        .filter_map(|t| closes.get(t).map(|s| (t.as_str(), s.pct_change())))
        .collect();

    let all_dates: BTreeSet<NaiveDate> = returns.values().flat_map(|s| s.dates.iter().copied()).collect();
    let dates: Vec<NaiveDate> = all_dates.into_iter().rev().take(display_days).collect();

    let labels = list.labels();
    let rows = tickers
        .iter()
        .map(|ticker| {
            let series = &returns[ticker.as_str()];
            let pct: Vec<Option<f64>> = dates.iter().map(|d| series.get(*d).map(|r| r * 100.0)).collect();
            let vol = list.metric(ticker, VOL_COLUMN);
            let mu = list.metric(ticker, MU_COLUMN);

            let live = match (pct.first().copied().flatten(), vol) {
                (Some(today), Some(v)) => zs_live(today, v),
                _ => None,
            };
            let five = match (vol, mu) {
                (Some(v), Some(m)) => zs_5d(&pct, v, m),
                _ => None,
            };
            let label = labels.get(ticker);
            HeatmapRow {
                ticker: ticker.clone(),
                name: label.map(|l| l.name.clone()).unwrap_or_else(|| ticker.clone()),
                industry: label.map(|l| l.industry.clone()).unwrap_or_default(),
                zs_live: live,
                zs_5d: five,
                returns: pct,
            }
        })
        .collect();

    HeatmapTable { dates, rows }
}

fn zs_cell(value: Option<f64>) -> String {
    match value {
        Some(v) => match zscore_color(v, 1.0) {
            Some(bg) => format!("<td style=\"background-color:{};\">{:+.2}</td>", bg, v),
            None => format!("<td>{:+.2}</td>", v),
        },
        None => "<td></td>".to_string(),
    }
}

fn return_cell(value: Option<f64>) -> String {
    match value.and_then(|v| return_color(v).map(|bg| (v, bg))) {
        Some((v, bg)) => format!(
            "<td style=\"background-color:{};color:{};\">{:+.2}%</td>",
            bg,
            contrast_text(&bg),
            v
        ),
        None => "<td></td>".to_string(),
    }
}

pub fn render(table: &HeatmapTable) -> String {
    let caption = format!("Sector ETF Daily Return Heatmap (Last {} Trading Days)", table.dates.len());
    let mut body = String::new();
    body.push_str("<table class=\"heatmap\">\n");
    body.push_str(&format!("<caption>{}</caption>\n<thead><tr>", html_escape(&caption)));
    body.push_str("<th><div class=\"corner\"><span class=\"date\">Date</span><span class=\"ticker\">Ticker</span></div></th>");
    body.push_str("<th>Industry</th><th>ZS Live</th><th>ZS 5D</th>");
    for label in table.date_labels() {
        body.push_str(&format!("<th>{}</th>", label));
    }
    body.push_str("</tr></thead>\n<tbody>\n");
    for row in &table.rows {
        body.push_str(&format!(
            "<tr><td title=\"{}\">{}</td><td>{}</td>",
            html_escape(&row.ticker),
            html_escape(&row.name),
            html_escape(&row.industry)
        ));
        body.push_str(&zs_cell(row.zs_live));
        body.push_str(&zs_cell(row.zs_5d));
        for r in &row.returns {
            body.push_str(&return_cell(*r));
        }
        body.push_str("</tr>\n");
    }
    body.push_str("</tbody></table>");

    let style = r#"
caption { caption-side: top; font-weight: 800; font-size: 20px; line-height: 1.6; margin: 12px 0 14px; }
.heatmap { table-layout: fixed; min-width: 1600px; }
.heatmap td:first-child { width: 160px; text-align: left; }
.corner { position: relative; height: 44px; }
.corner .date { position: absolute; right: 6px; top: 4px; font-weight: bold; }
.corner .ticker { position: absolute; left: 6px; bottom: 4px; font-weight: bold; }
"#;
    page(&caption, style, &body)
}

/// Build the heatmap from the sector list and export the matrix as CSV
pub async fn generate(cfg: &AppConfig, yahoo: &YahooClient) -> Result<ReportArtifact> {
    let list_path = Path::new(&cfg.heatmap.sector_file);
    let list = SectorList::load(list_path)?;
    let tickers = list.tickers();
    if tickers.is_empty() {
        bail!("No tickers found in {}", list_path.display());
    }
    info!(count = tickers.len(), "📥 Fetching sector ETF closes");

    let closes = fetch_closes_many(yahoo, &tickers, &cfg.heatmap.history_range, true, cfg.breadth.concurrency).await;
    if closes.is_empty() {
        bail!("No price data for any sector ETF");
    }
    let table = build_table(&list, &closes, cfg.heatmap.display_days);

    let export = cfg.output_dir().join(EXPORT_FILE);
    write_heatmap_csv(&export, &table.date_labels(), &table.rows)
        .with_context(|| format!("Failed exporting heatmap to {}", export.display()))?;
    info!(rows = table.rows.len(), days = table.dates.len(), "✅ Heatmap built");

    Ok(ReportArtifact::new(KEY, TITLE, render(&table)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn list() -> SectorList {
        let s = |v: &[&str]| v.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        SectorList::from_parts(
            s(&["Industry", "Name", "Ticker", "VOLATILITY_360D", "MU_1D"]),
            vec![
                s(&["Tech", "Technology", "XLK", "16.0", "0.0"]),
                s(&["Energy", "Energy Select", "XLE", "", ""]),
                s(&["Util", "Utilities", "XLU", "20.0", "0.0"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_table_layout_newest_first() {
        let mut closes = HashMap::new();
        closes.insert(
            "XLK".to_string(),
            DailySeries::from_pairs(vec![(d(3), 100.0), (d(4), 101.0), (d(5), 102.01), (d(6), 100.99), (d(7), 101.0), (d(10), 102.0)]),
        );
        closes.insert("XLE".to_string(), DailySeries::from_pairs(vec![(d(6), 50.0), (d(7), 55.0)]));

        let table = build_table(&list(), &closes, 3);
        assert_eq!(table.dates, vec![d(10), d(7), d(6)]);
        // XLU has no data and is dropped
        assert_eq!(table.rows.len(), 2);

        let xlk = &table.rows[0];
        assert_eq!(xlk.name, "Technology");
        let latest = xlk.returns[0].unwrap();
        assert!((latest - (102.0 / 101.0 - 1.0) * 100.0).abs() < 1e-9);
        // vol 16 -> ZS Live equals today's return in percent
        assert!((xlk.zs_live.unwrap() - latest).abs() < 1e-9);
        // only three displayed days: no five-day score
        assert_eq!(xlk.zs_5d, None);

        let xle = &table.rows[1];
        assert_eq!(xle.returns.len(), 3);
        assert!(xle.returns[0].is_none() && xle.returns[2].is_none());
        assert!((xle.returns[1].unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(xle.zs_live, None);
    }

    #[test]
    fn test_five_day_score_with_a_missing_day() {
        let mut closes = HashMap::new();
        // XLK skips the 6th; the other ticker fills every displayed date
        closes.insert(
            "XLK".to_string(),
            DailySeries::from_pairs(vec![(d(3), 100.0), (d(4), 101.0), (d(5), 101.0), (d(7), 101.0), (d(10), 101.0)]),
        );
        closes.insert(
            "XLU".to_string(),
            DailySeries::from_pairs(vec![(d(3), 10.0), (d(4), 10.0), (d(5), 10.0), (d(6), 10.0), (d(7), 10.0), (d(10), 10.0)]),
        );

        let table = build_table(&list(), &closes, 5);
        assert_eq!(table.dates, vec![d(10), d(7), d(6), d(5), d(4)]);
        let xlk = table.rows.iter().find(|r| r.ticker == "XLK").unwrap();
        assert!(xlk.returns[2].is_none());
        // Only the 1% move on the 4th compounds; vol 16 -> z = 1 / sqrt 5
        let z = xlk.zs_5d.unwrap();
        assert!((z - 1.0 / 5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_render_colors_cells() {
        let table = HeatmapTable {
            dates: vec![d(4)],
            rows: vec![HeatmapRow {
                ticker: "XLK".into(),
                name: "Tech & Co".into(),
                industry: "Tech".into(),
                zs_live: Some(2.0),
                zs_5d: None,
                returns: vec![Some(10.0)],
            }],
        };
        let html = render(&table);
        assert!(html.contains("Tech &amp; Co"));
        assert!(html.contains("background-color:#0FA84C;\">+2.00</td>"));
        assert!(html.contains("background-color:#00FF00;color:#FFFFFF;\">+10.00%</td>"));
        assert!(html.contains("<th>2025-03-04</th>"));
    }
}
