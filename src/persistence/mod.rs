//! CSV Persistence Module
//!
//! Flat-file inputs and outputs: the sector list with its volatility columns,
//! plain ticker lists, report exports and the `latest` manifest the server reads.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analytics::FactorFit;

pub const VOL_COLUMN: &str = "VOLATILITY_360D";
pub const MU_COLUMN: &str = "MU_1D";
pub const MANIFEST_FILE: &str = "latest.json";

const TICKER_HEADER_KEYWORDS: [&str; 3] = ["ticker", "symbol", "code"];
const SCORE_SAMPLE: usize = 200;

/// ASCII, at most 15 chars, alphanumerics plus `.-=`
pub fn is_ticker_like(value: &str) -> bool {
    let s = value.trim();
    !s.is_empty()
        && s.len() <= 15
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '='))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed creating {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Sector ETF list: free-form columns with one ticker column, column A an
/// industry label and column B a display name.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorList {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub ticker_col: usize,
}

/// Display labels for one ticker
#[derive(Debug, Clone, PartialEq)]
pub struct SectorLabel {
    pub name: String,
    pub industry: String,
}

impl SectorList {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open sector list {}", path.display()))?;
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read sector list header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read sector list row")?;
            let mut row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Self::from_parts(headers, rows)
    }

    pub fn from_parts(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if headers.is_empty() || rows.is_empty() {
            bail!("Sector list is empty");
        }
        let ticker_col = detect_ticker_column(&headers, &rows);
        Ok(Self {
            headers,
            rows,
            ticker_col,
        })
    }

    fn cell(&self, row: &[String], col: usize) -> Option<String> {
        row.get(col)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
            .map(str::to_string)
    }

    fn ticker_of(&self, row: &[String]) -> Option<String> {
        self.cell(row, self.ticker_col).filter(|t| is_ticker_like(t))
    }

    /// Unique ticker-like values of the ticker column, file order
    pub fn tickers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|r| self.ticker_of(r))
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn labels(&self) -> HashMap<String, SectorLabel> {
        self.rows
            .iter()
            .filter_map(|row| {
                let ticker = self.ticker_of(row)?;
                let name = if self.headers.len() > 1 {
                    self.cell(row, 1).unwrap_or_else(|| ticker.clone())
                } else {
                    ticker.clone()
                };
                let industry = self.cell(row, 0).unwrap_or_default();
                Some((ticker, SectorLabel { name, industry }))
            })
            .collect()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(i) = self.column(name) {
            return i;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Numeric value in `column` for `ticker`
    pub fn metric(&self, ticker: &str, column: &str) -> Option<f64> {
        let col = self.column(column)?;
        self.rows
            .iter()
            .find(|r| self.ticker_of(r).as_deref() == Some(ticker))
            .and_then(|r| self.cell(r, col))
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    /// Overwrite VOLATILITY_360D and MU_1D. Tickers without a value get an empty cell.
    pub fn set_vol_metrics(&mut self, metrics: &HashMap<String, (f64, f64)>) {
        let vol_col = self.ensure_column(VOL_COLUMN);
        let mu_col = self.ensure_column(MU_COLUMN);
        let ticker_col = self.ticker_col;
        for row in &mut self.rows {
            let ticker = row.get(ticker_col).map(|t| t.trim().to_string()).unwrap_or_default();
            let (vol, mu) = match metrics.get(&ticker) {
                Some((v, m)) => (format!("{:.4}", v), format!("{:.6}", m)),
                None => (String::new(), String::new()),
            };
            row[vol_col] = vol;
            row[mu_col] = mu;
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let mut writer = WriterBuilder::new()
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().context("Failed to flush sector list")?;
        Ok(())
    }
}

fn ticker_score(rows: &[Vec<String>], col: usize) -> f64 {
    let values: Vec<&str> = rows
        .iter()
        .take(SCORE_SAMPLE)
        .filter_map(|r| r.get(col))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    let like = values.iter().filter(|v| is_ticker_like(v)).count();
    like as f64 / values.len() as f64
}

fn is_numeric_column(rows: &[Vec<String>], col: usize) -> bool {
    let mut any = false;
    for v in rows.iter().filter_map(|r| r.get(col)).map(|v| v.trim()) {
        if v.is_empty() {
            continue;
        }
        if v.parse::<f64>().is_err() {
            return false;
        }
        any = true;
    }
    any
}

/// Prefer a header containing ticker/symbol/code, then the column whose values
/// look most like tickers. Numeric columns never qualify. Falls back to column 0.
pub fn detect_ticker_column(headers: &[String], rows: &[Vec<String>]) -> usize {
    let mut scored: Vec<(bool, f64, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !is_numeric_column(rows, *i))
        .map(|(i, h)| {
            let lower = h.to_lowercase();
            let keyword = TICKER_HEADER_KEYWORDS.iter().any(|k| lower.contains(k));
            (keyword, ticker_score(rows, i), i)
        })
        .collect();
    // Stable: earlier columns win ties
    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
    });
    match scored.first() {
        Some((_, score, idx)) if *score > 0.0 => *idx,
        _ => 0,
    }
}

/// First column of a headed CSV, trimmed, uppercased, de-duplicated
pub fn read_ticker_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open ticker list {}", path.display()))?;
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read ticker list row")?;
        let Some(raw) = record.get(0) else {
            continue;
        };
        let ticker = raw.trim().to_uppercase();
        if ticker.is_empty() || ticker == "NAN" {
            continue;
        }
        if seen.insert(ticker.clone()) {
            tickers.push(ticker);
        }
    }
    info!(path = %path.display(), count = tickers.len(), "Loaded ticker list");
    Ok(tickers)
}

/// One heatmap row: labels, z-scores and returns (newest first)
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapRow {
    pub ticker: String,
    pub name: String,
    pub industry: String,
    pub zs_live: Option<f64>,
    pub zs_5d: Option<f64>,
    pub returns: Vec<Option<f64>>,
}

fn opt_cell(v: Option<f64>, precision: usize) -> String {
    v.map(|x| format!("{:.*}", precision, x)).unwrap_or_default()
}

/// Heatmap matrix export: one column per date, values as percent
pub fn write_heatmap_csv(path: &Path, dates: &[String], rows: &[HeatmapRow]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut header = vec![
        "Ticker".to_string(),
        "Name".to_string(),
        "Industry".to_string(),
        "ZS Live".to_string(),
        "ZS 5D".to_string(),
    ];
    header.extend(dates.iter().cloned());
    writer.write_record(&header)?;
    for row in rows {
        let mut record = vec![
            row.ticker.clone(),
            row.name.clone(),
            row.industry.clone(),
            opt_cell(row.zs_live, 2),
            opt_cell(row.zs_5d, 2),
        ];
        record.extend(row.returns.iter().map(|r| opt_cell(*r, 2)));
        writer.write_record(&record)?;
    }
    writer.flush().context("Failed to flush heatmap export")?;
    Ok(())
}

/// Factor batch output record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactorRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Observations")]
    pub observations: usize,
    #[serde(rename = "Beta_Score")]
    pub beta_score: f64,
    #[serde(rename = "Size_Score")]
    pub size_score: f64,
    #[serde(rename = "Value_Score")]
    pub value_score: f64,
    #[serde(rename = "Momentum_Score")]
    pub momentum_score: f64,
    #[serde(rename = "Quality_Score")]
    pub quality_score: f64,
    #[serde(rename = "Alpha")]
    pub alpha: f64,
    #[serde(rename = "Beta_Mkt")]
    pub beta_mkt: f64,
    #[serde(rename = "Beta_SMB")]
    pub beta_smb: f64,
    #[serde(rename = "Beta_HML")]
    pub beta_hml: f64,
    #[serde(rename = "Beta_Mom")]
    pub beta_mom: f64,
    #[serde(rename = "Beta_RMW")]
    pub beta_rmw: f64,
    #[serde(rename = "Baskets")]
    pub baskets: String,
    #[serde(rename = "Beta_Trend")]
    pub beta_trend: String,
}

impl FactorRecord {
    pub fn from_fit(ticker: &str, fit: &FactorFit) -> Self {
        Self {
            ticker: ticker.to_string(),
            date: fit.last_date.format("%Y-%m-%d").to_string(),
            observations: fit.observations,
            beta_score: fit.scores.beta,
            size_score: fit.scores.size,
            value_score: fit.scores.value,
            momentum_score: fit.scores.momentum,
            quality_score: fit.scores.quality,
            alpha: fit.betas.alpha,
            beta_mkt: fit.betas.mkt,
            beta_smb: fit.betas.smb,
            beta_hml: fit.betas.hml,
            beta_mom: fit.betas.mom,
            beta_rmw: fit.betas.rmw,
            baskets: fit.baskets.clone(),
            beta_trend: fit.beta_trend_string(),
        }
    }
}

pub fn write_factor_csv(path: &Path, records: &[FactorRecord]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for record in records {
        writer
            .serialize(record)
            .context("Failed to write factor record")?;
    }
    writer.flush().context("Failed to flush factor writer")?;
    info!(path = %path.display(), rows = records.len(), "💾 Factor results saved");
    Ok(())
}

pub fn load_factor_csv(path: &Path) -> Result<Vec<FactorRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: FactorRecord = result.context("Failed to deserialize factor record")?;
        records.push(record);
    }
    Ok(records)
}

/// Latest output of one report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatestEntry {
    pub title: String,
    pub path: PathBuf,
    pub updated_at: DateTime<Utc>,
}

/// Most recent output per section, keyed by section key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatestManifest {
    pub sections: BTreeMap<String, LatestEntry>,
}

impl LatestManifest {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Missing or unreadable manifests load as empty
    pub fn load(dir: &Path) -> Self {
        let path = Self::path_in(dir);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
                Self::default()
            }
        }
    }

    pub fn record(&mut self, key: &str, title: &str, path: &Path, at: DateTime<Utc>) {
        self.sections.insert(
            key.to_string(),
            LatestEntry {
                title: title.to_string(),
                path: path.to_path_buf(),
                updated_at: at,
            },
        );
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("Failed creating {}", dir.display()))?;
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self).context("Failed to encode manifest")?;
        fs::write(&path, json).with_context(|| format!("Failed writing {}", path.display()))?;
        Ok(())
    }
}
