//! Ken French data library: daily Fama-French 5 factors and momentum

use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use super::build_http_client;
use crate::config::SourcesConfig;
use crate::error::{SourceError, SourceResult};

const PROVIDER: &str = "KenFrench";
const FF5_DAILY: &str = "F-F_Research_Data_5_Factors_2x3_daily_CSV.zip";
const MOMENTUM_DAILY: &str = "F-F_Momentum_Factor_daily_CSV.zip";

/// Date-indexed factor table (decimal returns)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorFrame {
    pub columns: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// Row-major, one row per date
    pub rows: Vec<Vec<f64>>,
}

impl FactorFrame {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row(&self, date: NaiveDate) -> Option<&[f64]> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.rows[i].as_slice())
    }

    /// Inner join on date; columns are concatenated
    pub fn join(&self, other: &FactorFrame) -> FactorFrame {
        let lookup: HashMap<NaiveDate, &Vec<f64>> =
            other.dates.iter().copied().zip(other.rows.iter()).collect();
        let mut out = FactorFrame {
            columns: self.columns.iter().chain(&other.columns).cloned().collect(),
            ..Default::default()
        };
        for (date, row) in self.dates.iter().zip(&self.rows) {
            if let Some(extra) = lookup.get(date) {
                out.dates.push(*date);
                out.rows.push(row.iter().chain(extra.iter()).copied().collect());
            }
        }
        out
    }

    fn scale(mut self, factor: f64) -> Self {
        for row in &mut self.rows {
            for v in row.iter_mut() {
                *v *= factor;
            }
        }
        self
    }
}

/// Parse the first daily table of a library CSV. The header row starts with an empty
/// cell; data rows start with a `YYYYMMDD` date. Values stay in percent.
pub fn parse_french_csv(text: &str) -> SourceResult<FactorFrame> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut frame = FactorFrame::default();
    let mut in_table = false;

    for record in reader.records() {
        let record = record.map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;
        let first = record.get(0).unwrap_or("");

        if !in_table {
            if first.is_empty() && record.len() > 1 {
                frame.columns = record.iter().skip(1).map(|c| c.trim().to_string()).collect();
                in_table = true;
            }
            continue;
        }

        if first.len() != 8 || !first.bytes().all(|b| b.is_ascii_digit()) {
            if !frame.dates.is_empty() {
                break;
            }
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(first, "%Y%m%d") else {
            continue;
        };
        let values: Option<Vec<f64>> = record
            .iter()
            .skip(1)
            .take(frame.columns.len())
            .map(|v| v.parse::<f64>().ok())
            .collect();
        match values {
            Some(v) if v.len() == frame.columns.len() => {
                frame.dates.push(date);
                frame.rows.push(v);
            }
            _ => continue,
        }
    }

    if frame.is_empty() {
        return Err(SourceError::empty(PROVIDER, "factor table"));
    }

    let mut order: Vec<usize> = (0..frame.dates.len()).collect();
    order.sort_by_key(|&i| frame.dates[i]);
    frame.dates = order.iter().map(|&i| frame.dates[i]).collect();
    frame.rows = order.iter().map(|&i| frame.rows[i].clone()).collect();
    Ok(frame)
}

/// Extract the first `.csv` member of a zip archive
fn read_zipped_csv(bytes: &[u8]) -> SourceResult<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| SourceError::decode(PROVIDER, e.to_string()))?;
        if file.name().to_ascii_lowercase().ends_with(".csv") {
            let mut raw = Vec::new();
            file.read_to_end(&mut raw).map_err(|source| SourceError::Io {
                path: file.name().to_string(),
                source,
            })?;
            return Ok(String::from_utf8_lossy(&raw).into_owned());
        }
    }
    Err(SourceError::decode(PROVIDER, "archive holds no csv member"))
}

#[derive(Debug, Clone)]
pub struct FrenchLibrary {
    http: reqwest::Client,
    base_url: String,
}

impl FrenchLibrary {
    pub fn new(cfg: &SourcesConfig) -> SourceResult<Self> {
        Ok(Self {
            http: build_http_client(cfg, None)?,
            base_url: cfg.french_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_table(&self, file: &str) -> SourceResult<FactorFrame> {
        let url = format!("{}/{}", self.base_url, file);
        let response = self.http.get(&url).send().await.map_err(|source| SourceError::Http {
            provider: PROVIDER,
            source,
        })?;
        if !response.status().is_success() {
            return Err(super::status_error(PROVIDER, file, response.status()));
        }
        let bytes = response.bytes().await.map_err(|source| SourceError::Http {
            provider: PROVIDER,
            source,
        })?;
        parse_french_csv(&read_zipped_csv(&bytes)?)
    }

    /// FF5 joined with momentum, as decimal returns
    pub async fn daily_factors(&self) -> SourceResult<FactorFrame> {
        let ff5 = self.fetch_table(FF5_DAILY).await?;
        let mom = self.fetch_table(MOMENTUM_DAILY).await?;
        let joined = ff5.join(&mom).scale(0.01);
        tracing::info!(
            rows = joined.len(),
            columns = ?joined.columns,
            "Fama-French factors loaded"
        );
        if joined.is_empty() {
            return Err(SourceError::empty(PROVIDER, "joined factors"));
        }
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FF5: &str = "This file was created using the 202410 CRSP database.\n\
The 1-month TBill rate data until 202405 are from Ibbotson Associates.\n\
\n\
,Mkt-RF,SMB,HML,RMW,CMA,RF\n\
20240102,  -0.71,  0.52, 1.02, 0.20, 0.30, 0.021\n\
20240103,  -1.00, -0.10, 0.20,-0.30, 0.10, 0.021\n\
20240104,   0.50,  0.00, 0.00, 0.10, 0.00, 0.021\n\
\n\
Copyright 2024 Kenneth R. French\n";

    const MOM: &str = "Missing data are indicated by -99.99.\n\
\n\
,Mom   \n\
20240103,   0.40\n\
20240104,  -0.20\n\
20240105,   0.10\n";

    #[test]
    fn test_parse_french_csv() {
        let frame = parse_french_csv(FF5).unwrap();
        assert_eq!(frame.columns, vec!["Mkt-RF", "SMB", "HML", "RMW", "CMA", "RF"]);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.rows[0][0], -0.71);
        let mom = parse_french_csv(MOM).unwrap();
        assert_eq!(mom.columns, vec!["Mom"]);
    }

    #[test]
    fn test_join_is_inner_and_scaled() {
        let joined = parse_french_csv(FF5)
            .unwrap()
            .join(&parse_french_csv(MOM).unwrap())
            .scale(0.01);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.columns.len(), 7);
        let mom = joined.column_index("Mom").unwrap();
        let row = joined.row(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()).unwrap();
        assert!((row[mom] - 0.004).abs() < 1e-12);
        assert!((row[0] + 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_read_zipped_csv() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"hello").unwrap();
            writer.start_file("F-F_Momentum_Factor_daily.CSV", options).unwrap();
            writer.write_all(MOM.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        let text = read_zipped_csv(buf.get_ref()).unwrap();
        assert!(text.contains("20240105"));
    }
}
