//! Configuration management
//!
//! Loads defaults, optional YAML files and `MKTDASH__*` environment overrides (via .env).

pub mod logging;
mod types;

pub use types::*;
pub use logging::{init_logging, LogFormat};

use anyhow::{bail, Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub output: OutputConfig,
    pub sources: SourcesConfig,
    pub telegram: TelegramConfig,
    pub schedule: ScheduleConfig,
    pub volume_profile: VolumeProfileConfig,
    pub heatmap: HeatmapConfig,
    pub breadth: BreadthConfig,
    pub true_range: TrueRangeConfig,
    pub intraday: IntradayConfig,
    pub implied: ImpliedConfig,
    pub factors: FactorsConfig,
    pub server: ServerConfig,
}

const LIST_KEYS: [&str; 8] = [
    "sources.binance_endpoints",
    "schedule.run_times",
    "schedule.weekdays",
    "volume_profile.symbols",
    "volume_profile.local_files",
    "true_range.symbols",
    "intraday.symbols",
    "server.allowed_emails",
];

impl AppConfig {
    /// Load configuration from `config/default`, `config/local` and the environment
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, optionally layering an explicit file after the default ones
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Self::defaults_builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = extra_file {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        let mut env = Environment::with_prefix("MKTDASH")
            .separator("__")
            .list_separator(",")
            .try_parsing(true);
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Built-in defaults only, no files or environment
    pub fn from_defaults() -> Result<Self> {
        let config = Self::defaults_builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn defaults_builder() -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Output defaults
            .set_default("output.dir", "./reports")?
            .set_default("output.data_dir", "./data")?
            .set_default("output.dashboard_prefix", "Market_Dashboard")?
            // Source defaults
            .set_default("sources.http_timeout_secs", 30)?
            .set_default(
                "sources.user_agent",
                "Mozilla/5.0 (X11; Linux x86_64) market-dashboard",
            )?
            .set_default(
                "sources.yahoo_chart_url",
                "https://query1.finance.yahoo.com/v8/finance/chart",
            )?
            .set_default(
                "sources.binance_endpoints",
                vec![
                    "https://api.binance.com/api/v3/klines",
                    "https://data.binance.com/api/v3/klines",
                    "https://data-api.binance.vision/api/v3/klines",
                ],
            )?
            .set_default("sources.binance_page_pause_ms", 200)?
            .set_default(
                "sources.deribit_url",
                "https://www.deribit.com/api/v2/public/get_tradingview_chart_data",
            )?
            .set_default(
                "sources.french_base_url",
                "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp",
            )?
            // Telegram defaults
            .set_default("telegram.enabled", false)?
            .set_default("telegram.api_base", "https://api.telegram.org")?
            .set_default("telegram.max_attempts", 5)?
            .set_default("telegram.retry_delay_ms", 2000)?
            // Schedule defaults (Hong Kong time)
            .set_default("schedule.run_times", vec!["09:00", "22:30", "23:30"])?
            .set_default("schedule.weekdays", vec![1, 2, 3, 4, 5, 6])?
            .set_default("schedule.utc_offset_hours", 8)?
            .set_default("schedule.max_attempts", 10)?
            .set_default("schedule.retry_delay_secs", 5)?
            .set_default("schedule.sleep_chunk_secs", 60)?
            // Volume profile defaults
            .set_default(
                "volume_profile.symbols",
                vec![
                    "GC=F", "NQ=F", "ES=F", "NIY=F", "SI=F", "BTC-USD", "ETH-USD", "TSLA",
                    "AAPL", "NVDA",
                ],
            )?
            .set_default("volume_profile.n_days", 20)?
            .set_default("volume_profile.lookback_days", 40)?
            .set_default("volume_profile.max_intraday_days", 29)?
            .set_default("volume_profile.bins_per_tick", 15.0)?
            .set_default("volume_profile.value_area_fraction", 1.0)?
            .set_default("volume_profile.local_files", Vec::<String>::new())?
            .set_default("volume_profile.push_every_hours", 2)?
            // Heatmap defaults
            .set_default("heatmap.sector_file", "./data/sector_etfs.csv")?
            .set_default("heatmap.history_range", "3mo")?
            .set_default("heatmap.display_days", 20)?
            // Breadth defaults
            .set_default("breadth.nq_file", "./data/nq100.csv")?
            .set_default("breadth.nq_index", "^NDX")?
            .set_default("breadth.hsi_file", "./data/hsi.csv")?
            .set_default("breadth.hsi_index", "^HSI")?
            .set_default("breadth.history_range", "2y")?
            .set_default("breadth.sma_window", 20)?
            .set_default("breadth.concurrency", 8)?
            // True range defaults
            .set_default("true_range.symbols", vec!["^HSI", "^GSPC", "^NDX", "GC=F"])?
            .set_default("true_range.sma_window", 5)?
            .set_default("true_range.lookback", 30)?
            // Intraday defaults
            .set_default("intraday.symbols", vec!["GC=F", "NQ=F", "^HSI"])?
            .set_default("intraday.history_range", "59d")?
            // Implied parameters
            .set_default("implied.skew_range", "1y")?
            // Factor defaults
            .set_default("factors.stock_file", "./data/stock_list.csv")?
            .set_default("factors.output_file", "stock_factor_data.csv")?
            .set_default("factors.history_range", "5y")?
            .set_default("factors.min_days", 126)?
            .set_default("factors.max_days", 756)?
            .set_default("factors.rolling_window", 252)?
            .set_default("factors.trend_months", 24)?
            // Server defaults
            .set_default("server.port", 8501)?
            .set_default("server.allowed_emails", Vec::<String>::new())?;

        Ok(builder)
    }

    /// Sanity checks that deserialization alone can't express
    pub fn validate(&self) -> Result<()> {
        let vp = &self.volume_profile;
        if vp.n_days == 0 {
            bail!("volume_profile.n_days must be positive");
        }
        if !(vp.value_area_fraction > 0.0 && vp.value_area_fraction <= 1.0) {
            bail!(
                "volume_profile.value_area_fraction must be in (0, 1], got {}",
                vp.value_area_fraction
            );
        }
        if vp.bins_per_tick <= 0.0 {
            bail!("volume_profile.bins_per_tick must be positive");
        }
        if self.schedule.max_attempts == 0 {
            bail!("schedule.max_attempts must be at least 1");
        }
        if self.telegram.enabled
            && (self.telegram.bot_token.is_none() || self.telegram.chat_id.is_none())
        {
            bail!("telegram.enabled requires telegram.bot_token and telegram.chat_id");
        }
        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.dir)
    }

    /// Local minute files as (symbol, path) pairs from `SYMBOL=path` entries
    pub fn local_minute_files(&self) -> Vec<(String, PathBuf)> {
        self.volume_profile
            .local_files
            .iter()
            .filter_map(|entry| {
                let (symbol, path) = entry.split_once('=')?;
                let symbol = symbol.trim();
                let path = path.trim();
                if symbol.is_empty() || path.is_empty() {
                    return None;
                }
                Some((symbol.to_string(), PathBuf::from(path)))
            })
            .collect()
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "output={} vp_symbols={} n_days={} va={:.2} schedule={:?} telegram={} server_port={}",
            self.output.dir,
            self.volume_profile.symbols.len(),
            self.volume_profile.n_days,
            self.volume_profile.value_area_fraction,
            self.schedule.run_times,
            if self.telegram.enabled { "on" } else { "off" },
            self.server.port,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let cfg = AppConfig::from_defaults().unwrap();
        assert_eq!(cfg.volume_profile.n_days, 20);
        assert_eq!(cfg.volume_profile.value_area_fraction, 1.0);
        assert_eq!(cfg.volume_profile.symbols[0], "GC=F");
        assert_eq!(cfg.sources.binance_endpoints.len(), 3);
        assert_eq!(cfg.schedule.weekdays, vec![1, 2, 3, 4, 5, 6]);
        assert!(cfg.telegram.bot_token.is_none());
        assert!(cfg.server.password_sha256.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_digest_hides_secrets() {
        let mut cfg = AppConfig::from_defaults().unwrap();
        cfg.telegram.bot_token = Some("123:secret".to_string());
        assert!(!cfg.digest().contains("secret"));
    }

    #[test]
    fn test_validate_rejects_bad_value_area() {
        let mut cfg = AppConfig::from_defaults().unwrap();
        cfg.volume_profile.value_area_fraction = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_local_minute_files_parsing() {
        let mut cfg = AppConfig::from_defaults().unwrap();
        cfg.volume_profile.local_files = vec![
            "HSI2512=data/hsi2512.csv".to_string(),
            "broken".to_string(),
            "=nope.csv".to_string(),
        ];
        let files = cfg.local_minute_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "HSI2512");
        assert_eq!(files[0].1, PathBuf::from("data/hsi2512.csv"));
    }
}
