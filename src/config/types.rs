//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory that receives generated HTML/CSV reports
    pub dir: String,
    /// Directory holding input ticker lists and local minute data
    pub data_dir: String,
    /// Dashboard file prefix (timestamp is appended)
    pub dashboard_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// HTTP timeout in seconds
    pub http_timeout_secs: u64,
    /// User agent sent to public endpoints
    pub user_agent: String,
    /// Yahoo chart API base (".../v8/finance/chart")
    pub yahoo_chart_url: String,
    /// Binance klines endpoints, tried in order
    pub binance_endpoints: Vec<String>,
    /// Optional proxy URL for Binance (http://, https:// or socks5://)
    pub binance_proxy: Option<String>,
    /// Pause between kline pages in milliseconds
    pub binance_page_pause_ms: u64,
    /// Deribit TradingView chart endpoint
    pub deribit_url: String,
    /// Ken French data library FTP base
    pub french_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Push reports after each successful run
    pub enabled: bool,
    pub api_base: String,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// Forum topic to post into
    pub message_thread_id: Option<i64>,
    /// Reply target for volume profile pushes
    pub reply_to_message_id: Option<i64>,
    /// Attempts per document upload
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Local run times as HH:MM
    pub run_times: Vec<String>,
    /// ISO weekdays to run on (1 = Monday)
    pub weekdays: Vec<u32>,
    /// Fixed UTC offset of the schedule clock in hours
    pub utc_offset_hours: i32,
    /// Pipeline attempts per scheduled run
    pub max_attempts: u32,
    /// Delay between pipeline attempts in seconds
    pub retry_delay_secs: u64,
    /// Longest single sleep while waiting for the next run
    pub sleep_chunk_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeProfileConfig {
    /// Symbols to profile, processed in order
    pub symbols: Vec<String>,
    /// Trading sessions per profile
    pub n_days: usize,
    /// Calendar days fetched before session selection
    pub lookback_days: i64,
    /// Oldest 1m bar the provider serves, in days
    pub max_intraday_days: i64,
    /// Bin width in ticks
    pub bins_per_tick: f64,
    /// Share of total volume inside VAL..VAH
    pub value_area_fraction: f64,
    /// Local minute CSV files for contracts without a public feed (symbol=path)
    pub local_files: Vec<String>,
    /// Hours between scheduled pushes
    pub push_every_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapConfig {
    /// Sector ETF list (CSV)
    pub sector_file: String,
    /// Yahoo range for daily closes
    pub history_range: String,
    /// Return columns shown
    pub display_days: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreadthConfig {
    pub nq_file: String,
    pub nq_index: String,
    pub hsi_file: String,
    pub hsi_index: String,
    pub history_range: String,
    pub sma_window: usize,
    /// Concurrent constituent downloads
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrueRangeConfig {
    pub symbols: Vec<String>,
    pub sma_window: usize,
    pub lookback: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntradayConfig {
    pub symbols: Vec<String>,
    pub history_range: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpliedConfig {
    /// Yahoo range used for the Skew percentile
    pub skew_range: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactorsConfig {
    /// Stock list (CSV, first column)
    pub stock_file: String,
    /// Output file name inside the output directory
    pub output_file: String,
    pub history_range: String,
    pub min_days: usize,
    pub max_days: usize,
    pub rolling_window: usize,
    pub trend_months: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Emails allowed to log in
    pub allowed_emails: Vec<String>,
    /// Hex SHA-256 of the shared password
    pub password_sha256: Option<String>,
}
