use crate::metrics::AnalysisParams;
use crate::source::SourceKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_SUBDIR: &str = ".finquote";
const DB_FILENAME: &str = "finquote.duckdb";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Provider selection and HTTP settings shared by every adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source")]
    pub default_source: SourceKind,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause before every request; 0 disables it.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_yql_url")]
    pub yql_url: String,

    #[serde(default = "default_csv_quotes_url")]
    pub csv_quotes_url: String,

    #[serde(default = "default_csv_hist_url")]
    pub csv_hist_url: String,

    #[serde(default = "default_bloomberg_url")]
    pub bloomberg_url: String,
}

/// Quote cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Falls back to `$FINQUOTE_DB`, then `$FINQUOTE_DIR/finquote.duckdb`,
    /// then `~/.finquote/finquote.duckdb`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    #[serde(default = "default_quote_expiry_secs")]
    pub quote_expiry_secs: u64,
}

/// Thresholds for the buy heuristics
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fixed_tx_cost")]
    pub fixed_tx_cost: f64,

    #[serde(default = "default_desired_tx_cost_fraction")]
    pub desired_tx_cost_fraction: f64,

    #[serde(default = "default_max_bid_ask_spread")]
    pub max_bid_ask_spread: f64,

    #[serde(default = "default_min_dividend_yield")]
    pub min_dividend_yield: f64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_source() -> SourceKind {
    SourceKind::YahooYql
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    0
}
fn default_user_agent() -> String {
    concat!("finquote/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_yql_url() -> String {
    "https://query.yahooapis.com/v1/public/yql".to_string()
}
fn default_csv_quotes_url() -> String {
    "https://download.finance.yahoo.com/d/quotes.csv".to_string()
}
fn default_csv_hist_url() -> String {
    "https://ichart.finance.yahoo.com/table.csv".to_string()
}
fn default_bloomberg_url() -> String {
    "https://www.bloomberg.com/quote".to_string()
}
fn default_quote_expiry_secs() -> u64 {
    5 * 60
}
fn default_fixed_tx_cost() -> f64 {
    9.75
}
fn default_desired_tx_cost_fraction() -> f64 {
    0.01
}
fn default_max_bid_ask_spread() -> f64 {
    0.01
}
fn default_min_dividend_yield() -> f64 {
    0.025
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            default_source: default_source(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            user_agent: default_user_agent(),
            yql_url: default_yql_url(),
            csv_quotes_url: default_csv_quotes_url(),
            csv_hist_url: default_csv_hist_url(),
            bloomberg_url: default_bloomberg_url(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: None,
            quote_expiry_secs: default_quote_expiry_secs(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fixed_tx_cost: default_fixed_tx_cost(),
            desired_tx_cost_fraction: default_desired_tx_cost_fraction(),
            max_bid_ask_spread: default_max_bid_ask_spread(),
            min_dividend_yield: default_min_dividend_yield(),
        }
    }
}

impl From<&AnalysisConfig> for AnalysisParams {
    fn from(c: &AnalysisConfig) -> Self {
        Self {
            fixed_tx_cost: c.fixed_tx_cost,
            desired_tx_cost_fraction: c.desired_tx_cost_fraction,
            max_bid_ask_spread: c.max_bid_ask_spread,
            min_dividend_yield: c.min_dividend_yield,
        }
    }
}

impl CacheConfig {
    pub fn quote_expiry(&self) -> Duration {
        Duration::from_secs(self.quote_expiry_secs)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(p) = &self.db_path {
            return p.clone();
        }
        if let Ok(p) = std::env::var("FINQUOTE_DB") {
            return PathBuf::from(p);
        }
        config_dir().join(DB_FILENAME)
    }
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FINQUOTE_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(CONFIG_SUBDIR)
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("FINQUOTE").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        cfg.try_deserialize().context("Invalid configuration")
    }
}
