//! Configuration management for PriceCast
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub binance: BinanceConfig,
    pub dxy: DxyConfig,
    pub fng: FearGreedConfig,
    pub alpha_vantage: AlphaVantageConfig,
    pub sentiment: SentimentConfig,
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Observation + prediction cadence in seconds
    pub prediction_interval_secs: u64,
    /// Wait for the next wall-clock minute before the first cycle
    pub align_to_minute: bool,
    /// Per-dispatcher input buffer (cycles); oldest dropped on overflow
    pub cycle_capacity: usize,
    /// Per-model output buffer (events) for SSE subscribers
    pub output_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Optional proxy for every source except AlphaVantage
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    /// REST endpoint, no key needed
    pub url: String,
    pub symbol: String,
    pub interval: String,
    /// Trailing candles per request (most recent last)
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DxyConfig {
    /// Yahoo-Finance chart endpoint for the dollar index
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FearGreedConfig {
    /// Live index endpoint
    pub live_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlphaVantageConfig {
    pub url: String,
    /// Usable API keys, rotated in order
    pub keys: Vec<String>,
    /// Maximum requests per key per day
    pub limit: u64,
    /// Known rate used until the first scheduled refresh
    pub initial_rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// Search keywords for news
    pub keywords: String,
    /// Upper bound on news items per cycle
    pub max_results: usize,
    /// Only search news published within this many hours
    #[serde(default)]
    pub time_window_hours: Option<u64>,
    /// NewsAPI-style search endpoint
    pub search_url: String,
    pub search_api_key: String,
    /// HuggingFace inference endpoint of the sentiment model
    pub scoring_url: String,
    pub scoring_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Serve SSE streams (requires the `server` feature)
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Scheduler defaults
            .set_default("scheduler.prediction_interval_secs", 60)?
            .set_default("scheduler.align_to_minute", true)?
            .set_default("scheduler.cycle_capacity", 4)?
            .set_default("scheduler.output_capacity", 64)?
            // HTTP defaults
            .set_default("http.timeout_secs", 30)?
            // Source defaults
            .set_default("binance.url", "https://api.binance.com/api/v3")?
            .set_default("binance.symbol", "BTCUSDT")?
            .set_default("binance.interval", "1m")?
            .set_default("binance.limit", 5)?
            .set_default(
                "dxy.url",
                "https://query1.finance.yahoo.com/v8/finance/chart/DX-Y.NYB",
            )?
            .set_default(
                "fng.live_url",
                "https://api.alternative.me/fng/?limit=1&date_format=world",
            )?
            .set_default("alpha_vantage.url", "https://www.alphavantage.co/query")?
            .set_default("alpha_vantage.keys", Vec::<String>::new())?
            .set_default("alpha_vantage.limit", 25)?
            // Sentiment defaults
            .set_default("sentiment.keywords", "bitcoin sentiment news")?
            .set_default("sentiment.max_results", 100)?
            .set_default("sentiment.search_url", "https://newsapi.org/v2/everything")?
            .set_default("sentiment.search_api_key", "")?
            .set_default(
                "sentiment.scoring_url",
                "https://api-inference.huggingface.co/models/cardiffnlp/twitter-roberta-base-sentiment-latest",
            )?
            .set_default("sentiment.scoring_token", "")?
            // Server defaults
            .set_default("server.enabled", true)?
            .set_default("server.port", 5000)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PRICECAST__*)
            .add_source(
                Environment::with_prefix("PRICECAST")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("alpha_vantage.keys")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.prediction_interval_secs == 0 {
            bail!("scheduler.prediction_interval_secs must be > 0");
        }
        if self.scheduler.cycle_capacity == 0 || self.scheduler.output_capacity == 0 {
            bail!("scheduler channel capacities must be > 0");
        }
        if self.binance.limit < 2 {
            bail!("binance.limit must be >= 2 to yield a previous and current candle");
        }
        if self.alpha_vantage.keys.is_empty() {
            bail!("alpha_vantage.keys must contain at least one API key");
        }
        if self.alpha_vantage.limit < 2 {
            bail!("alpha_vantage.limit must be >= 2");
        }
        if self.sentiment.time_window_hours == Some(0) {
            bail!("sentiment.time_window_hours must be > 0 when set");
        }
        if self.models.is_empty() {
            bail!("at least one model must be configured");
        }

        let mut names = HashSet::new();
        for model in &self.models {
            if !names.insert(model.name.as_str()) {
                bail!("duplicate model name '{}'", model.name);
            }
        }

        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        let models: Vec<String> = self
            .models
            .iter()
            .map(|m| format!("{}:{}", m.name, m.kind))
            .collect();
        format!(
            "interval={}s align={} keys={} limit={} models={:?} server={}:{}",
            self.scheduler.prediction_interval_secs,
            self.scheduler.align_to_minute,
            self.alpha_vantage.keys.len(),
            self.alpha_vantage.limit,
            models,
            self.server.enabled,
            self.server.port
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            name: "info".to_string(),
            kind: ModelKind::Linear,
            path: "models/lr.json".into(),
        },
        ModelConfig {
            name: "lgr".to_string(),
            kind: ModelKind::Logistic,
            path: "models/lgr.json".into(),
        },
        ModelConfig {
            name: "elr".to_string(),
            kind: ModelKind::ElasticNet,
            path: "models/elr.json".into(),
        },
    ]
}
