//! Source implementations (Binance klines, DXY, Fear & Greed, AlphaVantage)
//!
//! Each source wraps one upstream provider behind the same `fetch()` contract.
//! Retries, where any exist, live inside the fetcher; the aggregator never
//! retries a source.

mod binance;
mod dxy;
mod fed_fund;
mod fng;

pub use binance::BinanceKlines;
pub use dxy::DxyChart;
pub use fed_fund::FedFundRate;
pub use fng::FearGreedIndex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use std::time::Duration;

use crate::error::{ObserverError, Result};

/// Browser-like agent; some providers reject default library agents
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Uniform contract for one upstream data provider
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Normalized record produced by one fetch
    type Record: Send + 'static;

    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch the most recent record
    async fn fetch(&self) -> Result<Self::Record>;
}

/// Build an HTTP client with the shared timeout and optional proxy
pub fn http_client(timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT);

    if let Some(url) = proxy {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| ObserverError::Config(format!("invalid proxy '{}': {}", url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ObserverError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Day-granular provider dates carry the current hour and minute
pub(crate) fn stamp_with_time(date: NaiveDate, now: DateTime<Utc>) -> DateTime<Utc> {
    date.and_hms_opt(now.hour(), now.minute(), 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now)
}
