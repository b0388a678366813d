//! Fear & Greed index (alternative.me)

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::config::FearGreedConfig;
use crate::error::{ObserverError, Result};
use crate::sources::{stamp_with_time, SourceFetcher};
use crate::types::SentimentIndexRecord;

#[derive(Debug, Clone)]
pub struct FearGreedIndex {
    client: reqwest::Client,
    live_url: String,
}

#[derive(Debug, Deserialize)]
struct FngResponse {
    data: Vec<FngEntry>,
}

#[derive(Debug, Deserialize)]
struct FngEntry {
    value: String,
    timestamp: String,
}

impl FearGreedIndex {
    pub fn new(client: reqwest::Client, config: &FearGreedConfig) -> Self {
        Self {
            client,
            live_url: config.live_url.clone(),
        }
    }

    async fn fetch_index(&self) -> anyhow::Result<SentimentIndexRecord> {
        let response = self
            .client
            .get(&self.live_url)
            .send()
            .await
            .context("Failed to fetch Fear & Greed index")?;

        if !response.status().is_success() {
            bail!("Fear & Greed API returned error: {}", response.status());
        }

        let body: FngResponse = response
            .json()
            .await
            .context("Failed to parse Fear & Greed response")?;

        parse_fng(body, Utc::now())
    }
}

#[async_trait]
impl SourceFetcher for FearGreedIndex {
    type Record = SentimentIndexRecord;

    fn name(&self) -> &'static str {
        "fng"
    }

    async fn fetch(&self) -> Result<SentimentIndexRecord> {
        self.fetch_index()
            .await
            .map_err(|e| ObserverError::unavailable(self.name(), format!("{:#}", e)))
    }
}

fn parse_fng(body: FngResponse, now: DateTime<Utc>) -> anyhow::Result<SentimentIndexRecord> {
    let entry = body.data.first().context("Fear & Greed response has no data")?;

    let fng: u8 = entry
        .value
        .trim()
        .parse()
        .with_context(|| format!("index value is not an integer: {}", entry.value))?;
    if fng > 100 {
        bail!("index value {} outside 0..=100", fng);
    }

    Ok(SentimentIndexRecord {
        timestamp: stamp_with_time(parse_day(&entry.timestamp)?, now),
        fng,
    })
}

/// `date_format=world` yields `dd-mm-YYYY`, the default format unix seconds
fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d-%m-%Y") {
        return Ok(date);
    }

    let secs: i64 = raw
        .parse()
        .with_context(|| format!("unrecognised timestamp: {}", raw))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.date_naive())
        .context("timestamp out of range")
}
