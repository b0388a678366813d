//! AlphaVantage policy-rate client with key rotation
//!
//! Every request picks its API key through the shared `QuotaGuard`. A body
//! reporting the daily request limit rotates to the next key and retries;
//! once every key is spent the fetch fails with `QuotaExhausted`.
//!
//! Requests go out without the proxy: AlphaVantage rejects proxied traffic.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::config::AlphaVantageConfig;
use crate::error::{ObserverError, Result};
use crate::quota::QuotaGuard;
use crate::sources::{stamp_with_time, SourceFetcher};
use crate::types::PolicyRateRecord;

pub struct FedFundRate {
    client: reqwest::Client,
    url: String,
    keys: Vec<String>,
    guard: Arc<QuotaGuard>,
}

impl FedFundRate {
    pub fn new(
        client: reqwest::Client,
        config: &AlphaVantageConfig,
        guard: Arc<QuotaGuard>,
    ) -> Result<Self> {
        if config.keys.len() != guard.num_keys() {
            return Err(ObserverError::Config(format!(
                "quota guard tracks {} keys but {} are configured",
                guard.num_keys(),
                config.keys.len()
            )));
        }

        Ok(Self {
            client,
            url: config.url.clone(),
            keys: config.keys.clone(),
            guard,
        })
    }

    async fn request(&self, key: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("apikey", key),
                ("function", "TREASURY_YIELD"),
                ("maturity", "3month"),
                ("interval", "daily"),
                ("datatype", "json"),
            ])
            .send()
            .await
            .context("Failed to fetch treasury yield from AlphaVantage")?;

        if !response.status().is_success() {
            bail!("AlphaVantage API returned error: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse AlphaVantage response")
    }
}

#[async_trait]
impl SourceFetcher for FedFundRate {
    type Record = PolicyRateRecord;

    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch(&self) -> Result<PolicyRateRecord> {
        loop {
            let ticket = self.guard.acquire()?;
            let key = &self.keys[ticket.key_index];

            let body = self
                .request(key)
                .await
                .map_err(|e| ObserverError::unavailable(self.name(), format!("{:#}", e)))?;

            if is_exhaustion_response(&body) {
                self.guard.report_exhausted(&ticket);
                continue;
            }

            let record = parse_rate(&body, Utc::now())
                .map_err(|e| ObserverError::unavailable(self.name(), format!("{:#}", e)))?;

            tracing::info!(
                source = %self.name(),
                key_index = ticket.key_index,
                fed_rate = record.fed_rate,
                "Policy rate fetched"
            );

            return Ok(record);
        }
    }
}

/// AlphaVantage answers HTTP 200 with an `Information` note once a key is spent
pub(crate) fn is_exhaustion_response(body: &Value) -> bool {
    body.get("Information")
        .and_then(Value::as_str)
        .map(|info| info.to_lowercase().contains("requests per day"))
        .unwrap_or(false)
}

/// Most recent dated value; holidays are reported as "."
fn parse_rate(body: &Value, now: DateTime<Utc>) -> anyhow::Result<PolicyRateRecord> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .context("response has no data array")?;

    for entry in data {
        let value = match entry.get("value").and_then(Value::as_str) {
            Some(v) => v,
            None => continue,
        };
        let Ok(fed_rate) = value.parse::<f64>() else {
            continue;
        };

        let date = entry
            .get("date")
            .and_then(Value::as_str)
            .context("entry has no date")?;
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("invalid date: {}", date))?;

        return Ok(PolicyRateRecord {
            timestamp: stamp_with_time(day, now),
            fed_rate,
        });
    }

    bail!("no numeric value in {} entries", data.len())
}
