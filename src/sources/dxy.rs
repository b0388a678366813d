//! US dollar index from the Yahoo-Finance chart API

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::config::DxyConfig;
use crate::error::{ObserverError, Result};
use crate::sources::SourceFetcher;
use crate::types::CurrencyIndexRecord;

#[derive(Debug, Clone)]
pub struct DxyChart {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
}

impl DxyChart {
    pub fn new(client: reqwest::Client, config: &DxyConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
        }
    }

    async fn fetch_index(&self) -> anyhow::Result<CurrencyIndexRecord> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("interval", "1m"), ("range", "1d")])
            .send()
            .await
            .context("Failed to fetch DXY chart")?;

        if !response.status().is_success() {
            bail!("Yahoo chart API returned error: {}", response.status());
        }

        let chart: ChartResponse = response
            .json()
            .await
            .context("Failed to parse DXY chart response")?;

        parse_chart(chart)
    }
}

#[async_trait]
impl SourceFetcher for DxyChart {
    type Record = CurrencyIndexRecord;

    fn name(&self) -> &'static str {
        "dxy"
    }

    async fn fetch(&self) -> Result<CurrencyIndexRecord> {
        self.fetch_index()
            .await
            .map_err(|e| ObserverError::unavailable(self.name(), format!("{:#}", e)))
    }
}

/// Latest non-null minute open, falling back to the regular market price
fn parse_chart(chart: ChartResponse) -> anyhow::Result<CurrencyIndexRecord> {
    if let Some(err) = chart.chart.error.filter(|e| !e.is_null()) {
        bail!("chart error: {}", err);
    }

    let result = chart
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .context("chart response has no result")?;

    let opens = result
        .indicators
        .quote
        .first()
        .map(|q| q.open.as_slice())
        .unwrap_or(&[]);

    let latest = result
        .timestamp
        .iter()
        .zip(opens.iter())
        .rev()
        .find_map(|(ts, open)| open.map(|o| (*ts, o)));

    let (ts, value) = match latest {
        Some(pair) => pair,
        None => {
            let price = result
                .meta
                .regular_market_price
                .context("chart has neither opens nor a market price")?;
            let ts = result
                .meta
                .regular_market_time
                .unwrap_or_else(|| Utc::now().timestamp());
            (ts, price)
        }
    };

    let timestamp = Utc
        .timestamp_opt(ts, 0)
        .single()
        .context("chart timestamp out of range")?;

    Ok(CurrencyIndexRecord {
        timestamp,
        open_dxy: value,
    })
}
