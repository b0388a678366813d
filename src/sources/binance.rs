//! Binance REST klines client
//!
//! One request returns the trailing one-minute candles, most recent last.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::config::BinanceConfig;
use crate::error::{ObserverError, Result};
use crate::sources::SourceFetcher;
use crate::types::Candle;

#[derive(Debug, Clone)]
pub struct BinanceKlines {
    client: reqwest::Client,
    url: String,
    symbol: String,
    interval: String,
    limit: usize,
}

impl BinanceKlines {
    pub fn new(client: reqwest::Client, config: &BinanceConfig) -> Self {
        Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            symbol: config.symbol.clone(),
            interval: config.interval.clone(),
            limit: config.limit,
        }
    }

    async fn fetch_klines(&self) -> anyhow::Result<Vec<Candle>> {
        let url = format!("{}/klines", self.url);
        let limit = self.limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            bail!("Binance API returned error: {}", response.status());
        }

        // [[open_time, open, high, low, close, volume, close_time,
        //   quote_volume, trades, taker_base, taker_quote, ignore], ...]
        let klines: Vec<Vec<Value>> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;

        let candles = parse_klines(&klines)?;

        tracing::debug!(
            source = "binance",
            count = candles.len(),
            "Klines fetched"
        );

        Ok(candles)
    }
}

#[async_trait]
impl SourceFetcher for BinanceKlines {
    type Record = Vec<Candle>;

    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch(&self) -> Result<Vec<Candle>> {
        self.fetch_klines()
            .await
            .map_err(|e| ObserverError::unavailable(self.name(), format!("{:#}", e)))
    }
}

/// Parse the array-of-arrays kline payload
pub(crate) fn parse_klines(klines: &[Vec<Value>]) -> anyhow::Result<Vec<Candle>> {
    klines
        .iter()
        .enumerate()
        .map(|(i, kline)| parse_kline(kline).with_context(|| format!("malformed kline #{}", i)))
        .collect()
}

fn parse_kline(kline: &[Value]) -> anyhow::Result<Candle> {
    if kline.len() < 11 {
        bail!("expected at least 11 fields, got {}", kline.len());
    }

    let open_time_ms = kline[0].as_i64().context("open time is not an integer")?;
    let timestamp = Utc
        .timestamp_opt(open_time_ms / 1_000, 0)
        .single()
        .context("open time out of range")?;

    Ok(Candle {
        timestamp,
        open: decimal_field(&kline[1], "open")?,
        high: decimal_field(&kline[2], "high")?,
        low: decimal_field(&kline[3], "low")?,
        close: decimal_field(&kline[4], "close")?,
        volume: decimal_field(&kline[5], "volume")?,
        quote_asset_volume: decimal_field(&kline[7], "quote volume")?,
        number_of_trades: kline[8].as_u64().context("trade count is not an integer")?,
        taker_buy_base_asset_volume: decimal_field(&kline[9], "taker buy base")?,
        taker_buy_quote_asset_volume: decimal_field(&kline[10], "taker buy quote")?,
    })
}

/// Binance encodes decimals as strings
fn decimal_field(value: &Value, field: &str) -> anyhow::Result<f64> {
    match value {
        Value::String(s) => s
            .parse()
            .with_context(|| format!("{} is not a number: {}", field, s)),
        Value::Number(n) => n.as_f64().with_context(|| format!("{} out of range", field)),
        _ => bail!("{} has unexpected type", field),
    }
}
