//! Core types used throughout PriceCast
//!
//! Defines source records, observations, sentiment vectors and prediction events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul};

/// One-minute kline as returned by the price source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Minute open time (UTC)
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_asset_volume: f64,
    pub number_of_trades: u64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
}

/// Latest currency-index (DXY) value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrencyIndexRecord {
    pub timestamp: DateTime<Utc>,
    pub open_dxy: f64,
}

/// Latest Fear & Greed index value (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentIndexRecord {
    pub timestamp: DateTime<Utc>,
    pub fng: u8,
}

/// Latest policy-rate value, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyRateRecord {
    pub timestamp: DateTime<Utc>,
    pub fed_rate: f64,
}

/// Point-in-time snapshot merged from every source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_asset_volume: f64,
    pub number_of_trades: u64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
    pub open_dxy: f64,
    pub fng: u8,
    pub fed_rate: f64,
}

impl Observation {
    /// Number of model input features
    pub const NUM_FEATURES: usize = 9;

    /// Merge a candle with the scalar sources
    pub fn merge(
        candle: &Candle,
        dxy: &CurrencyIndexRecord,
        fng: &SentimentIndexRecord,
        rate: &PolicyRateRecord,
    ) -> Self {
        Self {
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            quote_asset_volume: candle.quote_asset_volume,
            number_of_trades: candle.number_of_trades,
            taker_buy_base_asset_volume: candle.taker_buy_base_asset_volume,
            taker_buy_quote_asset_volume: candle.taker_buy_quote_asset_volume,
            open_dxy: dxy.open_dxy,
            fng: fng.fng,
            fed_rate: rate.fed_rate,
        }
    }

    /// Feature names in model input order (targets close/high/low excluded)
    pub fn feature_names() -> [&'static str; Self::NUM_FEATURES] {
        [
            "open",
            "volume",
            "quote_asset_volume",
            "number_of_trades",
            "taker_buy_base_asset_volume",
            "taker_buy_quote_asset_volume",
            "open_dxy",
            "fng",
            "fed_rate",
        ]
    }

    /// Model input vector, ordered as `feature_names()`
    pub fn features(&self) -> Vec<f64> {
        vec![
            self.open,
            self.volume,
            self.quote_asset_volume,
            self.number_of_trades as f64,
            self.taker_buy_base_asset_volume,
            self.taker_buy_quote_asset_volume,
            self.open_dxy,
            self.fng as f64,
            self.fed_rate,
        ]
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} o={:.2} h={:.2} l={:.2} c={:.2} dxy={:.3} fng={} fed={:.2}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.open_dxy,
            self.fng,
            self.fed_rate
        )
    }
}

/// Positive / negative / neutral sentiment scores
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentVector {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

impl SentimentVector {
    pub fn new(positive: f64, negative: f64, neutral: f64) -> Self {
        Self {
            positive,
            negative,
            neutral,
        }
    }

    /// Neutral-dominant default used when nothing could be scored
    pub fn neutral() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Net sentiment in [-1, 1]
    pub fn net(&self) -> f64 {
        self.positive - self.negative
    }
}

impl Add for SentimentVector {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(
            self.positive + other.positive,
            self.negative + other.negative,
            self.neutral + other.neutral,
        )
    }
}

impl Mul<f64> for SentimentVector {
    type Output = Self;

    fn mul(self, w: f64) -> Self {
        Self::new(self.positive * w, self.negative * w, self.neutral * w)
    }
}

impl Div<f64> for SentimentVector {
    type Output = Self;

    fn div(self, d: f64) -> Self {
        Self::new(self.positive / d, self.negative / d, self.neutral / d)
    }
}

/// Output of one observation cycle, shared with every dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSnapshot {
    pub prev: Observation,
    pub current: Observation,
    pub sentiment: SentimentVector,
}

/// Previous-minute candle as shown to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrevSnapshot {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// Model-specific prediction payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionPayload {
    Continuous {
        p_close: f64,
        p_high: f64,
        p_low: f64,
    },
    Directional {
        p_direction: f64,
    },
}

/// Current minute plus its prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSnapshot {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    #[serde(flatten)]
    pub prediction: PredictionPayload,
}

/// Event pushed to a dispatcher's subscribers once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub prev: PrevSnapshot,
    pub current: CurrentSnapshot,
}

impl PredictionEvent {
    pub fn new(prev: &Observation, current: &Observation, prediction: PredictionPayload) -> Self {
        Self {
            prev: PrevSnapshot {
                timestamp: prev.timestamp,
                open: prev.open,
                close: prev.close,
                high: prev.high,
                low: prev.low,
            },
            current: CurrentSnapshot {
                timestamp: current.timestamp,
                open: current.open,
                prediction,
            },
        }
    }
}
