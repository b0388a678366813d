//! Observation Aggregator - concurrent multi-source fetch
//!
//! Every cycle fans out to the price, currency-index and sentiment-index
//! sources, plus the policy-rate source when its cached value needs a
//! refresh. All fetches are joined before anything is merged: one failing
//! source fails the whole cycle and no partial observation escapes.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use crate::error::{ObserverError, Result};
use crate::quota::RateCache;
use crate::sources::SourceFetcher;
use crate::types::{
    Candle, CurrencyIndexRecord, Observation, PolicyRateRecord, SentimentIndexRecord,
};

pub type PriceSource = Arc<dyn SourceFetcher<Record = Vec<Candle>>>;
pub type CurrencyIndexSource = Arc<dyn SourceFetcher<Record = CurrencyIndexRecord>>;
pub type SentimentIndexSource = Arc<dyn SourceFetcher<Record = SentimentIndexRecord>>;
pub type PolicyRateSource = Arc<dyn SourceFetcher<Record = PolicyRateRecord>>;

/// Merges the four sources into a (previous, current) observation pair
#[derive(Clone)]
pub struct ObservationAggregator {
    price: PriceSource,
    dxy: CurrencyIndexSource,
    fng: SentimentIndexSource,
    rate: PolicyRateSource,
}

impl ObservationAggregator {
    pub fn new(
        price: PriceSource,
        dxy: CurrencyIndexSource,
        fng: SentimentIndexSource,
        rate: PolicyRateSource,
    ) -> Self {
        Self {
            price,
            dxy,
            fng,
            rate,
        }
    }

    /// Observe the previous and current minute
    ///
    /// The policy rate is fetched only when `rate_cache` is stale; otherwise
    /// the cached value is reused. A fetched rate is stored on success.
    pub async fn observe(&self, rate_cache: &RateCache) -> Result<(Observation, Observation)> {
        let lookup = rate_cache.lookup().await;

        let rate_fut = async {
            match lookup.fresh {
                Some(fed_rate) => Ok(PolicyRateRecord {
                    timestamp: Utc::now(),
                    fed_rate,
                }),
                None => self.rate.fetch().await,
            }
        };

        let (candles, dxy, fng, rate) = tokio::try_join!(
            self.price.fetch(),
            self.dxy.fetch(),
            self.fng.fetch(),
            rate_fut
        )?;

        let (prev_candle, cur_candle) = split_candles(&candles)?;

        let prev = Observation::merge(&prev_candle, &dxy, &fng, &rate);
        let current = Observation::merge(&cur_candle, &dxy, &fng, &rate);

        if lookup.fresh.is_none() {
            rate_cache.store(current.fed_rate, &lookup).await;
        }

        tracing::debug!(
            refreshed_rate = lookup.fresh.is_none(),
            current = %current,
            "Observation merged"
        );

        Ok((prev, current))
    }
}

/// Last two candles: the completed previous minute and the open current one
pub fn split_candles(candles: &[Candle]) -> Result<(Candle, Candle)> {
    let [.., prev, current] = candles else {
        return Err(ObserverError::unavailable(
            "binance",
            format!("expected at least 2 candles, got {}", candles.len()),
        ));
    };

    if current.timestamp - prev.timestamp != ChronoDuration::minutes(1) {
        return Err(ObserverError::unavailable(
            "binance",
            format!(
                "candles are not consecutive minutes: {} then {}",
                prev.timestamp, current.timestamp
            ),
        ));
    }

    Ok((*prev, *current))
}
