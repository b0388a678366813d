//! Quota Guard - API key rotation for the rate-limited policy-rate source
//!
//! AlphaVantage grants each key a small daily request budget. The guard maps
//! a request counter onto a key index, jumps the counter to the next key when
//! the provider reports exhaustion, and fails hard once every key is spent.
//!
//! The counter is never reset while the process lives. Refresh cadence is
//! tuned instead: one fetch every `86400 / (keys * limit)` seconds consumes
//! exactly one day's budget across all keys.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{ObserverError, Result};

const SECONDS_PER_DAY: u64 = 86_400;

/// API key chosen for one request attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTicket {
    /// Counter value the key was derived from
    pub counter: u64,
    /// Index into the configured key list
    pub key_index: usize,
}

/// Tracks key consumption for a multi-key, per-key-limited provider
#[derive(Debug)]
pub struct QuotaGuard {
    limit: u64,
    num_keys: usize,
    counter: AtomicU64,
}

impl QuotaGuard {
    /// Create a guard for `num_keys` keys of `limit` requests each
    ///
    /// `limit` must be at least 2 because keys are selected with a
    /// `limit - 1` divisor.
    pub fn new(limit: u64, num_keys: usize) -> Result<Self> {
        if limit < 2 {
            return Err(ObserverError::Config(format!(
                "per-key request limit must be >= 2, got {}",
                limit
            )));
        }
        if num_keys == 0 {
            return Err(ObserverError::Config(
                "at least one API key is required".to_string(),
            ));
        }

        Ok(Self {
            limit,
            num_keys,
            counter: AtomicU64::new(0),
        })
    }

    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Key index for a counter value
    ///
    /// Divides by `limit - 1`, not `limit`, so indices advance one request
    /// early. Kept as-is for compatibility with deployed key rotation.
    pub fn next_key(&self, counter: u64) -> usize {
        (counter / (self.limit - 1)) as usize
    }

    /// Counter value after the provider reported the current key exhausted
    pub fn record_exhaustion_response(&self, counter: u64) -> u64 {
        counter.saturating_add(self.limit)
    }

    /// True once the counter has walked past every key's budget
    pub fn is_fully_exhausted(&self, counter: u64) -> bool {
        counter >= self.limit.saturating_mul(self.num_keys as u64)
    }

    /// Choose the key for the next request attempt
    pub fn acquire(&self) -> Result<KeyTicket> {
        let counter = self.counter();
        let key_index = self.next_key(counter);

        // The limit - 1 divisor can point past the key list before the
        // exhaustion bound trips
        if self.is_fully_exhausted(counter) || key_index >= self.num_keys {
            return Err(ObserverError::QuotaExhausted {
                keys: self.num_keys,
                limit: self.limit,
            });
        }

        Ok(KeyTicket { counter, key_index })
    }

    /// Rotate past the key in `ticket`; returns the new counter
    pub fn report_exhausted(&self, ticket: &KeyTicket) -> u64 {
        let next = self.record_exhaustion_response(ticket.counter);
        // Monotonic even if two tickets for the same key report
        self.counter.fetch_max(next, Ordering::SeqCst);
        tracing::warn!(
            key_index = ticket.key_index,
            counter = next,
            "Policy-rate API key exhausted, rotating"
        );
        next
    }

    /// Cadence of the daily refresh task
    pub fn reset_interval(&self) -> Duration {
        let per_day = self.limit.saturating_mul(self.num_keys as u64);
        Duration::from_secs((SECONDS_PER_DAY / per_day).max(1))
    }
}

/// Last known policy rate and whether it must be fetched again
///
/// The refresh flag is set by the daily reset task and cleared by the cycle
/// that fetched a new rate. Each reset bumps a generation; a store only
/// clears the flag when no reset arrived since its lookup.
#[derive(Debug, Default)]
pub struct RateCache {
    state: RwLock<RateState>,
}

#[derive(Debug, Default)]
struct RateState {
    value: Option<f64>,
    needs_refresh: bool,
    generation: u64,
}

/// Cache read taken at the start of a cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLookup {
    /// Rate to reuse; `None` when this cycle must fetch
    pub fresh: Option<f64>,
    generation: u64,
}

impl RateCache {
    pub fn new(initial: Option<f64>) -> Self {
        Self {
            state: RwLock::new(RateState {
                value: initial,
                needs_refresh: initial.is_none(),
                generation: 0,
            }),
        }
    }

    /// Last known rate, even if a refresh is pending
    pub async fn cached(&self) -> Option<f64> {
        self.state.read().await.value
    }

    pub async fn needs_refresh(&self) -> bool {
        let state = self.state.read().await;
        state.needs_refresh || state.value.is_none()
    }

    pub async fn lookup(&self) -> RateLookup {
        let state = self.state.read().await;
        let fresh = if state.needs_refresh {
            None
        } else {
            state.value
        };
        RateLookup {
            fresh,
            generation: state.generation,
        }
    }

    /// Record a fetched rate
    ///
    /// The refresh flag survives if `mark_stale` ran after `lookup`.
    pub async fn store(&self, rate: f64, lookup: &RateLookup) {
        let mut state = self.state.write().await;
        state.value = Some(rate);
        if state.generation == lookup.generation {
            state.needs_refresh = false;
        } else {
            tracing::info!(
                fed_rate = rate,
                "Policy rate reset arrived during the cycle, refresh kept"
            );
        }
    }

    /// Flag the rate so the next cycle refetches
    pub async fn mark_stale(&self) {
        let mut state = self.state.write().await;
        state.needs_refresh = true;
        state.generation = state.generation.wrapping_add(1);
        tracing::info!(previous = ?state.value, "Policy rate marked for refresh");
    }
}
