//! Error taxonomy for the observation pipeline
//!
//! Every failure that can stop a cycle maps onto one of these variants.
//! None of them are retried by the aggregator itself.

use thiserror::Error;

/// Errors raised by sources, the quota guard, the scheduler and the models
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Transport or parse failure from one upstream provider
    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        source_name: &'static str,
        reason: String,
    },

    /// Every API key spent its daily budget
    #[error("quota exhausted across {keys} keys (limit {limit} per key)")]
    QuotaExhausted { keys: usize, limit: u64 },

    /// A periodic task returned an error
    #[error("scheduled task '{task}' failed: {reason}")]
    SchedulerTaskFailure { task: String, reason: String },

    /// Model loading or inference failure
    #[error("model error: {0}")]
    Model(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ObserverError {
    pub fn unavailable(source_name: &'static str, reason: impl ToString) -> Self {
        ObserverError::SourceUnavailable {
            source_name,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObserverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ObserverError::unavailable("binance", "connection reset");
        assert_eq!(
            err.to_string(),
            "source binance unavailable: connection reset"
        );

        let err = ObserverError::QuotaExhausted { keys: 2, limit: 25 };
        assert_eq!(
            err.to_string(),
            "quota exhausted across 2 keys (limit 25 per key)"
        );
    }
}
