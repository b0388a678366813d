//! Prediction Broadcaster
//!
//! Per-model output channel. Subscribers (SSE clients) each get their own
//! receiver; a slow subscriber lags without affecting the dispatcher.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::types::PredictionEvent;

#[derive(Debug, Clone)]
pub struct PredictionBroadcaster {
    tx: broadcast::Sender<Arc<PredictionEvent>>,
}

impl PredictionBroadcaster {
    /// Create a new broadcaster with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to receive future predictions
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PredictionEvent>> {
        self.tx.subscribe()
    }

    /// Publish an event, returning the number of subscribers reached
    pub fn publish(&self, event: Arc<PredictionEvent>) -> usize {
        // No subscribers is fine
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
