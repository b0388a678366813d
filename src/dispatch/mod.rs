//! Prediction Dispatcher - one consumer loop per model
//!
//! Each dispatcher owns its own broadcast receiver of cycle snapshots, so a
//! slow model only lags (and drops its own oldest snapshots) without holding
//! back the cycle or its peers.
//!
//! ```text
//! WaitingForCycle -> Fetched -> Adjusted -> Published -> WaitingForCycle
//! ```

mod adjust;
mod broadcaster;

pub use adjust::{
    adjust_continuous, adjust_direction, apply_sentiment, sentiment_dampener, FLIP_THRESHOLD,
};
pub use broadcaster::PredictionBroadcaster;

use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::Model;
use crate::types::{CycleSnapshot, PredictionEvent};

/// Where a dispatcher is within its per-cycle work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    WaitingForCycle,
    /// Snapshot received and the model has predicted
    Fetched,
    /// Sentiment adjustment applied
    Adjusted,
    Published,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::WaitingForCycle => write!(f, "waiting_for_cycle"),
            DispatcherState::Fetched => write!(f, "fetched"),
            DispatcherState::Adjusted => write!(f, "adjusted"),
            DispatcherState::Published => write!(f, "published"),
        }
    }
}

pub struct PredictionDispatcher {
    name: String,
    model: Arc<dyn Model>,
    input: broadcast::Receiver<Arc<CycleSnapshot>>,
    output: PredictionBroadcaster,
    state: DispatcherState,
}

impl PredictionDispatcher {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn Model>,
        input: broadcast::Receiver<Arc<CycleSnapshot>>,
        output: PredictionBroadcaster,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            input,
            output,
            state: DispatcherState::WaitingForCycle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Predict, adjust and publish one snapshot
    pub fn process(&mut self, snapshot: &CycleSnapshot) -> Result<Arc<PredictionEvent>> {
        self.state = DispatcherState::WaitingForCycle;

        let raw = self.model.predict(&snapshot.current.features())?;
        self.transition(DispatcherState::Fetched);

        let payload = apply_sentiment(raw, &snapshot.sentiment);
        self.transition(DispatcherState::Adjusted);

        let event = Arc::new(PredictionEvent::new(
            &snapshot.prev,
            &snapshot.current,
            payload,
        ));
        let receivers = self.output.publish(event.clone());
        self.transition(DispatcherState::Published);

        tracing::info!(
            model = %self.name,
            timestamp = %snapshot.current.timestamp,
            receivers,
            prediction = ?event.current.prediction,
            "Prediction published"
        );

        Ok(event)
    }

    /// Consume snapshots until the cycle side shuts down
    ///
    /// Model failures are returned and end the dispatcher.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(model = %self.name, kind = %self.model.kind(), "Dispatcher started");

        loop {
            self.transition(DispatcherState::WaitingForCycle);

            match self.input.recv().await {
                Ok(snapshot) => {
                    if let Err(e) = self.process(&snapshot) {
                        tracing::error!(model = %self.name, error = %e, "Prediction failed");
                        return Err(e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        model = %self.name,
                        skipped,
                        "Dispatcher lagged, oldest snapshots dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(model = %self.name, "Cycle channel closed, dispatcher stopping");
                    return Ok(());
                }
            }
        }
    }

    fn transition(&mut self, next: DispatcherState) {
        tracing::trace!(model = %self.name, from = %self.state, to = %next, "Dispatcher state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::error::ObserverError;
    use crate::models::{MockModel, RawPrediction};
    use crate::types::{Observation, PredictionPayload, SentimentVector};
    use chrono::{TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    fn observation(minute: u32, open: f64, close: f64) -> Observation {
        Observation {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
            open,
            high: close + 1.0,
            low: open - 1.0,
            close,
            volume: 12.0,
            quote_asset_volume: 1200.0,
            number_of_trades: 40,
            taker_buy_base_asset_volume: 6.0,
            taker_buy_quote_asset_volume: 600.0,
            open_dxy: 105.2,
            fng: 45,
            fed_rate: 5.25,
        }
    }

    fn snapshot(sentiment: SentimentVector) -> Arc<CycleSnapshot> {
        Arc::new(CycleSnapshot {
            prev: observation(58, 98.0, 99.0),
            current: observation(59, 99.0, 100.0),
            sentiment,
        })
    }

    fn directional_model(label: f64) -> Arc<dyn Model> {
        let mut model = MockModel::new();
        model.expect_kind().return_const(ModelKind::Logistic);
        model
            .expect_predict()
            .withf(|features| features.len() == Observation::NUM_FEATURES)
            .returning(move |_| Ok(RawPrediction::Direction(label)));
        Arc::new(model)
    }

    #[test]
    fn test_process_publishes_adjusted_event() {
        let (_tx, rx) = broadcast::channel(4);
        let output = PredictionBroadcaster::new(4);
        let mut sub = output.subscribe();

        let mut dispatcher = PredictionDispatcher::new("lgr", directional_model(1.0), rx, output);
        let event = dispatcher
            .process(&snapshot(SentimentVector::new(0.1, 0.8, 0.1)))
            .unwrap();

        assert_eq!(dispatcher.state(), DispatcherState::Published);
        assert_eq!(
            event.current.prediction,
            PredictionPayload::Directional { p_direction: -1.0 }
        );
        assert_eq!(event.prev.close, 99.0);
        assert_eq!(event.current.open, 99.0);

        let received = sub.try_recv().unwrap();
        assert_eq!(*received, *event);
    }

    #[test]
    fn test_model_error_propagates() {
        let mut model = MockModel::new();
        model.expect_kind().return_const(ModelKind::Linear);
        model
            .expect_predict()
            .returning(|_| Err(ObserverError::Model("dimension mismatch".to_string())));

        let (_tx, rx) = broadcast::channel(4);
        let mut dispatcher =
            PredictionDispatcher::new("info", Arc::new(model), rx, PredictionBroadcaster::new(4));

        assert_err!(dispatcher.process(&snapshot(SentimentVector::neutral())));
        assert_eq!(dispatcher.state(), DispatcherState::WaitingForCycle);
    }

    #[tokio::test]
    async fn test_run_until_channel_closes() {
        let (tx, rx) = broadcast::channel(4);
        let output = PredictionBroadcaster::new(4);
        let mut sub = output.subscribe();

        let dispatcher = PredictionDispatcher::new("lgr", directional_model(-1.0), rx, output);
        let handle = tokio::spawn(dispatcher.run());

        tx.send(snapshot(SentimentVector::neutral())).unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(
            event.current.prediction,
            PredictionPayload::Directional { p_direction: -1.0 }
        );

        drop(tx);
        assert_ok!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_lagged_dispatcher_keeps_running() {
        let (tx, rx) = broadcast::channel(2);
        let output = PredictionBroadcaster::new(16);
        let mut sub = output.subscribe();

        // Five snapshots into a capacity-two channel before the dispatcher runs
        for _ in 0..5 {
            tx.send(snapshot(SentimentVector::neutral())).unwrap();
        }

        let dispatcher = PredictionDispatcher::new("lgr", directional_model(1.0), rx, output);
        let handle = tokio::spawn(dispatcher.run());

        // Only the two newest survive
        assert!(sub.recv().await.is_ok());
        assert!(sub.recv().await.is_ok());

        drop(tx);
        assert_ok!(handle.await.unwrap());
        assert!(sub.try_recv().is_err());
    }
}
