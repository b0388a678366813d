//! Service wiring - sources, cycle runner, quota reset and dispatchers
//!
//! ```text
//! PeriodicTask(observation_cycle) --observe + sentiment--> broadcast<CycleSnapshot>
//!                                                           |-> dispatcher(info) -> /info
//!                                                           |-> dispatcher(lgr)  -> /lgr
//!                                                           `-> dispatcher(elr)  -> /elr
//! PeriodicTask(policy_rate_refresh) --mark_stale--> RateCache
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::select_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ModelKind};
use crate::dispatch::{PredictionBroadcaster, PredictionDispatcher};
use crate::error::{ObserverError, Result};
use crate::models::{load_model, Model};
use crate::observer::ObservationAggregator;
use crate::quota::{QuotaGuard, RateCache};
use crate::scheduler::{FailurePolicy, PeriodicTask};
use crate::sentiment::{HuggingFaceScorer, NewsApiSearch, SentimentAggregator};
use crate::sources::{http_client, BinanceKlines, DxyChart, FearGreedIndex, FedFundRate};
use crate::types::{CycleSnapshot, PredictionEvent};

/// One observation + sentiment cycle, broadcast to every dispatcher
pub struct ObservationCycle {
    observer: ObservationAggregator,
    sentiment: SentimentAggregator,
    keywords: String,
    rate_cache: Arc<RateCache>,
    tx: broadcast::Sender<Arc<CycleSnapshot>>,
    last_cycle: LastCycle,
}

/// Timestamp of the last published snapshot, shared with the transport
pub type LastCycle = Arc<RwLock<Option<DateTime<Utc>>>>;

impl ObservationCycle {
    pub fn new(
        observer: ObservationAggregator,
        sentiment: SentimentAggregator,
        keywords: impl Into<String>,
        rate_cache: Arc<RateCache>,
        capacity: usize,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            observer,
            sentiment,
            keywords: keywords.into(),
            rate_cache,
            tx,
            last_cycle: Arc::new(RwLock::new(None)),
        }
    }

    /// Receiver for snapshots published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CycleSnapshot>> {
        self.tx.subscribe()
    }

    pub fn rate_cache(&self) -> &Arc<RateCache> {
        &self.rate_cache
    }

    /// Timestamp of the last published snapshot
    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.read().await
    }

    pub fn last_cycle_cell(&self) -> LastCycle {
        self.last_cycle.clone()
    }

    /// Observe and score concurrently, then publish the joined snapshot
    ///
    /// Nothing is published unless both halves succeed.
    pub async fn run_once(&self) -> Result<Arc<CycleSnapshot>> {
        let started = std::time::Instant::now();

        let ((prev, current), sentiment) = tokio::try_join!(
            self.observer.observe(&self.rate_cache),
            self.sentiment.general_sentiment(&self.keywords)
        )?;

        let snapshot = Arc::new(CycleSnapshot {
            prev,
            current,
            sentiment,
        });

        // No dispatcher subscribed is not an error
        let receivers = self.tx.send(snapshot.clone()).unwrap_or(0);
        *self.last_cycle.write().await = Some(current.timestamp);

        tracing::info!(
            timestamp = %current.timestamp,
            open = current.open,
            close = current.close,
            fed_rate = current.fed_rate,
            net_sentiment = sentiment.net(),
            receivers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle published"
        );

        Ok(snapshot)
    }
}

/// Output side of one registered model
#[derive(Debug, Clone)]
pub struct ModelStream {
    pub name: String,
    pub kind: ModelKind,
    pub output: PredictionBroadcaster,
}

/// Cloneable read access to a running service, used by the transport
#[derive(Clone)]
pub struct ServiceHandle {
    streams: Arc<Vec<ModelStream>>,
    last_cycle: LastCycle,
}

impl ServiceHandle {
    pub fn new(streams: Vec<ModelStream>, last_cycle: LastCycle) -> Self {
        Self {
            streams: Arc::new(streams),
            last_cycle,
        }
    }

    pub fn models(&self) -> &[ModelStream] {
        &self.streams
    }

    /// Subscribe to the prediction stream of `model`
    pub fn subscribe(&self, model: &str) -> Option<broadcast::Receiver<Arc<PredictionEvent>>> {
        self.streams
            .iter()
            .find(|s| s.name == model)
            .map(|s| s.output.subscribe())
    }

    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle.read().await
    }
}

/// Fully wired but not yet started service
pub struct Service {
    cycle: Arc<ObservationCycle>,
    quota: Arc<QuotaGuard>,
    dispatchers: Vec<PredictionDispatcher>,
    streams: Arc<Vec<ModelStream>>,
    interval: Duration,
    on_failure: FailurePolicy,
}

impl Service {
    /// Wire a service from parts; each model gets its own dispatcher
    pub fn new(
        cycle: Arc<ObservationCycle>,
        quota: Arc<QuotaGuard>,
        models: Vec<(String, Arc<dyn Model>)>,
        interval: Duration,
        output_capacity: usize,
    ) -> Self {
        let mut dispatchers = Vec::with_capacity(models.len());
        let mut streams = Vec::with_capacity(models.len());

        for (name, model) in models {
            let output = PredictionBroadcaster::new(output_capacity.max(1));
            streams.push(ModelStream {
                name: name.clone(),
                kind: model.kind(),
                output: output.clone(),
            });
            dispatchers.push(PredictionDispatcher::new(
                name,
                model,
                cycle.subscribe(),
                output,
            ));
        }

        Self {
            cycle,
            quota,
            dispatchers,
            streams: Arc::new(streams),
            interval,
            on_failure: FailurePolicy::default(),
        }
    }

    /// Build every collaborator from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http.timeout_secs);
        let client = http_client(timeout, config.http.proxy.as_deref())?;
        // AlphaVantage rejects proxied requests
        let direct_client = http_client(timeout, None)?;

        let quota = Arc::new(QuotaGuard::new(
            config.alpha_vantage.limit,
            config.alpha_vantage.keys.len(),
        )?);
        let rate_cache = Arc::new(RateCache::new(config.alpha_vantage.initial_rate));

        let observer = ObservationAggregator::new(
            Arc::new(BinanceKlines::new(client.clone(), &config.binance)),
            Arc::new(DxyChart::new(client.clone(), &config.dxy)),
            Arc::new(FearGreedIndex::new(client.clone(), &config.fng)),
            Arc::new(FedFundRate::new(
                direct_client,
                &config.alpha_vantage,
                quota.clone(),
            )?),
        );

        let sentiment = SentimentAggregator::new(
            Arc::new(NewsApiSearch::new(client.clone(), &config.sentiment)),
            Arc::new(HuggingFaceScorer::new(client, &config.sentiment)),
            config.sentiment.max_results,
        )
        .with_time_window(
            config
                .sentiment
                .time_window_hours
                .map(|hours| ChronoDuration::hours(hours as i64)),
        );

        let cycle = Arc::new(ObservationCycle::new(
            observer,
            sentiment,
            config.sentiment.keywords.clone(),
            rate_cache,
            config.scheduler.cycle_capacity,
        ));

        let models = config
            .models
            .iter()
            .map(|m| Ok((m.name.clone(), load_model(m)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(
            cycle,
            quota,
            models,
            Duration::from_secs(config.scheduler.prediction_interval_secs),
            config.scheduler.output_capacity,
        ))
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            streams: self.streams.clone(),
            last_cycle: self.cycle.last_cycle_cell(),
        }
    }

    /// Spawn the cycle runner, the quota-reset runner and every dispatcher
    pub fn start(self) -> RunningService {
        let handle = self.handle();
        let mut tasks = Vec::with_capacity(self.dispatchers.len() + 2);

        let cycle = self.cycle.clone();
        tasks.push((
            "observation_cycle".to_string(),
            PeriodicTask::new("observation_cycle", self.interval)
                .with_failure_policy(self.on_failure)
                .spawn(move || {
                    let cycle = cycle.clone();
                    async move { cycle.run_once().await.map(|_| ()) }
                }),
        ));

        let rate_cache = self.cycle.rate_cache().clone();
        tasks.push((
            "policy_rate_refresh".to_string(),
            PeriodicTask::new("policy_rate_refresh", self.quota.reset_interval())
                .with_failure_policy(self.on_failure)
                .spawn(move || {
                    let rate_cache = rate_cache.clone();
                    async move {
                        rate_cache.mark_stale().await;
                        Ok(())
                    }
                }),
        ));

        for dispatcher in self.dispatchers {
            let name = format!("dispatcher:{}", dispatcher.name());
            tasks.push((name, tokio::spawn(dispatcher.run())));
        }

        tracing::info!(
            tasks = tasks.len(),
            interval_secs = self.interval.as_secs(),
            refresh_secs = self.quota.reset_interval().as_secs(),
            "Service started"
        );

        RunningService { handle, tasks }
    }
}

/// Spawned service tasks
pub struct RunningService {
    handle: ServiceHandle,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
}

impl RunningService {
    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    /// Resolve when the first task ends; the others are aborted
    pub async fn wait(self) -> Result<()> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let (names, handles): (Vec<String>, Vec<_>) = self.tasks.into_iter().unzip();
        let (result, index, rest) = select_all(handles).await;
        for task in &rest {
            task.abort();
        }

        let task = names[index].clone();
        match result {
            Ok(Ok(())) => {
                tracing::info!(task = %task, "Service task finished");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ObserverError::SchedulerTaskFailure {
                task,
                reason: e.to_string(),
            }),
        }
    }

    pub fn shutdown(&self) {
        for (name, task) in &self.tasks {
            tracing::debug!(task = %name, "Aborting service task");
            task.abort();
        }
    }
}
