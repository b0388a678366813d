//! Tests for the observation cycle and service wiring

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use pricecast::config::ModelKind;
    use pricecast::models::{Model, RawPrediction};
    use pricecast::observer::ObservationAggregator;
    use pricecast::quota::{QuotaGuard, RateCache};
    use pricecast::scheduler::FailurePolicy;
    use pricecast::sentiment::{NewsItem, ScoringBackend, SearchBackend, SentimentAggregator};
    use pricecast::service::{ObservationCycle, Service};
    use pricecast::sources::SourceFetcher;
    use pricecast::types::{
        Candle, CurrencyIndexRecord, PolicyRateRecord, PredictionPayload, SentimentIndexRecord,
        SentimentVector,
    };
    use pricecast::{ObserverError, Result};

    // ============================================================================
    // Fakes
    // ============================================================================

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    fn candle(minute: u32, open: f64, close: f64) -> Candle {
        Candle {
            timestamp: ts(minute),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume: 20.0 + minute as f64,
            quote_asset_volume: 2000.0,
            number_of_trades: 50,
            taker_buy_base_asset_volume: 10.0,
            taker_buy_quote_asset_volume: 1000.0,
        }
    }

    struct Prices;

    #[async_trait]
    impl SourceFetcher for Prices {
        type Record = Vec<Candle>;

        fn name(&self) -> &'static str {
            "binance"
        }

        async fn fetch(&self) -> Result<Vec<Candle>> {
            Ok(vec![
                candle(55, 96.0, 97.0),
                candle(56, 97.0, 97.5),
                candle(57, 97.5, 98.0),
                candle(58, 98.0, 99.0),
                candle(59, 99.0, 100.0),
            ])
        }
    }

    struct Dxy;

    #[async_trait]
    impl SourceFetcher for Dxy {
        type Record = CurrencyIndexRecord;

        fn name(&self) -> &'static str {
            "dxy"
        }

        async fn fetch(&self) -> Result<CurrencyIndexRecord> {
            Ok(CurrencyIndexRecord {
                timestamp: ts(59),
                open_dxy: 105.2,
            })
        }
    }

    struct Fng {
        fail: bool,
    }

    #[async_trait]
    impl SourceFetcher for Fng {
        type Record = SentimentIndexRecord;

        fn name(&self) -> &'static str {
            "fng"
        }

        async fn fetch(&self) -> Result<SentimentIndexRecord> {
            if self.fail {
                return Err(ObserverError::unavailable("fng", "connection reset"));
            }
            Ok(SentimentIndexRecord {
                timestamp: ts(59),
                fng: 45,
            })
        }
    }

    #[derive(Default)]
    struct Rate {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for Rate {
        type Record = PolicyRateRecord;

        fn name(&self) -> &'static str {
            "alpha_vantage"
        }

        async fn fetch(&self) -> Result<PolicyRateRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PolicyRateRecord {
                timestamp: ts(59),
                fed_rate: 5.25,
            })
        }
    }

    struct News;

    #[async_trait]
    impl SearchBackend for News {
        async fn search(
            &self,
            _keywords: &str,
            _max_results: usize,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<NewsItem>> {
            Ok(vec![
                NewsItem {
                    title: "Bitcoin slides".to_string(),
                    body: "Selling pressure builds".to_string(),
                    published: ts(10),
                },
                NewsItem {
                    title: "Miners capitulate".to_string(),
                    body: "Hash rate drops".to_string(),
                    published: ts(20),
                },
            ])
        }
    }

    struct Bearish;

    #[async_trait]
    impl ScoringBackend for Bearish {
        async fn score(&self, texts: &[String]) -> Result<Vec<SentimentVector>> {
            Ok(texts
                .iter()
                .map(|_| SentimentVector::new(0.05, 0.85, 0.10))
                .collect())
        }
    }

    struct Constant(RawPrediction, ModelKind);

    impl Model for Constant {
        fn kind(&self) -> ModelKind {
            self.1
        }

        fn predict(&self, _features: &[f64]) -> Result<RawPrediction> {
            Ok(self.0)
        }
    }

    fn cycle(rate: Arc<Rate>, rate_cache: Arc<RateCache>, fail_fng: bool) -> Arc<ObservationCycle> {
        let observer = ObservationAggregator::new(
            Arc::new(Prices),
            Arc::new(Dxy),
            Arc::new(Fng { fail: fail_fng }),
            rate,
        );
        let sentiment = SentimentAggregator::new(Arc::new(News), Arc::new(Bearish), 100);
        Arc::new(ObservationCycle::new(
            observer,
            sentiment,
            "bitcoin sentiment news",
            rate_cache,
            4,
        ))
    }

    fn models() -> Vec<(String, Arc<dyn Model>)> {
        vec![
            (
                "info".to_string(),
                Arc::new(Constant(
                    RawPrediction::Continuous {
                        close: 100.0,
                        high: 102.0,
                        low: 98.0,
                    },
                    ModelKind::Linear,
                )),
            ),
            (
                "lgr".to_string(),
                Arc::new(Constant(RawPrediction::Direction(1.0), ModelKind::Logistic)),
            ),
        ]
    }

    // ============================================================================
    // Observation cycle
    // ============================================================================

    #[tokio::test]
    async fn test_cycle_merges_sources_and_reuses_rate() {
        let rate = Arc::new(Rate::default());
        let cache = Arc::new(RateCache::new(None));
        let cycle = cycle(rate.clone(), cache.clone(), false);

        let first = cycle.run_once().await.unwrap();
        assert_eq!(first.current.open, 99.0);
        assert_eq!(first.current.close, 100.0);
        assert_eq!(first.current.open_dxy, 105.2);
        assert_eq!(first.current.fng, 45);
        assert_eq!(first.current.fed_rate, 5.25);
        assert_eq!(first.prev.timestamp, ts(58));
        assert_eq!(first.prev.open_dxy, first.current.open_dxy);
        assert_eq!(first.prev.fng, first.current.fng);
        assert_eq!(first.prev.fed_rate, first.current.fed_rate);
        assert_eq!(rate.calls.load(Ordering::SeqCst), 1);

        // Cache present: no second rate fetch
        let second = cycle.run_once().await.unwrap();
        assert_eq!(second.current.fed_rate, 5.25);
        assert_eq!(rate.calls.load(Ordering::SeqCst), 1);

        // Refresh flag set: next cycle refetches
        cache.mark_stale().await;
        cycle.run_once().await.unwrap();
        assert_eq!(rate.calls.load(Ordering::SeqCst), 2);

        assert_eq!(cycle.last_cycle().await, Some(ts(59)));
    }

    #[tokio::test]
    async fn test_cycle_publishes_weighted_sentiment() {
        let cycle = cycle(Arc::new(Rate::default()), Arc::new(RateCache::new(None)), false);
        let mut rx = cycle.subscribe();

        cycle.run_once().await.unwrap();
        let snapshot = rx.recv().await.unwrap();

        assert!((snapshot.sentiment.negative - 0.85).abs() < 1e-9);
        assert!(snapshot.sentiment.net() < -0.4);
    }

    #[tokio::test]
    async fn test_failed_source_publishes_nothing() {
        let cycle = cycle(Arc::new(Rate::default()), Arc::new(RateCache::new(None)), true);
        let mut rx = cycle.subscribe();

        let err = cycle.run_once().await.unwrap_err();
        assert!(matches!(err, ObserverError::SourceUnavailable { source_name: "fng", .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(cycle.last_cycle().await, None);
    }

    // ============================================================================
    // Service
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_service_streams_adjusted_predictions() {
        let cycle = cycle(Arc::new(Rate::default()), Arc::new(RateCache::new(None)), false);
        let quota = Arc::new(QuotaGuard::new(25, 2).unwrap());

        let service = Service::new(cycle, quota, models(), Duration::from_secs(60), 8)
            .with_failure_policy(FailurePolicy::Stop);
        let handle = service.handle();
        let mut info = handle.subscribe("info").unwrap();
        let mut lgr = handle.subscribe("lgr").unwrap();
        assert!(handle.subscribe("elr").is_none());

        let running = service.start();

        // Paused clock auto-advances to the first 60s tick
        let event = info.recv().await.unwrap();
        match event.current.prediction {
            PredictionPayload::Continuous { p_close, p_high, p_low } => {
                // Bearish sentiment scales every target down
                assert!(p_close < 100.0 && p_close > 87.5);
                assert!(p_high < 102.0);
                assert!(p_low < 98.0);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(event.current.open, 99.0);
        assert_eq!(event.prev.close, 99.0);

        // Strong bearish sentiment flips the up call
        let event = lgr.recv().await.unwrap();
        assert_eq!(
            event.current.prediction,
            PredictionPayload::Directional { p_direction: -1.0 }
        );

        assert_eq!(handle.last_cycle().await, Some(ts(59)));
        running.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_stops_on_cycle_failure() {
        let cycle = cycle(Arc::new(Rate::default()), Arc::new(RateCache::new(None)), true);
        let quota = Arc::new(QuotaGuard::new(25, 2).unwrap());

        let running = Service::new(cycle, quota, models(), Duration::from_secs(60), 8)
            .with_failure_policy(FailurePolicy::Stop)
            .start();

        let err = running.wait().await.unwrap_err();
        match err {
            ObserverError::SchedulerTaskFailure { task, reason } => {
                assert_eq!(task, "observation_cycle");
                assert!(reason.contains("fng"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
