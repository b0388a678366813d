//! Sentiment Aggregator - time-weighted news sentiment
//!
//! Searches recent news, scores every item with an NLP model and averages
//! the scores, weighting each item by how close its publish hour is to the
//! current hour:
//!
//! ```text
//! weight = 24 - |current_hour - item_hour|
//! ```
//!
//! The hour distance is taken on a plain 0..23 scale and does not wrap
//! around midnight (23:00 and 01:00 are 22 hours apart).

mod scoring;
mod search;

pub use scoring::HuggingFaceScorer;
pub use search::NewsApiSearch;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::sync::Arc;

use crate::error::{ObserverError, Result};
use crate::types::SentimentVector;

/// One news hit
#[derive(Debug, Clone, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub body: String,
    pub published: DateTime<Utc>,
}

impl NewsItem {
    /// Text sent to the scoring model
    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

/// News search capability
///
/// `since` restricts results to items published at or after that instant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        keywords: &str,
        max_results: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NewsItem>>;
}

/// NLP scoring capability; returns one vector per input text, in order
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    async fn score(&self, texts: &[String]) -> Result<Vec<SentimentVector>>;
}

/// Combines search and scoring into one market-wide sentiment vector
#[derive(Clone)]
pub struct SentimentAggregator {
    search: Arc<dyn SearchBackend>,
    scorer: Arc<dyn ScoringBackend>,
    max_results: usize,
    time_window: Option<ChronoDuration>,
}

impl SentimentAggregator {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        scorer: Arc<dyn ScoringBackend>,
        max_results: usize,
    ) -> Self {
        Self {
            search,
            scorer,
            max_results,
            time_window: None,
        }
    }

    /// Only consider news published within `window` of the cycle
    pub fn with_time_window(mut self, window: Option<ChronoDuration>) -> Self {
        self.time_window = window;
        self
    }

    /// Current general sentiment for `keywords`
    pub async fn general_sentiment(&self, keywords: &str) -> Result<SentimentVector> {
        self.general_sentiment_at(keywords, Utc::now()).await
    }

    /// Same as `general_sentiment`, weighting against the given clock
    pub async fn general_sentiment_at(
        &self,
        keywords: &str,
        now: DateTime<Utc>,
    ) -> Result<SentimentVector> {
        let since = self.time_window.map(|window| now - window);
        let mut news = self.search.search(keywords, self.max_results, since).await?;
        news.truncate(self.max_results);

        if news.is_empty() {
            tracing::warn!(keywords = %keywords, "No news found, using neutral sentiment");
            return Ok(SentimentVector::neutral());
        }

        let texts: Vec<String> = news.iter().map(NewsItem::text).collect();
        let scores = self.scorer.score(&texts).await?;

        if scores.len() != news.len() {
            return Err(ObserverError::unavailable(
                "sentiment_scoring",
                format!("scored {} of {} texts", scores.len(), news.len()),
            ));
        }

        let weighted: Vec<(SentimentVector, f64)> = scores
            .into_iter()
            .zip(news.iter())
            .map(|(score, item)| (score, time_weight(now.hour(), item.published.hour())))
            .collect();

        let sentiment = weighted_average(&weighted);

        tracing::info!(
            items = news.len(),
            positive = sentiment.positive,
            negative = sentiment.negative,
            neutral = sentiment.neutral,
            "General sentiment computed"
        );

        Ok(sentiment)
    }
}

/// Proximity weight of an item published at `item_hour`
pub fn time_weight(current_hour: u32, item_hour: u32) -> f64 {
    24.0 - (current_hour as f64 - item_hour as f64).abs()
}

/// Weighted arithmetic mean per component; neutral when there is no weight
pub fn weighted_average(items: &[(SentimentVector, f64)]) -> SentimentVector {
    let total: f64 = items.iter().map(|(_, w)| *w).sum();
    if items.is_empty() || total <= 0.0 {
        return SentimentVector::neutral();
    }

    items
        .iter()
        .fold(SentimentVector::default(), |acc, (s, w)| acc + *s * *w)
        / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(hour: u32) -> NewsItem {
        NewsItem {
            title: format!("headline {}", hour),
            body: "body".to_string(),
            published: Utc.with_ymd_and_hms(2024, 3, 1, hour, 5, 0).unwrap(),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_time_weight() {
        assert_eq!(time_weight(12, 12), 24.0);
        assert_eq!(time_weight(12, 9), 21.0);
        assert_eq!(time_weight(9, 12), 21.0);
        // No wrap-around at midnight
        assert_eq!(time_weight(23, 1), 2.0);
        assert_eq!(time_weight(0, 23), 1.0);
    }

    #[test]
    fn test_weighted_average_equal_weights_is_mean() {
        let items = vec![
            (SentimentVector::new(0.6, 0.1, 0.3), 5.0),
            (SentimentVector::new(0.2, 0.5, 0.3), 5.0),
            (SentimentVector::new(0.1, 0.1, 0.8), 5.0),
        ];
        let avg = weighted_average(&items);
        assert!(approx(avg.positive, 0.3));
        assert!(approx(avg.negative, 0.7 / 3.0));
        assert!(approx(avg.neutral, 1.4 / 3.0));
    }

    #[test]
    fn test_weighted_average_favours_heavier_items() {
        let items = vec![
            (SentimentVector::new(1.0, 0.0, 0.0), 24.0),
            (SentimentVector::new(0.0, 1.0, 0.0), 8.0),
        ];
        let avg = weighted_average(&items);
        assert!(approx(avg.positive, 0.75));
        assert!(approx(avg.negative, 0.25));
    }

    #[test]
    fn test_weighted_average_empty_is_neutral() {
        assert_eq!(weighted_average(&[]), SentimentVector::neutral());
    }

    #[tokio::test]
    async fn test_no_news_returns_neutral() {
        let mut search = MockSearchBackend::new();
        search.expect_search().returning(|_, _, _| Ok(Vec::new()));
        let mut scorer = MockScoringBackend::new();
        scorer.expect_score().never();

        let aggregator = SentimentAggregator::new(Arc::new(search), Arc::new(scorer), 100);
        let sentiment = aggregator.general_sentiment("bitcoin").await.unwrap();

        assert_eq!(sentiment, SentimentVector::neutral());
    }

    #[tokio::test]
    async fn test_weights_by_publish_hour() {
        let mut search = MockSearchBackend::new();
        search
            .expect_search()
            .withf(|keywords, max, since| {
                keywords == "bitcoin sentiment news" && *max == 10 && since.is_none()
            })
            .returning(|_, _, _| Ok(vec![item(12), item(4)]));

        let mut scorer = MockScoringBackend::new();
        scorer
            .expect_score()
            .withf(|texts| texts.len() == 2 && texts[0] == "headline 12\nbody")
            .returning(|_| {
                Ok(vec![
                    SentimentVector::new(1.0, 0.0, 0.0),
                    SentimentVector::new(0.0, 1.0, 0.0),
                ])
            });

        let aggregator = SentimentAggregator::new(Arc::new(search), Arc::new(scorer), 10);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let sentiment = aggregator
            .general_sentiment_at("bitcoin sentiment news", now)
            .await
            .unwrap();

        // Weights 24 and 16
        assert!(approx(sentiment.positive, 0.6));
        assert!(approx(sentiment.negative, 0.4));
        assert!(approx(sentiment.neutral, 0.0));
    }

    #[tokio::test]
    async fn test_score_count_mismatch_is_error() {
        let mut search = MockSearchBackend::new();
        search
            .expect_search()
            .returning(|_, _, _| Ok(vec![item(1), item(2)]));
        let mut scorer = MockScoringBackend::new();
        scorer
            .expect_score()
            .returning(|_| Ok(vec![SentimentVector::neutral()]));

        let aggregator = SentimentAggregator::new(Arc::new(search), Arc::new(scorer), 10);
        assert!(aggregator.general_sentiment("bitcoin").await.is_err());
    }

    #[tokio::test]
    async fn test_time_window_bounds_search() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();

        let mut search = MockSearchBackend::new();
        search
            .expect_search()
            .withf(move |_, _, since| *since == Some(expected))
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let mut scorer = MockScoringBackend::new();
        scorer.expect_score().never();

        let aggregator = SentimentAggregator::new(Arc::new(search), Arc::new(scorer), 10)
            .with_time_window(Some(ChronoDuration::hours(24)));
        let sentiment = aggregator
            .general_sentiment_at("bitcoin", now)
            .await
            .unwrap();

        assert_eq!(sentiment, SentimentVector::neutral());
    }
}
