//! Sentiment scoring through a HuggingFace inference endpoint
//!
//! The model answers one list of `{label, score}` pairs per input text.
//! Labels `positive`, `negative` and `neutral` must all be present.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SentimentConfig;
use crate::error::{ObserverError, Result};
use crate::sentiment::ScoringBackend;
use crate::types::SentimentVector;

/// Texts per inference request
const BATCH_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct HuggingFaceScorer {
    client: reqwest::Client,
    url: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    inputs: &'a [String],
    options: ScoreOptions,
}

#[derive(Debug, Serialize)]
struct ScoreOptions {
    use_cache: bool,
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

impl HuggingFaceScorer {
    pub fn new(client: reqwest::Client, config: &SentimentConfig) -> Self {
        Self {
            client,
            url: config.scoring_url.clone(),
            token: bearer(&config.scoring_token),
        }
    }

    async fn score_batch(&self, texts: &[String]) -> anyhow::Result<Vec<SentimentVector>> {
        let request = ScoreRequest {
            inputs: texts,
            options: ScoreOptions {
                use_cache: true,
                wait_for_model: true,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.token)
            .json(&request)
            .send()
            .await
            .context("Failed to reach sentiment model")?;

        if !response.status().is_success() {
            bail!("Sentiment model returned error: {}", response.status());
        }

        let scores: Vec<Vec<LabelScore>> = response
            .json()
            .await
            .context("Failed to parse sentiment scores")?;

        scores.into_iter().map(to_vector).collect()
    }
}

#[async_trait]
impl ScoringBackend for HuggingFaceScorer {
    async fn score(&self, texts: &[String]) -> Result<Vec<SentimentVector>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            let scored = self
                .score_batch(batch)
                .await
                .map_err(|e| ObserverError::unavailable("sentiment_scoring", format!("{:#}", e)))?;
            vectors.extend(scored);
        }

        Ok(vectors)
    }
}

/// Accept tokens with or without the `Bearer ` prefix
fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

fn to_vector(labels: Vec<LabelScore>) -> anyhow::Result<SentimentVector> {
    let scores: HashMap<String, f64> = labels
        .into_iter()
        .map(|l| (l.label.to_lowercase(), l.score))
        .collect();

    let get = |label: &str| {
        scores
            .get(label)
            .copied()
            .with_context(|| format!("model output has no '{}' label", label))
    };

    Ok(SentimentVector::new(
        get("positive")?,
        get("negative")?,
        get("neutral")?,
    ))
}
