//! News search over a NewsAPI-compatible endpoint

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::SentimentConfig;
use crate::error::{ObserverError, Result};
use crate::sentiment::{NewsItem, SearchBackend};

/// NewsAPI caps a single page at 100 articles
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct NewsApiSearch {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    published_at: DateTime<Utc>,
}

impl NewsApiSearch {
    pub fn new(client: reqwest::Client, config: &SentimentConfig) -> Self {
        Self {
            client,
            url: config.search_url.clone(),
            api_key: config.search_api_key.clone(),
        }
    }

    async fn query_news(
        &self,
        keywords: &str,
        max_results: usize,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<NewsItem>> {
        let response = self
            .client
            .get(&self.url)
            .header("X-Api-Key", &self.api_key)
            .query(&query_params(keywords, max_results, since))
            .send()
            .await
            .context("Failed to query news")?;

        if !response.status().is_success() {
            bail!("News API returned error: {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse news response")?;

        into_items(body)
    }
}

#[async_trait]
impl SearchBackend for NewsApiSearch {
    async fn search(
        &self,
        keywords: &str,
        max_results: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<NewsItem>> {
        let items = self
            .query_news(keywords, max_results, since)
            .await
            .map_err(|e| ObserverError::unavailable("news_search", format!("{:#}", e)))?;

        tracing::debug!(keywords = %keywords, count = items.len(), "News fetched");
        Ok(items)
    }
}

fn query_params(
    keywords: &str,
    max_results: usize,
    since: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("q", keywords.to_string()),
        ("sortBy", "publishedAt".to_string()),
        ("language", "en".to_string()),
        ("pageSize", max_results.clamp(1, MAX_PAGE_SIZE).to_string()),
    ];
    if let Some(since) = since {
        params.push(("from", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    params
}

/// Articles without any text are dropped
fn into_items(body: SearchResponse) -> anyhow::Result<Vec<NewsItem>> {
    if body.status != "ok" {
        bail!(
            "search failed: {}",
            body.message.unwrap_or_else(|| body.status.clone())
        );
    }

    Ok(body
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = a.title.unwrap_or_default();
            let body = a.description.or(a.content).unwrap_or_default();
            if title.is_empty() && body.is_empty() {
                return None;
            }
            Some(NewsItem {
                title,
                body,
                published: a.published_at,
            })
        })
        .collect())
}
