// src/ingest/providers/json_feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{
    into_records, kind_or_text, load_body, parse_rfc3339, FeedItem, FeedSource, ProviderRateLimit,
    RetryPolicy,
};
use crate::content::{ContentKind, ContentRecord};
use crate::ingest::types::ProviderAdapter;

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    contents: Vec<JsonItem>,
}

/// Feeds disagree on whether ids are strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonId {
    Text(String),
    Number(i64),
}

impl JsonId {
    fn into_string(self) -> String {
        match self {
            JsonId::Text(s) => s,
            JsonId::Number(n) => n.to_string(),
        }
    }
}

/// Absent and `null` fields both decode to their zero value.
#[derive(Debug, Deserialize)]
struct JsonItem {
    id: Option<JsonId>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    metrics: Option<JsonMetrics>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonMetrics {
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default)]
    reading_time: Option<u64>,
    #[serde(default)]
    reactions: Option<u64>,
}

/// Provider speaking the `{"contents": [...]}` JSON feed format.
pub struct JsonFeedProvider {
    name: String,
    source: FeedSource,
    retry: RetryPolicy,
    rate_limit: Option<ProviderRateLimit>,
}

impl JsonFeedProvider {
    pub fn new(name: &str, source: FeedSource, retry: RetryPolicy) -> Self {
        Self {
            name: name.to_string(),
            source,
            retry,
            rate_limit: None,
        }
    }

    /// Cap outbound calls at `per_minute`; 0 leaves the provider unlimited.
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit = ProviderRateLimit::per_minute(per_minute);
        self
    }

    pub fn from_fixture(name: &str, content: &str) -> Self {
        Self::new(name, FeedSource::Inline(content.to_string()), RetryPolicy::none())
    }

    pub fn parse(
        &self,
        body: &str,
        kind: Option<ContentKind>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<ContentRecord>> {
        let t0 = std::time::Instant::now();

        let feed: JsonFeed = serde_json::from_str(body)
            .with_context(|| format!("parsing json feed from {}", self.name))?;
        let items = feed
            .contents
            .into_iter()
            .map(|it| {
                let metrics = it.metrics.unwrap_or_default();
                FeedItem {
                    id: it.id.map(JsonId::into_string).unwrap_or_default(),
                    title: it.title.unwrap_or_default(),
                    kind: kind_or_text(it.kind.as_deref().unwrap_or_default()),
                    views: metrics.views.unwrap_or_default(),
                    likes: metrics.likes.unwrap_or_default(),
                    reading_time: metrics.reading_time.unwrap_or_default(),
                    reactions: metrics.reactions.unwrap_or_default(),
                    created_at: it.published_at.as_deref().and_then(parse_rfc3339),
                }
            })
            .collect();
        let out = into_records(&self.name, items, kind, fetched_at);

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("provider_parse_ms", "provider" => self.name.clone()).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl ProviderAdapter for JsonFeedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate_limit_per_min(&self) -> Option<u32> {
        self.rate_limit.as_ref().map(ProviderRateLimit::limit)
    }

    async fn fetch_content(
        &self,
        query: &str,
        kind: Option<ContentKind>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentRecord>> {
        if let Some(limit) = &self.rate_limit {
            limit.acquire(&self.name, cancel).await?;
        }
        let body = load_body(&self.source, query, kind, "application/json", &self.retry, cancel)
            .await
            .with_context(|| format!("loading {}", self.source.describe()))?;
        self.parse(&body, kind, Utc::now())
    }
}
