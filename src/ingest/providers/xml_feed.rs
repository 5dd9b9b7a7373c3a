// src/ingest/providers/xml_feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{
    into_records, kind_or_text, load_body, parse_ymd, FeedItem, FeedSource, ProviderRateLimit,
    RetryPolicy,
};
use crate::content::{ContentKind, ContentRecord};
use crate::ingest::types::ProviderAdapter;

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    items: Items,
}

#[derive(Debug, Default, Deserialize)]
struct Items {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    id: String,
    #[serde(default)]
    headline: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    stats: Stats,
    publication_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Stats {
    #[serde(default)]
    views: u64,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    reading_time: u64,
    #[serde(default)]
    reactions: u64,
}

/// Provider speaking the `<feed><items><item>…` XML format.
pub struct XmlFeedProvider {
    name: String,
    source: FeedSource,
    retry: RetryPolicy,
    rate_limit: Option<ProviderRateLimit>,
}

impl XmlFeedProvider {
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

        let feed: Feed =
            from_str(body).with_context(|| format!("parsing xml feed from {}", self.name))?;
        let items = feed
            .items
            .item
            .into_iter()
            .map(|it| FeedItem {
                id: it.id,
                title: it.headline,
                kind: kind_or_text(&it.kind),
                views: it.stats.views,
                likes: it.stats.likes,
                reading_time: it.stats.reading_time,
                reactions: it.stats.reactions,
                created_at: it.publication_date.as_deref().and_then(parse_ymd),
            })
            .collect();
        let out = into_records(&self.name, items, kind, fetched_at);

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("provider_parse_ms", "provider" => self.name.clone()).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl ProviderAdapter for XmlFeedProvider {
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
        let body = load_body(&self.source, query, kind, "application/xml", &self.retry, cancel)
            .await
            .with_context(|| format!("loading {}", self.source.describe()))?;
        self.parse(&body, kind, Utc::now())
    }
}
