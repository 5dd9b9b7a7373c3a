// src/ingest/providers/mod.rs
//! Concrete feed adapters and the plumbing they share: where the payload
//! comes from, how HTTP retries back off, and how provider dates are read.

pub mod json_feed;
pub mod xml_feed;

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::ACCEPT;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use crate::config::{FeedFormat, ProviderConfig};
use crate::content::{ContentKind, ContentRecord};
use crate::ingest::normalize_text;
use crate::ingest::types::ProviderAdapter;

pub use json_feed::JsonFeedProvider;
pub use xml_feed::XmlFeedProvider;

/// Where a feed payload is read from.
#[derive(Debug, Clone)]
pub enum FeedSource {
    /// Fixture text held in memory.
    Inline(String),
    /// Local mock file, re-read on every fetch.
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

impl FeedSource {
    /// `http://` and `https://` locations become HTTP sources with the given
    /// per-request timeout; anything else is treated as a file path.
    pub fn from_location(location: &str, timeout: Duration) -> Result<Self> {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("building provider http client")?;
            Ok(FeedSource::Http {
                url: location.to_string(),
                client,
            })
        } else {
            Ok(FeedSource::File(PathBuf::from(location)))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FeedSource::Inline(_) => "inline".to_string(),
            FeedSource::File(p) => p.display().to_string(),
            FeedSource::Http { url, .. } => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Sleep before `attempt` (1-based): `delay * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.delay.saturating_mul(1u32 << shift)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Outbound token bucket for one provider: `per_minute` calls per minute,
/// bursting up to the same number.
#[derive(Clone)]
pub struct ProviderRateLimit {
    per_minute: u32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ProviderRateLimit {
    /// `None` for 0, which means unlimited.
    pub fn per_minute(per_minute: u32) -> Option<Self> {
        let n = NonZeroU32::new(per_minute)?;
        Some(Self {
            per_minute,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(n))),
        })
    }

    pub fn limit(&self) -> u32 {
        self.per_minute
    }

    /// Wait for a token, giving up when `cancel` fires.
    pub(crate) async fn acquire(&self, provider: &str, cancel: &CancellationToken) -> Result<()> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }
        tracing::debug!(provider, per_minute = self.per_minute, "waiting for rate limit");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("cancelled while waiting for rate limit"),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}

/// Fetch the raw payload for one provider call.
pub(crate) async fn load_body(
    source: &FeedSource,
    query: &str,
    kind: Option<ContentKind>,
    accept: &str,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    match source {
        FeedSource::Inline(s) => Ok(s.clone()),
        FeedSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading mock feed {}", path.display())),
        FeedSource::Http { url, client } => {
            fetch_with_retry(client, url, query, kind, accept, retry, cancel).await
        }
    }
}

async fn fetch_with_retry(
    client: &reqwest::Client,
    url: &str,
    query: &str,
    kind: Option<ContentKind>,
    accept: &str,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut last_err: Option<anyhow::Error> = None;

    for attempt in 0..=retry.retries {
        if attempt > 0 {
            let delay = retry.backoff(attempt);
            tracing::debug!(url, attempt, ?delay, "retrying provider request");
            tokio::select! {
                _ = cancel.cancelled() => bail!("cancelled while waiting to retry"),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut req = client.get(url).header(ACCEPT, accept).query(&[("q", query)]);
        if let Some(k) = kind {
            req = req.query(&[("type", k.as_str())]);
        }

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("cancelled"),
            r = req.send() => r,
        };

        match sent {
            Ok(resp) if resp.status().is_success() => {
                return resp.text().await.context("reading response body");
            }
            Ok(resp) if resp.status().is_client_error() => {
                bail!("client error: status code {}", resp.status().as_u16());
            }
            Ok(resp) => {
                last_err = Some(anyhow!("unexpected status code: {}", resp.status().as_u16()));
            }
            Err(e) => last_err = Some(anyhow::Error::new(e)),
        }
    }

    let attempts = retry.retries + 1;
    Err(last_err
        .unwrap_or_else(|| anyhow!("no attempt was made"))
        .context(format!("request failed after {attempts} attempts")))
}

/// Build the adapter described by one `[[providers]]` entry.
pub fn build_adapter(cfg: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
    let source = FeedSource::from_location(&cfg.source, cfg.timeout())?;
    let retry = RetryPolicy {
        retries: cfg.retry_count,
        delay: cfg.retry_delay(),
    };
    let adapter: Arc<dyn ProviderAdapter> = match cfg.format {
        FeedFormat::Json => Arc::new(
            JsonFeedProvider::new(&cfg.name, source, retry).with_rate_limit(cfg.rate_limit_per_min),
        ),
        FeedFormat::Xml => Arc::new(
            XmlFeedProvider::new(&cfg.name, source, retry).with_rate_limit(cfg.rate_limit_per_min),
        ),
    };
    Ok(adapter)
}

/// Anything other than `video` is text.
pub(crate) fn kind_or_text(raw: &str) -> ContentKind {
    if raw.trim().eq_ignore_ascii_case("video") {
        ContentKind::Video
    } else {
        ContentKind::Text
    }
}

pub(crate) fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// `YYYY-MM-DD`, taken as midnight UTC.
pub(crate) fn parse_ymd(s: &str) -> Option<DateTime<Utc>> {
    let date = Date::parse(s.trim(), format_description!("[year]-[month]-[day]")).ok()?;
    DateTime::from_timestamp(date.midnight().assume_utc().unix_timestamp(), 0)
}

/// Fields shared by every feed item once decoded.
pub(crate) struct FeedItem {
    pub id: String,
    pub title: String,
    pub kind: ContentKind,
    pub views: u64,
    pub likes: u64,
    pub reading_time: u64,
    pub reactions: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Turn decoded items into records for `provider`, dropping items without an
/// id and items outside the requested kind.
pub(crate) fn into_records(
    provider: &str,
    items: Vec<FeedItem>,
    kind: Option<ContentKind>,
    fetched_at: DateTime<Utc>,
) -> Vec<ContentRecord> {
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let id = it.id.trim();
        if id.is_empty() {
            tracing::debug!(provider, "skipping feed item without id");
            continue;
        }
        if kind.is_some_and(|k| k != it.kind) {
            continue;
        }
        let mut rec = ContentRecord::new(
            provider,
            format!("{provider}_{id}"),
            normalize_text(&it.title),
            it.kind,
            it.created_at.unwrap_or(fetched_at),
        );
        rec.views = it.views;
        rec.likes = it.likes;
        rec.reading_time = it.reading_time;
        rec.reactions = it.reactions;
        out.push(rec);
    }
    out
}
