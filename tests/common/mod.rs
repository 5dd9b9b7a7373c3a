// tests/common/mod.rs
//! Scripted adapters and failing collaborators shared by integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use content_aggregator::cache::{CacheError, ResultCache};
use content_aggregator::content::{ContentKind, ContentRecord, SearchRequest};
use content_aggregator::ingest::types::ProviderAdapter;
use content_aggregator::store::{Store, StoreError};

#[derive(Clone)]
pub enum Behavior {
    Records(Vec<ContentRecord>),
    Fail(&'static str),
    /// Never completes on its own.
    Hang,
    Delay(Duration, Vec<ContentRecord>),
}

pub struct StubAdapter {
    name: String,
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl StubAdapter {
    pub fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn ok(name: &str, titles: &[&str]) -> Arc<Self> {
        let records = titles
            .iter()
            .enumerate()
            .map(|(i, t)| record(name, &i.to_string(), t, ContentKind::Text))
            .collect();
        Self::new(name, Behavior::Records(records))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::new(name, Behavior::Fail("connection refused"))
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_content(
        &self,
        _query: &str,
        kind: Option<ContentKind>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ContentRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        let records = match behavior {
            Behavior::Records(r) => r,
            Behavior::Fail(msg) => return Err(anyhow!(msg)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Delay(d, r) => {
                tokio::time::sleep(d).await;
                r
            }
        };
        Ok(records
            .into_iter()
            .filter(|r| kind.is_none_or(|k| k == r.kind))
            .collect())
    }
}

pub fn record(provider: &str, id: &str, title: &str, kind: ContentKind) -> ContentRecord {
    let mut r = ContentRecord::new(
        provider,
        format!("{provider}_{id}"),
        title,
        kind,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    );
    match kind {
        ContentKind::Video => {
            r.views = 1_000 * (id.len() as u64 + 1);
            r.likes = 50;
        }
        ContentKind::Text => {
            r.reading_time = 5;
            r.reactions = 100;
        }
    }
    r
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl Store for BrokenStore {
    async fn search(&self, _req: &SearchRequest) -> Result<(Vec<ContentRecord>, usize), StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn get_by_id(&self, _id: i64) -> Result<ContentRecord, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn upsert_batch(&self, _records: &[ContentRecord]) -> Result<Vec<i64>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("disk on fire".into()))
    }
}

/// Cache that never holds anything and rejects every write.
#[derive(Default)]
pub struct BrokenCache {
    pub writes: AtomicUsize,
}

#[async_trait]
impl ResultCache for BrokenCache {
    async fn get(&self, _key: &str) -> Option<Vec<ContentRecord>> {
        None
    }

    async fn set(&self, _key: &str, _records: Vec<ContentRecord>, _ttl: Duration) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("connection reset".into()))
    }
}
