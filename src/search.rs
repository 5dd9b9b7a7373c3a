// src/search.rs
//! Cache-first search: on a miss, fetch from every provider, score, persist,
//! read back the authoritative page and populate the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::cache::{ResultCache, DEFAULT_TTL};
use crate::content::{ContentRecord, SearchRequest, SearchResponse};
use crate::error::SearchError;
use crate::ingest::FetchOrchestrator;
use crate::pagination::{self, PageLimits};
use crate::scoring::Scorer;
use crate::store::{Store, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("search_cache_hits_total", "Searches served from the result cache.");
        describe_counter!("search_cache_misses_total", "Searches that went to the providers.");
        describe_counter!(
            "search_cache_write_errors_total",
            "Result cache writes that failed and were skipped."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub response: SearchResponse,
    pub cache: CacheStatus,
}

/// Cache key over the search parameters that change the full result set.
/// Pagination is excluded; the cached value is the whole sorted set.
pub fn cache_key(req: &SearchRequest) -> String {
    let query = pagination::normalize_query(&req.query).to_lowercase();
    let kind = req.kind.map(|k| k.as_str()).unwrap_or("all");

    let mut hasher = Sha256::new();
    for part in [
        query.as_str(),
        kind,
        req.sort_by.as_str(),
        req.sort_order.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();

    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("search:");
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct SearchCoordinator {
    orchestrator: Arc<FetchOrchestrator>,
    store: Arc<dyn Store>,
    scorer: Arc<dyn Scorer>,
    cache: Arc<dyn ResultCache>,
    limits: PageLimits,
    cache_ttl: Duration,
}

impl SearchCoordinator {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        store: Arc<dyn Store>,
        scorer: Arc<dyn Scorer>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            scorer,
            cache,
            limits: PageLimits::default(),
            cache_ttl: DEFAULT_TTL,
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    pub async fn search(
        &self,
        req: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        ensure_metrics_described();
        let req = pagination::normalize(req, self.limits);
        let key = cache_key(&req);

        if let Some(all) = self.cache.get(&key).await {
            counter!("search_cache_hits_total").increment(1);
            tracing::debug!(%key, total = all.len(), "search cache hit");
            let items = pagination::paginate(&all, req.page, req.page_size);
            return Ok(SearchOutcome {
                response: SearchResponse::new(items, all.len(), req.page, req.page_size),
                cache: CacheStatus::Hit,
            });
        }
        counter!("search_cache_misses_total").increment(1);

        let mut fetched = self
            .orchestrator
            .fetch_all(&req.query, req.kind, cancel)
            .await
            .map_err(SearchError::Provider)?;

        let now = Utc::now();
        for r in &mut fetched {
            r.score = self.scorer.score(r, now);
        }
        if !fetched.is_empty() {
            self.store
                .upsert_batch(&fetched)
                .await
                .map_err(|e| SearchError::storage("upsert_batch", e))?;
        }

        let (items, total) = self
            .store
            .search(&req)
            .await
            .map_err(|e| SearchError::storage("search", e))?;

        match self.full_result_set(&req, &items, total).await {
            Ok(all) => {
                if let Err(e) = self.cache.set(&key, all, self.cache_ttl).await {
                    self.cache_write_failed(&key, &e);
                }
            }
            Err(e) => self.cache_write_failed(&key, &e),
        }

        tracing::info!(
            query = %req.query,
            fetched = fetched.len(),
            total,
            page = req.page,
            "search served from providers"
        );
        Ok(SearchOutcome {
            response: SearchResponse::new(items, total, req.page, req.page_size),
            cache: CacheStatus::Miss,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ContentRecord, SearchError> {
        match self.store.get_by_id(id).await {
            Ok(r) => Ok(r),
            Err(StoreError::NotFound { id }) => Err(SearchError::NotFound {
                resource: "content",
                id,
            }),
            Err(e) => Err(SearchError::storage("get_by_id", e)),
        }
    }

    /// Every matching record in sort order, reusing `page` when it already
    /// covers the whole set.
    async fn full_result_set(
        &self,
        req: &SearchRequest,
        page: &[ContentRecord],
        total: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        if total == page.len() && req.page == 1 {
            return Ok(page.to_vec());
        }
        let all_req = req.clone().with_page(1, total);
        Ok(self.store.search(&all_req).await?.0)
    }

    fn cache_write_failed(&self, key: &str, err: &dyn std::error::Error) {
        counter!("search_cache_write_errors_total").increment(1);
        tracing::warn!(%key, error = %err, "failed to cache search results");
    }
}
