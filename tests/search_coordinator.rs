// tests/search_coordinator.rs
//
// Cache-first search path: MISS → HIT, pagination of cached sets,
// idempotent persistence and error classification.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{record, Behavior, BrokenCache, BrokenStore, StubAdapter};
use content_aggregator::breaker::BreakerConfig;
use content_aggregator::cache::{MemoryCache, ResultCache};
use content_aggregator::content::{ContentKind, SearchRequest, SortKey, SortOrder};
use content_aggregator::ingest::registry::BreakerRegistry;
use content_aggregator::ingest::FetchOrchestrator;
use content_aggregator::scoring::RelevanceScorer;
use content_aggregator::search::{cache_key, CacheStatus, SearchCoordinator};
use content_aggregator::store::{MemoryStore, Store};
use content_aggregator::SearchError;

struct Harness {
    coordinator: SearchCoordinator,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
}

fn harness(adapters: Vec<Arc<StubAdapter>>) -> Harness {
    let mut orch = FetchOrchestrator::new(Arc::new(BreakerRegistry::new(BreakerConfig::default())));
    for a in adapters {
        orch.register(a);
    }
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(300), 100));
    let coordinator = SearchCoordinator::new(
        Arc::new(orch),
        store.clone(),
        Arc::new(RelevanceScorer),
        cache.clone(),
    );
    Harness {
        coordinator,
        store,
        cache,
    }
}

fn three_rust_records() -> Arc<StubAdapter> {
    StubAdapter::new(
        "p1",
        Behavior::Records(vec![
            record("p1", "1", "Rust basics", ContentKind::Text),
            record("p1", "2", "Rust traits", ContentKind::Text),
            record("p1", "3", "Rust video", ContentKind::Video),
        ]),
    )
}

#[tokio::test]
async fn second_identical_search_is_served_from_cache() {
    let p1 = three_rust_records();
    let h = harness(vec![p1.clone()]);
    let cancel = CancellationToken::new();
    let req = SearchRequest::new("rust");

    let first = h.coordinator.search(&req, &cancel).await.unwrap();
    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(first.response.total, 3);

    let second = h.coordinator.search(&req, &cancel).await.unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.response.items, first.response.items);
    assert_eq!(p1.calls(), 1, "cache hit must not contact providers");
}

#[tokio::test]
async fn query_case_and_spacing_share_a_cache_entry() {
    let p1 = three_rust_records();
    let h = harness(vec![p1.clone()]);
    let cancel = CancellationToken::new();

    h.coordinator
        .search(&SearchRequest::new("Rust"), &cancel)
        .await
        .unwrap();
    let again = h
        .coordinator
        .search(&SearchRequest::new("  rust "), &cancel)
        .await
        .unwrap();
    assert_eq!(again.cache, CacheStatus::Hit);
    assert_eq!(p1.calls(), 1);
}

#[tokio::test]
async fn cached_set_is_paginated_in_memory() {
    let h = harness(vec![three_rust_records()]);
    let cancel = CancellationToken::new();

    let p1 = h
        .coordinator
        .search(&SearchRequest::new("rust").with_page(1, 2), &cancel)
        .await
        .unwrap();
    assert_eq!(p1.cache, CacheStatus::Miss);
    assert_eq!(p1.response.items.len(), 2);
    assert_eq!(p1.response.total, 3);
    assert_eq!(p1.response.total_pages, 2);

    let p2 = h
        .coordinator
        .search(&SearchRequest::new("rust").with_page(2, 2), &cancel)
        .await
        .unwrap();
    assert_eq!(p2.cache, CacheStatus::Hit);
    assert_eq!(p2.response.items.len(), 1);
    assert_eq!(p2.response.total, 3);

    let p3 = h
        .coordinator
        .search(&SearchRequest::new("rust").with_page(3, 2), &cancel)
        .await
        .unwrap();
    assert!(p3.response.items.is_empty());
    assert_eq!(p3.response.total, 3);

    // The full sorted set was cached, not just the first page.
    let key = cache_key(&SearchRequest::new("rust"));
    assert_eq!(h.cache.get(&key).await.unwrap().len(), 3);
}

#[tokio::test]
async fn miss_on_later_page_returns_that_page() {
    let h = harness(vec![three_rust_records()]);
    let got = h
        .coordinator
        .search(
            &SearchRequest::new("rust").with_page(2, 2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(got.cache, CacheStatus::Miss);
    assert_eq!(got.response.items.len(), 1);
    assert_eq!(got.response.page, 2);
}

#[tokio::test]
async fn page_bounds_are_normalized() {
    let h = harness(vec![three_rust_records()]);
    let got = h
        .coordinator
        .search(
            &SearchRequest::new("rust").with_page(0, 10_000),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(got.response.page, 1);
    assert_eq!(got.response.page_size, 100);
}

#[tokio::test]
async fn returned_records_come_from_the_store() {
    let h = harness(vec![three_rust_records()]);
    let got = h
        .coordinator
        .search(&SearchRequest::new("rust"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(got.response.items.iter().all(|r| r.id.is_some()));
    assert!(got.response.items.iter().all(|r| r.score > 0.0));

    let scores: Vec<f64> = got.response.items.iter().map(|r| r.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    assert_eq!(scores, sorted, "default sort is score descending");
}

#[tokio::test]
async fn refetching_same_records_keeps_ids_stable() {
    let h = harness(vec![three_rust_records()]);
    let cancel = CancellationToken::new();

    let first = h
        .coordinator
        .search(&SearchRequest::new("rust"), &cancel)
        .await
        .unwrap();
    // Different sort order means a different cache key, hence a second fetch.
    let second = h
        .coordinator
        .search(
            &SearchRequest::new("rust").with_sort(SortKey::CreatedAt, SortOrder::Asc),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(second.cache, CacheStatus::Miss);
    assert_eq!(h.store.len().await.unwrap(), 3);

    let mut a: Vec<_> = first.response.items.iter().map(|r| (r.provider_id.clone(), r.id)).collect();
    let mut b: Vec<_> = second.response.items.iter().map(|r| (r.provider_id.clone(), r.id)).collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

#[tokio::test]
async fn all_providers_failing_is_a_provider_error_and_is_not_cached() {
    let p = StubAdapter::failing("p1");
    let h = harness(vec![p.clone()]);
    let cancel = CancellationToken::new();

    let err = h
        .coordinator
        .search(&SearchRequest::new("rust"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Provider(_)));
    assert_eq!(err.code(), "PROVIDER_ERROR");
    assert!(err.is_retryable());
    assert!(h.cache.is_empty());

    p.set(Behavior::Records(vec![record("p1", "1", "rust", ContentKind::Text)]));
    let ok = h
        .coordinator
        .search(&SearchRequest::new("rust"), &cancel)
        .await
        .unwrap();
    assert_eq!(ok.cache, CacheStatus::Miss);
    assert_eq!(ok.response.total, 1);
}

#[tokio::test]
async fn no_providers_gives_an_empty_result() {
    let h = harness(vec![]);
    let got = h
        .coordinator
        .search(&SearchRequest::new("anything"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(got.response.total, 0);
    assert_eq!(got.response.total_pages, 0);
    assert!(got.response.items.is_empty());
}

#[tokio::test]
async fn store_failure_is_fatal() {
    let mut orch = FetchOrchestrator::new(Arc::new(BreakerRegistry::default()));
    orch.register(three_rust_records());
    let coordinator = SearchCoordinator::new(
        Arc::new(orch),
        Arc::new(BrokenStore),
        Arc::new(RelevanceScorer),
        Arc::new(MemoryCache::default()),
    );

    let err = coordinator
        .search(&SearchRequest::new("rust"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Storage { operation: "upsert_batch", .. }));
    assert_eq!(err.code(), "DATABASE_ERROR");
}

#[tokio::test]
async fn cache_write_failure_is_swallowed() {
    let mut orch = FetchOrchestrator::new(Arc::new(BreakerRegistry::default()));
    orch.register(three_rust_records());
    let cache = Arc::new(BrokenCache::default());
    let coordinator = SearchCoordinator::new(
        Arc::new(orch),
        Arc::new(MemoryStore::new()),
        Arc::new(RelevanceScorer),
        cache.clone(),
    );

    let got = coordinator
        .search(&SearchRequest::new("rust"), &CancellationToken::new())
        .await
        .expect("cache errors must not fail the search");
    assert_eq!(got.cache, CacheStatus::Miss);
    assert_eq!(got.response.total, 3);
    assert_eq!(cache.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn get_by_id_round_trips_and_reports_missing() {
    let h = harness(vec![three_rust_records()]);
    let got = h
        .coordinator
        .search(&SearchRequest::new("rust"), &CancellationToken::new())
        .await
        .unwrap();
    let first = &got.response.items[0];
    let id = first.id.unwrap();

    let fetched = h.coordinator.get_by_id(id).await.unwrap();
    assert_eq!(&fetched, first);

    let err = h.coordinator.get_by_id(9_999).await.unwrap_err();
    assert!(matches!(err, SearchError::NotFound { id: 9_999, .. }));
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn kind_filter_narrows_results() {
    let h = harness(vec![three_rust_records()]);
    let got = h
        .coordinator
        .search(
            &SearchRequest::new("rust").with_kind(Some(ContentKind::Video)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(got.response.total, 1);
    assert_eq!(got.response.items[0].kind, ContentKind::Video);
}
