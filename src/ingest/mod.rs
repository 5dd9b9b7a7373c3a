// src/ingest/mod.rs
//! Concurrent fetch from every registered provider, each guarded by its own
//! circuit breaker.

pub mod providers;
pub mod registry;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::breaker::BreakerError;
use crate::content::{ContentKind, ContentRecord};
use crate::ingest::registry::BreakerRegistry;
use crate::ingest::types::ProviderAdapter;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Titles longer than this are truncated.
const MAX_TITLE_CHARS: usize = 500;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "provider_fetch_total",
            "Provider fetch attempts by outcome (ok, error, breaker_open, cancelled, timeout)."
        );
        describe_histogram!("provider_fetch_ms", "Provider fetch time in milliseconds.");
        describe_histogram!("provider_parse_ms", "Provider payload parse time in milliseconds.");
        describe_gauge!(
            "provider_breaker_state",
            "Circuit breaker state per provider (0 closed, 1 half-open, 2 open)."
        );
    });
}

/// Why a single provider contributed nothing.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error("circuit breaker is open")]
    BreakerOpen,
    #[error("cancelled")]
    Cancelled,
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0:#}")]
    Provider(anyhow::Error),
}

impl FailureCause {
    fn metric_label(&self) -> &'static str {
        match self {
            FailureCause::BreakerOpen => "breaker_open",
            FailureCause::Cancelled => "cancelled",
            FailureCause::TimedOut(_) => "timeout",
            FailureCause::Provider(_) => "error",
        }
    }
}

#[derive(Debug, Error)]
#[error("provider {provider}: {cause}")]
pub struct ProviderFailure {
    pub provider: String,
    pub cause: FailureCause,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Nothing came back and at least one provider failed.
    #[error("all providers failed: {}", join_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },
}

impl FetchError {
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            FetchError::AllProvidersFailed { failures } => failures,
        }
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Default)]
struct Merge {
    records: Vec<ContentRecord>,
    failures: Vec<ProviderFailure>,
}

/// Fans one query out to every registered adapter and merges what comes back.
pub struct FetchOrchestrator {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    breakers: Arc<BreakerRegistry>,
    fetch_timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            adapters: Vec::new(),
            breakers,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Register an adapter. An adapter with the same name replaces the old one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        tracing::info!(
            provider = adapter.name(),
            rate_limit_per_min = ?adapter.rate_limit_per_min(),
            "registered provider"
        );
        self.adapters.push(adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Query every provider concurrently and wait for all of them.
    ///
    /// Partial success is success. Fails only when the merged set is empty
    /// and at least one provider failed. Record order across providers is
    /// unspecified.
    pub async fn fetch_all(
        &self,
        query: &str,
        kind: Option<ContentKind>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentRecord>, FetchError> {
        if self.adapters.is_empty() {
            return Ok(Vec::new());
        }
        ensure_metrics_described();

        let merge = Mutex::new(Merge::default());
        join_all(
            self.adapters
                .iter()
                .map(|adapter| self.fetch_one(adapter.as_ref(), query, kind, cancel, &merge)),
        )
        .await;

        let Merge { records, failures } = merge.into_inner();
        if records.is_empty() && !failures.is_empty() {
            return Err(FetchError::AllProvidersFailed { failures });
        }
        if !failures.is_empty() {
            tracing::warn!(
                failed = failures.len(),
                kept = records.len(),
                "partial provider failure"
            );
        }
        Ok(records)
    }

    async fn fetch_one(
        &self,
        adapter: &dyn ProviderAdapter,
        query: &str,
        kind: Option<ContentKind>,
        cancel: &CancellationToken,
        merge: &Mutex<Merge>,
    ) {
        let name = adapter.name();
        let breaker = self.breakers.get_or_create(name);
        let t0 = std::time::Instant::now();

        let outcome = breaker
            .execute(|| self.guarded_call(adapter, query, kind, cancel))
            .await;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("provider_fetch_ms", "provider" => name.to_string()).record(ms);
        gauge!("provider_breaker_state", "provider" => name.to_string())
            .set(breaker.state().as_gauge());

        match outcome {
            Ok(records) => {
                counter!("provider_fetch_total", "provider" => name.to_string(), "outcome" => "ok")
                    .increment(1);
                tracing::debug!(
                    provider = name,
                    count = records.len(),
                    circuit_state = %breaker.state(),
                    "fetched content from provider"
                );
                merge.lock().records.extend(records);
            }
            Err(err) => {
                let cause = match err {
                    BreakerError::Open => FailureCause::BreakerOpen,
                    BreakerError::Call(cause) => cause,
                };
                counter!(
                    "provider_fetch_total",
                    "provider" => name.to_string(),
                    "outcome" => cause.metric_label()
                )
                .increment(1);
                tracing::warn!(
                    provider = name,
                    error = %cause,
                    circuit_state = %breaker.state(),
                    "provider fetch failed"
                );
                merge.lock().failures.push(ProviderFailure {
                    provider: name.to_string(),
                    cause,
                });
            }
        }
    }

    async fn guarded_call(
        &self,
        adapter: &dyn ProviderAdapter,
        query: &str,
        kind: Option<ContentKind>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentRecord>, FailureCause> {
        let call = tokio::time::timeout(self.fetch_timeout, adapter.fetch_content(query, kind, cancel));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureCause::Cancelled),
            res = call => match res {
                Ok(Ok(records)) => Ok(records),
                Ok(Err(e)) => Err(FailureCause::Provider(e)),
                Err(_) => Err(FailureCause::TimedOut(self.fetch_timeout)),
            },
        }
    }
}

/// Normalize a provider title: decode HTML entities, collapse whitespace and
/// cap the length. Angle brackets are content (`Option<T>`), not markup.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let mut out = crate::pagination::normalize_query(&decoded);

    if out.chars().count() > MAX_TITLE_CHARS {
        out = out.chars().take(MAX_TITLE_CHARS).collect();
    }
    out
}
