// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod pagination;
pub mod scoring;
pub mod search;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::config::SearchConfig;
pub use crate::error::SearchError;
pub use crate::search::SearchCoordinator;

use axum::Router;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "content_aggregator=info,tower_http=info";

/// Install a global subscriber honouring `RUST_LOG` (and `LOG_FORMAT=json`).
/// Does nothing when the host runtime already installed one.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Build the full application router from `SearchConfig::load()`, with
/// `/metrics` mounted.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = SearchConfig::load()?;
    app_with_config(&cfg)
}

pub fn app_with_config(cfg: &SearchConfig) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::install()?;
    let state = AppState::from_config(cfg)?;
    info!(
        providers = cfg.providers.len(),
        cache_ttl_secs = cfg.cache.ttl_secs,
        max_failures = cfg.breaker.max_failures,
        "content aggregator configured"
    );
    Ok(router(state).merge(metrics.router()))
}
