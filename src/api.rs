use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::breaker::BreakerSnapshot;
use crate::cache::MemoryCache;
use crate::config::SearchConfig;
use crate::content::{ContentKind, ContentRecord, SearchRequest, SortKey, SortOrder};
use crate::error::SearchError;
use crate::ingest::providers::build_adapter;
use crate::ingest::registry::BreakerRegistry;
use crate::ingest::FetchOrchestrator;
use crate::scoring::RelevanceScorer;
use crate::search::SearchCoordinator;
use crate::store::MemoryStore;

pub const X_SEARCH_CACHE: HeaderName = HeaderName::from_static("x-search-cache");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SearchCoordinator>,
    pub breakers: Arc<BreakerRegistry>,
}

impl AppState {
    pub fn new(coordinator: Arc<SearchCoordinator>) -> Self {
        let breakers = coordinator.orchestrator().breakers().clone();
        Self {
            coordinator,
            breakers,
        }
    }

    /// Wire the in-memory store, cache and scorer with one adapter per
    /// configured provider.
    pub fn from_config(cfg: &SearchConfig) -> anyhow::Result<Self> {
        let breakers = Arc::new(BreakerRegistry::new(cfg.breaker_config()));
        let mut orchestrator =
            FetchOrchestrator::new(breakers).with_fetch_timeout(cfg.fetch_timeout());
        for p in &cfg.providers {
            orchestrator.register(build_adapter(p)?);
        }

        let coordinator = SearchCoordinator::new(
            Arc::new(orchestrator),
            Arc::new(MemoryStore::new()),
            Arc::new(RelevanceScorer),
            Arc::new(MemoryCache::new(cfg.cache_ttl(), cfg.cache.max_entries)),
        )
        .with_limits(cfg.page_limits())
        .with_cache_ttl(cfg.cache_ttl());

        Ok(Self::new(Arc::new(coordinator)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/search", get(search))
        .route("/api/v1/content/{id}", get(get_content))
        .route("/debug/breakers", get(debug_breakers))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        // A caller-supplied X-Request-ID is kept; otherwise a UUID is minted.
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn request_span(req: &Request<Body>) -> tracing::Span {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        uri = %req.uri(),
        request_id,
    )
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Value::is_null")]
    details: Value,
}

fn error_response(status: StatusCode, error: String, code: &'static str, details: Value) -> Response {
    (status, Json(ErrorBody { error, code, details })).into_response()
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            SearchError::NotFound { resource, id } => {
                (StatusCode::NOT_FOUND, json!({ "resource": resource, "id": id }))
            }
            SearchError::InvalidInput { field, .. } => {
                (StatusCode::BAD_REQUEST, json!({ "field": field }))
            }
            SearchError::Provider(e) => {
                let providers: Vec<Value> = e
                    .failures()
                    .iter()
                    .map(|f| json!({ "provider": f.provider, "cause": f.cause.to_string() }))
                    .collect();
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "providers": providers, "retryable": true }),
                )
            }
            SearchError::Storage { operation, .. } => {
                tracing::error!(error = %self, source = ?std::error::Error::source(&self), "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "operation": operation }))
            }
        };
        error_response(status, self.to_string(), self.code(), details)
    }
}

fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
        "INTERNAL_ERROR",
        Value::Null,
    )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Raw query string parameters. Numbers arrive as text so that malformed
/// values are reported with the same error shape as everything else.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

fn parse_count(field: &'static str, raw: Option<&str>) -> Result<usize, SearchError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(0),
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| SearchError::invalid_input(field, format!("'{s}' is not a non-negative integer"))),
    }
}

impl SearchParams {
    pub fn into_request(self) -> Result<SearchRequest, SearchError> {
        Ok(SearchRequest {
            query: self.query.unwrap_or_default(),
            kind: ContentKind::parse_filter(self.kind.as_deref())?,
            page: parse_count("page", self.page.as_deref())?,
            page_size: parse_count("page_size", self.page_size.as_deref())?,
            sort_by: SortKey::parse_opt(self.sort_by.as_deref())?,
            sort_order: SortOrder::parse_opt(self.sort_order.as_deref())?,
        })
    }
}

async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, SearchError> {
    let Query(params) =
        params.map_err(|e| SearchError::invalid_input("query", e.body_text()))?;
    let req = params.into_request()?;

    // Dropping the request future drops the guard, which cancels the fetch.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.coordinator.search(&req, &cancel).await?;
    Ok((
        [(X_SEARCH_CACHE, outcome.cache.as_header())],
        Json(outcome.response),
    )
        .into_response())
}

async fn get_content(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<ContentRecord>, SearchError> {
    let id = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| SearchError::invalid_input("id", format!("'{raw}' is not a valid content id")))?;
    Ok(Json(state.coordinator.get_by_id(id).await?))
}

async fn debug_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}
