//! Content aggregator service entrypoint.
//! Boots the Axum HTTP server with the configured providers, store and cache.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    content_aggregator::init_tracing();

    let router = content_aggregator::app().await?;
    Ok(router.into())
}
