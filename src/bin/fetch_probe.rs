//! Runs one orchestrated fetch against the configured providers and prints a
//! JSON summary: records per provider, failures and breaker states.
//!
//! Usage: `fetch_probe [query] [video|text|all]`

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use content_aggregator::content::ContentKind;
use content_aggregator::ingest::providers::build_adapter;
use content_aggregator::ingest::registry::BreakerRegistry;
use content_aggregator::ingest::FetchOrchestrator;
use content_aggregator::SearchConfig;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    content_aggregator::init_tracing();

    let mut args = std::env::args().skip(1);
    let query = args.next().unwrap_or_default();
    let kind = ContentKind::parse_filter(args.next().as_deref())?;

    let cfg = SearchConfig::load()?;
    let breakers = Arc::new(BreakerRegistry::new(cfg.breaker_config()));
    let mut orchestrator =
        FetchOrchestrator::new(breakers.clone()).with_fetch_timeout(cfg.fetch_timeout());
    for p in &cfg.providers {
        orchestrator.register(build_adapter(p)?);
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let summary = match orchestrator.fetch_all(&query, kind, &cancel).await {
        Ok(records) => {
            let mut per_provider: BTreeMap<&str, usize> = BTreeMap::new();
            for r in &records {
                *per_provider.entry(r.provider.as_str()).or_default() += 1;
            }
            json!({
                "ok": true,
                "total": records.len(),
                "per_provider": per_provider,
                "breakers": breakers.snapshots(),
            })
        }
        Err(e) => {
            let failures: Vec<_> = e
                .failures()
                .iter()
                .map(|f| json!({ "provider": f.provider, "cause": f.cause.to_string() }))
                .collect();
            json!({
                "ok": false,
                "error": e.to_string(),
                "failures": failures,
                "breakers": breakers.snapshots(),
            })
        }
    };
    ctrl_c.abort();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
