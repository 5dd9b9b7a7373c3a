// src/ingest/types.rs
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::content::{ContentKind, ContentRecord};

/// One external content source.
///
/// Implementations must honour `cancel` and must return an error (never an
/// empty success) when the source could not be reached or parsed.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, used as breaker and logging key.
    fn name(&self) -> &str;

    /// Outbound calls per minute, if the adapter throttles itself.
    fn rate_limit_per_min(&self) -> Option<u32> {
        None
    }

    async fn fetch_content(
        &self,
        query: &str,
        kind: Option<ContentKind>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentRecord>>;
}
