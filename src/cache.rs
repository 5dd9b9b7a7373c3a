// src/cache.rs
//! Result-set cache keyed by normalized search parameters.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::time::Instant;

use crate::content::ContentRecord;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ResultCache: Send + Sync {
    /// `None` on a miss or an expired entry.
    async fn get(&self, key: &str) -> Option<Vec<ContentRecord>>;

    /// A zero `ttl` means the cache's own default.
    async fn set(&self, key: &str, records: Vec<ContentRecord>, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    records: Vec<ContentRecord>,
    expires_at: Instant,
}

/// Bounded in-process cache with absolute expiry and lazy eviction.
#[derive(Debug)]
pub struct MemoryCache {
    default_ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            default_ttl: if default_ttl.is_zero() { DEFAULT_TTL } else { default_ttl },
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry closest to expiry. Caller holds the write lock.
    fn evict_soonest(entries: &mut HashMap<String, Entry>) {
        let victim = entries
            .iter()
            .min_by_key(|(_, e)| e.expires_at)
            .map(|(k, _)| k.clone());
        if let Some(k) = victim {
            tracing::debug!(key = %k, "evicting cache entry");
            entries.remove(&k);
        }
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<ContentRecord>> {
        let now = Instant::now();
        {
            let g = self.entries.read();
            match g.get(key) {
                None => return None,
                Some(e) if e.expires_at > now => return Some(e.records.clone()),
                Some(_) => {}
            }
        }
        let mut w = self.entries.write();
        if w.get(key).is_some_and(|e| e.expires_at <= now) {
            w.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, records: Vec<ContentRecord>, ttl: Duration) -> Result<(), CacheError> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let mut w = self.entries.write();
        if !w.contains_key(key) && w.len() >= self.max_entries {
            Self::evict_soonest(&mut w);
        }
        w.insert(
            key.to_string(),
            Entry {
                records,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
