// src/ingest/registry.rs
//! Name → circuit breaker map owned by the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};

#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Existing breaker for `name`, or a new one. Concurrent first callers
    /// always end up sharing the same instance.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(cb) = self.breakers.read().get(name) {
            return cb.clone();
        }
        let mut w = self.breakers.write();
        w.entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(provider = name, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, self.config))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Snapshots sorted by provider name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut out: Vec<_> = self.breakers.read().values().map(|cb| cb.snapshot()).collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_returns_same_instance() {
        let reg = BreakerRegistry::new(BreakerConfig::default());
        let a = reg.get_or_create("p1");
        let b = reg.get_or_create("p1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("p2").is_none());
    }

    #[test]
    fn concurrent_first_access_creates_one_breaker() {
        let reg = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || reg.get_or_create("shared"))
            })
            .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(got.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.len(), 1);
    }
}
