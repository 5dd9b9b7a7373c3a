// src/config/search.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::breaker::{BreakerConfig, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT};
use crate::pagination::{PageLimits, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const DEFAULT_SEARCH_CONFIG_PATH: &str = "config/search.toml";
pub const ENV_SEARCH_CONFIG_PATH: &str = "SEARCH_CONFIG_PATH";

pub const ENV_CACHE_TTL_SECS: &str = "SEARCH_CACHE_TTL_SECS";
pub const ENV_BREAKER_MAX_FAILURES: &str = "SEARCH_BREAKER_MAX_FAILURES";
pub const ENV_BREAKER_RESET_SECS: &str = "SEARCH_BREAKER_RESET_SECS";

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    1000
}
fn default_max_failures() -> u32 {
    DEFAULT_MAX_FAILURES
}
fn default_reset_timeout_secs() -> u64 {
    DEFAULT_RESET_TIMEOUT.as_secs()
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_rate_limit_per_min() -> u32 {
    60
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Per-provider deadline for one fetch cycle.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSection {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Json,
    Xml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub format: FeedFormat,
    /// `http(s)://` URL or a local file path.
    pub source: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Outbound calls per minute; 0 disables the limiter.
    #[serde(default = "default_rate_limit_per_min")]
    pub rate_limit_per_min: u32,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SearchConfig {
    /// Resolve the path via `$SEARCH_CONFIG_PATH`, else `config/search.toml`.
    /// A missing default file yields built-in defaults; a missing explicit
    /// path is an error. Env overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_SEARCH_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("SEARCH_CONFIG_PATH points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_SEARCH_CONFIG_PATH);
                if pb.exists() {
                    Self::load_from(&pb)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading search config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing search config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: SearchConfig = toml::from_str(s)?;
        cfg.validate_providers()?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn validate_providers(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.providers {
            let name = p.name.trim();
            if name.is_empty() {
                bail!("provider with empty name");
            }
            if p.source.trim().is_empty() {
                bail!("provider `{name}` has an empty source");
            }
            if !seen.insert(name.to_string()) {
                bail!("duplicate provider name `{name}`");
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env::<u64>(ENV_CACHE_TTL_SECS) {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = parse_env::<u32>(ENV_BREAKER_MAX_FAILURES) {
            self.breaker.max_failures = v;
        }
        if let Some(v) = parse_env::<u64>(ENV_BREAKER_RESET_SECS) {
            self.breaker.reset_timeout_secs = v;
        }
    }

    /// Replace nonsensical values with defaults.
    fn sanitize(&mut self) {
        if self.search.max_page_size == 0 {
            self.search.max_page_size = default_max_page_size();
        }
        if self.search.default_page_size == 0
            || self.search.default_page_size > self.search.max_page_size
        {
            self.search.default_page_size = default_page_size().min(self.search.max_page_size);
        }
        if self.search.fetch_timeout_ms == 0 {
            self.search.fetch_timeout_ms = default_fetch_timeout_ms();
        }
        if self.cache.ttl_secs == 0 {
            self.cache.ttl_secs = default_ttl_secs();
        }
        if self.cache.max_entries == 0 {
            self.cache.max_entries = default_max_entries();
        }
        if self.breaker.max_failures == 0 {
            self.breaker.max_failures = default_max_failures();
        }
        if self.breaker.reset_timeout_secs == 0 {
            self.breaker.reset_timeout_secs = default_reset_timeout_secs();
        }
        for p in &mut self.providers {
            p.name = p.name.trim().to_string();
            p.source = p.source.trim().to_string();
            if p.timeout_ms == 0 {
                p.timeout_ms = default_provider_timeout_ms();
            }
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.search.default_page_size,
            max_page_size: self.search.max_page_size,
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            max_failures: self.breaker.max_failures,
            reset_timeout: Duration::from_secs(self.breaker.reset_timeout_secs),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.search.fetch_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const SAMPLE: &str = r#"
[search]
default_page_size = 10
max_page_size = 50

[cache]
ttl_secs = 60

[breaker]
max_failures = 3
reset_timeout_secs = 15

[[providers]]
name = " provider1 "
format = "json"
source = "mocks/json_provider.json"

[[providers]]
name = "provider2"
format = "xml"
source = "https://example.com/feed"
retry_count = 1
rate_limit_per_min = 0
"#;

    #[test]
    fn parses_sections_and_defaults() {
        let cfg = SearchConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.page_limits().default_page_size, 10);
        assert_eq!(cfg.page_limits().max_page_size, 50);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.cache.max_entries, 1000);
        assert_eq!(cfg.breaker_config().max_failures, 3);
        assert_eq!(cfg.providers.len(), 2);
        assert_eq!(cfg.providers[0].name, "provider1");
        assert_eq!(cfg.providers[0].retry_count, 3);
        assert_eq!(cfg.providers[1].format, FeedFormat::Xml);
        assert_eq!(cfg.providers[1].retry_count, 1);
        assert_eq!(cfg.providers[0].rate_limit_per_min, 60);
        assert_eq!(cfg.providers[1].rate_limit_per_min, 0);
    }

    #[test]
    fn duplicate_provider_names_are_rejected() {
        let s = r#"
[[providers]]
name = "a"
format = "json"
source = "x.json"

[[providers]]
name = "a"
format = "xml"
source = "y.xml"
"#;
        let err = SearchConfig::from_toml_str(s).unwrap_err();
        assert!(err.to_string().contains("duplicate provider"));
    }

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let s = r#"
[search]
default_page_size = 0
max_page_size = 0
[breaker]
max_failures = 0
"#;
        let cfg = SearchConfig::from_toml_str(s).unwrap();
        assert_eq!(cfg.search.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(cfg.search.max_page_size, MAX_PAGE_SIZE);
        assert_eq!(cfg.breaker.max_failures, DEFAULT_MAX_FAILURES);
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_and_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("search.toml");
        fs::write(&p, SAMPLE).unwrap();

        env::set_var(ENV_SEARCH_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_CACHE_TTL_SECS, "42");
        let cfg = SearchConfig::load().unwrap();
        assert_eq!(cfg.cache.ttl_secs, 42);
        assert_eq!(cfg.breaker.max_failures, 3);
        env::remove_var(ENV_CACHE_TTL_SECS);

        env::set_var(ENV_SEARCH_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(SearchConfig::load().is_err());
        env::remove_var(ENV_SEARCH_CONFIG_PATH);
    }
}
