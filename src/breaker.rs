// src/breaker.rs
//! Per-provider circuit breaker.
//!
//! ```text
//! Closed   --(max_failures consecutive failures)--> Open
//! Open     --(reset_timeout elapsed, next call)---> HalfOpen
//! HalfOpen --(2 consecutive successes)-----------> Closed
//! HalfOpen --(any failure)-----------------------> Open
//! ```
//!
//! While `Open`, calls are rejected without invoking the wrapped operation.
//! The state lock is never held across the wrapped call.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive half-open successes needed to close again.
const HALF_OPEN_SUCCESSES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub max_failures: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }

    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the call.
    #[error("circuit breaker is open")]
    Open,
    /// The call ran and failed.
    #[error("{0}")]
    Call(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub provider: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().failures
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let g = self.inner.lock();
        BreakerSnapshot {
            provider: self.name.clone(),
            state: g.state,
            consecutive_failures: g.failures,
        }
    }

    /// Force the breaker back to `Closed` with cleared counters.
    pub fn reset(&self) {
        let mut g = self.inner.lock();
        g.state = BreakerState::Closed;
        g.failures = 0;
        g.successes = 0;
    }

    /// Run `call` if the breaker admits it and record the outcome.
    pub async fn execute<T, E, F, Fut>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_admit() {
            return Err(BreakerError::Open);
        }
        match call().await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Call(e))
            }
        }
    }

    fn try_admit(&self) -> bool {
        let mut g = self.inner.lock();
        if g.state != BreakerState::Open {
            return true;
        }
        let cooled_down = g
            .last_failure
            .map(|at| at.elapsed() >= self.config.reset_timeout)
            .unwrap_or(true);
        if !cooled_down {
            return false;
        }
        g.state = BreakerState::HalfOpen;
        g.failures = 0;
        g.successes = 0;
        tracing::info!(provider = %self.name, state = "half-open", "circuit breaker probing");
        true
    }

    fn record_failure(&self) {
        let mut g = self.inner.lock();
        g.failures = g.failures.saturating_add(1);
        g.last_failure = Some(Instant::now());

        match g.state {
            BreakerState::HalfOpen => {
                g.state = BreakerState::Open;
                g.failures = 1;
                g.successes = 0;
                tracing::warn!(provider = %self.name, state = "open", "half-open probe failed");
            }
            BreakerState::Closed if g.failures >= self.config.max_failures => {
                g.state = BreakerState::Open;
                tracing::warn!(
                    provider = %self.name,
                    state = "open",
                    failures = g.failures,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    fn record_success(&self) {
        let mut g = self.inner.lock();
        g.failures = 0;

        match g.state {
            BreakerState::HalfOpen => {
                g.successes += 1;
                if g.successes >= HALF_OPEN_SUCCESSES {
                    g.state = BreakerState::Closed;
                    g.successes = 0;
                    tracing::info!(provider = %self.name, state = "closed", "circuit breaker recovered");
                }
            }
            BreakerState::Open => {
                g.state = BreakerState::Closed;
                g.successes = 0;
            }
            BreakerState::Closed => {}
        }
    }
}
