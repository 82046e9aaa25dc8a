//! Circuit breaker guarding a named, repeatedly failing resource.
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::Deref;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{
    ConfigError, check_breaker, default_breaker_half_open_ms, default_breaker_open_ms,
    default_breaker_threshold,
};
use crate::constants::{
    LOG_BREAKER_CLOSED, LOG_BREAKER_HALF_OPEN, LOG_BREAKER_OPEN, TARGET_RESILIENCE,
};
use crate::error::GameError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, one trial request is let through
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_breaker_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_open_ms")]
    pub open_timeout_ms: u64,
    #[serde(default = "default_breaker_half_open_ms")]
    pub half_open_retry_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_breaker_threshold(),
            open_timeout_ms: default_breaker_open_ms(),
            half_open_retry_ms: default_breaker_half_open_ms(),
        }
    }
}

impl BreakerConfig {
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    #[must_use]
    pub const fn half_open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.half_open_retry_ms)
    }

    /// # Errors
    ///
    /// Returns an error for a zero threshold or zero open timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_breaker(self)
    }
}

/// Error from a breaker-guarded call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError<E> {
    #[error("circuit {0} is open")]
    CircuitOpen(String),
    #[error("{0}")]
    Operation(E),
}

impl<E> GuardError<E> {
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    next_retry_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                next_retry_at: None,
                trial_in_flight: false,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    #[must_use]
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.inner.lock().next_retry_at
    }

    /// Decide whether a call may proceed at `now`. A caller admitted as the
    /// half-open trial must follow up with `record_success`,
    /// `record_failure` or `release_trial`.
    ///
    /// # Errors
    ///
    /// Returns `CircuitOpen` while open, and for every caller after the single
    /// half-open trial has been admitted.
    pub fn admit(&self, now: Instant) -> Result<(), GameError> {
        self.try_admit(now).map(|_| ())
    }

    /// Like `admit`, but reports whether the caller holds the half-open trial.
    fn try_admit(&self, now: Instant) -> Result<bool, GameError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                if inner.next_retry_at.is_some_and(|at| now >= at) {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(target: TARGET_RESILIENCE, "{LOG_BREAKER_HALF_OPEN} name={}", self.name);
                    Ok(true)
                } else {
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.open_error())
                } else {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    /// Give back an unfinished half-open trial so the next caller may run one.
    pub fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            debug!(target: TARGET_RESILIENCE, "trial abandoned name={}", self.name);
        }
    }

    /// Record a success: closes the circuit and resets the failure count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(target: TARGET_RESILIENCE, "{LOG_BREAKER_CLOSED} name={}", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.next_retry_at = None;
        inner.trial_in_flight = false;
    }

    /// Record a failure at `now`.
    pub fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.next_retry_at = Some(now + self.config.open_timeout());
                    warn!(
                        target: TARGET_RESILIENCE,
                        "{LOG_BREAKER_OPEN} name={} failures={}",
                        self.name, inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Failed trial reopens with the shorter retry delay.
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                inner.next_retry_at = Some(now + self.config.half_open_retry_delay());
                warn!(
                    target: TARGET_RESILIENCE,
                    "{LOG_BREAKER_OPEN} name={} trial failed", self.name
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::CircuitOpen` without invoking `operation` when the
    /// circuit rejects the call, or `GuardError::Operation` with its error.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Ok(admission) = Admission::acquire(self, Instant::now()) else {
            return Err(GuardError::CircuitOpen(self.name.clone()));
        };
        admission.settle(operation().await)
    }

    fn settle<T, E>(&self, result: Result<T, E>) -> Result<T, GuardError<E>> {
        match result {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure(Instant::now());
                Err(GuardError::Operation(err))
            }
        }
    }

    fn open_error(&self) -> GameError {
        GameError::CircuitOpen {
            resource: self.name.clone(),
        }
    }
}

/// A call the breaker let through. Dropping it unsettled (a cancelled
/// future) releases the half-open trial instead of leaving it held.
pub(crate) struct Admission<B: Deref<Target = CircuitBreaker>> {
    breaker: B,
    trial: bool,
}

impl<B: Deref<Target = CircuitBreaker>> Admission<B> {
    pub(crate) fn acquire(breaker: B, now: Instant) -> Result<Self, GameError> {
        let trial = breaker.try_admit(now)?;
        Ok(Self { breaker, trial })
    }

    /// Record the result of the admitted call.
    pub(crate) fn settle<T, E>(mut self, result: Result<T, E>) -> Result<T, GuardError<E>> {
        self.trial = false;
        self.breaker.settle(result)
    }
}

impl<B: Deref<Target = CircuitBreaker>> Drop for Admission<B> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(threshold: u32) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            open_timeout_ms: 1_000,
            half_open_retry_ms: 500,
        }
    }

    #[test]
    fn test_circuit_breaker_opens() {
        let cb = CircuitBreaker::new("assets", config(3));
        let now = Instant::now();

        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(now);
        cb.record_failure(now);
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure(now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.next_retry_at(), Some(now + Duration::from_secs(1)));
        assert_eq!(
            cb.admit(now),
            Err(GameError::CircuitOpen {
                resource: "assets".into()
            })
        );
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let cb = CircuitBreaker::new("assets", config(1));
        let now = Instant::now();
        cb.record_failure(now);

        let later = now + Duration::from_secs(1);
        assert!(cb.admit(later).is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.admit(later).is_err());

        cb.record_failure(later);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.next_retry_at(), Some(later + Duration::from_millis(500)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("assets", config(3));
        let now = Instant::now();
        cb.record_failure(now);
        assert_eq!(cb.failure_count(), 1);
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_is_released() {
        let cb = CircuitBreaker::new("assets", config(1));
        cb.record_failure(Instant::now());
        tokio::time::advance(Duration::from_secs(1)).await;

        let stalled = cb.call(|| std::future::pending::<Result<(), &str>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), stalled).await;
        assert!(timed_out.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result = cb.call(|| async { Ok::<_, &str>(1) }).await;
        assert_eq!(result, Ok(1));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_fails_fast_without_invoking() {
        let cb = CircuitBreaker::new("assets", config(2));
        let calls = AtomicU32::new(0);
        let failing = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("down") }
        };

        for _ in 0..2 {
            let result = cb.call(failing).await;
            assert_eq!(result, Err(GuardError::Operation("down")));
        }
        let result = cb.call(failing).await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(1)).await;
        let result = cb.call(|| async { Ok::<_, &str>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
