//! Retry and circuit-breaker guards for fallible collaborators.
mod circuit;
mod retry;

pub use circuit::{BreakerConfig, CircuitBreaker, CircuitState, GuardError};

use circuit::Admission;
pub use retry::{RetryConfig, RetryOutcome, retry, retry_if, retry_immediately};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// Registry of named circuit breakers sharing one retry policy.
#[derive(Debug)]
pub struct ResilienceGuard {
    retry: RetryConfig,
    breaker_config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl ResilienceGuard {
    #[must_use]
    pub fn new(retry: RetryConfig, breaker_config: BreakerConfig) -> Self {
        Self {
            retry,
            breaker_config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Breaker for `name`, created closed on first use.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.breaker_config.clone()))),
        )
    }

    #[must_use]
    pub fn state_of(&self, name: &str) -> Option<CircuitState> {
        self.breakers.lock().get(name).map(|breaker| breaker.state())
    }

    /// Retry `operation` through the breaker named `name`. An open circuit
    /// ends the retry loop immediately.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        mut operation: F,
    ) -> RetryOutcome<T, GuardError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let breaker = self.breaker(name);
        retry_if(
            &self.retry,
            |attempt| {
                let name = breaker.name().to_string();
                let pending = Admission::acquire(Arc::clone(&breaker), Instant::now())
                    .ok()
                    .map(|admission| (admission, operation(attempt)));
                async move {
                    match pending {
                        Some((admission, fut)) => admission.settle(fut.await),
                        None => Err(GuardError::CircuitOpen(name)),
                    }
                }
            },
            |err| !err.is_circuit_open(),
        )
        .await
    }
}
