//! Retry with capped exponential backoff and jitter.
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::{
    ConfigError, check_retry, default_retry_attempts, default_retry_initial_ms,
    default_retry_jitter_ms, default_retry_max_ms, default_retry_multiplier,
};
use crate::constants::{LOG_RETRY_ATTEMPT, TARGET_RESILIENCE};
use crate::numbers::{clamp_f64_to_u64, u64_to_f64};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_retry_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial_ms(),
            max_delay_ms: default_retry_max_ms(),
            backoff_multiplier: default_retry_multiplier(),
            max_jitter_ms: default_retry_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// A config that retries immediately; mostly for tests and synchronous paths.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            max_jitter_ms: 0,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter:
    /// `min(initial * multiplier^(attempt-1), max)`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = u64_to_f64(self.initial_delay_ms) * self.backoff_multiplier.powi(exponent);
        let millis = clamp_f64_to_u64(scaled).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// # Errors
    ///
    /// Returns an error for zero attempts, initial delay above max, or a
    /// multiplier below 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_retry(self)
    }
}

/// Final result of a retried operation plus how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the attempt count.
    ///
    /// # Errors
    ///
    /// Returns the last error when every attempt failed.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Run `operation` up to `config.max_attempts` times, sleeping with backoff
/// between failures. Never sleeps after the final attempt.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_if(config, operation, |_| true).await
}

/// Like [`retry`], but stops early when `should_retry` rejects an error.
pub async fn retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    };
                }
                let delay = config.base_delay(attempt) + jitter(config.max_jitter_ms);
                debug!(
                    target: TARGET_RESILIENCE,
                    "{LOG_RETRY_ATTEMPT} attempt={attempt}/{max_attempts} delay_ms={} error={err}",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Synchronous retry without sleeping, for paths that must not suspend.
pub fn retry_immediately<T, E, F>(max_attempts: u32, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if attempt >= max_attempts => {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }
            Err(_) => attempt += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_is_monotonic_and_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_jitter_ms: 100,
        };
        let delays: Vec<Duration> = (1..=10).map(|n| config.base_delay(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[3], Duration::from_millis(800));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(1_000)));
        assert_eq!(delays[9], Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let outcome = retry(&RetryConfig::default(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("flaky")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_without_trailing_delay() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_jitter_ms: 0,
        };
        let start = tokio::time::Instant::now();
        let outcome: RetryOutcome<(), &str> =
            retry(&config, |_| async { Err("down") }).await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Err("down"));
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_if_stops_on_rejected_error() {
        let outcome: RetryOutcome<(), &str> = retry_if(
            &RetryConfig::default(),
            |_| async { Err("fatal") },
            |err| *err != "fatal",
        )
        .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn immediate_retry_counts_attempts() {
        let outcome: RetryOutcome<u32, &str> =
            retry_immediately(4, |attempt| if attempt == 2 { Ok(7) } else { Err("no") });
        assert_eq!(outcome.result, Ok(7));
        assert_eq!(outcome.attempts, 2);

        let outcome: RetryOutcome<u32, &str> = retry_immediately(2, |_| Err("no"));
        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.succeeded());
    }
}
