use pawmatch_game::resilience::GuardError;
use pawmatch_game::{BreakerConfig, CircuitState, ResilienceGuard, RetryConfig, RetryOutcome};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const STORE: &str = "store";

fn guard() -> ResilienceGuard {
    ResilienceGuard::new(
        RetryConfig::immediate(3),
        BreakerConfig {
            failure_threshold: 3,
            open_timeout_ms: 60_000,
            half_open_retry_ms: 5_000,
        },
    )
}

async fn failing(
    guard: &ResilienceGuard,
    calls: &AtomicU32,
) -> RetryOutcome<u32, GuardError<String>> {
    guard
        .execute(STORE, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("disk full".to_string()) }
        })
        .await
}

async fn healthy(
    guard: &ResilienceGuard,
    calls: &AtomicU32,
) -> RetryOutcome<u32, GuardError<String>> {
    guard
        .execute(STORE, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(attempt) }
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_then_heals_after_timeout() {
    let guard = guard();
    let calls = AtomicU32::new(0);

    let outcome = failing(&guard, &calls).await;
    assert_eq!(outcome.attempts, 3);
    assert_eq!(
        outcome.result,
        Err(GuardError::Operation("disk full".to_string()))
    );
    assert_eq!(guard.state_of(STORE), Some(CircuitState::Open));

    let blocked = healthy(&guard, &calls).await;
    assert_eq!(blocked.attempts, 1);
    assert!(blocked.result.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(60)).await;
    let healed = healthy(&guard, &calls).await;
    assert_eq!(healed.result, Ok(1));
    assert_eq!(guard.state_of(STORE), Some(CircuitState::Closed));
    assert_eq!(guard.breaker(STORE).failure_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_with_short_delay() {
    let guard = guard();
    let calls = AtomicU32::new(0);
    failing(&guard, &calls).await;
    tokio::time::advance(Duration::from_secs(60)).await;

    let trial = failing(&guard, &calls).await;
    assert_eq!(trial.attempts, 2);
    assert!(trial.result.unwrap_err().is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(guard.state_of(STORE), Some(CircuitState::Open));

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(healthy(&guard, &calls).await.succeeded());
    assert_eq!(guard.state_of(STORE), Some(CircuitState::Closed));
}

#[tokio::test(start_paused = true)]
async fn separate_resources_trip_independently() {
    let guard = guard();
    let calls = AtomicU32::new(0);
    failing(&guard, &calls).await;
    let other = guard
        .execute("assets", |_| async { Ok::<_, String>("loaded") })
        .await;
    assert_eq!(other.result, Ok("loaded"));
    assert_eq!(guard.state_of("assets"), Some(CircuitState::Closed));
    assert_eq!(guard.state_of(STORE), Some(CircuitState::Open));
}
