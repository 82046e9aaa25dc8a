//! Runtime drills: scripted fault injection against a full `SessionRuntime`.
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail, ensure};
use async_trait::async_trait;
use pawmatch_game::constants::{SESSION_HISTORY_KEY, SESSION_STATE_KEY};
use pawmatch_game::{
    AssetError, AssetLoader, BundledCatalog, CacheConfig, CircuitState, CleanupTier, GameEngine,
    HostLifecycleEvent, LaunchOutcome, MemoryStore, PressureLevel, ResourceCache, RetryConfig,
    RuntimeConfig, SessionStatus,
};
use tokio::sync::mpsc;

/// Scripted runtime drills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrillKind {
    /// Corrupt the stored session between launches.
    Recovery,
    /// Fill the cache, raise host memory, and check relief.
    CachePressure,
    /// Fail every asset load until the breaker opens.
    FlakyAssets,
}

impl DrillKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Recovery => "recovery-drill",
            Self::CachePressure => "cache-pressure",
            Self::FlakyAssets => "flaky-assets",
        }
    }

    /// Run the drill once with `seed`.
    ///
    /// # Errors
    ///
    /// Returns the first expectation the runtime failed.
    pub async fn run(self, seed: u64) -> Result<()> {
        match self {
            Self::Recovery => recovery_drill(seed).await,
            Self::CachePressure => cache_pressure_drill(seed).await,
            Self::FlakyAssets => flaky_assets_drill().await,
        }
    }
}

#[derive(Clone, Default)]
struct NamedLoader {
    failures: Arc<AtomicU32>,
    broken: bool,
}

#[async_trait]
impl AssetLoader for NamedLoader {
    type Handle = Arc<str>;

    async fn load(&self, key: &str) -> Result<Arc<str>, AssetError> {
        if self.broken {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(AssetError::new(key, "decoder unavailable"));
        }
        Ok(Arc::from(key))
    }
}

fn engine() -> Result<GameEngine<BundledCatalog>> {
    Ok(GameEngine::new(BundledCatalog, RuntimeConfig::default())?)
}

async fn recovery_drill(seed: u64) -> Result<()> {
    let engine = engine()?;
    let store = MemoryStore::new();

    let (_host, lifecycle) = mpsc::channel(1);
    let (runtime, _events) = engine
        .launch(NamedLoader::default(), store.clone(), seed, lifecycle)
        .await?;
    runtime.start()?;
    for _ in 0..4 {
        let Some(challenge) = runtime.current_challenge() else {
            bail!("session ended before the drill could answer");
        };
        runtime.select_image(challenge.correct_slot);
    }
    runtime.handle_lifecycle(HostLifecycleEvent::Backgrounded).await;
    let saved = runtime.snapshot();
    runtime.shutdown().await;

    store.put_raw(
        SESSION_STATE_KEY,
        b"{\"version\":1,\"checksum\":0,\"state\":null}".to_vec(),
    );

    let (_host, lifecycle) = mpsc::channel(1);
    let (restored, _events) = engine
        .launch(NamedLoader::default(), store.clone(), seed, lifecycle)
        .await?;
    let outcome = restored.launch_outcome().clone();
    let LaunchOutcome::Recovered(report) = outcome else {
        bail!("expected recovery, launch reported {outcome:?}");
    };
    ensure!(
        restored.snapshot().score == saved.score,
        "recovered score {} differs from saved {} (step {:?})",
        restored.snapshot().score,
        saved.score,
        report.step
    );
    ensure!(
        restored.status() == SessionStatus::Paused,
        "recovered session should wait paused, found {}",
        restored.status()
    );
    restored.shutdown().await;

    store.put_raw(SESSION_STATE_KEY, b"not even json".to_vec());
    store.put_raw(SESSION_HISTORY_KEY, b"[]".to_vec());
    let (_host, lifecycle) = mpsc::channel(1);
    let (fresh, _events) = engine
        .launch(NamedLoader::default(), store.clone(), seed, lifecycle)
        .await?;
    ensure!(
        fresh.launch_outcome() == &LaunchOutcome::Unrecoverable,
        "garbage without history must be unrecoverable, got {:?}",
        fresh.launch_outcome()
    );
    ensure!(!store.contains(SESSION_STATE_KEY), "store was not cleared");
    fresh.shutdown().await;
    Ok(())
}

async fn cache_pressure_drill(seed: u64) -> Result<()> {
    let engine = engine()?;
    let (_host, lifecycle) = mpsc::channel(1);
    let (runtime, _events) = engine
        .launch(NamedLoader::default(), MemoryStore::new(), seed, lifecycle)
        .await?;
    for i in 0..40 {
        runtime.cache().get(&format!("breeds/drill_{i}")).await?;
    }
    ensure!(runtime.cache().len() == 40, "cache holds {}", runtime.cache().len());

    runtime.report_host_memory(120 * 1024 * 1024);
    let Some(high) = runtime.sample_pressure().await else {
        bail!("high memory produced no pressure transition");
    };
    ensure!(
        high.transition.level == PressureLevel::High,
        "expected high pressure, got {}",
        high.transition.level
    );
    ensure!(
        runtime.cache().len() == 24,
        "moderate cleanup should keep 24 items, kept {}",
        runtime.cache().len()
    );

    runtime.report_host_memory(0);
    let calm = runtime.sample_pressure().await;
    ensure!(
        calm.is_some_and(|response| response.transition.level == PressureLevel::Low),
        "pressure did not return to low"
    );
    runtime.shutdown().await;
    Ok(())
}

async fn flaky_assets_drill() -> Result<()> {
    let loader = NamedLoader {
        broken: true,
        ..NamedLoader::default()
    };
    let failures = Arc::clone(&loader.failures);
    let cache = ResourceCache::new(
        loader,
        CacheConfig {
            load_retry: RetryConfig::immediate(1),
            ..CacheConfig::default()
        },
    );
    let threshold = cache.config().breaker.failure_threshold;
    for i in 0..threshold {
        ensure!(
            cache.get(&format!("breeds/broken_{i}")).await.is_err(),
            "broken loader produced an image"
        );
    }
    ensure!(
        cache.breaker_state() == Some(CircuitState::Open),
        "breaker should be open after {threshold} failures"
    );
    let calls = failures.load(Ordering::SeqCst);
    ensure!(
        cache.get("breeds/after_open").await.is_err(),
        "open breaker let a load through"
    );
    ensure!(
        failures.load(Ordering::SeqCst) == calls,
        "open breaker still called the loader"
    );
    ensure!(
        !cache.is_failed("breeds/after_open"),
        "fast-failed key must not be marked failed"
    );
    let report = cache.cleanup(CleanupTier::Aggressive);
    ensure!(
        report.failed_cleared == usize::try_from(threshold).unwrap_or(usize::MAX),
        "aggressive cleanup cleared {} failed keys",
        report.failed_cleared
    );
    Ok(())
}
