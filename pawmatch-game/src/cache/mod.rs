//! LRU asset cache with guarded loads, staggered preloading and tiered cleanup.
mod lru;
mod preload;

pub use preload::{PreloadPriority, preload_delay};

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;
use crate::constants::{
    AGGRESSIVE_CLEANUP_PCT, ASSET_BREAKER_NAME, BASIC_CLEANUP_PCT, LOG_CACHE_CLEANUP,
    LOG_CACHE_EVICT, LOG_CACHE_LOAD_FAILED, MODERATE_CLEANUP_PCT, TARGET_CACHE,
};
use crate::error::{AssetError, GameError};
use crate::numbers::{ceil_share, len_to_u64};
use crate::resilience::{CircuitState, GuardError, ResilienceGuard};
use lru::LruIndex;

/// Loads an asset by key. Failures are ordinary errors; the cache retries them.
#[async_trait]
pub trait AssetLoader: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns an error when the asset cannot be produced.
    async fn load(&self, key: &str) -> Result<Self::Handle, AssetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupTier {
    Basic,
    Moderate,
    Aggressive,
}

impl CleanupTier {
    #[must_use]
    pub const fn evict_pct(self) -> usize {
        match self {
            Self::Basic => BASIC_CLEANUP_PCT,
            Self::Moderate => MODERATE_CLEANUP_PCT,
            Self::Aggressive => AGGRESSIVE_CLEANUP_PCT,
        }
    }

    #[must_use]
    pub const fn clears_failed(self) -> bool {
        matches!(self, Self::Moderate | Self::Aggressive)
    }

    #[must_use]
    pub const fn cancels_preloads(self) -> bool {
        matches!(self, Self::Aggressive)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for CleanupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub evicted: usize,
    pub failed_cleared: usize,
    pub preloads_cancelled: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

struct CacheShared<L: AssetLoader> {
    loader: L,
    config: CacheConfig,
    entries: RwLock<LruIndex<L::Handle>>,
    failed: Mutex<HashSet<String>>,
    in_flight: Mutex<HashSet<String>>,
    guard: ResilienceGuard,
    urgent: Arc<Semaphore>,
    background: Arc<Semaphore>,
    preload_token: Mutex<CancellationToken>,
    hits: AtomicU64,
    misses: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

/// Shared handle to the asset cache; clones refer to the same entries.
pub struct ResourceCache<L: AssetLoader> {
    shared: Arc<CacheShared<L>>,
}

impl<L: AssetLoader> Clone for ResourceCache<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: AssetLoader> fmt::Debug for ResourceCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("failed", &self.shared.failed.lock().len())
            .finish_non_exhaustive()
    }
}

impl<L: AssetLoader> ResourceCache<L> {
    #[must_use]
    pub fn new(loader: L, config: CacheConfig) -> Self {
        let capacity = config.effective_capacity();
        let guard = ResilienceGuard::new(config.load_retry.clone(), config.breaker.clone());
        Self {
            shared: Arc::new(CacheShared {
                loader,
                entries: RwLock::new(LruIndex::new(capacity)),
                failed: Mutex::new(HashSet::new()),
                in_flight: Mutex::new(HashSet::new()),
                guard,
                urgent: Arc::new(Semaphore::new(config.urgent_workers.max(1))),
                background: Arc::new(Semaphore::new(config.background_workers.max(1))),
                preload_token: Mutex::new(CancellationToken::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                load_failures: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn loader(&self) -> &L {
        &self.shared.loader
    }

    /// Cached handle for `key`, loading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `AssetUnavailable` for keys that failed before (until reset) or
    /// that fail every retry, and `CircuitOpen` while the asset breaker is open.
    pub async fn get(&self, key: &str) -> Result<L::Handle, GameError> {
        let cached = self.shared.entries.write().touch(key);
        if let Some(handle) = cached {
            self.shared.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }
        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        if self.is_failed(key) {
            return Err(GameError::AssetUnavailable {
                key: key.to_string(),
                reason: "marked failed".into(),
            });
        }
        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<L::Handle, GameError> {
        let loader = &self.shared.loader;
        let outcome = self
            .shared
            .guard
            .execute(ASSET_BREAKER_NAME, move |_| loader.load(key))
            .await;
        match outcome.result {
            Ok(handle) => {
                self.insert(key, handle.clone());
                Ok(handle)
            }
            Err(GuardError::CircuitOpen(resource)) => Err(GameError::CircuitOpen { resource }),
            Err(GuardError::Operation(err)) => {
                self.shared.failed.lock().insert(key.to_string());
                self.shared.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: TARGET_CACHE,
                    "{LOG_CACHE_LOAD_FAILED} key={key} attempts={} error={err}",
                    outcome.attempts
                );
                Err(GameError::AssetUnavailable {
                    key: key.to_string(),
                    reason: err.message,
                })
            }
        }
    }

    /// Insert or replace a handle. Re-inserting a key never double counts it.
    pub fn insert(&self, key: &str, handle: L::Handle) {
        let evicted = self.shared.entries.write().insert(key, handle);
        self.shared.failed.lock().remove(key);
        if !evicted.is_empty() {
            self.shared
                .evictions
                .fetch_add(len_to_u64(evicted.len()), Ordering::Relaxed);
            debug!(target: TARGET_CACHE, "{LOG_CACHE_EVICT} keys={evicted:?}");
        }
    }

    /// Schedule background loads: the first three keys start after
    /// 100/200/300ms, the rest 500ms apart. Cached, failed and already
    /// scheduled keys are skipped.
    pub fn preload(&self, keys: &[String], priority: PreloadPriority) -> Vec<JoinHandle<()>> {
        let token = self.shared.preload_token.lock().clone();
        let semaphore = match priority {
            PreloadPriority::Critical => Arc::clone(&self.shared.urgent),
            PreloadPriority::Normal => Arc::clone(&self.shared.background),
        };
        let mut tasks = Vec::new();
        for key in keys {
            if self.contains(key) || self.is_failed(key) {
                continue;
            }
            if !self.shared.in_flight.lock().insert(key.clone()) {
                continue;
            }
            let delay = preload_delay(tasks.len());
            let cache = self.clone();
            let token = token.clone();
            let semaphore = Arc::clone(&semaphore);
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    () = token.cancelled() => {
                        debug!(target: TARGET_CACHE, "preload of {key} cancelled");
                    }
                    () = cache.run_preload(&key, delay, semaphore) => {}
                }
                cache.shared.in_flight.lock().remove(&key);
            }));
        }
        tasks
    }

    async fn run_preload(&self, key: &str, delay: Duration, semaphore: Arc<Semaphore>) {
        tokio::time::sleep(delay).await;
        let Ok(_permit) = semaphore.acquire_owned().await else {
            return;
        };
        if let Err(err) = self.get(key).await {
            debug!(target: TARGET_CACHE, "preload of {key} skipped: {err}");
        }
    }

    /// Load every key in parallel on the urgent pool and wait for all of them.
    pub async fn preload_critical(
        &self,
        keys: &[String],
    ) -> Vec<(String, Result<L::Handle, GameError>)> {
        let mut set = JoinSet::new();
        for key in keys {
            let cache = self.clone();
            let key = key.clone();
            set.spawn(async move {
                let permit = Arc::clone(&cache.shared.urgent).acquire_owned().await;
                let result = cache.get(&key).await;
                drop(permit);
                (key, result)
            });
        }
        let mut results = Vec::with_capacity(keys.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => warn!(target: TARGET_CACHE, "critical load task failed: {err}"),
            }
        }
        results
    }

    /// Evict the oldest share of entries for `tier`.
    pub fn cleanup(&self, tier: CleanupTier) -> CleanupReport {
        let evicted = {
            let mut entries = self.shared.entries.write();
            let count = ceil_share(entries.len(), tier.evict_pct());
            entries.evict_oldest(count)
        };
        self.shared
            .evictions
            .fetch_add(len_to_u64(evicted.len()), Ordering::Relaxed);
        let failed_cleared = if tier.clears_failed() {
            self.clear_failed()
        } else {
            0
        };
        let preloads_cancelled = if tier.cancels_preloads() {
            self.cancel_preloads()
        } else {
            0
        };
        let report = CleanupReport {
            evicted: evicted.len(),
            failed_cleared,
            preloads_cancelled,
        };
        info!(
            target: TARGET_CACHE,
            "{LOG_CACHE_CLEANUP} tier={tier} evicted={} failed_cleared={} preloads_cancelled={}",
            report.evicted, report.failed_cleared, report.preloads_cancelled
        );
        report
    }

    /// Cancel scheduled preloads; returns how many were pending. Loads
    /// already running may still land in the cache.
    pub fn cancel_preloads(&self) -> usize {
        let mut token = self.shared.preload_token.lock();
        token.cancel();
        *token = CancellationToken::new();
        let mut in_flight = self.shared.in_flight.lock();
        let pending = in_flight.len();
        in_flight.clear();
        pending
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.shared.entries.read().contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.entries.read().capacity()
    }

    /// Item count times the per-item estimate.
    #[must_use]
    pub fn estimated_bytes(&self) -> u64 {
        len_to_u64(self.len()).saturating_mul(self.shared.config.item_estimate_bytes)
    }

    /// Keys from least to most recently used.
    #[must_use]
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.shared.entries.read().keys_by_recency()
    }

    #[must_use]
    pub fn is_failed(&self, key: &str) -> bool {
        self.shared.failed.lock().contains(key)
    }

    #[must_use]
    pub fn failed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.failed.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Allow a failed key to be loaded again.
    pub fn reset_failed(&self, key: &str) -> bool {
        self.shared.failed.lock().remove(key)
    }

    pub fn clear_failed(&self) -> usize {
        let mut failed = self.shared.failed.lock();
        let cleared = failed.len();
        failed.clear();
        cleared
    }

    #[must_use]
    pub fn pending_preloads(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    #[must_use]
    pub fn breaker_state(&self) -> Option<CircuitState> {
        self.shared.guard.state_of(ASSET_BREAKER_NAME)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            load_failures: self.shared.load_failures.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
        }
    }
}
