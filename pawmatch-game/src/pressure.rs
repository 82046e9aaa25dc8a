//! Memory pressure sampling and the cleanup each level triggers.
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cache::{AssetLoader, CleanupReport, CleanupTier, ResourceCache};
use crate::config::PressureConfig;
use crate::constants::{
    CRITICAL_PRESSURE_HISTORY_KEEP, CRITICAL_PRESSURE_USED_BREEDS_KEEP,
    HIGH_PRESSURE_HISTORY_KEEP, LOG_PRESSURE_LEVEL, PRESSURE_MEDIUM_PCT, TARGET_PRESSURE,
};
use crate::numbers::len_to_u64;
use crate::persistence::{SessionPersistenceManager, SessionStore};
use crate::session::GameSession;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    /// Classify `bytes` against the warning and critical thresholds.
    #[must_use]
    pub fn classify(bytes: u64, config: &PressureConfig) -> Self {
        if bytes >= config.critical_bytes {
            Self::Critical
        } else if bytes >= config.warning_bytes {
            Self::High
        } else if u128::from(bytes) * 100
            >= u128::from(config.warning_bytes) * u128::from(PRESSURE_MEDIUM_PCT)
        {
            Self::Medium
        } else {
            Self::Low
        }
    }

    #[must_use]
    pub const fn cleanup_tier(self) -> Option<CleanupTier> {
        match self {
            Self::Low => None,
            Self::Medium => Some(CleanupTier::Basic),
            Self::High => Some(CleanupTier::Moderate),
            Self::Critical => Some(CleanupTier::Aggressive),
        }
    }

    /// How many history entries survive at this level.
    #[must_use]
    pub const fn history_keep(self) -> Option<usize> {
        match self {
            Self::Low | Self::Medium => None,
            Self::High => Some(HIGH_PRESSURE_HISTORY_KEEP),
            Self::Critical => Some(CRITICAL_PRESSURE_HISTORY_KEEP),
        }
    }

    /// How many used breed names survive at this level.
    #[must_use]
    pub const fn used_breeds_keep(self) -> Option<usize> {
        match self {
            Self::Critical => Some(CRITICAL_PRESSURE_USED_BREEDS_KEEP),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One memory estimate, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PressureSample {
    pub cache_bytes: u64,
    pub history_bytes: u64,
    /// Extra usage the host reports (decoded images, UI, ...).
    pub host_bytes: u64,
}

impl PressureSample {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.cache_bytes
            .saturating_add(self.history_bytes)
            .saturating_add(self.host_bytes)
    }
}

/// A level change and the relief it calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PressureTransition {
    pub previous: PressureLevel,
    pub level: PressureLevel,
    pub sample: PressureSample,
}

/// What a transition actually did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PressureResponse {
    pub transition: PressureTransition,
    pub cleanup: Option<CleanupReport>,
    pub history_trimmed: usize,
    pub used_breeds_kept: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResourcePressureCoordinator {
    config: PressureConfig,
    level: PressureLevel,
    transitions: u64,
}

impl ResourcePressureCoordinator {
    #[must_use]
    pub const fn new(config: PressureConfig) -> Self {
        Self {
            config,
            level: PressureLevel::Low,
            transitions: 0,
        }
    }

    #[must_use]
    pub const fn level(&self) -> PressureLevel {
        self.level
    }

    #[must_use]
    pub const fn transitions(&self) -> u64 {
        self.transitions
    }

    #[must_use]
    pub const fn config(&self) -> &PressureConfig {
        &self.config
    }

    /// Record a sample. Returns a transition only when the level changed.
    pub fn observe(&mut self, sample: PressureSample) -> Option<PressureTransition> {
        let level = PressureLevel::classify(sample.total(), &self.config);
        if level == self.level {
            return None;
        }
        let transition = PressureTransition {
            previous: self.level,
            level,
            sample,
        };
        self.level = level;
        self.transitions += 1;
        match level {
            PressureLevel::Low | PressureLevel::Medium => info!(
                target: TARGET_PRESSURE,
                "{LOG_PRESSURE_LEVEL} from={} to={level} bytes={}",
                transition.previous,
                sample.total()
            ),
            PressureLevel::High | PressureLevel::Critical => warn!(
                target: TARGET_PRESSURE,
                "{LOG_PRESSURE_LEVEL} from={} to={level} bytes={}",
                transition.previous,
                sample.total()
            ),
        }
        Some(transition)
    }

    /// Sample the cache, the history ring and `host_bytes`, and on a level
    /// change run the matching cleanup tier and trims.
    pub async fn relieve<L, S>(
        &mut self,
        cache: &ResourceCache<L>,
        persistence: &tokio::sync::Mutex<SessionPersistenceManager<S>>,
        session: &Mutex<GameSession>,
        host_bytes: u64,
    ) -> Option<PressureResponse>
    where
        L: AssetLoader,
        S: SessionStore,
    {
        let mut manager = persistence.lock().await;
        let sample = PressureSample {
            cache_bytes: cache.estimated_bytes(),
            history_bytes: len_to_u64(manager.history_bytes()),
            host_bytes,
        };
        let transition = self.observe(sample)?;
        let level = transition.level;
        let cleanup = level.cleanup_tier().map(|tier| cache.cleanup(tier));
        let history_trimmed = level
            .history_keep()
            .map_or(0, |keep| manager.trim_history(keep));
        drop(manager);
        let used_breeds_kept = level.used_breeds_keep();
        if let Some(keep) = used_breeds_kept {
            session.lock().trim_used_breeds(keep);
        }
        Some(PressureResponse {
            transition,
            cleanup,
            history_trimmed,
            used_breeds_kept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, PersistenceConfig, SessionConfig};
    use crate::data::BreedCatalog;
    use crate::error::AssetError;
    use crate::persistence::MemoryStore;
    use crate::resilience::RetryConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    const MIB: u64 = 1024 * 1024;

    struct EchoLoader;

    #[async_trait]
    impl AssetLoader for EchoLoader {
        type Handle = String;

        async fn load(&self, key: &str) -> Result<String, AssetError> {
            Ok(key.to_string())
        }
    }

    #[test]
    fn levels_follow_thresholds() {
        let config = PressureConfig::default();
        assert_eq!(PressureLevel::classify(0, &config), PressureLevel::Low);
        assert_eq!(PressureLevel::classify(69 * MIB, &config), PressureLevel::Low);
        assert_eq!(PressureLevel::classify(70 * MIB, &config), PressureLevel::Medium);
        assert_eq!(PressureLevel::classify(100 * MIB, &config), PressureLevel::High);
        assert_eq!(PressureLevel::classify(150 * MIB, &config), PressureLevel::Critical);
    }

    #[test]
    fn repeated_levels_are_ignored() {
        let mut coordinator = ResourcePressureCoordinator::new(PressureConfig::default());
        let high = PressureSample {
            host_bytes: 120 * MIB,
            ..PressureSample::default()
        };
        let transition = coordinator.observe(high).unwrap();
        assert_eq!(transition.previous, PressureLevel::Low);
        assert_eq!(transition.level, PressureLevel::High);
        assert_eq!(coordinator.observe(high), None);
        assert_eq!(coordinator.transitions(), 1);

        let calm = coordinator.observe(PressureSample::default()).unwrap();
        assert_eq!(calm.level, PressureLevel::Low);
        assert_eq!(calm.level.cleanup_tier(), None);
    }

    #[tokio::test]
    async fn critical_pressure_trims_everything() {
        let now = Utc::now();
        let cache = ResourceCache::new(
            EchoLoader,
            CacheConfig {
                load_retry: RetryConfig::immediate(1),
                ..CacheConfig::default()
            },
        );
        for i in 0..10 {
            cache.get(&format!("img-{i}")).await.unwrap();
        }

        let catalog = Arc::new(BreedCatalog::bundled().unwrap());
        let mut game = GameSession::new(catalog, SessionConfig::default(), 11);
        game.start(now).unwrap();
        let store = MemoryStore::new();
        let mut manager = SessionPersistenceManager::new(store, PersistenceConfig::default());
        for _ in 0..12 {
            if let Some(challenge) = game.current_challenge() {
                let slot = challenge.correct_slot;
                game.select_image(slot);
            }
            manager.save_now(&game.snapshot(), now).unwrap();
        }
        assert!(game.used_breeds().len() > 10);
        assert!(manager.history().len() > 1);

        let persistence = tokio::sync::Mutex::new(manager);
        let session = Mutex::new(game);
        let mut coordinator = ResourcePressureCoordinator::new(PressureConfig::default());
        let response = coordinator
            .relieve(&cache, &persistence, &session, 200 * MIB)
            .await
            .unwrap();
        assert_eq!(response.transition.level, PressureLevel::Critical);
        assert_eq!(response.cleanup.map(|c| c.evicted), Some(6));
        assert_eq!(cache.len(), 4);
        assert_eq!(persistence.lock().await.history().len(), 1);
        assert_eq!(session.lock().used_breeds().len(), 10);

        let again = coordinator
            .relieve(&cache, &persistence, &session, 200 * MIB)
            .await;
        assert_eq!(again, None);
    }
}
