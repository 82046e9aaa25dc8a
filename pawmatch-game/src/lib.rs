//! Pawmatch Session Runtime
//!
//! Platform-agnostic core of the Pawmatch breed-matching trivia game: the
//! challenge generator, session state machine, persistence with recovery,
//! asset cache and memory-pressure relief. The crate has no UI; hosts drive it
//! through [`SessionRuntime`] or, headless, through [`GameSession`].

pub mod cache;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod hints;
pub mod numbers;
pub mod persistence;
pub mod phase;
pub mod powerups;
pub mod pressure;
pub mod resilience;
pub mod runtime;
pub mod session;

use std::sync::Arc;

// Re-export commonly used types
pub use cache::{
    AssetLoader, CacheStats, CleanupReport, CleanupTier, PreloadPriority, ResourceCache,
};
pub use challenge::{Challenge, ChallengeGenerator, ChallengeSource, Slot, UsedBreeds};
pub use clock::{ClockState, SessionClock};
pub use config::{
    CacheConfig, ConfigError, PersistenceConfig, PressureConfig, RuntimeConfig, SessionConfig,
};
pub use data::{Breed, BreedCatalog, CatalogError};
pub use error::{AssetError, GameError, StoreError};
pub use persistence::{
    LoadOutcome, MemoryStore, Recovered, RecoveryReport, RecoveryStep, SessionPersistenceManager,
    SessionStore, ValidationFailure,
};
pub use phase::DifficultyPhase;
pub use powerups::{PowerUpInventory, PowerUpKind};
pub use pressure::{PressureLevel, PressureResponse, ResourcePressureCoordinator};
pub use resilience::{
    BreakerConfig, CircuitBreaker, CircuitState, ResilienceGuard, RetryConfig, RetryOutcome,
};
pub use runtime::{HostLifecycleEvent, LaunchOutcome, RuntimeEvent, SessionRuntime};
pub use session::{
    AnswerOutcome, ClockTick, GameSession, SessionOutcome, SessionState, SessionStatus,
};

/// Trait for abstracting where the breed catalog comes from.
/// Platform-specific implementations should provide this
pub trait CatalogSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the breed catalog
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or parsed.
    fn load_catalog(&self) -> Result<BreedCatalog, Self::Error>;
}

/// Catalog compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledCatalog;

impl CatalogSource for BundledCatalog {
    type Error = CatalogError;

    fn load_catalog(&self) -> Result<BreedCatalog, Self::Error> {
        BreedCatalog::bundled()
    }
}

/// Entry point that pairs a catalog source with a runtime configuration.
pub struct GameEngine<C>
where
    C: CatalogSource,
{
    catalog_source: C,
    config: RuntimeConfig,
}

impl<C> GameEngine<C>
where
    C: CatalogSource,
{
    /// # Errors
    ///
    /// Returns the first configuration invariant `config` violates.
    pub fn new(catalog_source: C, config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            catalog_source,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Build a headless session, with no timers or persistence attached.
    /// A seed in the session config takes precedence over `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    pub fn create_session(&self, seed: u64) -> Result<GameSession, C::Error> {
        let catalog = Arc::new(self.catalog_source.load_catalog()?);
        Ok(GameSession::new(
            catalog,
            self.config.session.clone(),
            self.config.session.seed_or(seed),
        ))
    }

    /// Launch a full runtime over `store` and `loader`, restoring whatever
    /// the store holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    pub async fn launch<L, S>(
        &self,
        loader: L,
        store: S,
        seed: u64,
        lifecycle: tokio::sync::mpsc::Receiver<HostLifecycleEvent>,
    ) -> Result<
        (
            SessionRuntime<L, S>,
            tokio::sync::mpsc::UnboundedReceiver<RuntimeEvent>,
        ),
        C::Error,
    >
    where
        L: AssetLoader,
        S: SessionStore + 'static,
    {
        let catalog = Arc::new(self.catalog_source.load_catalog()?);
        let seed = self.config.session.seed_or(seed);
        Ok(SessionRuntime::launch(catalog, loader, store, self.config.clone(), seed, lifecycle).await)
    }
}
