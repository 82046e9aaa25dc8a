//! Runtime configuration with serde defaults and invariant checks.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    AUTOSAVE_INTERVAL_MS, BREAKER_FAILURE_THRESHOLD, BREAKER_HALF_OPEN_RETRY_MS,
    BREAKER_OPEN_TIMEOUT_MS, CACHE_ITEM_ESTIMATE_BYTES, CACHE_MAX_ITEMS, CACHE_MEMORY_BUDGET_BYTES,
    CLOCK_TICK_MS, EXTRA_TIME_SECONDS, HISTORY_CAPACITY, MAX_LIVES, MAX_TIMER_SECONDS,
    POWER_UP_REWARD_THRESHOLD, PRELOAD_BACKGROUND_WORKERS, PRELOAD_URGENT_WORKERS,
    PRESSURE_CRITICAL_BYTES, PRESSURE_SAMPLE_INTERVAL_MS, PRESSURE_WARNING_BYTES, RETRY_BACKOFF_MULTIPLIER, RETRY_INITIAL_DELAY_MS, RETRY_MAX_ATTEMPTS,
    RETRY_MAX_DELAY_MS, RETRY_MAX_JITTER_MS, VALIDATION_INTERVAL_MS,
};
use crate::phase::DifficultyPhase;
use crate::resilience::{BreakerConfig, RetryConfig};

/// Errors raised when configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u64,
        value: u64,
    },
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("{min_field} ({min}) exceeds {max_field} ({max})")]
    Ordering {
        min_field: &'static str,
        min: u64,
        max_field: &'static str,
        max: u64,
    },
    #[error("backoff multiplier must be finite and at least 1.0 (got {0})")]
    BackoffMultiplier(f64),
    #[error("configuration JSON could not be parsed: {0}")]
    Parse(String),
}

fn at_least(field: &'static str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::MinViolation { field, min, value });
    }
    Ok(())
}

fn within(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::RangeViolation {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn ordered(
    min_field: &'static str,
    min: u64,
    max_field: &'static str,
    max: u64,
) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Ordering {
            min_field,
            min,
            max_field,
            max,
        });
    }
    Ok(())
}

/// Gameplay knobs for a single session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_max_lives")]
    pub max_lives: u8,
    #[serde(default = "SessionConfig::default_reward_threshold")]
    pub power_up_reward_threshold: u32,
    #[serde(default = "SessionConfig::default_extra_time")]
    pub extra_time_seconds: u32,
    #[serde(default = "SessionConfig::default_beginner_timer")]
    pub beginner_timer_seconds: u32,
    #[serde(default = "SessionConfig::default_intermediate_timer")]
    pub intermediate_timer_seconds: u32,
    #[serde(default = "SessionConfig::default_expert_timer")]
    pub expert_timer_seconds: u32,
    /// Fixed seed; when set it replaces the seed a host passes in.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SessionConfig {
    const fn default_max_lives() -> u8 {
        MAX_LIVES
    }

    const fn default_reward_threshold() -> u32 {
        POWER_UP_REWARD_THRESHOLD
    }

    const fn default_extra_time() -> u32 {
        EXTRA_TIME_SECONDS
    }

    const fn default_beginner_timer() -> u32 {
        DifficultyPhase::Beginner.timer_seconds()
    }

    const fn default_intermediate_timer() -> u32 {
        DifficultyPhase::Intermediate.timer_seconds()
    }

    const fn default_expert_timer() -> u32 {
        DifficultyPhase::Expert.timer_seconds()
    }

    /// Round length for `phase`.
    #[must_use]
    pub const fn timer_seconds(&self, phase: DifficultyPhase) -> u32 {
        match phase {
            DifficultyPhase::Beginner => self.beginner_timer_seconds,
            DifficultyPhase::Intermediate => self.intermediate_timer_seconds,
            DifficultyPhase::Expert => self.expert_timer_seconds,
        }
    }

    /// The configured seed, or `fallback` when none is set.
    #[must_use]
    pub fn seed_or(&self, fallback: u64) -> u64 {
        self.seed.unwrap_or(fallback)
    }

    /// # Errors
    ///
    /// Returns an error when lives, reward threshold or any timer is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        within(
            "session.max_lives",
            u64::from(self.max_lives),
            1,
            u64::from(MAX_LIVES),
        )?;
        at_least(
            "session.power_up_reward_threshold",
            u64::from(self.power_up_reward_threshold),
            1,
        )?;
        within(
            "session.extra_time_seconds",
            u64::from(self.extra_time_seconds),
            1,
            u64::from(MAX_TIMER_SECONDS),
        )?;
        for (field, seconds) in [
            ("session.beginner_timer_seconds", self.beginner_timer_seconds),
            (
                "session.intermediate_timer_seconds",
                self.intermediate_timer_seconds,
            ),
            ("session.expert_timer_seconds", self.expert_timer_seconds),
        ] {
            within(field, u64::from(seconds), 1, u64::from(MAX_TIMER_SECONDS))?;
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_lives: Self::default_max_lives(),
            power_up_reward_threshold: Self::default_reward_threshold(),
            extra_time_seconds: Self::default_extra_time(),
            beginner_timer_seconds: Self::default_beginner_timer(),
            intermediate_timer_seconds: Self::default_intermediate_timer(),
            expert_timer_seconds: Self::default_expert_timer(),
            seed: None,
        }
    }
}

/// Autosave, validation and history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "PersistenceConfig::default_autosave_ms")]
    pub autosave_interval_ms: u64,
    #[serde(default = "PersistenceConfig::default_validation_ms")]
    pub validation_interval_ms: u64,
    #[serde(default = "PersistenceConfig::default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub store_retry: RetryConfig,
}

impl PersistenceConfig {
    const fn default_autosave_ms() -> u64 {
        AUTOSAVE_INTERVAL_MS
    }

    const fn default_validation_ms() -> u64 {
        VALIDATION_INTERVAL_MS
    }

    const fn default_history_capacity() -> usize {
        HISTORY_CAPACITY
    }

    #[must_use]
    pub const fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }

    #[must_use]
    pub const fn validation_interval(&self) -> Duration {
        Duration::from_millis(self.validation_interval_ms)
    }

    /// # Errors
    ///
    /// Returns an error for zero intervals, an empty history ring, or bad retry settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("persistence.autosave_interval_ms", self.autosave_interval_ms, 1)?;
        at_least(
            "persistence.validation_interval_ms",
            self.validation_interval_ms,
            1,
        )?;
        at_least(
            "persistence.history_capacity",
            crate::numbers::len_to_u64(self.history_capacity),
            1,
        )?;
        self.store_retry.validate()
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            autosave_interval_ms: Self::default_autosave_ms(),
            validation_interval_ms: Self::default_validation_ms(),
            history_capacity: Self::default_history_capacity(),
            store_retry: RetryConfig::default(),
        }
    }
}

/// Resource cache bounds and load policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_max_items")]
    pub max_items: usize,
    #[serde(default = "CacheConfig::default_memory_budget")]
    pub memory_budget_bytes: u64,
    #[serde(default = "CacheConfig::default_item_estimate")]
    pub item_estimate_bytes: u64,
    #[serde(default = "CacheConfig::default_urgent_workers")]
    pub urgent_workers: usize,
    #[serde(default = "CacheConfig::default_background_workers")]
    pub background_workers: usize,
    #[serde(default)]
    pub load_retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl CacheConfig {
    const fn default_max_items() -> usize {
        CACHE_MAX_ITEMS
    }

    const fn default_memory_budget() -> u64 {
        CACHE_MEMORY_BUDGET_BYTES
    }

    const fn default_item_estimate() -> u64 {
        CACHE_ITEM_ESTIMATE_BYTES
    }

    const fn default_urgent_workers() -> usize {
        PRELOAD_URGENT_WORKERS
    }

    const fn default_background_workers() -> usize {
        PRELOAD_BACKGROUND_WORKERS
    }

    /// Cache capacity bounded by both item count and estimated memory.
    #[must_use]
    pub fn effective_capacity(&self) -> usize {
        let by_memory = self
            .memory_budget_bytes
            .checked_div(self.item_estimate_bytes)
            .unwrap_or(u64::MAX);
        let by_memory = usize::try_from(by_memory).unwrap_or(usize::MAX);
        self.max_items.min(by_memory)
    }

    /// Same config with a different item cap (handy for tests and tooling).
    #[must_use]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// # Errors
    ///
    /// Returns an error when the cache cannot hold a single item or has no workers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least(
            "cache.max_items",
            crate::numbers::len_to_u64(self.max_items),
            1,
        )?;
        at_least("cache.item_estimate_bytes", self.item_estimate_bytes, 1)?;
        ordered(
            "cache.item_estimate_bytes",
            self.item_estimate_bytes,
            "cache.memory_budget_bytes",
            self.memory_budget_bytes,
        )?;
        at_least(
            "cache.urgent_workers",
            crate::numbers::len_to_u64(self.urgent_workers),
            1,
        )?;
        at_least(
            "cache.background_workers",
            crate::numbers::len_to_u64(self.background_workers),
            1,
        )?;
        self.load_retry.validate()?;
        self.breaker.validate()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: Self::default_max_items(),
            memory_budget_bytes: Self::default_memory_budget(),
            item_estimate_bytes: Self::default_item_estimate(),
            urgent_workers: Self::default_urgent_workers(),
            background_workers: Self::default_background_workers(),
            load_retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Memory pressure thresholds and sampling cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureConfig {
    #[serde(default = "PressureConfig::default_sample_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "PressureConfig::default_warning")]
    pub warning_bytes: u64,
    #[serde(default = "PressureConfig::default_critical")]
    pub critical_bytes: u64,
}

impl PressureConfig {
    const fn default_sample_ms() -> u64 {
        PRESSURE_SAMPLE_INTERVAL_MS
    }

    const fn default_warning() -> u64 {
        PRESSURE_WARNING_BYTES
    }

    const fn default_critical() -> u64 {
        PRESSURE_CRITICAL_BYTES
    }

    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// # Errors
    ///
    /// Returns an error for a zero interval or a warning threshold above critical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("pressure.sample_interval_ms", self.sample_interval_ms, 1)?;
        at_least("pressure.warning_bytes", self.warning_bytes, 1)?;
        ordered(
            "pressure.warning_bytes",
            self.warning_bytes,
            "pressure.critical_bytes",
            self.critical_bytes,
        )
    }
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: Self::default_sample_ms(),
            warning_bytes: Self::default_warning(),
            critical_bytes: Self::default_critical(),
        }
    }
}

/// Everything one running game needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pressure: PressureConfig,
    #[serde(default = "RuntimeConfig::default_tick_ms")]
    pub clock_tick_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            persistence: PersistenceConfig::default(),
            cache: CacheConfig::default(),
            pressure: PressureConfig::default(),
            clock_tick_ms: CLOCK_TICK_MS,
        }
    }
}

impl RuntimeConfig {
    const fn default_tick_ms() -> u64 {
        CLOCK_TICK_MS
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or any section fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    /// # Errors
    ///
    /// Returns the first violated invariant across all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least("clock_tick_ms", self.clock_tick_ms, 1)?;
        self.session.validate()?;
        self.persistence.validate()?;
        self.cache.validate()?;
        self.pressure.validate()
    }
}

pub(crate) const fn default_retry_attempts() -> u32 {
    RETRY_MAX_ATTEMPTS
}

pub(crate) const fn default_retry_initial_ms() -> u64 {
    RETRY_INITIAL_DELAY_MS
}

pub(crate) const fn default_retry_max_ms() -> u64 {
    RETRY_MAX_DELAY_MS
}

pub(crate) const fn default_retry_multiplier() -> f64 {
    RETRY_BACKOFF_MULTIPLIER
}

pub(crate) const fn default_retry_jitter_ms() -> u64 {
    RETRY_MAX_JITTER_MS
}

pub(crate) const fn default_breaker_threshold() -> u32 {
    BREAKER_FAILURE_THRESHOLD
}

pub(crate) const fn default_breaker_open_ms() -> u64 {
    BREAKER_OPEN_TIMEOUT_MS
}

pub(crate) const fn default_breaker_half_open_ms() -> u64 {
    BREAKER_HALF_OPEN_RETRY_MS
}

pub(crate) fn check_retry(config: &RetryConfig) -> Result<(), ConfigError> {
    at_least("retry.max_attempts", u64::from(config.max_attempts), 1)?;
    ordered(
        "retry.initial_delay_ms",
        config.initial_delay_ms,
        "retry.max_delay_ms",
        config.max_delay_ms,
    )?;
    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::BackoffMultiplier(config.backoff_multiplier));
    }
    Ok(())
}

pub(crate) fn check_breaker(config: &BreakerConfig) -> Result<(), ConfigError> {
    at_least(
        "breaker.failure_threshold",
        u64::from(config.failure_threshold),
        1,
    )?;
    at_least("breaker.open_timeout_ms", config.open_timeout_ms, 1)
}
