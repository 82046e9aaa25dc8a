//! Centralized balance and tuning constants for the Pawmatch session runtime.
//!
//! These values define the scoring math, session limits, and resource bounds.
//! Keeping them together ensures that gameplay can only be adjusted via
//! code changes reviewed in version control, rather than through external
//! JSON assets.

// Logging targets ----------------------------------------------------------
pub(crate) const TARGET_CHALLENGE: &str = "pawmatch::challenge";
pub(crate) const TARGET_SESSION: &str = "pawmatch::session";
pub(crate) const TARGET_CLOCK: &str = "pawmatch::clock";
pub(crate) const TARGET_PERSISTENCE: &str = "pawmatch::persistence";
pub(crate) const TARGET_CACHE: &str = "pawmatch::cache";
pub(crate) const TARGET_PRESSURE: &str = "pawmatch::pressure";
pub(crate) const TARGET_RESILIENCE: &str = "pawmatch::resilience";
pub(crate) const TARGET_RUNTIME: &str = "pawmatch::runtime";

// Logging keys -------------------------------------------------------------
pub(crate) const LOG_SESSION_START: &str = "log.session.start";
pub(crate) const LOG_SESSION_END: &str = "log.session.end";
pub(crate) const LOG_SESSION_RESTORED: &str = "log.session.restored";
pub(crate) const LOG_PHASE_ADVANCE: &str = "log.phase.advance";
pub(crate) const LOG_POWERUP_AWARD: &str = "log.powerup.award";
pub(crate) const LOG_POWERUP_USED: &str = "log.powerup.used";
pub(crate) const LOG_ROUND_TIMEOUT: &str = "log.round.timeout";
pub(crate) const LOG_POOL_FALLBACK: &str = "log.challenge.fallback";
pub(crate) const LOG_POOL_EMERGENCY: &str = "log.challenge.emergency";
pub(crate) const LOG_CLOCK_EXPIRED: &str = "log.clock.expired";
pub(crate) const LOG_AUTOSAVE: &str = "log.persistence.autosave";
pub(crate) const LOG_SAVE_FAILED: &str = "log.persistence.save-failed";
pub(crate) const LOG_LIFECYCLE_SAVE: &str = "log.persistence.lifecycle-save";
pub(crate) const LOG_VALIDATION_FAILED: &str = "log.persistence.validation-failed";
pub(crate) const LOG_RECOVERY_BACKUP: &str = "log.recovery.backup";
pub(crate) const LOG_RECOVERY_HISTORY: &str = "log.recovery.history";
pub(crate) const LOG_RECOVERY_SAFE_STATE: &str = "log.recovery.safe-state";
pub(crate) const LOG_RECOVERY_FAILED: &str = "log.recovery.unrecoverable";
pub(crate) const LOG_CACHE_EVICT: &str = "log.cache.evict";
pub(crate) const LOG_CACHE_CLEANUP: &str = "log.cache.cleanup";
pub(crate) const LOG_CACHE_LOAD_FAILED: &str = "log.cache.load-failed";
pub(crate) const LOG_PRESSURE_LEVEL: &str = "log.pressure.level";
pub(crate) const LOG_BREAKER_OPEN: &str = "log.breaker.open";
pub(crate) const LOG_BREAKER_HALF_OPEN: &str = "log.breaker.half-open";
pub(crate) const LOG_BREAKER_CLOSED: &str = "log.breaker.closed";
pub(crate) const LOG_RETRY_ATTEMPT: &str = "log.retry.attempt";

// Session limits -----------------------------------------------------------
pub const MAX_LIVES: u8 = 3;
pub const MAX_TIMER_SECONDS: u32 = 30;
pub const EXTRA_TIME_SECONDS: u32 = 5;
pub const POWER_UP_REWARD_THRESHOLD: u32 = 5;
pub const MAX_POWER_UPS_TOTAL: u32 = 20;
pub const MAX_USED_BREED_NAMES: usize = 100;
pub const MAX_SESSION_DURATION_SECS: i64 = 2 * 60 * 60;

// Scoring ------------------------------------------------------------------
pub(crate) const BASE_POINTS: u32 = 10;
pub(crate) const STREAK_BONUS_POINTS: u32 = 5;
pub(crate) const STREAK_BONUS_MIN: u32 = 3;

// Difficulty progression ---------------------------------------------------
pub const INTERMEDIATE_MIN_QUESTIONS: u32 = 5;
pub const EXPERT_MIN_QUESTIONS: u32 = 15;
pub(crate) const PHASE_ADVANCE_MIN_ACCURACY_PCT: u32 = 60;
pub(crate) const BEGINNER_TIMER_SECONDS: u32 = 10;
pub(crate) const INTERMEDIATE_TIMER_SECONDS: u32 = 9;
pub(crate) const EXPERT_TIMER_SECONDS: u32 = 8;

// Recovery -----------------------------------------------------------------
pub(crate) const SAFE_SCORE_MAX: u32 = 10_000;
pub(crate) const SAFE_TOTAL_QUESTIONS_MAX: u32 = 200;
pub(crate) const SAFE_USED_BREED_NAMES: usize = 50;
pub(crate) const HISTORY_CAPACITY: usize = 10;
pub(crate) const ENVELOPE_VERSION: u32 = 1;
pub(crate) const CHECKSUM_SEED: u64 = 0x5041_574D_4154_4348;

// Store keys ---------------------------------------------------------------
pub const SESSION_STATE_KEY: &str = "sessionState";
pub const POWER_UP_BACKUP_KEY: &str = "powerUpBackup";
pub const SESSION_HISTORY_KEY: &str = "sessionHistory";

// Cache --------------------------------------------------------------------
pub(crate) const CACHE_MAX_ITEMS: usize = 100;
pub(crate) const CACHE_MEMORY_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub(crate) const CACHE_ITEM_ESTIMATE_BYTES: u64 = 512 * 1024;
pub(crate) const PRELOAD_STAGGERED_KEYS: usize = 3;
pub(crate) const PRELOAD_STAGGER_STEP_MS: u64 = 100;
pub(crate) const PRELOAD_SPACING_MS: u64 = 500;
pub(crate) const PRELOAD_URGENT_WORKERS: usize = 2;
pub(crate) const PRELOAD_BACKGROUND_WORKERS: usize = 3;
pub(crate) const BASIC_CLEANUP_PCT: usize = 20;
pub(crate) const MODERATE_CLEANUP_PCT: usize = 40;
pub(crate) const AGGRESSIVE_CLEANUP_PCT: usize = 60;
pub const ASSET_BREAKER_NAME: &str = "assets";

// Pressure -----------------------------------------------------------------
pub(crate) const PRESSURE_WARNING_BYTES: u64 = 100 * 1024 * 1024;
pub(crate) const PRESSURE_CRITICAL_BYTES: u64 = 150 * 1024 * 1024;
pub(crate) const PRESSURE_MEDIUM_PCT: u64 = 70;
pub(crate) const HIGH_PRESSURE_HISTORY_KEEP: usize = 5;
pub(crate) const CRITICAL_PRESSURE_HISTORY_KEEP: usize = 1;
pub(crate) const CRITICAL_PRESSURE_USED_BREEDS_KEEP: usize = 10;

// Timers -------------------------------------------------------------------
pub(crate) const CLOCK_TICK_MS: u64 = 1_000;
pub(crate) const AUTOSAVE_INTERVAL_MS: u64 = 10_000;
pub(crate) const VALIDATION_INTERVAL_MS: u64 = 30_000;
pub(crate) const PRESSURE_SAMPLE_INTERVAL_MS: u64 = 60_000;

// Resilience ---------------------------------------------------------------
pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 3;
pub(crate) const RETRY_INITIAL_DELAY_MS: u64 = 200;
pub(crate) const RETRY_MAX_DELAY_MS: u64 = 2_000;
pub(crate) const RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
pub(crate) const RETRY_MAX_JITTER_MS: u64 = 100;
pub(crate) const BREAKER_FAILURE_THRESHOLD: u32 = 5;
pub(crate) const BREAKER_OPEN_TIMEOUT_MS: u64 = 30_000;
pub(crate) const BREAKER_HALF_OPEN_RETRY_MS: u64 = 10_000;
