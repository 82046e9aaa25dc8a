//! Error taxonomy shared across the session runtime.
use thiserror::Error;

use crate::persistence::ValidationFailure;
use crate::phase::DifficultyPhase;
use crate::powerups::PowerUpKind;

/// Every failure the runtime can surface to its host.
///
/// Misuse variants (`InvalidDuration`, `InvalidPowerUpUse`) are recoverable by
/// ignoring the call; only `Unrecoverable` forces a fresh session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GameError {
    #[error("no eligible breeds remain for the {phase} phase")]
    ContentExhausted { phase: DifficultyPhase },
    #[error("breed catalog is empty")]
    NoContentAvailable,
    #[error("timer duration {seconds}s outside 0..={max}s")]
    InvalidDuration { seconds: u32, max: u32 },
    #[error("power-up {kind} cannot be used right now")]
    InvalidPowerUpUse { kind: PowerUpKind },
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("session state failed validation: {reason}")]
    ValidationFailure { reason: ValidationFailure },
    #[error("{resource} is temporarily unavailable, try later")]
    CircuitOpen { resource: String },
    #[error("asset {key} unavailable: {reason}")]
    AssetUnavailable { key: String, reason: String },
    #[error("session state could not be recovered; start a fresh session")]
    Unrecoverable,
}

impl GameError {
    /// Whether the host must discard the session and start over.
    #[must_use]
    pub const fn requires_fresh_session(&self) -> bool {
        matches!(self, Self::Unrecoverable)
    }
}

impl From<ValidationFailure> for GameError {
    fn from(reason: ValidationFailure) -> Self {
        Self::ValidationFailure { reason }
    }
}

/// Failure reported by a persistence store collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store operation on {key} failed: {message}")]
pub struct StoreError {
    pub key: String,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by an asset loader collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("loading {key} failed: {message}")]
pub struct AssetError {
    pub key: String,
    pub message: String,
}

impl AssetError {
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}
