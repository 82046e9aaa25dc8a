//! Session persistence: checksummed saves, periodic validation and recovery.
mod envelope;
mod history;
mod recovery;
mod store;
mod validation;

pub use envelope::{open, seal};
pub use history::SnapshotHistory;
pub use recovery::{
    Recovered, RecoveryReport, RecoverySeverity, RecoveryStep, recover, safe_state,
};
pub use store::{MemoryStore, SessionStore};
pub use validation::{ValidationFailure, validate, validate_all};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::constants::{
    LOG_AUTOSAVE, LOG_LIFECYCLE_SAVE, LOG_SAVE_FAILED, LOG_VALIDATION_FAILED,
    POWER_UP_BACKUP_KEY, SESSION_HISTORY_KEY, SESSION_STATE_KEY, TARGET_PERSISTENCE,
};
use crate::error::GameError;
use crate::powerups::PowerUpInventory;
use crate::resilience::{retry, retry_immediately};
use crate::session::SessionState;

/// What `load` found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored; start a new session.
    Fresh,
    /// Stored state passed validation.
    Restored(SessionState),
    /// Stored state failed validation and was repaired.
    Recovered(Recovered),
}

impl LoadOutcome {
    #[must_use]
    pub const fn state(&self) -> Option<&SessionState> {
        match self {
            Self::Fresh => None,
            Self::Restored(state) => Some(state),
            Self::Recovered(recovered) => Some(&recovered.state),
        }
    }
}

type StagedWrite = (&'static str, Vec<u8>);

/// Owns the store handle, the snapshot history and the last state that
/// passed validation.
#[derive(Debug)]
pub struct SessionPersistenceManager<S: SessionStore> {
    store: S,
    config: PersistenceConfig,
    history: SnapshotHistory,
    last_known_good: Option<SessionState>,
}

impl<S: SessionStore> SessionPersistenceManager<S> {
    #[must_use]
    pub fn new(store: S, config: PersistenceConfig) -> Self {
        let history = SnapshotHistory::new(config.history_capacity);
        Self {
            store,
            config,
            history,
            last_known_good: None,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    #[must_use]
    pub const fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    #[must_use]
    pub const fn last_known_good(&self) -> Option<&SessionState> {
        self.last_known_good.as_ref()
    }

    #[must_use]
    pub fn history_bytes(&self) -> usize {
        self.history.estimated_bytes()
    }

    /// Drop all but the `keep` newest history entries; returns how many went.
    pub fn trim_history(&mut self, keep: usize) -> usize {
        self.history.trim(keep)
    }

    /// Save with backoff between failed store writes.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` for an invalid state (nothing is written)
    /// and `PersistenceFailure` once the retry budget is spent.
    pub async fn save(&mut self, state: &SessionState, now: DateTime<Utc>) -> Result<(), GameError> {
        let writes = self.stage(state, now)?;
        let store = &self.store;
        for (key, bytes) in &writes {
            let outcome = retry(&self.config.store_retry, |_| async move {
                store.save(key, bytes)
            })
            .await;
            if let Err(err) = outcome.result {
                warn!(
                    target: TARGET_PERSISTENCE,
                    "{LOG_SAVE_FAILED} key={key} attempts={} error={err}",
                    outcome.attempts
                );
                return Err(GameError::PersistenceFailure(err.to_string()));
            }
        }
        debug!(
            target: TARGET_PERSISTENCE,
            "{LOG_AUTOSAVE} score={} questions={}",
            state.score, state.total_questions
        );
        Ok(())
    }

    /// Save without suspending, for host suspend signals. Failed writes are
    /// retried back to back.
    ///
    /// # Errors
    ///
    /// Same as [`Self::save`].
    pub fn save_now(&mut self, state: &SessionState, now: DateTime<Utc>) -> Result<(), GameError> {
        let writes = self.stage(state, now)?;
        let attempts = self.config.store_retry.max_attempts;
        for (key, bytes) in &writes {
            let outcome = retry_immediately(attempts, |_| self.store.save(key, bytes));
            if let Err(err) = outcome.result {
                warn!(
                    target: TARGET_PERSISTENCE,
                    "{LOG_SAVE_FAILED} key={key} attempts={} error={err}",
                    outcome.attempts
                );
                return Err(GameError::PersistenceFailure(err.to_string()));
            }
        }
        info!(
            target: TARGET_PERSISTENCE,
            "{LOG_LIFECYCLE_SAVE} score={} active={}",
            state.score, state.is_active
        );
        Ok(())
    }

    /// Read the stored session, running recovery when it fails validation.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` when the store cannot be read and
    /// `Unrecoverable` when every recovery step fails. In the latter case the
    /// stored keys are removed.
    pub async fn load(&mut self, now: DateTime<Utc>) -> Result<LoadOutcome, GameError> {
        if let Some(bytes) = self.read(SESSION_HISTORY_KEY).await? {
            match open::<Vec<SessionState>>(&bytes) {
                Ok(entries) => {
                    self.history =
                        SnapshotHistory::from_entries(self.config.history_capacity, entries);
                }
                Err(reason) => {
                    warn!(target: TARGET_PERSISTENCE, "stored history ignored: {reason}");
                }
            }
        }
        let Some(bytes) = self.read(SESSION_STATE_KEY).await? else {
            return Ok(LoadOutcome::Fresh);
        };
        let (decoded, reason) = match open::<SessionState>(&bytes) {
            Ok(state) => match validate(&state, now) {
                Ok(()) => {
                    self.accept(&state);
                    return Ok(LoadOutcome::Restored(state));
                }
                Err(reason) => (Some(state), reason),
            },
            Err(reason) => (None, reason),
        };
        warn!(target: TARGET_PERSISTENCE, "{LOG_VALIDATION_FAILED} reason={reason}");

        let backup = self.read(POWER_UP_BACKUP_KEY).await.ok().flatten();
        let backup = backup.and_then(|bytes| open::<PowerUpInventory>(&bytes).ok());
        let recovered = match recover(decoded.as_ref(), &reason, backup, &self.history, now) {
            Ok(recovered) => recovered,
            Err(err) => {
                self.clear();
                return Err(err);
            }
        };
        if let Err(err) = self.save(&recovered.state, now).await {
            warn!(target: TARGET_PERSISTENCE, "recovered state not persisted: {err}");
        }
        Ok(LoadOutcome::Recovered(recovered))
    }

    /// Re-check `state`; repair it through the recovery chain if it fails.
    /// Returns `None` when `state` is valid.
    ///
    /// # Errors
    ///
    /// Returns `Unrecoverable` when every recovery step fails.
    pub fn verify(
        &mut self,
        state: &SessionState,
        now: DateTime<Utc>,
    ) -> Result<Option<Recovered>, GameError> {
        let Err(reason) = validate(state, now) else {
            return Ok(None);
        };
        warn!(target: TARGET_PERSISTENCE, "{LOG_VALIDATION_FAILED} reason={reason}");
        let backup = self.read_backup_now();
        let recovered = recover(Some(state), &reason, backup, &self.history, now)?;
        self.accept(&recovered.state);
        Ok(Some(recovered))
    }

    /// Periodic check of the last state that passed validation.
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify`].
    pub fn verify_last_known_good(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<Recovered>, GameError> {
        match self.last_known_good.clone() {
            Some(state) => self.verify(&state, now),
            None => Ok(None),
        }
    }

    /// Remove every stored key and forget in-memory history.
    pub fn clear(&mut self) {
        for key in [SESSION_STATE_KEY, POWER_UP_BACKUP_KEY, SESSION_HISTORY_KEY] {
            if let Err(err) = self.store.delete(key) {
                warn!(target: TARGET_PERSISTENCE, "delete {key} failed: {err}");
            }
        }
        self.history.trim(0);
        self.last_known_good = None;
    }

    fn accept(&mut self, state: &SessionState) {
        self.history.push(state.clone());
        self.last_known_good = Some(state.clone());
    }

    fn stage(&mut self, state: &SessionState, now: DateTime<Utc>) -> Result<Vec<StagedWrite>, GameError> {
        validate(state, now)?;
        self.accept(state);
        let encode = |err: serde_json::Error| GameError::PersistenceFailure(err.to_string());
        Ok(vec![
            (SESSION_STATE_KEY, seal(state).map_err(encode)?),
            (POWER_UP_BACKUP_KEY, seal(&state.power_ups).map_err(encode)?),
            (SESSION_HISTORY_KEY, seal(&self.history.entries()).map_err(encode)?),
        ])
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, GameError> {
        let store = &self.store;
        let outcome = retry(&self.config.store_retry, |_| async move { store.load(key) }).await;
        let attempts = outcome.attempts;
        outcome.result.map_err(|err| {
            warn!(
                target: TARGET_PERSISTENCE,
                "read {key} failed after {attempts} attempts: {err}"
            );
            GameError::PersistenceFailure(err.to_string())
        })
    }

    fn read_backup_now(&self) -> Option<PowerUpInventory> {
        let attempts = self.config.store_retry.max_attempts;
        retry_immediately(attempts, |_| self.store.load(POWER_UP_BACKUP_KEY))
            .result
            .ok()
            .flatten()
            .and_then(|bytes| open::<PowerUpInventory>(&bytes).ok())
    }
}
