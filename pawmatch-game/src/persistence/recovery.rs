//! Three-step recovery chain for session state that failed validation.
//!
//! 1. Reapply the redundantly stored power-up backup and re-validate.
//! 2. Fall back to the newest valid history entry.
//! 3. Clamp the corrupted state into a safe, inactive state.
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::history::SnapshotHistory;
use super::validation::{ValidationFailure, validate};
use crate::challenge::UsedBreeds;
use crate::constants::{
    LOG_RECOVERY_BACKUP, LOG_RECOVERY_FAILED, LOG_RECOVERY_HISTORY, LOG_RECOVERY_SAFE_STATE,
    MAX_LIVES, MAX_TIMER_SECONDS, POWER_UP_REWARD_THRESHOLD, SAFE_SCORE_MAX,
    SAFE_TOTAL_QUESTIONS_MAX, SAFE_USED_BREED_NAMES, TARGET_PERSISTENCE,
};
use crate::error::GameError;
use crate::phase::DifficultyPhase;
use crate::powerups::PowerUpInventory;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    PowerUpBackup,
    History,
    SafeState,
}

impl RecoveryStep {
    #[must_use]
    pub const fn severity(self) -> RecoverySeverity {
        match self {
            Self::PowerUpBackup => RecoverySeverity::Low,
            Self::History | Self::SafeState => RecoverySeverity::Medium,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerUpBackup => "power_up_backup",
            Self::History => "history",
            Self::SafeState => "safe_state",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoverySeverity {
    Low,
    Medium,
}

/// Which step repaired the state and why it was needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub step: RecoveryStep,
    pub severity: RecoverySeverity,
    pub reason: ValidationFailure,
}

/// A repaired state plus the report describing the repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub state: SessionState,
    pub report: RecoveryReport,
}

/// Clamp `corrupted` into a state that passes validation. Deterministic, so
/// recovering the same snapshot twice yields the same result.
#[must_use]
pub fn safe_state(corrupted: &SessionState) -> SessionState {
    let total_questions = corrupted.total_questions.min(SAFE_TOTAL_QUESTIONS_MAX);
    let correct_answers = corrupted.correct_answers.min(total_questions);
    let phase = corrupted
        .phase
        .min(DifficultyPhase::ceiling_for(total_questions));
    let mut used_breed_names: Vec<String> = corrupted
        .used_breed_names
        .iter()
        .map(str::to_string)
        .collect();
    let overflow = used_breed_names.len().saturating_sub(SAFE_USED_BREED_NAMES);
    used_breed_names.drain(..overflow);

    SessionState {
        score: corrupted.score.min(SAFE_SCORE_MAX),
        correct_answers,
        total_questions,
        phase,
        used_breed_names: used_breed_names.into_iter().collect::<UsedBreeds>(),
        power_ups: PowerUpInventory::starting(),
        is_active: false,
        started_at: corrupted.started_at,
        consecutive_correct: corrupted.consecutive_correct.min(correct_answers),
        time_remaining: corrupted.time_remaining.min(MAX_TIMER_SECONDS),
        current_hint: None,
        lives: corrupted.lives.clamp(1, MAX_LIVES),
        reward_progress: corrupted
            .reward_progress
            .min(POWER_UP_REWARD_THRESHOLD.saturating_sub(1)),
    }
}

fn report(step: RecoveryStep, reason: &ValidationFailure) -> RecoveryReport {
    let severity = step.severity();
    let key = match step {
        RecoveryStep::PowerUpBackup => LOG_RECOVERY_BACKUP,
        RecoveryStep::History => LOG_RECOVERY_HISTORY,
        RecoveryStep::SafeState => LOG_RECOVERY_SAFE_STATE,
    };
    match severity {
        RecoverySeverity::Low => info!(target: TARGET_PERSISTENCE, "{key} reason={reason}"),
        RecoverySeverity::Medium => warn!(target: TARGET_PERSISTENCE, "{key} reason={reason}"),
    }
    RecoveryReport {
        step,
        severity,
        reason: reason.clone(),
    }
}

/// Run the recovery chain. `corrupted` is `None` when the stored bytes could
/// not be decoded at all, which rules out steps 1 and 3.
///
/// # Errors
///
/// Returns `GameError::Unrecoverable` when every step fails.
pub fn recover(
    corrupted: Option<&SessionState>,
    reason: &ValidationFailure,
    backup: Option<PowerUpInventory>,
    history: &SnapshotHistory,
    now: DateTime<Utc>,
) -> Result<Recovered, GameError> {
    if let (Some(state), Some(power_ups)) = (corrupted, backup) {
        let candidate = SessionState {
            power_ups,
            ..state.clone()
        };
        if validate(&candidate, now).is_ok() {
            return Ok(Recovered {
                state: candidate,
                report: report(RecoveryStep::PowerUpBackup, reason),
            });
        }
    }

    if let Some(state) = history.newest_valid(now) {
        return Ok(Recovered {
            state: state.clone(),
            report: report(RecoveryStep::History, reason),
        });
    }

    if let Some(state) = corrupted {
        let candidate = safe_state(state);
        if validate(&candidate, now).is_ok() {
            return Ok(Recovered {
                state: candidate,
                report: report(RecoveryStep::SafeState, reason),
            });
        }
    }

    error!(target: TARGET_PERSISTENCE, "{LOG_RECOVERY_FAILED} reason={reason}");
    Err(GameError::Unrecoverable)
}
