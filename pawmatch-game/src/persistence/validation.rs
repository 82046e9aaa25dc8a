//! Invariant checks for persisted session state.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    MAX_LIVES, MAX_POWER_UPS_TOTAL, MAX_SESSION_DURATION_SECS, MAX_TIMER_SECONDS,
    MAX_USED_BREED_NAMES,
};
use crate::phase::DifficultyPhase;
use crate::session::SessionState;

/// Which invariant a stored session broke. Each category is checked on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("correct answers {correct} exceed total questions {total}")]
    CorrectExceedsTotal { correct: u32, total: u32 },
    #[error("phase {phase} requires more than {total_questions} questions")]
    PhaseMismatch {
        phase: DifficultyPhase,
        total_questions: u32,
    },
    #[error("power-up total {total} exceeds the 20 item cap")]
    PowerUpOverflow { total: u64 },
    #[error("{count} used breed names exceed the 100 name cap")]
    UsedBreedOverflow { count: usize },
    #[error("timer value {seconds}s exceeds 30s")]
    TimerOutOfRange { seconds: u32 },
    #[error("{lives} lives exceed the maximum of 3")]
    LivesOutOfRange { lives: u8 },
    #[error("active session has no lives left")]
    NoLivesLeft,
    #[error("active session has no start time")]
    MissingStartTime,
    #[error("active session has run for {elapsed_secs}s")]
    DurationOverflow { elapsed_secs: i64 },
    #[error("stored data is corrupted: {detail}")]
    Corrupted { detail: String },
}

/// Every invariant violation in `state`, in check order.
#[must_use]
pub fn validate_all(state: &SessionState, now: DateTime<Utc>) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if state.correct_answers > state.total_questions {
        failures.push(ValidationFailure::CorrectExceedsTotal {
            correct: state.correct_answers,
            total: state.total_questions,
        });
    }
    if !state.phase.consistent_with(state.total_questions) {
        failures.push(ValidationFailure::PhaseMismatch {
            phase: state.phase,
            total_questions: state.total_questions,
        });
    }
    let power_ups = state.power_ups.total();
    if power_ups > u64::from(MAX_POWER_UPS_TOTAL) {
        failures.push(ValidationFailure::PowerUpOverflow { total: power_ups });
    }
    if state.used_breed_names.len() > MAX_USED_BREED_NAMES {
        failures.push(ValidationFailure::UsedBreedOverflow {
            count: state.used_breed_names.len(),
        });
    }
    if state.time_remaining > MAX_TIMER_SECONDS {
        failures.push(ValidationFailure::TimerOutOfRange {
            seconds: state.time_remaining,
        });
    }
    if state.lives > MAX_LIVES {
        failures.push(ValidationFailure::LivesOutOfRange { lives: state.lives });
    }
    if state.is_active && state.lives == 0 {
        failures.push(ValidationFailure::NoLivesLeft);
    }
    if state.is_active {
        match state.started_at {
            None => failures.push(ValidationFailure::MissingStartTime),
            Some(started) => {
                let elapsed_secs = (now - started).num_seconds();
                if elapsed_secs >= MAX_SESSION_DURATION_SECS {
                    failures.push(ValidationFailure::DurationOverflow { elapsed_secs });
                }
            }
        }
    }
    failures
}

/// First invariant violation in `state`, if any.
///
/// # Errors
///
/// Returns the first failing category.
pub fn validate(state: &SessionState, now: DateTime<Utc>) -> Result<(), ValidationFailure> {
    validate_all(state, now)
        .into_iter()
        .next()
        .map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::UsedBreeds;
    use crate::powerups::PowerUpInventory;
    use chrono::Duration;

    fn active_state(now: DateTime<Utc>) -> SessionState {
        SessionState {
            is_active: true,
            started_at: Some(now - Duration::minutes(5)),
            ..SessionState::default()
        }
    }

    #[test]
    fn default_and_active_states_are_valid() {
        let now = Utc::now();
        assert!(validate(&SessionState::default(), now).is_ok());
        assert!(validate(&active_state(now), now).is_ok());
    }

    #[test]
    fn intermediate_with_three_questions_is_a_phase_mismatch() {
        let now = Utc::now();
        let state = SessionState {
            phase: DifficultyPhase::Intermediate,
            total_questions: 3,
            correct_answers: 3,
            ..active_state(now)
        };
        assert_eq!(
            validate(&state, now),
            Err(ValidationFailure::PhaseMismatch {
                phase: DifficultyPhase::Intermediate,
                total_questions: 3
            })
        );
    }

    #[test]
    fn each_category_is_reported_independently() {
        let now = Utc::now();
        let names: Vec<String> = (0..101).map(|i| format!("breed-{i}")).collect();
        let used_breed_names: UsedBreeds =
            serde_json::from_value(serde_json::json!(names)).unwrap();
        let mut power_ups = PowerUpInventory::empty();
        power_ups.hint = 21;
        let state = SessionState {
            correct_answers: 9,
            total_questions: 4,
            phase: DifficultyPhase::Expert,
            power_ups,
            used_breed_names,
            time_remaining: 45,
            lives: 7,
            is_active: true,
            started_at: None,
            ..SessionState::default()
        };
        let failures = validate_all(&state, now);
        assert_eq!(failures.len(), 7);
        assert!(failures.contains(&ValidationFailure::UsedBreedOverflow { count: 101 }));
        assert!(failures.contains(&ValidationFailure::PowerUpOverflow { total: 21 }));
        assert!(failures.contains(&ValidationFailure::MissingStartTime));
        assert!(failures.contains(&ValidationFailure::TimerOutOfRange { seconds: 45 }));
    }

    #[test]
    fn active_session_without_lives_is_rejected() {
        let now = Utc::now();
        let state = SessionState {
            lives: 0,
            total_questions: 3,
            ..active_state(now)
        };
        assert_eq!(validate(&state, now), Err(ValidationFailure::NoLivesLeft));

        let ended = SessionState {
            is_active: false,
            ..state
        };
        assert!(validate(&ended, now).is_ok());
    }

    #[test]
    fn long_running_active_session_overflows() {
        let now = Utc::now();
        let state = SessionState {
            started_at: Some(now - Duration::hours(3)),
            ..active_state(now)
        };
        assert!(matches!(
            validate(&state, now),
            Err(ValidationFailure::DurationOverflow { elapsed_secs }) if elapsed_secs >= 3 * 3600
        ));

        let idle = SessionState {
            is_active: false,
            ..state
        };
        assert!(validate(&idle, now).is_ok());
    }
}
