//! Difficulty phases and the advance-only progression rule.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    BASE_POINTS, BEGINNER_TIMER_SECONDS, EXPERT_MIN_QUESTIONS, EXPERT_TIMER_SECONDS,
    INTERMEDIATE_MIN_QUESTIONS, INTERMEDIATE_TIMER_SECONDS, PHASE_ADVANCE_MIN_ACCURACY_PCT,
};
use crate::numbers::percent_of;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyPhase {
    #[default]
    Beginner,
    Intermediate,
    Expert,
}

impl DifficultyPhase {
    pub const ALL: [Self; 3] = [Self::Beginner, Self::Intermediate, Self::Expert];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }

    /// Difficulty ratings that belong to this phase. The sets are disjoint.
    #[must_use]
    pub const fn ratings(self) -> &'static [u8] {
        match self {
            Self::Beginner => &[1, 2],
            Self::Intermediate => &[3],
            Self::Expert => &[4, 5],
        }
    }

    #[must_use]
    pub fn accepts(self, rating: u8) -> bool {
        self.ratings().contains(&rating)
    }

    #[must_use]
    pub const fn multiplier(self) -> u32 {
        match self {
            Self::Beginner => 1,
            Self::Intermediate => 2,
            Self::Expert => 3,
        }
    }

    /// Points awarded for a correct answer before time and streak bonuses.
    #[must_use]
    pub const fn base_points(self) -> u32 {
        BASE_POINTS * self.multiplier()
    }

    /// Countdown duration for each round in this phase.
    #[must_use]
    pub const fn timer_seconds(self) -> u32 {
        match self {
            Self::Beginner => BEGINNER_TIMER_SECONDS,
            Self::Intermediate => INTERMEDIATE_TIMER_SECONDS,
            Self::Expert => EXPERT_TIMER_SECONDS,
        }
    }

    /// Minimum answered questions before a session may sit in this phase.
    #[must_use]
    pub const fn min_questions(self) -> u32 {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => INTERMEDIATE_MIN_QUESTIONS,
            Self::Expert => EXPERT_MIN_QUESTIONS,
        }
    }

    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Beginner => None,
            Self::Intermediate => Some(Self::Beginner),
            Self::Expert => Some(Self::Intermediate),
        }
    }

    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Expert)
    }

    /// Highest phase the question count allows, ignoring accuracy.
    #[must_use]
    pub const fn ceiling_for(total_questions: u32) -> Self {
        if total_questions >= EXPERT_MIN_QUESTIONS {
            Self::Expert
        } else if total_questions >= INTERMEDIATE_MIN_QUESTIONS {
            Self::Intermediate
        } else {
            Self::Beginner
        }
    }

    /// Whether the stored question count is consistent with this phase.
    #[must_use]
    pub const fn consistent_with(self, total_questions: u32) -> bool {
        total_questions >= self.min_questions()
    }

    /// Phase a session should be in after answering, never lower than `self`.
    ///
    /// Advancement needs both the question-count threshold and an accuracy of
    /// at least 60%.
    #[must_use]
    pub fn advance(self, total_questions: u32, correct_answers: u32) -> Self {
        let accuracy = percent_of(correct_answers, total_questions);
        let earned = if accuracy >= PHASE_ADVANCE_MIN_ACCURACY_PCT {
            Self::ceiling_for(total_questions)
        } else {
            Self::Beginner
        };
        self.max(earned)
    }
}

impl fmt::Display for DifficultyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "expert" => Ok(Self::Expert),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_sets_are_disjoint() {
        for rating in 1..=5 {
            let owners = DifficultyPhase::ALL
                .iter()
                .filter(|phase| phase.accepts(rating))
                .count();
            assert_eq!(owners, 1, "rating {rating}");
        }
    }

    #[test]
    fn four_questions_stay_beginner() {
        assert_eq!(
            DifficultyPhase::Beginner.advance(4, 4),
            DifficultyPhase::Beginner
        );
        assert_eq!(
            DifficultyPhase::Beginner.advance(5, 5),
            DifficultyPhase::Intermediate
        );
    }

    #[test]
    fn low_accuracy_blocks_advance_but_never_regresses() {
        assert_eq!(
            DifficultyPhase::Beginner.advance(5, 2),
            DifficultyPhase::Beginner
        );
        assert_eq!(
            DifficultyPhase::Intermediate.advance(10, 1),
            DifficultyPhase::Intermediate
        );
        assert_eq!(
            DifficultyPhase::Intermediate.advance(15, 12),
            DifficultyPhase::Expert
        );
    }

    #[test]
    fn consistency_matches_thresholds() {
        assert!(!DifficultyPhase::Intermediate.consistent_with(3));
        assert!(DifficultyPhase::Intermediate.consistent_with(5));
        assert!(!DifficultyPhase::Expert.consistent_with(14));
        assert!(DifficultyPhase::Beginner.consistent_with(0));
    }

    #[test]
    fn parse_roundtrips_labels() {
        for phase in DifficultyPhase::ALL {
            assert_eq!(phase.as_str().parse::<DifficultyPhase>(), Ok(phase));
        }
        assert!("legendary".parse::<DifficultyPhase>().is_err());
    }
}
