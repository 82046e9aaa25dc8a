//! Game session state machine: score, lives, streak, power-ups and the round timer.
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::challenge::{Challenge, ChallengeGenerator, ChallengeSource, Slot, UsedBreeds};
use crate::clock::{ClockState, SessionClock};
use crate::config::SessionConfig;
use crate::constants::{
    LOG_PHASE_ADVANCE, LOG_POWERUP_AWARD, LOG_POWERUP_USED, LOG_ROUND_TIMEOUT, LOG_SESSION_END,
    LOG_SESSION_RESTORED, LOG_SESSION_START, MAX_LIVES, STREAK_BONUS_MIN, STREAK_BONUS_POINTS,
    TARGET_SESSION,
};
use crate::data::BreedCatalog;
use crate::error::GameError;
use crate::hints::hint_for;
use crate::phase::DifficultyPhase;
use crate::powerups::{PowerUpInventory, PowerUpKind};

const fn default_lives() -> u8 {
    MAX_LIVES
}

/// The unit persisted, validated and recovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub score: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub phase: DifficultyPhase,
    pub used_breed_names: UsedBreeds,
    pub power_ups: PowerUpInventory,
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub consecutive_correct: u32,
    pub time_remaining: u32,
    pub current_hint: Option<String>,
    #[serde(default = "default_lives")]
    pub lives: u8,
    #[serde(default)]
    pub reward_progress: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            score: 0,
            correct_answers: 0,
            total_questions: 0,
            phase: DifficultyPhase::Beginner,
            used_breed_names: UsedBreeds::new(),
            power_ups: PowerUpInventory::starting(),
            is_active: false,
            started_at: None,
            consecutive_correct: 0,
            time_remaining: 0,
            current_hint: None,
            lives: MAX_LIVES,
            reward_progress: 0,
        }
    }
}

impl SessionState {
    /// Rough serialized footprint, used by pressure sampling.
    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.used_breed_names.estimated_bytes()
            + self.current_hint.as_ref().map_or(0, String::len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    Won,
    Lost,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    Active,
    Paused,
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Result of answering one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub points: u32,
    pub awarded: Option<PowerUpKind>,
    pub phase_advanced_to: Option<DifficultyPhase>,
    pub ended: Option<SessionOutcome>,
}

/// Result of one clock tick while the session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub remaining: u32,
    pub timed_out: bool,
    pub ended: Option<SessionOutcome>,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    generator: ChallengeGenerator,
    config: SessionConfig,
    rng: ChaCha20Rng,
    status: SessionStatus,
    outcome: Option<SessionOutcome>,
    clock: SessionClock,
    score: u32,
    lives: u8,
    correct_answers: u32,
    total_questions: u32,
    consecutive_correct: u32,
    reward_progress: u32,
    phase: DifficultyPhase,
    used: UsedBreeds,
    power_ups: PowerUpInventory,
    started_at: Option<DateTime<Utc>>,
    challenge: Option<Challenge>,
    challenge_source: Option<ChallengeSource>,
    hint: Option<String>,
    revision: u64,
}

impl GameSession {
    /// Construct a session that has not started yet. The idle clock shows
    /// the opening round length.
    #[must_use]
    pub fn new(catalog: Arc<BreedCatalog>, config: SessionConfig, seed: u64) -> Self {
        let mut clock = SessionClock::new();
        if let Err(err) = clock.reset(config.timer_seconds(DifficultyPhase::Beginner)) {
            warn!(target: TARGET_SESSION, "opening timer not loaded: {err}");
        }
        Self {
            generator: ChallengeGenerator::new(catalog),
            lives: config.max_lives,
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
            status: SessionStatus::NotStarted,
            outcome: None,
            clock,
            score: 0,
            correct_answers: 0,
            total_questions: 0,
            consecutive_correct: 0,
            reward_progress: 0,
            phase: DifficultyPhase::Beginner,
            used: UsedBreeds::new(),
            power_ups: PowerUpInventory::starting(),
            started_at: None,
            challenge: None,
            challenge_source: None,
            hint: None,
            revision: 0,
        }
    }

    /// Rebuild a session from a persisted or recovered state.
    ///
    /// An active state comes back `Paused` with a fresh challenge so nothing
    /// is accepted until the host resumes it; an inactive state with progress
    /// comes back `Ended`. An active state with no lives left ends as lost.
    #[must_use]
    pub fn from_state(
        catalog: Arc<BreedCatalog>,
        config: SessionConfig,
        seed: u64,
        state: SessionState,
    ) -> Self {
        let mut session = Self::new(catalog, config, seed);
        session.score = state.score;
        session.lives = state.lives.min(session.config.max_lives);
        session.correct_answers = state.correct_answers;
        session.total_questions = state.total_questions;
        session.consecutive_correct = state.consecutive_correct;
        session.reward_progress = state.reward_progress;
        session.phase = state.phase;
        session.used = state.used_breed_names;
        session.power_ups = state.power_ups;
        session.started_at = state.started_at;

        if state.is_active && session.lives == 0 {
            warn!(target: TARGET_SESSION, "restored session has no lives left");
            session.finish(SessionOutcome::Lost);
        } else if state.is_active {
            session.status = SessionStatus::Active;
            session.next_round();
            if session.status == SessionStatus::Active {
                if state.time_remaining > 0
                    && let Err(err) = session.clock.start(state.time_remaining)
                {
                    warn!(target: TARGET_SESSION, "stored timer ignored: {err}");
                }
                session.clock.pause();
                session.status = SessionStatus::Paused;
            }
        } else if state.total_questions > 0 || state.started_at.is_some() {
            session.status = SessionStatus::Ended;
            session.outcome = Some(SessionOutcome::Abandoned);
        }
        info!(
            target: TARGET_SESSION,
            "{LOG_SESSION_RESTORED} status={} score={} questions={}",
            session.status, session.score, session.total_questions
        );
        session.revision = 1;
        session
    }

    /// Begin play: resets counters, draws the first challenge and starts the clock.
    ///
    /// # Errors
    ///
    /// Returns `NoContentAvailable` when the breed catalog is empty.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), GameError> {
        if self.generator.catalog().is_empty() {
            return Err(GameError::NoContentAvailable);
        }
        if self.status != SessionStatus::NotStarted {
            debug!(target: TARGET_SESSION, "start ignored in status {}", self.status);
            return Ok(());
        }
        self.score = 0;
        self.lives = self.config.max_lives;
        self.correct_answers = 0;
        self.total_questions = 0;
        self.consecutive_correct = 0;
        self.reward_progress = 0;
        self.phase = DifficultyPhase::Beginner;
        self.used.clear();
        self.started_at = Some(now);
        self.status = SessionStatus::Active;
        info!(
            target: TARGET_SESSION,
            "{LOG_SESSION_START} catalog_size={}",
            self.generator.catalog().len()
        );
        self.next_round();
        self.commit();
        Ok(())
    }

    /// Answer the current challenge. Returns `None` outside `Active`.
    pub fn select_image(&mut self, slot: Slot) -> Option<AnswerOutcome> {
        if self.status != SessionStatus::Active {
            return None;
        }
        let challenge = self.challenge.as_ref()?;
        let correct = slot == challenge.correct_slot;
        let mut outcome = AnswerOutcome {
            correct,
            points: 0,
            awarded: None,
            phase_advanced_to: None,
            ended: None,
        };

        if correct {
            self.consecutive_correct = self.consecutive_correct.saturating_add(1);
            outcome.points = self.points_for_correct();
            self.score = self.score.saturating_add(outcome.points);
            self.correct_answers = self.correct_answers.saturating_add(1);
            self.total_questions = self.total_questions.saturating_add(1);
            outcome.awarded = self.progress_reward();
            outcome.phase_advanced_to = self.reevaluate_phase();
        } else {
            self.record_miss();
            if self.lives == 0 {
                self.finish(SessionOutcome::Lost);
            }
        }

        if self.status == SessionStatus::Active {
            self.next_round();
        }
        outcome.ended = self.outcome.filter(|_| self.status == SessionStatus::Ended);
        self.commit();
        Some(outcome)
    }

    /// Advance the round timer by one second; a timeout counts as a miss.
    pub fn tick(&mut self) -> Option<ClockTick> {
        if self.status != SessionStatus::Active {
            return None;
        }
        let remaining = self.clock.tick()?;
        let timed_out = self.clock.state() == ClockState::Expired;
        if timed_out {
            info!(
                target: TARGET_SESSION,
                "{LOG_ROUND_TIMEOUT} question={}",
                self.total_questions + 1
            );
            self.record_miss();
            if self.lives == 0 {
                self.finish(SessionOutcome::Lost);
            } else {
                self.next_round();
            }
            self.commit();
        }
        Some(ClockTick {
            remaining,
            timed_out,
            ended: self.outcome.filter(|_| self.status == SessionStatus::Ended),
        })
    }

    /// Spend a power-up. Returns false when it is not held, the session is not
    /// active, or the kind makes no sense right now.
    pub fn use_power_up(&mut self, kind: PowerUpKind) -> bool {
        if let Err(err) = self.check_power_up(kind) {
            debug!(target: TARGET_SESSION, "{err}");
            return false;
        }
        if !self.power_ups.consume(kind) {
            return false;
        }
        match kind {
            PowerUpKind::Hint => {
                self.hint = self
                    .challenge
                    .as_ref()
                    .map(|challenge| hint_for(&challenge.correct_breed_name));
            }
            PowerUpKind::ExtraTime => {
                self.clock.add_time(self.config.extra_time_seconds);
            }
            PowerUpKind::Skip => {
                self.next_round();
            }
            PowerUpKind::SecondChance => {
                self.lives = (self.lives + 1).min(self.config.max_lives);
            }
            PowerUpKind::FiftyFifty => {}
        }
        info!(
            target: TARGET_SESSION,
            "{LOG_POWERUP_USED} kind={kind} remaining={}",
            self.power_ups.count(kind)
        );
        self.commit();
        true
    }

    fn check_power_up(&self, kind: PowerUpKind) -> Result<(), GameError> {
        let invalid = GameError::InvalidPowerUpUse { kind };
        if self.status != SessionStatus::Active
            || !kind.available_in_breed_mode()
            || self.power_ups.count(kind) == 0
        {
            return Err(invalid);
        }
        let allowed = match kind {
            PowerUpKind::Hint => self.challenge.is_some() && self.hint.is_none(),
            PowerUpKind::ExtraTime => self.clock.is_running(),
            PowerUpKind::Skip => self.challenge.is_some(),
            PowerUpKind::SecondChance => self.lives < self.config.max_lives,
            PowerUpKind::FiftyFifty => false,
        };
        if allowed { Ok(()) } else { Err(invalid) }
    }

    /// Active -> Paused, pausing the clock.
    pub fn pause(&mut self) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.clock.pause();
        self.status = SessionStatus::Paused;
        self.commit();
        true
    }

    /// Paused -> Active, resuming the clock.
    pub fn resume(&mut self) -> bool {
        if self.status != SessionStatus::Paused {
            return false;
        }
        self.clock.resume();
        self.status = SessionStatus::Active;
        if self.challenge.is_none() {
            self.next_round();
        }
        self.commit();
        true
    }

    /// Force the session to `Ended`. Idempotent.
    pub fn end(&mut self) {
        if matches!(self.status, SessionStatus::Active | SessionStatus::Paused) {
            self.finish(SessionOutcome::Abandoned);
            self.commit();
        }
    }

    /// Copy of the persisted fields.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        SessionState {
            score: self.score,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            phase: self.phase,
            used_breed_names: self.used.clone(),
            power_ups: self.power_ups,
            is_active: matches!(self.status, SessionStatus::Active | SessionStatus::Paused),
            started_at: self.started_at,
            consecutive_correct: self.consecutive_correct,
            time_remaining: self.clock.remaining(),
            current_hint: self.hint.clone(),
            lives: self.lives,
            reward_progress: self.reward_progress,
        }
    }

    /// Keep only the most recent used breed names (memory pressure relief).
    pub fn trim_used_breeds(&mut self, keep: usize) {
        if self.used.len() > keep {
            self.used.retain_recent(keep);
            self.commit();
        }
    }

    /// Asset keys of fresh breeds the next rounds may draw from, for prefetching.
    #[must_use]
    pub fn upcoming_asset_keys(&self, limit: usize) -> Vec<String> {
        self.generator
            .catalog()
            .breeds
            .iter()
            .filter(|breed| self.phase.accepts(breed.difficulty_rating))
            .filter(|breed| !self.used.contains(&breed.name))
            .take(limit)
            .map(|breed| breed.asset_key.clone())
            .collect()
    }

    fn points_for_correct(&self) -> u32 {
        let time_bonus = self.clock.remaining();
        let streak_bonus = if self.consecutive_correct >= STREAK_BONUS_MIN {
            STREAK_BONUS_POINTS * self.phase.multiplier()
        } else {
            0
        };
        self.phase.base_points() + time_bonus + streak_bonus
    }

    fn progress_reward(&mut self) -> Option<PowerUpKind> {
        self.reward_progress = self.reward_progress.saturating_add(1);
        if self.reward_progress < self.config.power_up_reward_threshold {
            return None;
        }
        self.reward_progress = 0;
        let awarded = self.power_ups.grant_random(&mut self.rng);
        if let Some(kind) = awarded {
            info!(target: TARGET_SESSION, "{LOG_POWERUP_AWARD} kind={kind}");
        }
        awarded
    }

    fn reevaluate_phase(&mut self) -> Option<DifficultyPhase> {
        let next = self
            .phase
            .advance(self.total_questions, self.correct_answers);
        if next == self.phase {
            return None;
        }
        info!(
            target: TARGET_SESSION,
            "{LOG_PHASE_ADVANCE} from={} to={next} questions={}",
            self.phase, self.total_questions
        );
        self.phase = next;
        Some(next)
    }

    fn record_miss(&mut self) {
        self.lives = self.lives.saturating_sub(1);
        self.consecutive_correct = 0;
        self.total_questions = self.total_questions.saturating_add(1);
    }

    fn next_round(&mut self) {
        self.hint = None;
        if self.phase.is_final() && self.generator.fresh_in_phase(self.phase, &self.used) == 0 {
            self.finish(SessionOutcome::Won);
            return;
        }
        match self
            .generator
            .generate_with_fallback(self.phase, &self.used, &mut self.rng)
        {
            Ok((challenge, source)) => {
                self.used.insert(challenge.correct_breed_name.clone());
                self.challenge = Some(challenge);
                self.challenge_source = Some(source);
                if let Err(err) = self.clock.start(self.config.timer_seconds(self.phase)) {
                    warn!(target: TARGET_SESSION, "round timer not started: {err}");
                }
            }
            Err(err) => {
                warn!(target: TARGET_SESSION, "no challenge available: {err}");
                self.finish(SessionOutcome::Won);
            }
        }
    }

    fn finish(&mut self, outcome: SessionOutcome) {
        self.status = SessionStatus::Ended;
        self.outcome = Some(outcome);
        self.challenge = None;
        self.hint = None;
        self.clock.stop();
        info!(
            target: TARGET_SESSION,
            "{LOG_SESSION_END} outcome={outcome:?} score={} correct={}/{}",
            self.score, self.correct_answers, self.total_questions
        );
    }

    const fn commit(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub const fn lives(&self) -> u8 {
        self.lives
    }

    #[must_use]
    pub const fn phase(&self) -> DifficultyPhase {
        self.phase
    }

    #[must_use]
    pub const fn consecutive_correct(&self) -> u32 {
        self.consecutive_correct
    }

    #[must_use]
    pub const fn reward_progress(&self) -> u32 {
        self.reward_progress
    }

    #[must_use]
    pub const fn power_ups(&self) -> &PowerUpInventory {
        &self.power_ups
    }

    #[must_use]
    pub const fn clock(&self) -> &SessionClock {
        &self.clock
    }

    #[must_use]
    pub const fn current_challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    #[must_use]
    pub const fn challenge_source(&self) -> Option<ChallengeSource> {
        self.challenge_source
    }

    #[must_use]
    pub fn current_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    #[must_use]
    pub const fn used_breeds(&self) -> &UsedBreeds {
        &self.used
    }

    /// Monotonic counter bumped after every committed transition.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn catalog(&self) -> &BreedCatalog {
        self.generator.catalog()
    }
}
