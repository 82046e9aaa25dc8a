use std::fmt;

use pawmatch_game::{GameSession, PowerUpKind, Slot};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// One step a [`PlayerPolicy`] takes against a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Answer(Slot),
    UsePowerUp(PowerUpKind),
    /// Let one clock second pass.
    Wait,
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Pick the next action for an active session.
    fn next_action(&mut self, session: &GameSession) -> PlayerAction;
}

/// Built-in gameplay strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameplayStrategy {
    Perfect,
    CoinFlip,
    PowerUpSpender,
    Idle,
}

impl GameplayStrategy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Perfect => "Perfect",
            Self::CoinFlip => "Coin Flip",
            Self::PowerUpSpender => "Power-up Spender",
            Self::Idle => "Idle",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy + Send> {
        match self {
            Self::Perfect => Box::new(PerfectPolicy),
            Self::CoinFlip => Box::new(CoinFlipPolicy::new(seed)),
            Self::PowerUpSpender => Box::new(SpenderPolicy::new(seed)),
            Self::Idle => Box::new(IdlePolicy),
        }
    }
}

impl fmt::Display for GameplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn correct_slot(session: &GameSession) -> Option<Slot> {
    session
        .current_challenge()
        .map(|challenge| challenge.correct_slot)
}

struct PerfectPolicy;

impl PlayerPolicy for PerfectPolicy {
    fn name(&self) -> &'static str {
        "perfect"
    }

    fn next_action(&mut self, session: &GameSession) -> PlayerAction {
        correct_slot(session).map_or(PlayerAction::Wait, PlayerAction::Answer)
    }
}

struct CoinFlipPolicy {
    rng: ChaCha20Rng,
}

impl CoinFlipPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl PlayerPolicy for CoinFlipPolicy {
    fn name(&self) -> &'static str {
        "coin-flip"
    }

    fn next_action(&mut self, _session: &GameSession) -> PlayerAction {
        PlayerAction::Answer(self.rng.gen_range(0..2))
    }
}

/// Spends every power-up as soon as it applies, then answers right three
/// times out of four.
struct SpenderPolicy {
    rng: ChaCha20Rng,
}

impl SpenderPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed ^ 0x5EED),
        }
    }
}

impl PlayerPolicy for SpenderPolicy {
    fn name(&self) -> &'static str {
        "power-up-spender"
    }

    fn next_action(&mut self, session: &GameSession) -> PlayerAction {
        let held = session.power_ups();
        if held.second_chance > 0 && session.lives() < 3 {
            return PlayerAction::UsePowerUp(PowerUpKind::SecondChance);
        }
        if held.hint > 0 && session.current_hint().is_none() {
            return PlayerAction::UsePowerUp(PowerUpKind::Hint);
        }
        if held.extra_time > 0 && session.clock().remaining() < 3 {
            return PlayerAction::UsePowerUp(PowerUpKind::ExtraTime);
        }
        if held.skip > 0 && self.rng.gen_bool(0.1) {
            return PlayerAction::UsePowerUp(PowerUpKind::Skip);
        }
        let Some(slot) = correct_slot(session) else {
            return PlayerAction::Wait;
        };
        if self.rng.gen_bool(0.75) {
            PlayerAction::Answer(slot)
        } else {
            PlayerAction::Answer(1 - slot)
        }
    }
}

/// Never answers; every round runs out of time.
struct IdlePolicy;

impl PlayerPolicy for IdlePolicy {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn next_action(&mut self, _session: &GameSession) -> PlayerAction {
        PlayerAction::Wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawmatch_game::{BundledCatalog, GameEngine, RuntimeConfig};

    fn session() -> GameSession {
        let engine = GameEngine::new(BundledCatalog, RuntimeConfig::default()).unwrap();
        let mut session = engine.create_session(4).unwrap();
        session.start(chrono::Utc::now()).unwrap();
        session
    }

    #[test]
    fn perfect_policy_answers_the_right_slot() {
        let session = session();
        let expected = session.current_challenge().unwrap().correct_slot;
        let mut policy = GameplayStrategy::Perfect.create_policy(1);
        assert_eq!(policy.next_action(&session), PlayerAction::Answer(expected));
    }

    #[test]
    fn spender_reaches_for_a_hint_first() {
        let session = session();
        let mut policy = GameplayStrategy::PowerUpSpender.create_policy(1);
        assert_eq!(
            policy.next_action(&session),
            PlayerAction::UsePowerUp(PowerUpKind::Hint)
        );
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(GameplayStrategy::CoinFlip.to_string(), "Coin Flip");
        assert_eq!(GameplayStrategy::Idle.create_policy(0).name(), "idle");
    }
}
