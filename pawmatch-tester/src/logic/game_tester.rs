use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use pawmatch_game::persistence::validate_all;
use pawmatch_game::{
    BreedCatalog, DifficultyPhase, GameSession, RuntimeConfig, SessionOutcome, SessionState,
    SessionStatus,
};

use crate::logic::policy::{GameplayStrategy, PlayerAction};

const DEFAULT_MAX_STEPS: usize = 2_000;

/// Immutable inputs shared by every simulated session.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    catalog: Arc<BreedCatalog>,
    config: RuntimeConfig,
}

impl TesterAssets {
    /// Bundled catalog with default tuning.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled catalog is malformed.
    pub fn load_default() -> Result<Self> {
        Ok(Self {
            catalog: Arc::new(BreedCatalog::bundled()?),
            config: RuntimeConfig::default(),
        })
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<BreedCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

/// Declarative plan for running a simulation session.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub strategy: GameplayStrategy,
    pub max_steps: usize,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub const fn new(strategy: GameplayStrategy) -> Self {
        Self {
            strategy,
            max_steps: DEFAULT_MAX_STEPS,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }
}

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn =
    Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// Complete record of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub strategy: GameplayStrategy,
    pub steps: usize,
    pub answers: u32,
    pub timeouts: u32,
    pub power_ups_used: u32,
    pub power_ups_refused: u32,
    pub phases_reached: Vec<DifficultyPhase>,
    /// Invariant violations seen after any step, formatted for reports.
    pub violations: Vec<String>,
    pub final_status: SessionStatus,
    pub outcome: Option<SessionOutcome>,
    pub final_state: SessionState,
}

impl SimulationSummary {
    #[must_use]
    pub const fn ended(&self) -> bool {
        matches!(self.final_status, SessionStatus::Ended)
    }
}

#[derive(Debug, Clone)]
pub struct GameTester {
    assets: Arc<TesterAssets>,
    verbose: bool,
}

impl GameTester {
    #[must_use]
    pub const fn new(assets: Arc<TesterAssets>, verbose: bool) -> Self {
        Self { assets, verbose }
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    #[must_use]
    pub fn assets(&self) -> &TesterAssets {
        &self.assets
    }

    /// Play one headless session to its end (or `plan.max_steps`).
    #[must_use]
    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> SimulationSummary {
        let mut session = GameSession::new(
            self.assets.catalog(),
            self.assets.config().session.clone(),
            seed,
        );
        let mut policy = plan.strategy.create_policy(seed);
        let mut summary = SimulationSummary {
            seed,
            strategy: plan.strategy,
            steps: 0,
            answers: 0,
            timeouts: 0,
            power_ups_used: 0,
            power_ups_refused: 0,
            phases_reached: vec![session.phase()],
            violations: Vec::new(),
            final_status: session.status(),
            outcome: None,
            final_state: session.snapshot(),
        };
        if let Err(err) = session.start(Utc::now()) {
            summary.violations.push(format!("start failed: {err}"));
            return summary;
        }

        while session.status() == SessionStatus::Active && summary.steps < plan.max_steps {
            summary.steps += 1;
            match policy.next_action(&session) {
                PlayerAction::Answer(slot) => {
                    if session.select_image(slot).is_some() {
                        summary.answers += 1;
                    }
                }
                PlayerAction::UsePowerUp(kind) => {
                    if session.use_power_up(kind) {
                        summary.power_ups_used += 1;
                    } else {
                        summary.power_ups_refused += 1;
                        if let Some(challenge) = session.current_challenge() {
                            let slot = challenge.correct_slot;
                            session.select_image(slot);
                            summary.answers += 1;
                        }
                    }
                }
                PlayerAction::Wait => {
                    if session.tick().is_some_and(|tick| tick.timed_out) {
                        summary.timeouts += 1;
                    }
                }
            }
            if summary.phases_reached.last() != Some(&session.phase()) {
                summary.phases_reached.push(session.phase());
            }
            let state = session.snapshot();
            for failure in validate_all(&state, Utc::now()) {
                summary
                    .violations
                    .push(format!("step {}: {failure}", summary.steps));
            }
        }

        summary.final_status = session.status();
        summary.outcome = session.outcome();
        summary.final_state = session.snapshot();
        if self.verbose {
            log::debug!(
                "seed {seed} {} finished after {} steps: {:?} score {}",
                plan.strategy,
                summary.steps,
                summary.outcome,
                summary.final_state.score
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tester() -> GameTester {
        GameTester::new(Arc::new(TesterAssets::load_default().unwrap()), false)
    }

    #[test]
    fn perfect_plan_wins_without_violations() {
        let summary = tester().run_plan(&SimulationPlan::new(GameplayStrategy::Perfect), 7);
        assert_eq!(summary.outcome, Some(SessionOutcome::Won));
        assert!(summary.violations.is_empty());
        assert_eq!(summary.phases_reached.len(), 3);
    }

    #[test]
    fn idle_plan_times_out_every_life() {
        let summary = tester().run_plan(&SimulationPlan::new(GameplayStrategy::Idle), 3);
        assert_eq!(summary.outcome, Some(SessionOutcome::Lost));
        assert_eq!(summary.timeouts, 3);
        assert_eq!(summary.answers, 0);
    }

    #[test]
    fn step_cap_halts_long_runs() {
        let plan = SimulationPlan::new(GameplayStrategy::Idle).with_max_steps(4);
        let summary = tester().run_plan(&plan, 3);
        assert_eq!(summary.steps, 4);
        assert!(!summary.ended());
    }
}
