use anyhow::{Result, ensure};
use pawmatch_game::{DifficultyPhase, SessionOutcome};

use super::TestScenario;
use crate::logic::drills::DrillKind;
use crate::logic::game_tester::{SimulationPlan, SimulationSummary};
use crate::logic::policy::GameplayStrategy;

pub fn simulation_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::simulation(
            "smoke",
            "Five correct answers on a fresh session",
            SimulationPlan::new(GameplayStrategy::Perfect)
                .with_max_steps(5)
                .with_expectation(smoke_expectation),
        ),
        TestScenario::simulation(
            "perfect-run",
            "Flawless play clears every phase and wins",
            SimulationPlan::new(GameplayStrategy::Perfect).with_expectation(perfect_expectation),
        ),
        TestScenario::simulation(
            "coin-flip",
            "Random answers still end the session cleanly",
            SimulationPlan::new(GameplayStrategy::CoinFlip).with_expectation(ended_expectation),
        ),
        TestScenario::simulation(
            "power-up-spender",
            "Spending power-ups never breaks the inventory",
            SimulationPlan::new(GameplayStrategy::PowerUpSpender)
                .with_expectation(ended_expectation)
                .with_expectation(spender_expectation),
        ),
        TestScenario::simulation(
            "idle-timeout",
            "An idle player loses one life per expired round",
            SimulationPlan::new(GameplayStrategy::Idle).with_expectation(idle_expectation),
        ),
    ]
}

pub fn drill_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::drill(
            DrillKind::Recovery,
            "Corrupted saves recover, garbage without history starts fresh",
        ),
        TestScenario::drill(
            DrillKind::CachePressure,
            "Host memory pressure trims the image cache",
        ),
        TestScenario::drill(
            DrillKind::FlakyAssets,
            "Failing asset loads open the breaker and fail fast",
        ),
    ]
}

fn smoke_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(summary.answers == 5, "answered {} questions", summary.answers);
    ensure!(
        summary.final_state.correct_answers == 5,
        "only {} answers were correct",
        summary.final_state.correct_answers
    );
    ensure!(summary.final_state.score > 0, "score did not move");
    ensure!(!summary.ended(), "smoke run should still be in progress");
    Ok(())
}

fn perfect_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.outcome == Some(SessionOutcome::Won),
        "perfect play ended with {:?}",
        summary.outcome
    );
    ensure!(
        summary.phases_reached.last() == Some(&DifficultyPhase::Expert),
        "never reached the expert phase"
    );
    ensure!(summary.final_state.lives == 3, "perfect play lost a life");
    Ok(())
}

fn ended_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.ended(),
        "session still {} after {} steps",
        summary.final_status,
        summary.steps
    );
    ensure!(
        summary.final_state.correct_answers <= summary.final_state.total_questions,
        "more correct answers than questions"
    );
    Ok(())
}

fn spender_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(summary.power_ups_used > 0, "no power-up was ever spent");
    Ok(())
}

fn idle_expectation(summary: &SimulationSummary) -> Result<()> {
    ensure!(
        summary.outcome == Some(SessionOutcome::Lost),
        "idle play ended with {:?}",
        summary.outcome
    );
    ensure!(summary.answers == 0, "idle policy answered");
    ensure!(summary.timeouts == 3, "saw {} timeouts", summary.timeouts);
    Ok(())
}
