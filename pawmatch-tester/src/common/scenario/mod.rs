mod catalog;

use crate::logic::drills::DrillKind;
use crate::logic::game_tester::SimulationPlan;

pub use catalog::{drill_scenarios, simulation_scenarios};

/// What a scenario actually drives.
#[derive(Debug, Clone)]
pub enum ScenarioKind {
    /// Headless session played by a policy.
    Simulation(SimulationPlan),
    /// Fault drill against a full runtime.
    Drill(DrillKind),
}

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: &'static str,
    pub kind: ScenarioKind,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: &str, description: &'static str, plan: SimulationPlan) -> Self {
        Self {
            name: name.to_string(),
            description,
            kind: ScenarioKind::Simulation(plan),
        }
    }

    #[must_use]
    pub fn drill(drill: DrillKind, description: &'static str) -> Self {
        Self {
            name: drill.label().to_string(),
            description,
            kind: ScenarioKind::Drill(drill),
        }
    }
}

fn all_scenarios() -> Vec<TestScenario> {
    let mut scenarios = simulation_scenarios();
    scenarios.extend(drill_scenarios());
    scenarios
}

/// Look up a scenario by key; matching ignores case.
#[must_use]
pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let key = match name.to_lowercase().as_str() {
        "perfect" => "perfect-run".to_string(),
        "idle" | "timeout" => "idle-timeout".to_string(),
        "recovery" => "recovery-drill".to_string(),
        "spender" => "power-up-spender".to_string(),
        other => other.to_string(),
    };
    all_scenarios()
        .into_iter()
        .find(|scenario| scenario.name == key)
}

pub fn list_scenarios() -> Vec<(String, &'static str)> {
    all_scenarios()
        .into_iter()
        .map(|scenario| (scenario.name, scenario.description))
        .collect()
}
