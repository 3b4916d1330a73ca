use anyhow::{Result, ensure};
use std::collections::BTreeSet;

use farmstead_game::{ProcessType, SimulationState};

use super::policy::GameplayStrategy;
use super::simulation::{Regen, SimulationPlan, SimulationSummary};

/// Named plan runnable by the logic tester.
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub key: &'static str,
    pub name: &'static str,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub const fn new(key: &'static str, name: &'static str, plan: SimulationPlan) -> Self {
        Self { key, name, plan }
    }
}

const CATALOG: [(&str, &str); 6] = [
    ("smoke", "Smoke Test"),
    ("determinism", "Deterministic Replay"),
    ("invariants", "Resource Invariants Under Scarcity"),
    ("crop-economy", "Crop Economy"),
    ("adventure-loop", "Adventure Loop"),
    ("crafting-chain", "Crafting Chain"),
];

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let key = match name.trim().to_lowercase().as_str() {
        "smoke" => "smoke",
        "determinism" | "deterministic" | "replay" => "determinism",
        "invariants" | "scarcity" => "invariants",
        "crop-economy" | "crops" | "farming" => "crop-economy",
        "adventure-loop" | "adventure" => "adventure-loop",
        "crafting-chain" | "crafting" => "crafting-chain",
        _ => return None,
    };
    let (key, title) = CATALOG.into_iter().find(|(k, _)| *k == key)?;
    Some(TestScenario::new(key, title, plan_for(key)?))
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG.to_vec()
}

/// Every catalog key, in listing order.
pub fn all_scenario_keys() -> Vec<String> {
    CATALOG.iter().map(|(key, _)| (*key).to_string()).collect()
}

fn plan_for(key: &str) -> Option<SimulationPlan> {
    let plan = match key {
        "smoke" => SimulationPlan::new(GameplayStrategy::Balanced)
            .with_ticks(120)
            .with_expectation(healthy_run),
        "determinism" => SimulationPlan::new(GameplayStrategy::Random)
            .with_ticks(360)
            .with_replay_check()
            .with_expectation(healthy_run),
        "invariants" => SimulationPlan::new(GameplayStrategy::Random)
            .with_regen(Regen::NONE)
            .with_setup(scarce_farm)
            .with_expectation(healthy_run)
            .with_expectation(scarcity_expectation),
        "crop-economy" => SimulationPlan::new(GameplayStrategy::Farmer)
            .with_expectation(healthy_run)
            .with_expectation(crop_economy_expectation),
        "adventure-loop" => SimulationPlan::new(GameplayStrategy::Adventurer)
            .with_expectation(healthy_run)
            .with_expectation(adventure_loop_expectation),
        "crafting-chain" => SimulationPlan::new(GameplayStrategy::Balanced)
            .with_setup(crafting_stockpile)
            .with_expectation(healthy_run)
            .with_expectation(crafting_chain_expectation),
        _ => return None,
    };
    Some(plan)
}

fn scarce_farm(state: &mut SimulationState) {
    state.resources.energy.current = 10.0;
    state.resources.water.current = 2.0;
    state.resources.gold = 0;
}

fn crafting_stockpile(state: &mut SimulationState) {
    for (id, count) in [("ancient_wood", 6), ("iron_ore", 3), ("copper_ore", 3)] {
        state.resources.materials.insert(id.to_string(), count);
    }
    state.resources.gold = 150;
}

fn healthy_run(summary: &SimulationSummary) -> Result<()> {
    let metrics = &summary.metrics;
    ensure!(
        metrics.invariant_violations.is_empty(),
        "state invariants broken: {}",
        metrics.invariant_violations.join("; ")
    );
    ensure!(
        metrics.faulted == 0,
        "{} process(es) faulted",
        metrics.faulted
    );
    ensure!(
        summary.stats.ticks == u64::from(metrics.ticks),
        "manager counted {} ticks, runner {}",
        summary.stats.ticks,
        metrics.ticks
    );
    Ok(())
}

fn scarcity_expectation(summary: &SimulationSummary) -> Result<()> {
    let resources = &summary.final_state.resources;
    ensure!(
        resources.energy.current >= 0.0 && resources.water.current >= 0.0,
        "pools went negative: energy {:.2} water {:.2}",
        resources.energy.current,
        resources.water.current
    );
    ensure!(resources.gold >= 0, "gold went negative: {}", resources.gold);
    Ok(())
}

fn crop_economy_expectation(summary: &SimulationSummary) -> Result<()> {
    let metrics = &summary.metrics;
    let harvests = metrics.completions(ProcessType::CropGrowth);
    ensure!(harvests > 0, "no crops were harvested");
    ensure!(
        metrics.completions(ProcessType::SeedCatching) > 0,
        "no seed-catching run finished"
    );
    ensure!(
        metrics.experience_earned > 0,
        "farming earned no experience after {harvests} harvests"
    );
    Ok(())
}

fn adventure_loop_expectation(summary: &SimulationSummary) -> Result<()> {
    let metrics = &summary.metrics;
    ensure!(
        metrics.completions(ProcessType::Adventure) > 0,
        "no adventure completed"
    );
    ensure!(metrics.gold_earned > 0, "adventures earned no gold");
    let completed = &summary.final_state.progression.completed_adventures;
    let unique: BTreeSet<&String> = completed.iter().collect();
    ensure!(
        unique.len() == completed.len(),
        "completed adventures recorded twice"
    );
    Ok(())
}

fn crafting_chain_expectation(summary: &SimulationSummary) -> Result<()> {
    let progression = &summary.final_state.progression;
    for upgrade in ["workbench", "greenhouse"] {
        ensure!(
            progression.has_upgrade(upgrade),
            "{upgrade} was never unlocked (unlocked: {:?})",
            progression.unlocked_upgrades
        );
    }
    Ok(())
}
