use anyhow::{Context, Result};
use colored::Colorize;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use farmstead_game::{
    ApplyReport, GameData, ManagerConfig, ProcessManager, ProcessStats, ProcessTickResult,
    ProcessType, SimulationState, StateChanges, apply_changes,
};

use super::policy::{GameplayStrategy, PolicyView};

pub const DEFAULT_TICKS: u32 = 720;
pub const DEFAULT_DT: f64 = 5.0;
const WIND_SHIFT_TICKS: u32 = 24;
const MAX_WIND_LEVEL: u8 = 3;
const DECISION_LOG_LIMIT: usize = 32;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Passive regeneration applied after every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Regen {
    pub energy_per_second: f64,
    pub water_per_second: f64,
}

impl Regen {
    pub const DEFAULT: Self = Self {
        energy_per_second: 0.05,
        water_per_second: 0.02,
    };
    pub const NONE: Self = Self {
        energy_per_second: 0.0,
        water_per_second: 0.0,
    };

    fn changes(self, dt: f64) -> StateChanges {
        StateChanges {
            energy: self.energy_per_second * dt,
            water: self.water_per_second * dt,
            ..StateChanges::default()
        }
    }
}

/// Content and manager configuration shared by every run.
#[derive(Debug, Clone)]
pub struct TesterAssets {
    data: GameData,
    config: ManagerConfig,
}

impl TesterAssets {
    /// Bundled game data with the default manager configuration.
    ///
    /// # Errors
    ///
    /// Fails only if the bundled data does not validate.
    pub fn load_default() -> Result<Self> {
        Self::load(None, None)
    }

    /// Load game data and manager configuration, falling back to the bundled
    /// defaults for any path not given.
    ///
    /// # Errors
    ///
    /// Returns an error when a file cannot be read or does not validate.
    pub fn load(data_path: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let data = match data_path {
            Some(path) => GameData::from_json(&read_text(path)?)
                .with_context(|| format!("invalid game data in {}", path.display()))?,
            None => GameData::bundled().context("bundled game data is invalid")?,
        };
        let config = match config_path {
            Some(path) => ManagerConfig::from_json(&read_text(path)?)
                .with_context(|| format!("invalid manager config in {}", path.display()))?,
            None => ManagerConfig::default(),
        };
        Ok(Self { data, config })
    }

    #[must_use]
    pub const fn from_parts(data: GameData, config: ManagerConfig) -> Self {
        Self { data, config }
    }

    #[must_use]
    pub const fn data(&self) -> &GameData {
        &self.data
    }

    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Declarative plan for running a simulation session.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub strategy: GameplayStrategy,
    pub ticks: u32,
    pub dt: f64,
    pub regen: Regen,
    pub setup: Option<fn(&mut SimulationState)>,
    /// Run every iteration twice and require identical fingerprints.
    pub replay_check: bool,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub const fn new(strategy: GameplayStrategy) -> Self {
        Self {
            strategy,
            ticks: DEFAULT_TICKS,
            dt: DEFAULT_DT,
            regen: Regen::DEFAULT,
            setup: None,
            replay_check: false,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks;
        self
    }

    #[must_use]
    pub const fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    #[must_use]
    pub const fn with_regen(mut self, regen: Regen) -> Self {
        self.regen = regen;
        self
    }

    #[must_use]
    pub fn with_setup(mut self, setup: fn(&mut SimulationState)) -> Self {
        self.setup = Some(setup);
        self
    }

    #[must_use]
    pub const fn with_replay_check(mut self) -> Self {
        self.replay_check = true;
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
    /// # Errors
    ///
    /// Returns the expectation's own failure.
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

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub tick: u32,
    pub process_type: ProcessType,
    pub accepted: bool,
    pub note: String,
}

/// Analytics gathered over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub ticks: u32,
    pub simulated_seconds: f64,
    pub starts_attempted: u64,
    pub starts_rejected: u64,
    pub completed: u64,
    pub completed_by_type: BTreeMap<ProcessType, u64>,
    pub failed: u64,
    pub faulted: u64,
    pub conflicts: u64,
    pub gold_earned: i64,
    pub experience_earned: i64,
    /// Resources discarded by clamping while applying process deltas.
    pub process_waste: ApplyReport,
    /// Regeneration lost to full pools.
    pub regen_energy_wasted: f64,
    pub regen_water_wasted: f64,
    pub invariant_violations: Vec<String>,
    pub final_gold: i64,
    pub final_experience: i64,
    pub final_hero_level: u32,
    pub decision_log: Vec<DecisionRecord>,
}

impl RunMetrics {
    fn record_tick(&mut self, result: &ProcessTickResult) {
        self.ticks += 1;
        self.completed = self
            .completed
            .saturating_add(u64::try_from(result.completed.len()).unwrap_or(0));
        for handle in &result.completed {
            *self.completed_by_type.entry(handle.process_type).or_default() += 1;
        }
        self.gold_earned = self.gold_earned.saturating_add(result.changes.gold.max(0));
        self.experience_earned = self
            .experience_earned
            .saturating_add(result.changes.experience.max(0));
        self.process_waste.accumulate(&result.apply);
    }

    fn record_regen(&mut self, report: &ApplyReport) {
        self.regen_energy_wasted += report.energy_clamped;
        self.regen_water_wasted += report.water_clamped;
    }

    fn record_decision(&mut self, record: DecisionRecord) {
        if self.decision_log.len() == DECISION_LOG_LIMIT {
            self.decision_log.remove(0);
        }
        self.decision_log.push(record);
    }

    fn finalize(&mut self, state: &SimulationState, stats: &ProcessStats) {
        self.simulated_seconds = stats.simulated_seconds;
        self.starts_rejected = stats.rejected;
        self.failed = stats.failed;
        self.faulted = stats.faulted;
        self.conflicts = stats.conflicts;
        self.final_gold = state.resources.gold;
        self.final_experience = state.progression.experience;
        self.final_hero_level = state.progression.hero_level;
    }

    #[must_use]
    pub fn completions(&self, process_type: ProcessType) -> u64 {
        self.completed_by_type
            .get(&process_type)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn gold_per_hour(&self) -> f64 {
        self.per_hour(self.gold_earned)
    }

    #[must_use]
    pub fn experience_per_hour(&self) -> f64 {
        self.per_hour(self.experience_earned)
    }

    /// Energy and water thrown away by clamping, process deltas and regen combined.
    #[must_use]
    pub fn wasted_pool(&self) -> f64 {
        self.process_waste.energy_clamped
            + self.process_waste.water_clamped
            + self.regen_energy_wasted
            + self.regen_water_wasted
    }

    #[allow(clippy::cast_precision_loss)]
    fn per_hour(&self, amount: i64) -> f64 {
        if self.simulated_seconds > 0.0 {
            amount as f64 * SECONDS_PER_HOUR / self.simulated_seconds
        } else {
            0.0
        }
    }
}

/// Complete record of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub strategy: GameplayStrategy,
    pub metrics: RunMetrics,
    pub stats: ProcessStats,
    pub final_state: SimulationState,
    pub fingerprint: u64,
}

/// Farm every strategy starts from.
#[must_use]
pub fn starting_state() -> SimulationState {
    let mut state = SimulationState::default()
        .with_seeds("carrot", 4)
        .with_seeds("wheat", 2);
    state.resources.gold = 30;
    state
}

/// Headless deterministic runner driving the process manager.
#[derive(Debug, Clone)]
pub struct FarmTester {
    verbose: bool,
    assets: Arc<TesterAssets>,
}

impl FarmTester {
    #[must_use]
    pub const fn new(assets: Arc<TesterAssets>, verbose: bool) -> Self {
        Self { verbose, assets }
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run `plan` once with `seed`.
    ///
    /// # Errors
    ///
    /// Fails when the manager configuration is rejected.
    pub fn run_plan(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let data = self.assets.data();
        let mut manager =
            ProcessManager::new(self.assets.config().clone()).context("manager rejected config")?;
        let mut state = starting_state();
        if let Some(setup) = plan.setup {
            setup(&mut state);
        }

        let mut policy = plan.strategy.create_policy(seed);
        let mut weather = ChaCha20Rng::seed_from_u64(seed);
        let mut wind_level = 0;
        let mut metrics = RunMetrics::default();

        if self.verbose {
            log_initial_state(seed, plan, &state);
        }

        for tick in 0..plan.ticks {
            if tick % WIND_SHIFT_TICKS == 0 {
                wind_level = weather.gen_range(0..=MAX_WIND_LEVEL);
            }

            let decisions = policy.plan(&PolicyView {
                state: &state,
                data,
                manager: &manager,
                wind_level,
            });
            for decision in decisions {
                let process_type = decision.process_type();
                metrics.starts_attempted += 1;
                let note = decision.rationale.unwrap_or_default();
                let started =
                    manager.start_process(process_type, decision.data, &mut state, data);
                let accepted = match started {
                    Ok(handle) => {
                        log::debug!(
                            "tick {tick}: {} started {} ({note})",
                            policy.name(),
                            handle.id
                        );
                        true
                    }
                    Err(err) => {
                        log::debug!(
                            "tick {tick}: {} could not start {process_type}: {err}",
                            policy.name()
                        );
                        false
                    }
                };
                metrics.record_decision(DecisionRecord {
                    tick,
                    process_type,
                    accepted,
                    note,
                });
            }

            let result = manager.tick(plan.dt, &mut state, data);
            metrics.record_tick(&result);
            if self.verbose {
                log_tick(tick, &result);
            }

            let regen = apply_changes(&mut state, &plan.regen.changes(plan.dt));
            metrics.record_regen(&regen);

            if let Some(violation) = state.invariant_violation() {
                log::warn!("tick {tick}: invariant violated: {violation}");
                metrics
                    .invariant_violations
                    .push(format!("tick {tick}: {violation}"));
            }
        }

        let stats = manager.stats();
        metrics.finalize(&state, &stats);
        let fingerprint = state.fingerprint();
        Ok(SimulationSummary {
            seed,
            strategy: plan.strategy,
            metrics,
            stats,
            final_state: state,
            fingerprint,
        })
    }
}

fn log_initial_state(seed: u64, plan: &SimulationPlan, state: &SimulationState) {
    println!(
        "🌱 Starting simulation | seed:{seed} policy:{} ticks:{} dt:{}",
        plan.strategy.label(),
        plan.ticks,
        plan.dt
    );
    println!(
        "📊 Initial farm | Energy:{:.1} Water:{:.1} Gold:{} Seeds:{}",
        state.resources.energy.current,
        state.resources.water.current,
        state.resources.gold,
        state.resources.seeds.values().sum::<i64>()
    );
}

fn log_tick(tick: u32, result: &ProcessTickResult) {
    for handle in &result.completed {
        println!("  ✅ tick {tick}: {} completed", handle.id.to_string().green());
    }
    for failure in &result.failed {
        println!(
            "  ❌ tick {tick}: {} {:?}: {}",
            failure.id.to_string().red(),
            failure.kind,
            failure.reason
        );
    }
    if !result.conflicts.is_empty() {
        println!(
            "  ⚠️  tick {tick}: {} merge conflict(s)",
            result.conflicts.len().to_string().yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tester() -> FarmTester {
        FarmTester::new(Arc::new(TesterAssets::load_default().unwrap()), false)
    }

    #[test]
    fn same_seed_same_fingerprint() {
        let tester = tester();
        let plan = SimulationPlan::new(GameplayStrategy::Random).with_ticks(200);
        let first = tester.run_plan(&plan, 99).unwrap();
        let second = tester.run_plan(&plan, 99).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.final_state, second.final_state);
        assert_eq!(first.metrics.starts_attempted, second.metrics.starts_attempted);
    }

    #[test]
    fn zero_ticks_leaves_the_starting_farm() {
        let summary = tester()
            .run_plan(&SimulationPlan::new(GameplayStrategy::Balanced).with_ticks(0), 1)
            .unwrap();
        assert_eq!(summary.final_state, starting_state());
        assert_eq!(summary.metrics.ticks, 0);
        assert!(summary.metrics.gold_per_hour().abs() < f64::EPSILON);
    }

    #[test]
    fn farmer_harvests_within_an_hour() {
        let summary = tester()
            .run_plan(&SimulationPlan::new(GameplayStrategy::Farmer), 1337)
            .unwrap();
        assert!(summary.metrics.completions(ProcessType::CropGrowth) > 0);
        assert!(summary.metrics.invariant_violations.is_empty());
        assert_eq!(summary.stats.ticks, u64::from(DEFAULT_TICKS));
        assert!((summary.metrics.simulated_seconds - 3600.0).abs() < 1e-6);
    }

    #[test]
    fn regen_fills_pools_and_reports_waste() {
        let plan = SimulationPlan::new(GameplayStrategy::Farmer)
            .with_ticks(10)
            .with_regen(Regen {
                energy_per_second: 1.0,
                water_per_second: 0.0,
            })
            .with_setup(|state| state.resources.seeds.clear());
        let summary = tester().run_plan(&plan, 5).unwrap();
        assert!(summary.metrics.regen_energy_wasted > 0.0);
        assert!(summary.metrics.wasted_pool() >= summary.metrics.regen_energy_wasted);
    }

    #[test]
    fn missing_override_files_are_reported() {
        let err = TesterAssets::load(Some(Path::new("/definitely/not/here.json")), None)
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
