use anyhow::{Context, Result, ensure};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::balance::BalanceRecord;
use super::scenarios::TestScenario;
use super::simulation::{FarmTester, SimulationPlan, SimulationSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_name: String,
    pub strategy: String,
    pub seed: u64,
    pub passed: bool,
    pub iterations_run: usize,
    pub successful_iterations: usize,
    pub failures: Vec<String>,
    #[serde(with = "duration_serde")]
    pub average_duration: Duration,
    #[serde(with = "duration_vec_serde")]
    pub performance_data: Vec<Duration>,
}

/// Everything one scenario produced: pass/fail per seed and the metrics of
/// each successful iteration.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOutcome {
    pub results: Vec<ScenarioResult>,
    pub records: Vec<BalanceRecord>,
}

impl ScenarioOutcome {
    pub fn extend(&mut self, other: Self) {
        self.results.extend(other.results);
        self.records.extend(other.records);
    }
}

pub struct LogicTester {
    tester: FarmTester,
}

impl LogicTester {
    pub const fn new(tester: FarmTester) -> Self {
        Self { tester }
    }

    pub fn run_scenario(
        &self,
        scenario: &TestScenario,
        seeds: &[u64],
        iterations: usize,
    ) -> ScenarioOutcome {
        let mut outcome = ScenarioOutcome::default();

        for &seed in seeds {
            if self.tester.verbose() {
                println!(
                    "🧪 Testing scenario: {} (policy: {} seed: {})",
                    scenario.name.bright_white(),
                    scenario.plan.strategy,
                    seed
                );
            }
            let (result, records) = self.run_single_scenario(scenario, seed, iterations);
            outcome.results.push(result);
            outcome.records.extend(records);
        }

        outcome
    }

    fn run_single_scenario(
        &self,
        scenario: &TestScenario,
        seed: u64,
        iterations: usize,
    ) -> (ScenarioResult, Vec<BalanceRecord>) {
        let mut successes = 0;
        let mut failures = Vec::new();
        let mut performance_data = Vec::new();
        let mut records = Vec::new();

        for i in 0..iterations {
            let start_time = Instant::now();
            let iteration_seed = seed.wrapping_add(u64::try_from(i).unwrap_or(u64::MAX));

            match self.run_iteration(&scenario.plan, iteration_seed) {
                Ok(summary) => {
                    successes += 1;
                    let duration = start_time.elapsed();
                    performance_data.push(duration);
                    if self.tester.verbose() {
                        println!(
                            "  ✅ Iteration {}/{} passed ({duration:?}) gold/h:{:.1} xp/h:{:.1} level:{}",
                            i + 1,
                            iterations,
                            summary.metrics.gold_per_hour(),
                            summary.metrics.experience_per_hour(),
                            summary.metrics.final_hero_level
                        );
                    }
                    records.push(BalanceRecord {
                        scenario_name: scenario.name.to_string(),
                        strategy: summary.strategy,
                        seed: iteration_seed,
                        metrics: summary.metrics,
                    });
                }
                Err(err) => {
                    let message = format!(
                        "Iteration {} (strategy {}, seed {iteration_seed}): {err:#}",
                        i + 1,
                        scenario.plan.strategy
                    );
                    if self.tester.verbose() {
                        println!(
                            "  ❌ Iteration {}/{} failed: {}",
                            i + 1,
                            iterations,
                            format!("{err:#}").red()
                        );
                    }
                    failures.push(message);
                }
            }
        }

        let average_duration = if performance_data.is_empty() {
            Duration::ZERO
        } else {
            performance_data.iter().sum::<Duration>()
                / u32::try_from(performance_data.len()).unwrap_or(1)
        };

        let result = ScenarioResult {
            scenario_name: scenario.name.to_string(),
            strategy: scenario.plan.strategy.label().to_string(),
            seed,
            passed: failures.is_empty(),
            iterations_run: iterations,
            successful_iterations: successes,
            failures,
            average_duration,
            performance_data,
        };
        (result, records)
    }

    fn run_iteration(&self, plan: &SimulationPlan, seed: u64) -> Result<SimulationSummary> {
        let summary = self.tester.run_plan(plan, seed)?;
        if plan.replay_check {
            let replay = self.tester.run_plan(plan, seed)?;
            ensure!(
                replay.fingerprint == summary.fingerprint,
                "replay diverged: {:016x} != {:016x}",
                summary.fingerprint,
                replay.fingerprint
            );
            ensure!(
                replay.stats == summary.stats,
                "replay produced different process counters"
            );
        }
        for expectation in &plan.expectations {
            expectation.evaluate(&summary).with_context(|| {
                format!(
                    "final gold {} xp {} level {}",
                    summary.final_state.resources.gold,
                    summary.final_state.progression.experience,
                    summary.final_state.progression.hero_level
                )
            })?;
        }
        Ok(summary)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u128::deserialize(deserializer)?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(durations: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis: Vec<u128> = durations.iter().map(Duration::as_millis).collect();
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis_vec = Vec::<u128>::deserialize(deserializer)?;
        Ok(millis_vec
            .into_iter()
            .map(|m| Duration::from_millis(u64::try_from(m).unwrap_or(0)))
            .collect())
    }
}
