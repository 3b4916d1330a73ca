use serde::Serialize;
use std::collections::BTreeMap;

use farmstead_game::ProcessType;

use super::policy::GameplayStrategy;
use super::simulation::RunMetrics;

/// Metrics of one successful iteration, tagged with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceRecord {
    pub scenario_name: String,
    pub strategy: GameplayStrategy,
    pub seed: u64,
    pub metrics: RunMetrics,
}

/// Per-scenario balance figures across every recorded iteration.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceAggregate {
    pub scenario_name: String,
    pub strategy: GameplayStrategy,
    pub iterations: usize,
    pub mean_gold_per_hour: f64,
    pub std_gold_per_hour: f64,
    pub mean_xp_per_hour: f64,
    pub std_xp_per_hour: f64,
    pub mean_completed: f64,
    pub mean_completed_by_type: BTreeMap<ProcessType, f64>,
    /// Failed and faulted processes over started ones.
    pub failure_rate: f64,
    pub rejection_rate: f64,
    pub mean_conflicts: f64,
    pub mean_wasted_pool: f64,
    pub mean_final_level: f64,
    pub invariant_breaches: usize,
}

pub fn aggregate_balance(records: &[BalanceRecord]) -> Vec<BalanceAggregate> {
    let mut aggregates: BTreeMap<String, AggregateBuilder> = BTreeMap::new();
    for record in records {
        aggregates
            .entry(record.scenario_name.clone())
            .or_insert_with(|| AggregateBuilder::new(record))
            .ingest(&record.metrics);
    }
    aggregates
        .into_values()
        .map(AggregateBuilder::finish)
        .collect()
}

struct AggregateBuilder {
    scenario_name: String,
    strategy: GameplayStrategy,
    iterations: u32,
    gold_per_hour: RunningStats,
    xp_per_hour: RunningStats,
    completed_sum: u64,
    completed_by_type: BTreeMap<ProcessType, u64>,
    attempted_sum: u64,
    rejected_sum: u64,
    failures_sum: u64,
    conflicts_sum: u64,
    wasted_pool_sum: f64,
    level_sum: u64,
    invariant_breaches: usize,
}

impl AggregateBuilder {
    fn new(record: &BalanceRecord) -> Self {
        Self {
            scenario_name: record.scenario_name.clone(),
            strategy: record.strategy,
            iterations: 0,
            gold_per_hour: RunningStats::default(),
            xp_per_hour: RunningStats::default(),
            completed_sum: 0,
            completed_by_type: BTreeMap::new(),
            attempted_sum: 0,
            rejected_sum: 0,
            failures_sum: 0,
            conflicts_sum: 0,
            wasted_pool_sum: 0.0,
            level_sum: 0,
            invariant_breaches: 0,
        }
    }

    fn ingest(&mut self, metrics: &RunMetrics) {
        self.iterations += 1;
        self.gold_per_hour.add(metrics.gold_per_hour());
        self.xp_per_hour.add(metrics.experience_per_hour());
        self.completed_sum = self.completed_sum.saturating_add(metrics.completed);
        for (kind, count) in &metrics.completed_by_type {
            *self.completed_by_type.entry(*kind).or_default() += count;
        }
        self.attempted_sum = self.attempted_sum.saturating_add(metrics.starts_attempted);
        self.rejected_sum = self.rejected_sum.saturating_add(metrics.starts_rejected);
        self.failures_sum = self
            .failures_sum
            .saturating_add(metrics.failed)
            .saturating_add(metrics.faulted);
        self.conflicts_sum = self.conflicts_sum.saturating_add(metrics.conflicts);
        self.wasted_pool_sum += metrics.wasted_pool();
        self.level_sum = self
            .level_sum
            .saturating_add(u64::from(metrics.final_hero_level));
        self.invariant_breaches += metrics.invariant_violations.len();
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> BalanceAggregate {
        let denom = f64::from(self.iterations.max(1));
        let ratio = |num: u64, den: u64| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let started = self.attempted_sum.saturating_sub(self.rejected_sum);
        BalanceAggregate {
            scenario_name: self.scenario_name,
            strategy: self.strategy,
            iterations: usize::try_from(self.iterations).unwrap_or(usize::MAX),
            mean_gold_per_hour: self.gold_per_hour.mean(),
            std_gold_per_hour: self.gold_per_hour.std_dev(),
            mean_xp_per_hour: self.xp_per_hour.mean(),
            std_xp_per_hour: self.xp_per_hour.std_dev(),
            mean_completed: self.completed_sum as f64 / denom,
            mean_completed_by_type: self
                .completed_by_type
                .into_iter()
                .map(|(kind, count)| (kind, count as f64 / denom))
                .collect(),
            failure_rate: ratio(self.failures_sum, started),
            rejection_rate: ratio(self.rejected_sum, self.attempted_sum),
            mean_conflicts: self.conflicts_sum as f64 / denom,
            mean_wasted_pool: self.wasted_pool_sum / denom,
            mean_final_level: self.level_sum as f64 / denom,
            invariant_breaches: self.invariant_breaches,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RunningStats {
    count: u32,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let count = f64::from(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn std_dev(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / f64::from(self.count - 1)).sqrt()
        } else {
            0.0
        }
    }
}
