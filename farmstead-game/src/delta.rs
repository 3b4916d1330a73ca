//! Sparse state deltas, the per-tick merge accumulator, and the clamped apply step.
//!
//! Merge contract:
//! - flow fields (energy, gold, water, seeds, materials, experience, helper
//!   experience, helper level gains) are summed across every process visited
//!   in a tick;
//! - overwrite fields (capacities, hero level, screen, plots) keep one writer per
//!   tick, chosen by [`ConflictPolicy`], and every competing write is reported
//!   as a [`MergeConflict`];
//! - set fields (unlocked upgrades, completed adventures) are unioned.
//!
//! Application floors counts at zero and clamps pools to `[0, max]` after any
//! capacity overwrite has been applied. Hero level never falls behind the
//! experience curve; the manager settles it after each apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConflictPolicy;
use crate::process::ProcessId;
use crate::state::{PlotId, Screen, SimulationState};

/// Signed adjustments keyed by resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDelta(BTreeMap<String, i64>);

impl ResourceDelta {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add `amount` to the entry for `id`; entries that net to zero are dropped.
    pub fn add(&mut self, id: impl Into<String>, amount: i64) {
        if amount == 0 {
            return;
        }
        let id = id.into();
        let total = self.0.get(&id).copied().unwrap_or(0).saturating_add(amount);
        if total == 0 {
            self.0.remove(&id);
        } else {
            self.0.insert(id, total);
        }
    }

    /// Sum every entry of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (id, amount) in &other.0 {
            self.add(id.clone(), *amount);
        }
    }

    /// Add each entry to `stock`, flooring results at zero.
    ///
    /// Returns the total quantity discarded by the floor.
    pub fn apply_to(&self, stock: &mut BTreeMap<String, i64>) -> i64 {
        let mut floored = 0_i64;
        for (id, amount) in &self.0 {
            let entry = stock.entry(id.clone()).or_insert(0);
            let next = entry.saturating_add(*amount);
            if next < 0 {
                floored = floored.saturating_add(next.saturating_neg());
                *entry = 0;
            } else {
                *entry = next;
            }
        }
        floored
    }

    #[must_use]
    pub fn get(&self, id: &str) -> i64 {
        self.0.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for ResourceDelta {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut delta = Self::new();
        for (id, amount) in iter {
            delta.add(id, amount);
        }
        delta
    }
}

/// Change to a single farm plot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotChange {
    Planted { crop: String },
    Cleared,
}

/// Sparse description of how the simulation state should change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateChanges {
    #[serde(default)]
    pub energy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_max: Option<f64>,
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub water: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_max: Option<f64>,
    #[serde(default, skip_serializing_if = "ResourceDelta::is_empty")]
    pub seeds: ResourceDelta,
    #[serde(default, skip_serializing_if = "ResourceDelta::is_empty")]
    pub materials: ResourceDelta,
    #[serde(default)]
    pub experience: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unlocked_upgrades: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_adventures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_screen: Option<Screen>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plots: BTreeMap<PlotId, PlotChange>,
    #[serde(default, skip_serializing_if = "ResourceDelta::is_empty")]
    pub helper_experience: ResourceDelta,
    /// Levels gained per helper.
    #[serde(default, skip_serializing_if = "ResourceDelta::is_empty")]
    pub helper_level_gains: ResourceDelta,
}

impl StateChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.energy == 0.0
            && self.energy_max.is_none()
            && self.gold == 0
            && self.water == 0.0
            && self.water_max.is_none()
            && self.seeds.is_empty()
            && self.materials.is_empty()
            && self.experience == 0
            && self.hero_level.is_none()
            && self.unlocked_upgrades.is_empty()
            && self.completed_adventures.is_empty()
            && self.current_screen.is_none()
            && self.plots.is_empty()
            && self.helper_experience.is_empty()
            && self.helper_level_gains.is_empty()
    }

    /// Insert `id` into `list` unless it is already present.
    pub fn push_unique(list: &mut Vec<String>, id: impl Into<String>) {
        let id = id.into();
        if !list.iter().any(|existing| *existing == id) {
            list.push(id);
        }
    }

    pub fn unlock(&mut self, upgrade: impl Into<String>) {
        Self::push_unique(&mut self.unlocked_upgrades, upgrade);
    }

    pub fn complete_adventure(&mut self, adventure: impl Into<String>) {
        Self::push_unique(&mut self.completed_adventures, adventure);
    }
}

/// Overwrite-style field that admits a single writer per tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "field", content = "key", rename_all = "snake_case")]
pub enum OverwriteField {
    EnergyMax,
    WaterMax,
    HeroLevel,
    CurrentScreen,
    Plot(PlotId),
}

impl fmt::Display for OverwriteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnergyMax => f.write_str("energy.max"),
            Self::WaterMax => f.write_str("water.max"),
            Self::HeroLevel => f.write_str("hero_level"),
            Self::CurrentScreen => f.write_str("current_screen"),
            Self::Plot(plot) => write!(f, "plot[{plot}]"),
        }
    }
}

/// Two processes wrote the same overwrite field within one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub field: OverwriteField,
    pub previous_writer: ProcessId,
    pub later_writer: ProcessId,
    /// Writer whose value survives the merge.
    pub kept: ProcessId,
}

/// Tick-local accumulator merging deltas from every visited process.
#[derive(Debug, Clone)]
pub struct DeltaAccumulator {
    policy: ConflictPolicy,
    changes: StateChanges,
    writers: BTreeMap<OverwriteField, ProcessId>,
    conflicts: Vec<MergeConflict>,
}

impl DeltaAccumulator {
    #[must_use]
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            changes: StateChanges::default(),
            writers: BTreeMap::new(),
            conflicts: Vec::new(),
        }
    }

    /// Merge a delta reported by `writer`.
    ///
    /// Returns the conflicts this merge introduced.
    pub fn merge(&mut self, writer: &ProcessId, delta: StateChanges) -> &[MergeConflict] {
        let before = self.conflicts.len();
        let StateChanges {
            energy,
            energy_max,
            gold,
            water,
            water_max,
            seeds,
            materials,
            experience,
            hero_level,
            unlocked_upgrades,
            completed_adventures,
            current_screen,
            plots,
            helper_experience,
            helper_level_gains,
        } = delta;

        self.changes.energy += energy;
        self.changes.gold = self.changes.gold.saturating_add(gold);
        self.changes.water += water;
        self.changes.seeds.merge(&seeds);
        self.changes.materials.merge(&materials);
        self.changes.experience = self.changes.experience.saturating_add(experience);
        self.changes.helper_experience.merge(&helper_experience);
        self.changes.helper_level_gains.merge(&helper_level_gains);
        for upgrade in unlocked_upgrades {
            self.changes.unlock(upgrade);
        }
        for adventure in completed_adventures {
            self.changes.complete_adventure(adventure);
        }

        if let Some(max) = energy_max
            && self.claim(OverwriteField::EnergyMax, writer)
        {
            self.changes.energy_max = Some(max);
        }
        if let Some(max) = water_max
            && self.claim(OverwriteField::WaterMax, writer)
        {
            self.changes.water_max = Some(max);
        }
        if let Some(level) = hero_level
            && self.claim(OverwriteField::HeroLevel, writer)
        {
            self.changes.hero_level = Some(level);
        }
        if let Some(screen) = current_screen
            && self.claim(OverwriteField::CurrentScreen, writer)
        {
            self.changes.current_screen = Some(screen);
        }
        for (plot, change) in plots {
            if self.claim(OverwriteField::Plot(plot), writer) {
                self.changes.plots.insert(plot, change);
            }
        }

        &self.conflicts[before..]
    }

    /// Record `writer` as the owner of `field`; returns whether its value should be kept.
    fn claim(&mut self, field: OverwriteField, writer: &ProcessId) -> bool {
        let Some(previous) = self.writers.get(&field) else {
            self.writers.insert(field, writer.clone());
            return true;
        };
        if previous == writer {
            return true;
        }
        let previous = previous.clone();
        let keep_later = matches!(self.policy, ConflictPolicy::LastWriteWins);
        let kept = if keep_later {
            writer.clone()
        } else {
            previous.clone()
        };
        self.conflicts.push(MergeConflict {
            field: field.clone(),
            previous_writer: previous,
            later_writer: writer.clone(),
            kept,
        });
        if keep_later {
            self.writers.insert(field, writer.clone());
        }
        keep_later
    }

    #[must_use]
    pub const fn changes(&self) -> &StateChanges {
        &self.changes
    }

    #[must_use]
    pub fn conflicts(&self) -> &[MergeConflict] {
        &self.conflicts
    }

    #[must_use]
    pub fn into_parts(self) -> (StateChanges, Vec<MergeConflict>) {
        (self.changes, self.conflicts)
    }
}

/// Amounts discarded while enforcing state invariants during an apply.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub energy_clamped: f64,
    pub water_clamped: f64,
    pub gold_floored: i64,
    pub seeds_floored: i64,
    pub materials_floored: i64,
    pub experience_floored: i64,
    pub duplicates_skipped: usize,
}

impl ApplyReport {
    /// True when the delta fit inside every bound without adjustment.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.energy_clamped == 0.0
            && self.water_clamped == 0.0
            && self.gold_floored == 0
            && self.seeds_floored == 0
            && self.materials_floored == 0
            && self.experience_floored == 0
            && self.duplicates_skipped == 0
    }

    pub fn accumulate(&mut self, other: &Self) {
        self.energy_clamped += other.energy_clamped;
        self.water_clamped += other.water_clamped;
        self.gold_floored = self.gold_floored.saturating_add(other.gold_floored);
        self.seeds_floored = self.seeds_floored.saturating_add(other.seeds_floored);
        self.materials_floored = self
            .materials_floored
            .saturating_add(other.materials_floored);
        self.experience_floored = self
            .experience_floored
            .saturating_add(other.experience_floored);
        self.duplicates_skipped += other.duplicates_skipped;
    }
}

/// Apply `changes` to `state`, enforcing every resource invariant.
pub fn apply_changes(state: &mut SimulationState, changes: &StateChanges) -> ApplyReport {
    let mut report = ApplyReport::default();
    let resources = &mut state.resources;

    if let Some(max) = changes.energy_max {
        resources.energy.max = max;
    }
    if let Some(max) = changes.water_max {
        resources.water.max = max;
    }
    resources.energy.current += changes.energy;
    resources.water.current += changes.water;
    report.energy_clamped = resources.energy.clamp();
    report.water_clamped = resources.water.clamp();

    let (gold, gold_floored) = floor_at_zero(resources.gold.saturating_add(changes.gold));
    resources.gold = gold;
    report.gold_floored = gold_floored;
    report.seeds_floored = changes.seeds.apply_to(&mut resources.seeds);
    report.materials_floored = changes.materials.apply_to(&mut resources.materials);

    let progression = &mut state.progression;
    let (experience, experience_floored) =
        floor_at_zero(progression.experience.saturating_add(changes.experience));
    progression.experience = experience;
    report.experience_floored = experience_floored;
    if let Some(level) = changes.hero_level {
        progression.hero_level = level.max(1);
    }
    report.duplicates_skipped += insert_unique(
        &mut progression.unlocked_upgrades,
        &changes.unlocked_upgrades,
    );
    report.duplicates_skipped += insert_unique(
        &mut progression.completed_adventures,
        &changes.completed_adventures,
    );

    if let Some(screen) = changes.current_screen {
        state.location.current_screen = screen;
    }

    for (plot, change) in &changes.plots {
        match change {
            PlotChange::Planted { crop } => {
                state.farm.plots.insert(*plot, crop.clone());
            }
            PlotChange::Cleared => {
                state.farm.plots.remove(plot);
            }
        }
    }

    for (helper, amount) in changes.helper_experience.iter() {
        let entry = state.helpers.entry(helper.clone()).or_default();
        let (experience, floored) = floor_at_zero(entry.experience.saturating_add(*amount));
        entry.experience = experience;
        report.experience_floored = report.experience_floored.saturating_add(floored);
    }
    for (helper, gain) in changes.helper_level_gains.iter() {
        let entry = state.helpers.entry(helper.clone()).or_default();
        let level = i64::from(entry.level)
            .saturating_add(*gain)
            .clamp(1, i64::from(u32::MAX));
        entry.level = u32::try_from(level).unwrap_or(u32::MAX);
    }

    report
}

const fn floor_at_zero(value: i64) -> (i64, i64) {
    if value < 0 {
        (0, value.saturating_neg())
    } else {
        (value, 0)
    }
}

fn insert_unique(target: &mut Vec<String>, additions: &[String]) -> usize {
    let mut skipped = 0;
    for id in additions {
        if target.iter().any(|existing| existing == id) {
            skipped += 1;
        } else {
            target.push(id.clone());
        }
    }
    skipped
}
