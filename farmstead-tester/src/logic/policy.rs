use std::fmt;
use std::str::FromStr;

use farmstead_game::{
    AdventureData, CombatModifiers, CraftingData, CropGrowthData, Equipment, GameData,
    HelperTrainingData, MiningData, ProcessData, ProcessManager, ProcessType, SeedCatchingData,
    SimulationState,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

/// Helper every policy trains; the tester farm has a single hand.
pub const DEFAULT_HELPER: &str = "mira";

/// Read-only snapshot a policy plans against.
pub struct PolicyView<'a> {
    pub state: &'a SimulationState,
    pub data: &'a GameData,
    pub manager: &'a ProcessManager,
    pub wind_level: u8,
}

impl PolicyView<'_> {
    fn has_slot(&self, kind: ProcessType) -> bool {
        self.manager.can_start_process(kind)
    }

    fn energy(&self) -> f64 {
        self.state.resources.energy.current
    }

    fn energy_ratio(&self) -> f64 {
        let pool = self.state.resources.energy;
        if pool.max > 0.0 {
            pool.current / pool.max
        } else {
            0.0
        }
    }

    fn helper_in_training(&self, helper: &str) -> bool {
        self.manager
            .active_processes_by_type(ProcessType::HelperTraining)
            .any(|handle| match &handle.data {
                ProcessData::HelperTraining(data) => data.helper_id == helper,
                _ => false,
            })
    }
}

/// Start request returned by a [`PlayerPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub data: ProcessData,
    pub rationale: Option<String>,
}

impl PolicyDecision {
    #[must_use]
    pub const fn new(data: ProcessData, rationale: Option<String>) -> Self {
        Self { data, rationale }
    }

    #[must_use]
    pub const fn process_type(&self) -> ProcessType {
        self.data.process_type()
    }
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Processes to start before the next tick, in priority order.
    fn plan(&mut self, view: &PolicyView<'_>) -> Vec<PolicyDecision>;
}

/// Built-in gameplay strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameplayStrategy {
    Farmer,
    Adventurer,
    Balanced,
    Random,
}

impl GameplayStrategy {
    pub const ALL: [Self; 4] = [Self::Farmer, Self::Adventurer, Self::Balanced, Self::Random];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Farmer => "Farmer",
            Self::Adventurer => "Adventurer",
            Self::Balanced => "Balanced",
            Self::Random => "Random",
        }
    }

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Farmer => "farmer",
            Self::Adventurer => "adventurer",
            Self::Balanced => "balanced",
            Self::Random => "random",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy + Send> {
        match self {
            Self::Farmer => Box::new(FarmerPolicy),
            Self::Adventurer => Box::new(AdventurerPolicy),
            Self::Balanced => Box::new(BalancedPolicy),
            Self::Random => Box::new(RandomPolicy::new(seed)),
        }
    }
}

impl fmt::Display for GameplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GameplayStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown strategy: {s}"))
    }
}

struct FarmerPolicy;
struct AdventurerPolicy;
struct BalancedPolicy;

struct RandomPolicy {
    rng: ChaCha20Rng,
    start_chance: f64,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed ^ 0x5EED_F00D),
            start_chance: 0.5,
        }
    }
}

impl PlayerPolicy for FarmerPolicy {
    fn name(&self) -> &'static str {
        "Farmer"
    }

    fn plan(&mut self, view: &PolicyView<'_>) -> Vec<PolicyDecision> {
        [
            plant_crop(view),
            catch_seeds(view),
            train_helper(view, 0),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl PlayerPolicy for AdventurerPolicy {
    fn name(&self) -> &'static str {
        "Adventurer"
    }

    fn plan(&mut self, view: &PolicyView<'_>) -> Vec<PolicyDecision> {
        [
            craft_next(view),
            go_adventuring(view, 1.0),
            mine_deepest(view, 1.0),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl PlayerPolicy for BalancedPolicy {
    fn name(&self) -> &'static str {
        "Balanced"
    }

    fn plan(&mut self, view: &PolicyView<'_>) -> Vec<PolicyDecision> {
        let mut decisions: Vec<PolicyDecision> = [plant_crop(view), craft_next(view)]
            .into_iter()
            .flatten()
            .collect();
        let seeds_left: i64 = view.state.resources.seeds.values().sum();
        if seeds_left < 2
            && let Some(decision) = catch_seeds(view)
        {
            decisions.push(decision);
        }
        if view.energy_ratio() > 0.5
            && let Some(decision) = go_adventuring(view, 1.5)
        {
            decisions.push(decision);
        }
        decisions.extend(train_helper(view, 60));
        decisions
    }
}

impl PlayerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn plan(&mut self, view: &PolicyView<'_>) -> Vec<PolicyDecision> {
        if !self.rng.gen_bool(self.start_chance) {
            return Vec::new();
        }
        let candidates = random_candidates(view, &mut self.rng);
        candidates
            .choose(&mut self.rng)
            .cloned()
            .map(|data| vec![PolicyDecision::new(data, Some(String::from("random pick")))])
            .unwrap_or_default()
    }
}

fn plant_crop(view: &PolicyView<'_>) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::CropGrowth) {
        return None;
    }
    view.state.farm.free_plot()?;
    let resources = &view.state.resources;
    let (id, crop) = view
        .data
        .crops
        .iter()
        .filter(|(_, crop)| {
            resources.seed_count(&crop.seed_kind) > 0 && resources.water.covers(crop.water_cost)
        })
        .max_by_key(|(_, crop)| crop.experience)?;
    Some(PolicyDecision::new(
        ProcessData::CropGrowth(CropGrowthData::new(id)),
        Some(format!("plant {id} ({} seeds)", resources.seed_count(&crop.seed_kind))),
    ))
}

fn catch_seeds(view: &PolicyView<'_>) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::SeedCatching) {
        return None;
    }
    // Areas cap the usable wind at their highest multiplier.
    let (id, wind, rate) = view
        .data
        .seed_areas
        .iter()
        .filter(|(_, area)| view.state.resources.energy.covers(area.energy_cost))
        .filter_map(|(id, area)| {
            let top = u8::try_from(area.wind_multipliers.len().checked_sub(1)?).ok()?;
            let wind = view.wind_level.min(top);
            Some((id, wind, area.catch_rate * area.wind_multiplier(wind)?))
        })
        .max_by(|a, b| a.2.total_cmp(&b.2))?;
    Some(PolicyDecision::new(
        ProcessData::SeedCatching(SeedCatchingData::new(id, wind)),
        Some(format!("catch seeds in {id} at {rate:.2}/s")),
    ))
}

fn train_helper(view: &PolicyView<'_>, gold_reserve: i64) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::HelperTraining) || view.helper_in_training(DEFAULT_HELPER) {
        return None;
    }
    let gold = view.state.resources.gold;
    let (id, _) = view
        .data
        .trainings
        .iter()
        .filter(|(_, training)| gold >= training.gold_cost.saturating_add(gold_reserve))
        .min_by_key(|(_, training)| training.gold_cost)?;
    Some(PolicyDecision::new(
        ProcessData::HelperTraining(HelperTrainingData::new(DEFAULT_HELPER, id)),
        Some(format!("train {DEFAULT_HELPER} in {id}")),
    ))
}

fn go_adventuring(view: &PolicyView<'_>, energy_margin: f64) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::Adventure) {
        return None;
    }
    let level = view.state.progression.hero_level;
    let (id, adventure) = view
        .data
        .adventures
        .iter()
        .filter(|(_, adventure)| adventure.min_level <= level)
        .filter(|(_, adventure)| {
            let upkeep = adventure.energy_per_second * adventure.duration;
            view.energy() >= (adventure.energy_cost + upkeep) * energy_margin
        })
        .max_by_key(|(_, adventure)| adventure.min_level)?;
    let equipment = best_equipment(view);
    let rationale = match &equipment.weapon {
        Some(weapon) => format!("{id} (min level {}) with {weapon}", adventure.min_level),
        None => format!("{id} (min level {})", adventure.min_level),
    };
    Some(PolicyDecision::new(
        ProcessData::Adventure(AdventureData::new(id).with_equipment(equipment)),
        Some(rationale),
    ))
}

fn mine_deepest(view: &PolicyView<'_>, energy_margin: f64) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::Mining) {
        return None;
    }
    let level = view.state.progression.hero_level;
    let mining = &view.data.mining;
    let depth = mining
        .levels
        .iter()
        .filter(|(_, def)| def.min_level <= level)
        .filter(|(depth, def)| {
            view.energy() >= mining.drain_rate(**depth) * def.duration * energy_margin
        })
        .map(|(depth, _)| *depth)
        .max()?;
    Some(PolicyDecision::new(
        ProcessData::Mining(MiningData::new(depth)),
        Some(format!("mine depth {depth}")),
    ))
}

/// Next recipe worth crafting: unlocks first, then gear not yet owned.
fn craft_next(view: &PolicyView<'_>) -> Option<PolicyDecision> {
    if !view.has_slot(ProcessType::Crafting) {
        return None;
    }
    let state = view.state;
    let affordable = view.data.recipes.iter().filter(|(_, recipe)| {
        recipe
            .requires
            .as_deref()
            .is_none_or(|req| state.progression.has_upgrade(req))
            && state.resources.has_materials(&recipe.materials)
            && state.resources.gold >= recipe.gold_cost
            && state.resources.energy.covers(recipe.energy_cost)
    });
    let (id, _) = affordable
        .filter_map(|(id, recipe)| {
            let rank = match &recipe.unlocks {
                Some(unlock) if state.progression.has_upgrade(unlock) => return None,
                Some(_) => 0,
                None if recipe
                    .outputs
                    .keys()
                    .all(|output| state.resources.material_count(output) > 0) =>
                {
                    return None;
                }
                None => 1,
            };
            Some((id, rank))
        })
        .min_by_key(|(_, rank)| *rank)?;
    Some(PolicyDecision::new(
        ProcessData::Crafting(CraftingData::new(id)),
        Some(format!("craft {id}")),
    ))
}

/// Owned weapon with the best loot bonus and owned armor with the lowest drain.
fn best_equipment(view: &PolicyView<'_>) -> Equipment {
    let owned = |table: &std::collections::BTreeMap<String, CombatModifiers>| {
        table
            .iter()
            .filter(|(id, _)| view.state.resources.material_count(id) > 0)
            .map(|(id, modifiers)| (id.clone(), *modifiers))
            .collect::<Vec<_>>()
    };
    let weapon = owned(&view.data.combat.weapon_effects)
        .into_iter()
        .max_by(|a, b| a.1.loot_multiplier.total_cmp(&b.1.loot_multiplier))
        .map(|(id, _)| id);
    let armor = owned(&view.data.combat.armor_effects)
        .into_iter()
        .min_by(|a, b| {
            a.1.energy_drain_multiplier
                .total_cmp(&b.1.energy_drain_multiplier)
        })
        .map(|(id, _)| id);
    Equipment { weapon, armor }
}

fn random_candidates(view: &PolicyView<'_>, rng: &mut ChaCha20Rng) -> Vec<ProcessData> {
    let data = view.data;
    let mut candidates: Vec<ProcessData> = Vec::new();
    candidates.extend(
        data.crops
            .keys()
            .map(|id| ProcessData::CropGrowth(CropGrowthData::new(id))),
    );
    let equipment = best_equipment(view);
    candidates.extend(data.adventures.keys().map(|id| {
        ProcessData::Adventure(AdventureData::new(id).with_equipment(equipment.clone()))
    }));
    candidates.extend(
        data.recipes
            .keys()
            .map(|id| ProcessData::Crafting(CraftingData::new(id))),
    );
    candidates.extend(
        data.mining
            .levels
            .keys()
            .map(|depth| ProcessData::Mining(MiningData::new(*depth))),
    );
    candidates.extend(data.seed_areas.keys().map(|id| {
        ProcessData::SeedCatching(SeedCatchingData::new(id, rng.gen_range(0..=view.wind_level)))
    }));
    candidates.extend(
        data.trainings
            .keys()
            .map(|id| ProcessData::HelperTraining(HelperTrainingData::new(DEFAULT_HELPER, id))),
    );
    candidates
}
