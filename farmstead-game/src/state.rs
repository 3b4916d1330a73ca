//! Shared simulation state mutated once per tick by the process manager.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;
use twox_hash::XxHash64;

const DEFAULT_ENERGY_MAX: f64 = 100.0;
const DEFAULT_WATER_MAX: f64 = 20.0;
const DEFAULT_PLOT_COUNT: u32 = 6;
const FINGERPRINT_SEED: u64 = 0;

/// Plot index on the farm grid.
pub type PlotId = u32;

/// Bounded resource pool such as energy or water.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    pub current: f64,
    pub max: f64,
}

impl Capacity {
    #[must_use]
    pub const fn new(current: f64, max: f64) -> Self {
        Self { current, max }
    }

    #[must_use]
    pub const fn full(max: f64) -> Self {
        Self { current: max, max }
    }

    /// Whether `amount` can be paid from the pool without going negative.
    #[must_use]
    pub fn covers(&self, amount: f64) -> bool {
        amount <= 0.0 || self.current >= amount
    }

    /// Clamp `current` into `[0, max]`, returning the absolute amount removed or added.
    pub fn clamp(&mut self) -> f64 {
        if !self.max.is_finite() || self.max < 0.0 {
            self.max = 0.0;
        }
        let raw = if self.current.is_finite() {
            self.current
        } else {
            0.0
        };
        let bounded = raw.clamp(0.0, self.max);
        self.current = bounded;
        (raw - bounded).abs()
    }
}

/// Currency, consumables, and stockpiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub energy: Capacity,
    pub gold: i64,
    pub water: Capacity,
    #[serde(default)]
    pub seeds: BTreeMap<String, i64>,
    #[serde(default)]
    pub materials: BTreeMap<String, i64>,
}

impl Resources {
    #[must_use]
    pub fn seed_count(&self, kind: &str) -> i64 {
        self.seeds.get(kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn material_count(&self, id: &str) -> i64 {
        self.materials.get(id).copied().unwrap_or(0)
    }

    /// True when every `(id, amount)` requirement is in stock.
    #[must_use]
    pub fn has_materials(&self, costs: &BTreeMap<String, i64>) -> bool {
        costs
            .iter()
            .all(|(id, amount)| self.material_count(id) >= *amount)
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            energy: Capacity::full(DEFAULT_ENERGY_MAX),
            gold: 0,
            water: Capacity::full(DEFAULT_WATER_MAX),
            seeds: BTreeMap::new(),
            materials: BTreeMap::new(),
        }
    }
}

/// Hero experience and unlock history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    pub experience: i64,
    pub hero_level: u32,
    #[serde(default)]
    pub unlocked_upgrades: Vec<String>,
    #[serde(default)]
    pub completed_adventures: Vec<String>,
}

impl Progression {
    #[must_use]
    pub fn has_upgrade(&self, id: &str) -> bool {
        self.unlocked_upgrades.iter().any(|u| u == id)
    }

    #[must_use]
    pub fn has_completed(&self, adventure: &str) -> bool {
        self.completed_adventures.iter().any(|a| a == adventure)
    }
}

impl Default for Progression {
    fn default() -> Self {
        Self {
            experience: 0,
            hero_level: 1,
            unlocked_upgrades: Vec::new(),
            completed_adventures: Vec::new(),
        }
    }
}

/// Screen the player is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Farm,
    Town,
    Forge,
    Mine,
    Tower,
    Adventure,
}

impl Screen {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Farm => "farm",
            Self::Town => "town",
            Self::Forge => "forge",
            Self::Mine => "mine",
            Self::Tower => "tower",
            Self::Adventure => "adventure",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farm" => Ok(Self::Farm),
            "town" => Ok(Self::Town),
            "forge" => Ok(Self::Forge),
            "mine" => Ok(Self::Mine),
            "tower" => Ok(Self::Tower),
            "adventure" => Ok(Self::Adventure),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Location {
    pub current_screen: Screen,
}

/// Plot occupancy on the farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmState {
    pub plot_count: u32,
    /// Occupied plots mapped to the crop growing on them.
    #[serde(default)]
    pub plots: BTreeMap<PlotId, String>,
}

impl FarmState {
    #[must_use]
    pub fn is_plot_free(&self, plot: PlotId) -> bool {
        plot < self.plot_count && !self.plots.contains_key(&plot)
    }

    /// Lowest-numbered free plot, if any.
    #[must_use]
    pub fn free_plot(&self) -> Option<PlotId> {
        (0..self.plot_count).find(|plot| !self.plots.contains_key(plot))
    }
}

impl Default for FarmState {
    fn default() -> Self {
        Self {
            plot_count: DEFAULT_PLOT_COUNT,
            plots: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperState {
    pub experience: i64,
    pub level: u32,
}

impl Default for HelperState {
    fn default() -> Self {
        Self {
            experience: 0,
            level: 1,
        }
    }
}

/// The single mutable aggregate every process delta is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SimulationState {
    pub resources: Resources,
    pub progression: Progression,
    pub location: Location,
    #[serde(default)]
    pub farm: FarmState,
    #[serde(default)]
    pub helpers: BTreeMap<String, HelperState>,
}

impl SimulationState {
    #[must_use]
    pub fn with_energy(mut self, current: f64, max: f64) -> Self {
        self.resources.energy = Capacity::new(current, max);
        self
    }

    #[must_use]
    pub fn with_water(mut self, current: f64, max: f64) -> Self {
        self.resources.water = Capacity::new(current, max);
        self
    }

    #[must_use]
    pub fn with_seeds(mut self, kind: &str, count: i64) -> Self {
        self.resources.seeds.insert(kind.to_string(), count);
        self
    }

    #[must_use]
    pub fn with_material(mut self, id: &str, count: i64) -> Self {
        self.resources.materials.insert(id.to_string(), count);
        self
    }

    /// Check every numeric invariant, returning a description of the first violation.
    #[must_use]
    pub fn invariant_violation(&self) -> Option<String> {
        let res = &self.resources;
        for (label, pool) in [("energy", res.energy), ("water", res.water)] {
            if pool.current < 0.0 || pool.current > pool.max || !pool.current.is_finite() {
                return Some(format!(
                    "{label} {:.3} outside [0, {:.3}]",
                    pool.current, pool.max
                ));
            }
        }
        if res.gold < 0 {
            return Some(format!("gold {} is negative", res.gold));
        }
        if let Some((kind, count)) = res.seeds.iter().find(|(_, count)| **count < 0) {
            return Some(format!("seed {kind} count {count} is negative"));
        }
        if let Some((id, count)) = res.materials.iter().find(|(_, count)| **count < 0) {
            return Some(format!("material {id} count {count} is negative"));
        }
        if has_duplicates(&self.progression.unlocked_upgrades) {
            return Some(String::from("unlocked upgrades contain duplicates"));
        }
        if has_duplicates(&self.progression.completed_adventures) {
            return Some(String::from("completed adventures contain duplicates"));
        }
        None
    }

    /// Stable digest of the full state, used to compare replays.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(FINGERPRINT_SEED);
        hasher.write(&bytes);
        hasher.finish()
    }
}

fn has_duplicates(items: &[String]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(idx, item)| items[..idx].contains(item))
}
