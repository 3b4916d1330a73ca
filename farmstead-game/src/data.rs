//! Read-only game content consulted by the process handlers.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::combat::{CombatEffects, CombatTables};

const BUNDLED_GAME_DATA: &str = include_str!("../assets/data/game_data.json");

/// Errors raised while loading or validating game content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataStoreError {
    #[error("game data parse error: {0}")]
    Parse(String),
    #[error("{kind} '{id}' is invalid: {reason}")]
    Invalid {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

/// Growth rules and harvest for one crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropDef {
    /// Seed kind consumed when planting.
    pub seed_kind: String,
    /// Seconds from planting to harvest.
    pub growth_time: f64,
    #[serde(default)]
    pub water_cost: f64,
    /// Materials granted on harvest.
    #[serde(default)]
    pub yields: BTreeMap<String, i64>,
    #[serde(default)]
    pub experience: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdventureDef {
    pub duration: f64,
    #[serde(default = "default_level")]
    pub min_level: u32,
    /// Energy paid up front when the adventure starts.
    #[serde(default)]
    pub energy_cost: f64,
    /// Energy drained per second while travelling.
    #[serde(default)]
    pub energy_per_second: f64,
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub loot: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boss: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDef {
    pub duration: f64,
    #[serde(default)]
    pub energy_cost: f64,
    #[serde(default)]
    pub gold_cost: i64,
    /// Materials consumed when crafting starts.
    #[serde(default)]
    pub materials: BTreeMap<String, i64>,
    #[serde(default)]
    pub outputs: BTreeMap<String, i64>,
    /// Upgrade unlocked when the craft completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocks: Option<String>,
    /// Upgrade that must already be unlocked to start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    #[serde(default)]
    pub experience: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineLevelDef {
    pub duration: f64,
    #[serde(default = "default_level")]
    pub min_level: u32,
    #[serde(default)]
    pub ores: BTreeMap<String, i64>,
}

/// Mine layout: energy drain grows linearly with depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MiningDef {
    #[serde(default)]
    pub base_drain: f64,
    #[serde(default)]
    pub drain_per_depth: f64,
    #[serde(default)]
    pub levels: BTreeMap<u32, MineLevelDef>,
}

impl MiningDef {
    /// Energy per second drained while working at `depth`.
    #[must_use]
    pub fn drain_rate(&self, depth: u32) -> f64 {
        (self.base_drain + f64::from(depth) * self.drain_per_depth).max(0.0)
    }

    #[must_use]
    pub fn level(&self, depth: u32) -> Option<&MineLevelDef> {
        self.levels.get(&depth)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedAreaDef {
    pub duration: f64,
    #[serde(default)]
    pub energy_cost: f64,
    /// Seeds caught per second at a neutral wind.
    pub catch_rate: f64,
    /// Seed kinds handed out round-robin.
    pub kinds: Vec<String>,
    /// Catch multiplier indexed by wind level.
    pub wind_multipliers: Vec<f64>,
    #[serde(default)]
    pub experience: i64,
}

impl SeedAreaDef {
    #[must_use]
    pub fn wind_multiplier(&self, wind_level: u8) -> Option<f64> {
        self.wind_multipliers.get(usize::from(wind_level)).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDef {
    pub duration: f64,
    #[serde(default)]
    pub gold_cost: i64,
    pub xp_per_second: f64,
    #[serde(default)]
    pub level_bonus: u32,
}

const fn default_level() -> u32 {
    1
}

/// Read-only content lookups used by handlers during `can_start`, `update`, and `complete`.
pub trait DataStore {
    fn crop(&self, id: &str) -> Option<&CropDef>;
    fn adventure(&self, id: &str) -> Option<&AdventureDef>;
    fn recipe(&self, id: &str) -> Option<&RecipeDef>;
    fn mining(&self) -> &MiningDef;
    fn seed_area(&self, id: &str) -> Option<&SeedAreaDef>;
    fn training(&self, id: &str) -> Option<&TrainingDef>;
    /// Hero level reached with `experience` total experience.
    fn hero_level_for(&self, experience: i64) -> u32;
    fn combat(&self) -> &dyn CombatEffects;
}

/// Serde-backed game content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameData {
    #[serde(default)]
    pub crops: BTreeMap<String, CropDef>,
    #[serde(default)]
    pub adventures: BTreeMap<String, AdventureDef>,
    #[serde(default)]
    pub recipes: BTreeMap<String, RecipeDef>,
    #[serde(default)]
    pub mining: MiningDef,
    #[serde(default)]
    pub seed_areas: BTreeMap<String, SeedAreaDef>,
    #[serde(default)]
    pub trainings: BTreeMap<String, TrainingDef>,
    /// Total experience required for each level above 1, ascending.
    #[serde(default)]
    pub level_thresholds: Vec<i64>,
    #[serde(default)]
    pub combat: CombatTables,
}

impl GameData {
    /// Load game data from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or any definition is invalid.
    pub fn from_json(json: &str) -> Result<Self, DataStoreError> {
        let data: Self =
            serde_json::from_str(json).map_err(|err| DataStoreError::Parse(err.to_string()))?;
        data.validate()?;
        Ok(data)
    }

    /// Content bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled asset fails to parse or validate.
    pub fn bundled() -> Result<Self, DataStoreError> {
        Self::from_json(BUNDLED_GAME_DATA)
    }

    /// Check every definition for usable durations, rates, and references.
    ///
    /// # Errors
    ///
    /// Returns the first invalid definition found.
    pub fn validate(&self) -> Result<(), DataStoreError> {
        for (id, crop) in &self.crops {
            positive("crop", id, "growth_time", crop.growth_time)?;
            non_negative("crop", id, "water_cost", crop.water_cost)?;
            if crop.seed_kind.trim().is_empty() {
                return Err(invalid("crop", id, "seed_kind is empty"));
            }
        }
        for (id, adventure) in &self.adventures {
            positive("adventure", id, "duration", adventure.duration)?;
            non_negative("adventure", id, "energy_cost", adventure.energy_cost)?;
            non_negative(
                "adventure",
                id,
                "energy_per_second",
                adventure.energy_per_second,
            )?;
        }
        for (id, recipe) in &self.recipes {
            positive("recipe", id, "duration", recipe.duration)?;
            non_negative("recipe", id, "energy_cost", recipe.energy_cost)?;
            if recipe.materials.values().any(|amount| *amount < 0) {
                return Err(invalid("recipe", id, "material cost is negative"));
            }
            if let Some(required) = &recipe.requires
                && recipe.unlocks.as_ref() == Some(required)
            {
                return Err(invalid("recipe", id, "requires its own unlock"));
            }
        }
        for (depth, level) in &self.mining.levels {
            positive("mine level", &depth.to_string(), "duration", level.duration)?;
        }
        for (id, area) in &self.seed_areas {
            positive("seed area", id, "duration", area.duration)?;
            non_negative("seed area", id, "catch_rate", area.catch_rate)?;
            if area.kinds.is_empty() {
                return Err(invalid("seed area", id, "no seed kinds"));
            }
            if area.wind_multipliers.is_empty() {
                return Err(invalid("seed area", id, "no wind levels"));
            }
        }
        for (id, training) in &self.trainings {
            positive("training", id, "duration", training.duration)?;
            non_negative("training", id, "xp_per_second", training.xp_per_second)?;
        }
        if self.level_thresholds.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("levels", "thresholds", "not ascending"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_crop(mut self, id: &str, crop: CropDef) -> Self {
        self.crops.insert(id.to_string(), crop);
        self
    }

    #[must_use]
    pub fn with_adventure(mut self, id: &str, adventure: AdventureDef) -> Self {
        self.adventures.insert(id.to_string(), adventure);
        self
    }

    #[must_use]
    pub fn with_recipe(mut self, id: &str, recipe: RecipeDef) -> Self {
        self.recipes.insert(id.to_string(), recipe);
        self
    }

    #[must_use]
    pub fn with_mine_level(mut self, depth: u32, level: MineLevelDef) -> Self {
        self.mining.levels.insert(depth, level);
        self
    }

    #[must_use]
    pub fn with_seed_area(mut self, id: &str, area: SeedAreaDef) -> Self {
        self.seed_areas.insert(id.to_string(), area);
        self
    }

    #[must_use]
    pub fn with_training(mut self, id: &str, training: TrainingDef) -> Self {
        self.trainings.insert(id.to_string(), training);
        self
    }
}

fn invalid(kind: &'static str, id: &str, reason: impl Into<String>) -> DataStoreError {
    DataStoreError::Invalid {
        kind,
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn positive(kind: &'static str, id: &str, field: &str, value: f64) -> Result<(), DataStoreError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(kind, id, format!("{field} must be positive")))
    }
}

fn non_negative(
    kind: &'static str,
    id: &str,
    field: &str,
    value: f64,
) -> Result<(), DataStoreError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(kind, id, format!("{field} must not be negative")))
    }
}

impl DataStore for GameData {
    fn crop(&self, id: &str) -> Option<&CropDef> {
        self.crops.get(id)
    }

    fn adventure(&self, id: &str) -> Option<&AdventureDef> {
        self.adventures.get(id)
    }

    fn recipe(&self, id: &str) -> Option<&RecipeDef> {
        self.recipes.get(id)
    }

    fn mining(&self) -> &MiningDef {
        &self.mining
    }

    fn seed_area(&self, id: &str) -> Option<&SeedAreaDef> {
        self.seed_areas.get(id)
    }

    fn training(&self, id: &str) -> Option<&TrainingDef> {
        self.trainings.get(id)
    }

    fn hero_level_for(&self, experience: i64) -> u32 {
        let reached = self
            .level_thresholds
            .iter()
            .take_while(|threshold| experience >= **threshold)
            .count();
        u32::try_from(reached).unwrap_or(u32::MAX - 1) + 1
    }

    fn combat(&self) -> &dyn CombatEffects {
        &self.combat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_data_parses_and_validates() {
        let data = GameData::bundled().expect("bundled data is valid");
        assert!(!data.crops.is_empty());
        assert!(!data.adventures.is_empty());
        assert!(!data.recipes.is_empty());
        assert!(!data.mining.levels.is_empty());
        assert!(!data.seed_areas.is_empty());
        assert!(!data.trainings.is_empty());
    }

    #[test]
    fn from_json_reads_partial_documents() {
        let json = r#"{
            "crops": {
                "carrot": {
                    "seed_kind": "carrot",
                    "growth_time": 60,
                    "water_cost": 1,
                    "yields": { "carrot": 3 }
                }
            },
            "level_thresholds": [100, 250]
        }"#;
        let data = GameData::from_json(json).unwrap();
        let carrot = data.crop("carrot").unwrap();
        assert!((carrot.growth_time - 60.0).abs() < f64::EPSILON);
        assert_eq!(carrot.yields.get("carrot"), Some(&3));
        assert!(data.adventure("cave").is_none());
        assert_eq!(data.hero_level_for(0), 1);
        assert_eq!(data.hero_level_for(100), 2);
        assert_eq!(data.hero_level_for(9_999), 3);
    }

    #[test]
    fn validate_rejects_bad_definitions() {
        let data = GameData::default().with_crop(
            "ghost",
            CropDef {
                seed_kind: String::from("ghost"),
                growth_time: 0.0,
                water_cost: 0.0,
                yields: BTreeMap::new(),
                experience: 0,
            },
        );
        assert!(matches!(
            data.validate(),
            Err(DataStoreError::Invalid { kind: "crop", .. })
        ));

        let data = GameData {
            level_thresholds: vec![50, 10],
            ..GameData::default()
        };
        assert!(data.validate().is_err());

        assert!(matches!(
            GameData::from_json("{\"crops\": 7}"),
            Err(DataStoreError::Parse(_))
        ));
    }

    #[test]
    fn mining_drain_scales_with_depth() {
        let mining = MiningDef {
            base_drain: 0.5,
            drain_per_depth: 0.25,
            levels: BTreeMap::new(),
        };
        assert!((mining.drain_rate(0) - 0.5).abs() < f64::EPSILON);
        assert!((mining.drain_rate(4) - 1.5).abs() < f64::EPSILON);
    }
}
