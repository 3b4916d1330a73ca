//! Combat-effect lookups consumed by the adventure handler.
//!
//! The tables themselves are game content; the orchestrator only reads the
//! resulting multipliers.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIN_MULTIPLIER: f64 = 0.1;
const MAX_MULTIPLIER: f64 = 10.0;

/// Gear the hero brings on an adventure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Equipment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub armor: Option<String>,
}

impl Equipment {
    #[must_use]
    pub fn new(weapon: Option<&str>, armor: Option<&str>) -> Self {
        Self {
            weapon: weapon.map(str::to_string),
            armor: armor.map(str::to_string),
        }
    }
}

/// Multiplicative penalties/bonuses applied to an adventure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatModifiers {
    #[serde(default = "CombatModifiers::one")]
    pub duration_multiplier: f64,
    #[serde(default = "CombatModifiers::one")]
    pub energy_drain_multiplier: f64,
    #[serde(default = "CombatModifiers::one")]
    pub loot_multiplier: f64,
}

impl CombatModifiers {
    pub const NEUTRAL: Self = Self {
        duration_multiplier: 1.0,
        energy_drain_multiplier: 1.0,
        loot_multiplier: 1.0,
    };

    const fn one() -> f64 {
        1.0
    }

    /// Stack two modifier sets multiplicatively.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        Self {
            duration_multiplier: self.duration_multiplier * other.duration_multiplier,
            energy_drain_multiplier: self.energy_drain_multiplier * other.energy_drain_multiplier,
            loot_multiplier: self.loot_multiplier * other.loot_multiplier,
        }
    }

    /// Bound every multiplier to a sane range, mapping non-finite values to neutral.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            duration_multiplier: bound(self.duration_multiplier),
            energy_drain_multiplier: bound(self.energy_drain_multiplier),
            loot_multiplier: bound(self.loot_multiplier),
        }
    }
}

impl Default for CombatModifiers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

fn bound(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
    } else {
        1.0
    }
}

/// Pure lookup of combat effects for a boss and loadout.
pub trait CombatEffects {
    fn modifiers(&self, boss: Option<&str>, equipment: &Equipment) -> CombatModifiers;
}

/// Table-driven combat effects: boss penalties stacked with armor and weapon effects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CombatTables {
    #[serde(default)]
    pub boss_penalties: BTreeMap<String, CombatModifiers>,
    #[serde(default)]
    pub armor_effects: BTreeMap<String, CombatModifiers>,
    #[serde(default)]
    pub weapon_effects: BTreeMap<String, CombatModifiers>,
}

impl CombatEffects for CombatTables {
    fn modifiers(&self, boss: Option<&str>, equipment: &Equipment) -> CombatModifiers {
        let lookup = |table: &BTreeMap<String, CombatModifiers>, key: Option<&str>| {
            key.and_then(|k| table.get(k))
                .copied()
                .unwrap_or(CombatModifiers::NEUTRAL)
        };
        lookup(&self.boss_penalties, boss)
            .combine(lookup(&self.armor_effects, equipment.armor.as_deref()))
            .combine(lookup(&self.weapon_effects, equipment.weapon.as_deref()))
            .sanitized()
    }
}
