//! Engine configuration.

use crate::dice::{DiceSource, RngDice};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be within [0, 1], got {value}")]
    InvalidProbability { field: &'static str, value: f64 },

    #[error("stat bonus percent must not be negative, got {0}")]
    InvalidStatBonus(i32),
}

/// How suspension points are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AckMode {
    #[default]
    Immediate,
    Auto {
        delay_ms: u64,
    },
    Manual,
}

/// Tunables for a combat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed seed for reproducible fights. `None` seeds from entropy.
    pub seed: Option<u64>,

    pub acknowledgement: AckMode,

    /// Probability a monster with a ready skill uses one.
    pub monster_skill_chance: f64,

    /// Probability a boss spends a legendary action after a player turn.
    pub legendary_action_chance: f64,

    /// Share of attack (or magic attack) added to damage, in percent.
    pub stat_bonus_percent: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            acknowledgement: AckMode::Immediate,
            monster_skill_chance: 0.4,
            legendary_action_chance: 0.5,
            stat_bonus_percent: 30,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_acknowledgement(mut self, mode: AckMode) -> Self {
        self.acknowledgement = mode;
        self
    }

    pub fn with_monster_skill_chance(mut self, chance: f64) -> Self {
        self.monster_skill_chance = chance;
        self
    }

    pub fn with_legendary_action_chance(mut self, chance: f64) -> Self {
        self.legendary_action_chance = chance;
        self
    }

    pub fn with_stat_bonus_percent(mut self, percent: i32) -> Self {
        self.stat_bonus_percent = percent;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("monster_skill_chance", self.monster_skill_chance),
            ("legendary_action_chance", self.legendary_action_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { field, value });
            }
        }
        if self.stat_bonus_percent < 0 {
            return Err(ConfigError::InvalidStatBonus(self.stat_bonus_percent));
        }
        Ok(())
    }

    /// Parse and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Dice for a new session.
    pub fn dice(&self) -> Box<dyn DiceSource + Send> {
        match self.seed {
            Some(seed) => {
                tracing::info!(seed, "seeded dice");
                Box::new(RngDice::seeded(seed))
            }
            None => Box::new(RngDice::from_entropy()),
        }
    }
}
