//! Combat snapshots for save/load.
//!
//! A snapshot holds everything needed to resume a fight at the start of
//! the current actor's turn: the roster, the initiative order and cursor,
//! the round counters, loot, the experience pool and the log. A selected
//! but unconfirmed action is not saved.

use crate::combatant::{Combatant, CombatantId};
use crate::config::ConfigError;
use crate::events::CombatEvent;
use crate::outcome::LootItem;
use crate::session::CombatPhase;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Summary readable without restoring the fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub round: u32,
    pub party: Vec<String>,
    pub enemies_remaining: usize,
    #[serde(default)]
    pub saved_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    pub version: u32,
    pub metadata: SnapshotMetadata,
    pub roster: Vec<Combatant>,
    pub turn_order: Vec<CombatantId>,
    pub turn_index: usize,
    pub full_rounds_elapsed: u32,
    pub turn_number: u32,
    pub phase: CombatPhase,
    #[serde(default)]
    pub loot: Vec<LootItem>,
    #[serde(default)]
    pub experience_pool: u32,
    #[serde(default)]
    pub log: Vec<CombatEvent>,
}

impl CombatSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        roster: Vec<Combatant>,
        turn_order: Vec<CombatantId>,
        turn_index: usize,
        full_rounds_elapsed: u32,
        turn_number: u32,
        phase: CombatPhase,
        loot: Vec<LootItem>,
        experience_pool: u32,
        log: Vec<CombatEvent>,
    ) -> Self {
        let metadata = SnapshotMetadata {
            round: full_rounds_elapsed + 1,
            party: roster
                .iter()
                .filter(|c| c.is_player())
                .map(|c| c.name.clone())
                .collect(),
            enemies_remaining: roster.iter().filter(|c| !c.is_player() && c.is_alive()).count(),
            saved_at: timestamp(),
        };

        Self {
            version: SNAPSHOT_VERSION,
            metadata,
            roster,
            turn_order,
            turn_index,
            full_rounds_elapsed,
            turn_number,
            phase,
            loot,
            experience_pool,
            log,
        }
    }

    /// Check that the order and cursor point into the roster, every HP
    /// value is in range and an unfinished fight is resumable.
    pub fn validate(&self) -> Result<(), PersistError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            });
        }
        if self.turn_order.is_empty() {
            return Err(PersistError::Inconsistent("empty turn order".into()));
        }
        if self.turn_index >= self.turn_order.len() {
            return Err(PersistError::Inconsistent(format!(
                "turn index {} out of {} entries",
                self.turn_index,
                self.turn_order.len()
            )));
        }
        if let Some(missing) = self
            .turn_order
            .iter()
            .find(|id| !self.roster.iter().any(|c| c.id == **id))
        {
            return Err(PersistError::Inconsistent(format!(
                "{missing} is in the turn order but not the roster"
            )));
        }
        for combatant in &self.roster {
            let hp = combatant.hit_points;
            if hp.maximum < 1 || hp.current < 0 || hp.current > hp.maximum || hp.temporary < 0 {
                return Err(PersistError::Inconsistent(format!(
                    "{} has {}/{} HP ({} temporary)",
                    combatant.name, hp.current, hp.maximum, hp.temporary
                )));
            }
        }
        if self.phase == CombatPhase::InProgress {
            let current = self.turn_order[self.turn_index];
            if self.roster.iter().any(|c| c.id == current && c.is_down()) {
                return Err(PersistError::Inconsistent(
                    "the current actor is down in a fight still in progress".into(),
                ));
            }
            let party_up = self.roster.iter().any(|c| c.is_player() && c.is_alive());
            let monsters_up = self.roster.iter().any(|c| !c.is_player() && c.is_alive());
            if !party_up || !monsters_up {
                return Err(PersistError::Inconsistent(
                    "a fight in progress needs a living combatant on each side".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = self.to_json()?;
        fs::write(path.as_ref(), content).await?;
        tracing::info!(path = %path.as_ref().display(), "combat snapshot saved");
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Read only the metadata of a saved snapshot.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SnapshotMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SnapshotMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        if partial.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: partial.version,
            });
        }
        Ok(partial.metadata)
    }
}

/// Seconds since the epoch, as a string.
fn timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}
