//! Victory and defeat detection, loot, and rewards.

use crate::combatant::{Combatant, CombatantId, Item, Side};
use crate::dice::DiceSource;
use crate::events::CombatEvent;
use crate::progression::{self, LevelUp};
use serde::{Deserialize, Serialize};

/// Which side, if any, has been wiped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Ongoing,
    Victory,
    Defeat,
}

/// A fight is over when every member of one side is down. An empty side
/// counts as wiped out.
pub fn verdict(roster: &[Combatant]) -> Verdict {
    let standing = |side: Side| roster.iter().any(|c| c.side() == side && c.is_alive());
    if !standing(Side::Party) {
        Verdict::Defeat
    } else if !standing(Side::Enemies) {
        Verdict::Victory
    } else {
        Verdict::Ongoing
    }
}

/// An item dropped during the fight, waiting for (or holding) an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootItem {
    pub item: Item,
    /// Name of the monster that dropped it.
    pub source: String,
    pub assigned_to: Option<CombatantId>,
}

/// Roll a monster's loot table. Each entry is an independent chance.
pub fn roll_loot(dice: &mut dyn DiceSource, monster: &Combatant) -> Vec<LootItem> {
    let Some(profile) = monster.monster_profile() else {
        return Vec::new();
    };
    profile
        .loot
        .iter()
        .filter(|drop| drop.chance >= 1.0 || dice.chance(drop.chance))
        .map(|drop| {
            let mut item = Item::new(drop.name.clone());
            item.description = drop.description.clone();
            tracing::debug!(monster = %monster.name, item = %item.name, "loot dropped");
            LootItem {
                item,
                source: monster.name.clone(),
                assigned_to: None,
            }
        })
        .collect()
}

/// Experience each living player receives: `floor(total / party_size)`.
pub fn experience_share(total: u32, party_size: usize) -> u32 {
    if party_size == 0 {
        return 0;
    }
    total / party_size as u32
}

/// Award a share of the pool to every living player.
pub fn distribute_experience(party: &mut [Combatant], total: u32) -> Vec<LevelUp> {
    let share = experience_share(total, party.len());
    party
        .iter_mut()
        .filter(|c| c.is_alive())
        .filter_map(|c| progression::award_experience(c, share))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatResult {
    Victory { loot: Vec<LootItem>, experience: u32 },
    Defeat,
}

impl CombatResult {
    pub fn is_victory(&self) -> bool {
        matches!(self, CombatResult::Victory { .. })
    }
}

/// Where the game goes after the fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostCombatPhase {
    /// A player leveled into a talent pick; this comes before exploring.
    TalentChoice,
    Explore,
    GameOver,
}

impl PostCombatPhase {
    pub fn after(result: &CombatResult, party: &[Combatant]) -> Self {
        match result {
            CombatResult::Defeat => PostCombatPhase::GameOver,
            CombatResult::Victory { .. } => {
                let talent_pending = party
                    .iter()
                    .filter_map(|c| c.player_profile())
                    .any(|p| p.pending_talent_choice);
                if talent_pending {
                    PostCombatPhase::TalentChoice
                } else {
                    PostCombatPhase::Explore
                }
            }
        }
    }
}

/// Everything the caller gets back when a combat is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatClosure {
    pub result: CombatResult,
    /// Updated player snapshots, in party order.
    pub party: Vec<Combatant>,
    pub level_ups: Vec<LevelUp>,
    pub next_phase: PostCombatPhase,
    pub log: Vec<CombatEvent>,
}
