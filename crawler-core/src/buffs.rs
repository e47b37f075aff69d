//! Buff and debuff ledger.
//!
//! Current stats are never edited in place. Every change to the ledger is
//! followed by [`recompute_stats`], which rebuilds [`CombatStats`] from the
//! base snapshot so an expiring buff can never leave drift behind.

use crate::combatant::{Ability, Combatant, CombatantId, CombatStats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a buff modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    Attack,
    MagicAttack,
    Defense,
    MagicDefense,
    Speed,
    /// Heals `magnitude` at the start of the owner's turn.
    Regen,
    /// Deals `magnitude` direct damage at the start of the owner's turn.
    Poison,
    /// Reflects `magnitude` percent of weapon damage taken.
    DamageReflect,
    #[serde(rename = "ac")]
    ArmorClass,
}

impl BuffKind {
    pub fn name(&self) -> &'static str {
        match self {
            BuffKind::Attack => "attack",
            BuffKind::MagicAttack => "magic attack",
            BuffKind::Defense => "defense",
            BuffKind::MagicDefense => "magic defense",
            BuffKind::Speed => "speed",
            BuffKind::Regen => "regeneration",
            BuffKind::Poison => "poison",
            BuffKind::DamageReflect => "damage reflect",
            BuffKind::ArmorClass => "armor class",
        }
    }
}

impl fmt::Display for BuffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A timed modifier sitting on a combatant.
///
/// `owner` is the combatant whose turn start ticks this buff. For
/// self-buffs and debuffs it is the holder; for party-wide buffs it is the
/// caster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBuff {
    pub kind: BuffKind,
    pub magnitude: i32,
    pub owner: CombatantId,
    pub turns_remaining: u32,
    pub origin: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub taunt: bool,
}

impl ActiveBuff {
    pub fn new(
        kind: BuffKind,
        magnitude: i32,
        owner: CombatantId,
        turns: u32,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            magnitude,
            owner,
            turns_remaining: turns,
            origin: origin.into(),
            icon: String::new(),
            taunt: false,
        }
    }

    pub fn taunting(mut self) -> Self {
        self.taunt = true;
        self
    }

    pub fn is_taunt(&self) -> bool {
        self.taunt && self.kind == BuffKind::DamageReflect
    }
}

/// Append a buff and re-derive stats.
pub fn apply_buff(combatant: &mut Combatant, buff: ActiveBuff) {
    if buff.turns_remaining == 0 {
        return;
    }
    tracing::debug!(
        target_name = %combatant.name,
        kind = %buff.kind,
        magnitude = buff.magnitude,
        turns = buff.turns_remaining,
        "buff applied"
    );
    combatant.buffs.push(buff);
    recompute_stats(combatant);
}

/// Remove every buff and return to base stats.
pub fn clear_buffs(combatant: &mut Combatant) {
    combatant.buffs.clear();
    recompute_stats(combatant);
}

fn sum_of(combatant: &Combatant, kind: BuffKind) -> i32 {
    combatant
        .buffs
        .iter()
        .filter(|b| b.kind == kind)
        .map(|b| b.magnitude)
        .sum()
}

/// Rebuild current stats from base stats and the ledger. Idempotent.
pub fn recompute_stats(combatant: &mut Combatant) {
    let base = combatant.base_stats;
    let dex = combatant.ability_scores.modifier(Ability::Dexterity);

    combatant.stats = CombatStats {
        attack: (base.attack + sum_of(combatant, BuffKind::Attack)).max(1),
        magic_attack: (base.magic_attack + sum_of(combatant, BuffKind::MagicAttack)).max(1),
        defense: (base.defense + sum_of(combatant, BuffKind::Defense)).max(0),
        magic_defense: (base.magic_defense + sum_of(combatant, BuffKind::MagicDefense)).max(0),
        speed: (base.speed + sum_of(combatant, BuffKind::Speed)).max(1),
        armor_class: 10 + dex + base.armor_bonus + sum_of(combatant, BuffKind::ArmorClass),
    };
}

/// A buff that ran out during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredBuff {
    pub kind: BuffKind,
    pub origin: String,
}

/// What one start-of-turn tick did to a combatant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub healed: i32,
    pub poisoned: i32,
    pub expired: Vec<ExpiredBuff>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.healed == 0 && self.poisoned == 0 && self.expired.is_empty()
    }

    pub fn merge(&mut self, other: TickReport) {
        self.healed += other.healed;
        self.poisoned += other.poisoned;
        self.expired.extend(other.expired);
    }
}

/// Tick the buffs on `holder` that belong to `owner`.
///
/// Regen heals up to the missing HP, poison removes HP directly (no
/// defense, resistance or temp HP). Regen does nothing once the holder is
/// down, even if the poison that downed it ticked first. Each ticked buff loses one turn and is
/// dropped at zero. Buffs of other owners are left alone. Stats are
/// recomputed once at the end.
pub fn tick_owned(holder: &mut Combatant, owner: CombatantId) -> TickReport {
    let mut report = TickReport::default();
    let mut buffs = std::mem::take(&mut holder.buffs);

    buffs.retain_mut(|buff| {
        if buff.owner != owner {
            return true;
        }
        match buff.kind {
            BuffKind::Regen if !holder.hit_points.is_down() => {
                report.healed += holder.hit_points.heal(buff.magnitude)
            }
            BuffKind::Poison => report.poisoned += holder.hit_points.lose(buff.magnitude),
            _ => {}
        }
        buff.turns_remaining = buff.turns_remaining.saturating_sub(1);
        if buff.turns_remaining == 0 {
            report.expired.push(ExpiredBuff {
                kind: buff.kind,
                origin: buff.origin.clone(),
            });
            false
        } else {
            true
        }
    });

    holder.buffs = buffs;
    recompute_stats(holder);
    report
}

/// Start-of-turn tick for a combatant's own buffs.
pub fn tick_start_of_turn(combatant: &mut Combatant) -> TickReport {
    let id = combatant.id;
    tick_owned(combatant, id)
}
