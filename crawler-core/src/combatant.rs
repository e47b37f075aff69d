//! Combatant types.
//!
//! A combatant is either a player character or a monster. Shared vitals,
//! stats, buffs, conditions and skills live on [`Combatant`]; everything
//! that only one side has lives in the [`CombatantKind`] variant.

use crate::buffs::ActiveBuff;
use crate::damage::DamageType;
use crate::dice::{DamageDice, DieType};
use crate::progression;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for combatants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for dropped items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// `floor((score - 10) / 2)`; score 9 is -1, not 0.
    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Hit Points
// ============================================================================

/// Hit point tracking. `current` stays within `[0, maximum]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        let maximum = maximum.max(1);
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    /// Remove HP directly (temp HP already handled). Returns HP actually lost.
    pub fn lose(&mut self, amount: i32) -> i32 {
        let before = self.current;
        self.current = (self.current - amount.max(0)).max(0);
        before - self.current
    }

    /// Restore HP up to the maximum. Returns HP actually gained.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.current;
        self.current = (self.current + amount.max(0)).min(self.maximum);
        self.current - before
    }

    /// Temporary HP never stack; a larger grant replaces a smaller one.
    pub fn grant_temporary(&mut self, amount: i32) {
        self.temporary = self.temporary.max(amount);
    }

    /// Drain temporary HP first. Returns how much was absorbed.
    pub fn absorb(&mut self, amount: i32) -> i32 {
        let absorbed = self.temporary.min(amount.max(0));
        self.temporary -= absorbed;
        absorbed
    }

    pub fn is_down(&self) -> bool {
        self.current <= 0
    }

    pub fn missing(&self) -> i32 {
        self.maximum - self.current
    }

    pub fn ratio(&self) -> f32 {
        (self.current as f32 / self.maximum as f32).max(0.0)
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Stats before any buff is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub attack: i32,
    pub magic_attack: i32,
    pub defense: i32,
    pub magic_defense: i32,
    pub speed: i32,
    /// Armor or natural armor on top of `10 + DEX`.
    #[serde(default)]
    pub armor_bonus: i32,
}

impl Default for BaseStats {
    fn default() -> Self {
        Self {
            attack: 10,
            magic_attack: 10,
            defense: 0,
            magic_defense: 0,
            speed: 30,
            armor_bonus: 0,
        }
    }
}

/// Stats in effect right now. Always derived from [`BaseStats`] plus the
/// buff ledger, see [`crate::buffs::recompute_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombatStats {
    pub attack: i32,
    pub magic_attack: i32,
    pub defense: i32,
    pub magic_defense: i32,
    pub speed: i32,
    pub armor_class: i32,
}

// ============================================================================
// Conditions
// ============================================================================

/// Timed conditions that change how attacks are rolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Attacks with advantage; attacks against it also have advantage.
    Reckless,
    Blinded,
    Prone,
    /// Skips turns; attacks against it have advantage.
    Frozen,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Reckless => "Reckless",
            Condition::Blinded => "Blinded",
            Condition::Prone => "Prone",
            Condition::Frozen => "Frozen",
        }
    }

    pub fn is_incapacitating(&self) -> bool {
        matches!(self, Condition::Frozen)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A condition with its remaining duration in rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub condition: Condition,
    pub source: String,
    pub rounds_remaining: u32,
}

/// Creature kinds that skills can be especially effective against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreatureTag {
    Undead,
    Fiend,
    Beast,
    Dragon,
    Humanoid,
    Construct,
    Elemental,
}

// ============================================================================
// Weapons and Skills
// ============================================================================

/// Whether an attack is rolled with weapon or spell ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackKind {
    #[default]
    Weapon,
    Spell,
}

/// What a plain attack uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: DamageDice,
    pub damage_type: DamageType,
    #[serde(default)]
    pub kind: AttackKind,
    /// Use the higher of STR and DEX.
    #[serde(default)]
    pub finesse: bool,
}

impl Weapon {
    pub fn new(name: impl Into<String>, damage: DamageDice, damage_type: DamageType) -> Self {
        Self {
            name: name.into(),
            damage,
            damage_type,
            kind: AttackKind::Weapon,
            finesse: false,
        }
    }

    pub fn finesse(mut self) -> Self {
        self.finesse = true;
        self
    }

    pub fn unarmed() -> Self {
        Self::new("Unarmed Strike", DamageDice::new(1, DieType::D4, 0), DamageType::Bludgeoning)
    }
}

/// Who a skill affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkillTarget {
    #[default]
    SingleEnemy,
    AllEnemies,
    SingleAlly,
    AllAllies,
    Myself,
}

impl SkillTarget {
    pub fn is_hostile(&self) -> bool {
        matches!(self, SkillTarget::SingleEnemy | SkillTarget::AllEnemies)
    }

    pub fn needs_target(&self) -> bool {
        matches!(self, SkillTarget::SingleEnemy | SkillTarget::SingleAlly)
    }
}

/// A saving throw a skill forces instead of an attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequirement {
    pub ability: Ability,
    pub dc: i32,
}

/// Buff or debuff a skill attaches to each of its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffTemplate {
    pub kind: crate::buffs::BuffKind,
    pub magnitude: i32,
    pub turns: u32,
    #[serde(default)]
    pub taunt: bool,
}

/// Bonus damage against one creature tag (e.g. smiting undead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagBonus {
    pub tag: CreatureTag,
    pub bonus: i32,
}

/// An active ability with a cooldown. Players and monsters share this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub target: SkillTarget,
    #[serde(default)]
    pub kind: AttackKind,
    pub damage: Option<DamageDice>,
    #[serde(default = "default_skill_damage_type")]
    pub damage_type: DamageType,
    /// Independent attack rolls per target ("multiattack").
    #[serde(default = "default_hits")]
    pub hits: u8,
    #[serde(default)]
    pub accuracy_bonus: i32,
    pub save: Option<SaveRequirement>,
    pub heal: Option<DamageDice>,
    pub temporary_hp: Option<i32>,
    pub buff: Option<BuffTemplate>,
    pub condition: Option<(Condition, u32)>,
    pub bonus_vs: Option<TagBonus>,
    /// Using this skill makes the user reckless for the round.
    #[serde(default)]
    pub reckless: bool,
    pub cooldown: u32,
    #[serde(default)]
    pub cooldown_remaining: u32,
}

fn default_skill_damage_type() -> DamageType {
    DamageType::Force
}

fn default_hits() -> u8 {
    1
}

impl Skill {
    pub fn new(name: impl Into<String>, target: SkillTarget, cooldown: u32) -> Self {
        Self {
            name: name.into(),
            icon: String::new(),
            target,
            kind: AttackKind::Weapon,
            damage: None,
            damage_type: default_skill_damage_type(),
            hits: 1,
            accuracy_bonus: 0,
            save: None,
            heal: None,
            temporary_hp: None,
            buff: None,
            condition: None,
            bonus_vs: None,
            reckless: false,
            cooldown,
            cooldown_remaining: 0,
        }
    }

    pub fn with_damage(mut self, damage: DamageDice, damage_type: DamageType) -> Self {
        self.damage = Some(damage);
        self.damage_type = damage_type;
        self
    }

    pub fn spell(mut self) -> Self {
        self.kind = AttackKind::Spell;
        self
    }

    pub fn with_hits(mut self, hits: u8) -> Self {
        self.hits = hits.max(1);
        self
    }

    pub fn with_save(mut self, ability: Ability, dc: i32) -> Self {
        self.save = Some(SaveRequirement { ability, dc });
        self
    }

    pub fn with_heal(mut self, heal: DamageDice) -> Self {
        self.heal = Some(heal);
        self
    }

    pub fn with_temporary_hp(mut self, amount: i32) -> Self {
        self.temporary_hp = Some(amount);
        self
    }

    pub fn with_buff(mut self, buff: BuffTemplate) -> Self {
        self.buff = Some(buff);
        self
    }

    pub fn with_condition(mut self, condition: Condition, rounds: u32) -> Self {
        self.condition = Some((condition, rounds));
        self
    }

    pub fn with_bonus_vs(mut self, tag: CreatureTag, bonus: i32) -> Self {
        self.bonus_vs = Some(TagBonus { tag, bonus });
        self
    }

    pub fn reckless(mut self) -> Self {
        self.reckless = true;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.cooldown_remaining == 0
    }

    pub fn deals_damage(&self) -> bool {
        self.damage.is_some()
    }
}

// ============================================================================
// Player data
// ============================================================================

/// Character classes. Only hit dice and casting ability matter in combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn hit_die(&self) -> DieType {
        match self {
            CharacterClass::Barbarian => DieType::D12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => {
                DieType::D10
            }
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock => DieType::D8,
            CharacterClass::Sorcerer | CharacterClass::Wizard => DieType::D6,
        }
    }

    /// Ability used for spell attacks. Martial classes fall back to WIS.
    pub fn spellcasting_ability(&self) -> Ability {
        match self {
            CharacterClass::Bard
            | CharacterClass::Sorcerer
            | CharacterClass::Warlock
            | CharacterClass::Paladin => Ability::Charisma,
            CharacterClass::Wizard => Ability::Intelligence,
            _ => Ability::Wisdom,
        }
    }
}

/// An item as far as combat cares: something that can be looted or held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            description: String::new(),
        }
    }
}

/// Passive effects derived from equipment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveEffects {
    pub lifesteal_percent: u8,
    pub critical_percent: u8,
    pub evasion_percent: u8,
    pub thorns_percent: u8,
    pub regeneration: i32,
    /// Per damage type reduction; replaces resistance for that type.
    pub damage_reduction: HashMap<DamageType, u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub class: CharacterClass,
    pub level: u8,
    pub experience: u32,
    #[serde(default)]
    pub inventory: Vec<Item>,
    #[serde(default)]
    pub equipped: Vec<Item>,
    #[serde(default)]
    pub passives: PassiveEffects,
    #[serde(default)]
    pub pending_talent_choice: bool,
}

impl PlayerProfile {
    pub fn new(class: CharacterClass, level: u8) -> Self {
        Self {
            class,
            level: level.max(1),
            experience: progression::experience_for_level(level.max(1)),
            inventory: Vec::new(),
            equipped: Vec::new(),
            passives: PassiveEffects::default(),
            pending_talent_choice: false,
        }
    }

    pub fn proficiency_bonus(&self) -> i32 {
        progression::proficiency_for_level(self.level)
    }
}

// ============================================================================
// Monster data
// ============================================================================

/// Extra action a boss can spend after a player's turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendaryAction {
    pub name: String,
    #[serde(default = "default_cost")]
    pub cost: u8,
    pub effect: LegendaryEffect,
}

fn default_cost() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegendaryEffect {
    /// An attack roll against one target.
    Strike {
        damage: DamageDice,
        damage_type: DamageType,
    },
    /// Heal the boss.
    Regenerate { amount: i32 },
    /// Buff the boss.
    Empower {
        kind: crate::buffs::BuffKind,
        magnitude: i32,
        turns: u32,
    },
}

/// Per-round legendary budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendaryPool {
    pub actions: Vec<LegendaryAction>,
    pub per_round: u8,
    #[serde(default)]
    pub remaining: u8,
}

impl LegendaryPool {
    pub fn new(actions: Vec<LegendaryAction>, per_round: u8) -> Self {
        Self {
            actions,
            per_round,
            remaining: per_round,
        }
    }

    pub fn refresh(&mut self) {
        self.remaining = self.per_round;
    }

    /// Indices of actions the remaining budget can pay for.
    pub fn affordable(&self) -> Vec<usize> {
        self.actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.cost <= self.remaining)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Status effect an ultimate spreads over the whole party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEffect {
    DebuffAll {
        kind: crate::buffs::BuffKind,
        magnitude: i32,
        turns: u32,
    },
    PoisonAll { damage: i32, turns: u32 },
    FreezeAll { rounds: u32 },
}

/// Once-per-fight boss ability, unlocked after a number of full rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ultimate {
    pub name: String,
    pub damage: DamageDice,
    pub damage_type: DamageType,
    pub effect: Option<GroupEffect>,
    #[serde(default)]
    pub lifesteal_percent: u8,
    pub round_trigger: u32,
    #[serde(default)]
    pub used: bool,
}

/// One entry of a monster's loot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootDrop {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Probability in `[0, 1]`.
    pub chance: f64,
}

impl LootDrop {
    pub fn guaranteed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            chance: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterProfile {
    pub challenge_rating: f32,
    #[serde(default)]
    pub boss: bool,
    pub legendary: Option<LegendaryPool>,
    pub ultimate: Option<Ultimate>,
    #[serde(default)]
    pub minion_templates: Vec<String>,
    pub experience_reward: u32,
    #[serde(default)]
    pub loot: Vec<LootDrop>,
}

impl MonsterProfile {
    pub fn new(challenge_rating: f32, experience_reward: u32) -> Self {
        Self {
            challenge_rating,
            boss: false,
            legendary: None,
            ultimate: None,
            minion_templates: Vec::new(),
            experience_reward,
            loot: Vec::new(),
        }
    }

    /// 5e proficiency by challenge rating.
    pub fn proficiency_bonus(&self) -> i32 {
        match self.challenge_rating {
            cr if cr < 5.0 => 2,
            cr if cr < 9.0 => 3,
            cr if cr < 13.0 => 4,
            cr if cr < 17.0 => 5,
            cr if cr < 21.0 => 6,
            cr if cr < 25.0 => 7,
            cr if cr < 29.0 => 8,
            _ => 9,
        }
    }
}

// ============================================================================
// Combatant
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatantKind {
    Player(PlayerProfile),
    Monster(MonsterProfile),
}

/// Which side of the fight a combatant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Party,
    Enemies,
}

impl Side {
    pub fn opposing(&self) -> Side {
        match self {
            Side::Party => Side::Enemies,
            Side::Enemies => Side::Party,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    #[serde(default)]
    pub portrait: String,
    pub hit_points: HitPoints,
    pub ability_scores: AbilityScores,
    pub base_stats: BaseStats,
    #[serde(default)]
    pub stats: CombatStats,
    #[serde(default)]
    pub resistances: HashSet<DamageType>,
    #[serde(default)]
    pub immunities: HashSet<DamageType>,
    #[serde(default)]
    pub vulnerabilities: HashSet<DamageType>,
    #[serde(default)]
    pub tags: HashSet<CreatureTag>,
    #[serde(default)]
    pub buffs: Vec<ActiveBuff>,
    #[serde(default)]
    pub conditions: Vec<ActiveCondition>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    pub weapon: Weapon,
    pub kind: CombatantKind,
}

impl Combatant {
    fn new(name: impl Into<String>, max_hp: i32, kind: CombatantKind) -> Self {
        let mut combatant = Self {
            id: CombatantId::new(),
            name: name.into(),
            portrait: String::new(),
            hit_points: HitPoints::new(max_hp),
            ability_scores: AbilityScores::default(),
            base_stats: BaseStats::default(),
            stats: CombatStats::default(),
            resistances: HashSet::new(),
            immunities: HashSet::new(),
            vulnerabilities: HashSet::new(),
            tags: HashSet::new(),
            buffs: Vec::new(),
            conditions: Vec::new(),
            skills: Vec::new(),
            weapon: Weapon::unarmed(),
            kind,
        };
        crate::buffs::recompute_stats(&mut combatant);
        combatant
    }

    pub fn player(name: impl Into<String>, class: CharacterClass, level: u8, max_hp: i32) -> Self {
        Self::new(
            name,
            max_hp,
            CombatantKind::Player(PlayerProfile::new(class, level)),
        )
    }

    pub fn monster(name: impl Into<String>, profile: MonsterProfile, max_hp: i32) -> Self {
        Self::new(name, max_hp, CombatantKind::Monster(profile))
    }

    pub fn with_portrait(mut self, portrait: impl Into<String>) -> Self {
        self.portrait = portrait.into();
        self
    }

    pub fn with_abilities(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = scores;
        crate::buffs::recompute_stats(&mut self);
        self
    }

    pub fn with_base_stats(mut self, stats: BaseStats) -> Self {
        self.base_stats = stats;
        crate::buffs::recompute_stats(&mut self);
        self
    }

    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.weapon = weapon;
        self
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn with_resistance(mut self, damage_type: DamageType) -> Self {
        self.resistances.insert(damage_type);
        self
    }

    pub fn with_immunity(mut self, damage_type: DamageType) -> Self {
        self.immunities.insert(damage_type);
        self
    }

    pub fn with_vulnerability(mut self, damage_type: DamageType) -> Self {
        self.vulnerabilities.insert(damage_type);
        self
    }

    pub fn with_tag(mut self, tag: CreatureTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn side(&self) -> Side {
        match self.kind {
            CombatantKind::Player(_) => Side::Party,
            CombatantKind::Monster(_) => Side::Enemies,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, CombatantKind::Player(_))
    }

    pub fn is_down(&self) -> bool {
        self.hit_points.is_down()
    }

    pub fn is_alive(&self) -> bool {
        !self.is_down()
    }

    pub fn is_boss(&self) -> bool {
        match &self.kind {
            CombatantKind::Monster(m) => m.boss,
            CombatantKind::Player(_) => false,
        }
    }

    pub fn player_profile(&self) -> Option<&PlayerProfile> {
        match &self.kind {
            CombatantKind::Player(p) => Some(p),
            CombatantKind::Monster(_) => None,
        }
    }

    pub fn player_profile_mut(&mut self) -> Option<&mut PlayerProfile> {
        match &mut self.kind {
            CombatantKind::Player(p) => Some(p),
            CombatantKind::Monster(_) => None,
        }
    }

    pub fn monster_profile(&self) -> Option<&MonsterProfile> {
        match &self.kind {
            CombatantKind::Monster(m) => Some(m),
            CombatantKind::Player(_) => None,
        }
    }

    pub fn monster_profile_mut(&mut self) -> Option<&mut MonsterProfile> {
        match &mut self.kind {
            CombatantKind::Monster(m) => Some(m),
            CombatantKind::Player(_) => None,
        }
    }

    pub fn passives(&self) -> Option<&PassiveEffects> {
        self.player_profile().map(|p| &p.passives)
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    pub fn initiative_modifier(&self) -> i32 {
        self.modifier(Ability::Dexterity)
    }

    pub fn proficiency_bonus(&self) -> i32 {
        match &self.kind {
            CombatantKind::Player(p) => p.proficiency_bonus(),
            CombatantKind::Monster(m) => m.proficiency_bonus(),
        }
    }

    /// Ability modifier an attack of this kind is rolled with.
    pub fn attack_ability_modifier(&self, kind: AttackKind, finesse: bool) -> i32 {
        match (kind, &self.kind) {
            (AttackKind::Weapon, _) if finesse => self
                .modifier(Ability::Strength)
                .max(self.modifier(Ability::Dexterity)),
            (AttackKind::Weapon, CombatantKind::Player(_)) => self.modifier(Ability::Strength),
            // Monsters use their best physical stat.
            (AttackKind::Weapon, CombatantKind::Monster(_)) => self
                .modifier(Ability::Strength)
                .max(self.modifier(Ability::Dexterity)),
            (AttackKind::Spell, CombatantKind::Player(p)) => {
                self.modifier(p.class.spellcasting_ability())
            }
            (AttackKind::Spell, CombatantKind::Monster(_)) => self
                .modifier(Ability::Intelligence)
                .max(self.modifier(Ability::Wisdom))
                .max(self.modifier(Ability::Charisma)),
        }
    }

    /// Saving throw bonus. Players add proficiency to saves of their
    /// spellcasting ability and CON; monsters add it when boss-flagged.
    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        let proficient = match &self.kind {
            CombatantKind::Player(p) => {
                ability == Ability::Constitution || ability == p.class.spellcasting_ability()
            }
            CombatantKind::Monster(m) => m.boss,
        };
        self.modifier(ability) + if proficient { self.proficiency_bonus() } else { 0 }
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.iter().any(|c| c.condition == condition)
    }

    /// Adds a condition, keeping the longer duration if already present.
    pub fn add_condition(&mut self, condition: Condition, source: impl Into<String>, rounds: u32) {
        if rounds == 0 {
            return;
        }
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.condition == condition)
        {
            existing.rounds_remaining = existing.rounds_remaining.max(rounds);
            return;
        }
        self.conditions.push(ActiveCondition {
            condition,
            source: source.into(),
            rounds_remaining: rounds,
        });
    }

    /// Round-boundary countdown. Returns conditions that ended.
    pub fn tick_conditions(&mut self) -> Vec<Condition> {
        let mut ended = Vec::new();
        self.conditions.retain_mut(|c| {
            c.rounds_remaining = c.rounds_remaining.saturating_sub(1);
            if c.rounds_remaining == 0 {
                ended.push(c.condition);
                false
            } else {
                true
            }
        });
        ended
    }

    pub fn is_incapacitated(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition.is_incapacitating())
    }

    /// Taunting combatants carry a damage-reflect buff flagged as taunt.
    pub fn is_taunting(&self) -> bool {
        self.buffs.iter().any(|b| b.is_taunt())
    }

    pub fn ready_skills(&self) -> Vec<usize> {
        self.skills
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_ready())
            .map(|(i, _)| i)
            .collect()
    }

    /// Start-of-turn cooldown countdown.
    pub fn tick_cooldowns(&mut self) {
        for skill in &mut self.skills {
            skill.cooldown_remaining = skill.cooldown_remaining.saturating_sub(1);
        }
    }

    pub fn reset_cooldowns(&mut self) {
        for skill in &mut self.skills {
            skill.cooldown_remaining = 0;
        }
    }
}
