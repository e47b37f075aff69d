//! Damage types and damage computation.
//!
//! # Pipeline
//!
//! ```text
//! total   = base + floor(attack_stat * stat_bonus_percent / 100)
//! total  += skill bonus vs creature tag
//! total  *= 2 if critical
//! after   = max(1, total - defense_stat)
//! after   = floor(after / 2) if the target saved   (0 => no effect)
//! final   = immune ? 0 : max(1, after * type modifier)
//! to_hp   = final - min(temp_hp, final)
//! ```

use crate::combatant::{Combatant, CombatantKind, Skill};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Damage types. Unrecognised names in authored data deserialize to
/// [`DamageType::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
    #[serde(other)]
    Unknown,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Lightning => "lightning",
            DamageType::Thunder => "thunder",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Necrotic => "necrotic",
            DamageType::Radiant => "radiant",
            DamageType::Force => "force",
            DamageType::Psychic => "psychic",
            DamageType::Unknown => "unknown",
        }
    }

    /// Physical or magical, from the fixed table. Types missing from the
    /// table are physical.
    pub fn category(&self) -> DamageCategory {
        match CATEGORY_TABLE.iter().find(|(t, _)| t == self) {
            Some((_, category)) => *category,
            None => {
                tracing::warn!(damage_type = self.name(), "unclassified damage type, treating as physical");
                DamageCategory::Physical
            }
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which attack and defense stats a damage type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageCategory {
    Physical,
    Magical,
}

const CATEGORY_TABLE: &[(DamageType, DamageCategory)] = &[
    (DamageType::Slashing, DamageCategory::Physical),
    (DamageType::Piercing, DamageCategory::Physical),
    (DamageType::Bludgeoning, DamageCategory::Physical),
    (DamageType::Poison, DamageCategory::Physical),
    (DamageType::Acid, DamageCategory::Physical),
    (DamageType::Fire, DamageCategory::Magical),
    (DamageType::Cold, DamageCategory::Magical),
    (DamageType::Lightning, DamageCategory::Magical),
    (DamageType::Thunder, DamageCategory::Magical),
    (DamageType::Necrotic, DamageCategory::Magical),
    (DamageType::Radiant, DamageCategory::Magical),
    (DamageType::Force, DamageCategory::Magical),
    (DamageType::Psychic, DamageCategory::Magical),
];

/// How the damage type interacted with the defender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeInteraction {
    Normal,
    Resisted,
    /// Per-type reduction percentage from equipment.
    Reduced(u8),
    Vulnerable,
    Immune,
}

/// Inputs to [`compute_damage`].
#[derive(Debug, Clone, Copy)]
pub struct DamageRequest<'a> {
    pub base: i32,
    pub damage_type: DamageType,
    pub skill: Option<&'a Skill>,
    pub critical: bool,
    /// The defender succeeded on a saving throw against this damage.
    pub saved: bool,
    pub stat_bonus_percent: i32,
}

impl<'a> DamageRequest<'a> {
    pub fn new(base: i32, damage_type: DamageType) -> Self {
        Self {
            base,
            damage_type,
            skill: None,
            critical: false,
            saved: false,
            stat_bonus_percent: 30,
        }
    }

    pub fn with_skill(mut self, skill: &'a Skill) -> Self {
        self.skill = Some(skill);
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn saved(mut self, saved: bool) -> Self {
        self.saved = saved;
        self
    }

    pub fn stat_bonus_percent(mut self, percent: i32) -> Self {
        self.stat_bonus_percent = percent;
        self
    }
}

/// Result of [`compute_damage`]. Nothing is applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    /// Damage after defense and type modifiers.
    pub amount: i32,
    /// Portion eaten by temporary HP.
    pub absorbed: i32,
    /// Portion that reaches current HP.
    pub to_hp: i32,
    pub interaction: TypeInteraction,
    /// Saving throw halved the damage to nothing.
    pub no_effect: bool,
    pub critical: bool,
}

impl DamageOutcome {
    fn nothing(interaction: TypeInteraction, no_effect: bool, critical: bool) -> Self {
        Self {
            amount: 0,
            absorbed: 0,
            to_hp: 0,
            interaction,
            no_effect,
            critical,
        }
    }
}

/// Compute damage from `attacker` to `defender` without mutating either.
pub fn compute_damage(
    attacker: &Combatant,
    defender: &Combatant,
    request: DamageRequest<'_>,
) -> DamageOutcome {
    let category = request.damage_type.category();

    let (attack_stat, defense_stat) = match category {
        DamageCategory::Physical => (attacker.stats.attack, defender.stats.defense),
        DamageCategory::Magical => (attacker.stats.magic_attack, defender.stats.magic_defense),
    };

    let mut total = request.base + (attack_stat * request.stat_bonus_percent).div_euclid(100);

    if let Some(bonus) = request.skill.and_then(|s| s.bonus_vs) {
        if defender.tags.contains(&bonus.tag) {
            total += bonus.bonus;
        }
    }

    if request.critical {
        total *= 2;
    }

    let mut after_defense = (total - defense_stat).max(1);

    if request.saved {
        after_defense /= 2;
        if after_defense == 0 {
            return DamageOutcome::nothing(TypeInteraction::Normal, true, request.critical);
        }
    }

    let interaction = type_interaction(defender, request.damage_type);
    let amount = match interaction {
        TypeInteraction::Immune => {
            return DamageOutcome::nothing(TypeInteraction::Immune, false, request.critical)
        }
        TypeInteraction::Normal => after_defense,
        TypeInteraction::Resisted => after_defense / 2,
        TypeInteraction::Reduced(percent) => after_defense * (100 - percent.min(100) as i32) / 100,
        TypeInteraction::Vulnerable => after_defense * 2,
    }
    .max(1);

    let absorbed = defender.hit_points.temporary.min(amount).max(0);

    DamageOutcome {
        amount,
        absorbed,
        to_hp: amount - absorbed,
        interaction,
        no_effect: false,
        critical: request.critical,
    }
}

/// Immunity wins over everything; custom reduction wins over resistance.
pub fn type_interaction(defender: &Combatant, damage_type: DamageType) -> TypeInteraction {
    if defender.immunities.contains(&damage_type) {
        return TypeInteraction::Immune;
    }

    let custom = match &defender.kind {
        CombatantKind::Player(p) => p
            .passives
            .damage_reduction
            .get(&damage_type)
            .copied()
            .filter(|pct| *pct > 0),
        CombatantKind::Monster(_) => None,
    };

    let reduced = match custom {
        Some(percent) => Some(TypeInteraction::Reduced(percent)),
        None if defender.resistances.contains(&damage_type) => Some(TypeInteraction::Resisted),
        None => None,
    };

    match (reduced, defender.vulnerabilities.contains(&damage_type)) {
        // Resistance and vulnerability on the same type cancel.
        (Some(_), true) => TypeInteraction::Normal,
        (Some(r), false) => r,
        (None, true) => TypeInteraction::Vulnerable,
        (None, false) => TypeInteraction::Normal,
    }
}

/// Share of `amount` given by a percentage passive, rounded down.
pub fn percent_of(amount: i32, percent: i32) -> i32 {
    (amount.max(0) * percent.max(0)) / 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{BaseStats, CharacterClass, CreatureTag, MonsterProfile, SkillTarget};

    fn attacker(attack: i32, magic_attack: i32) -> Combatant {
        Combatant::player("Attacker", CharacterClass::Fighter, 1, 20).with_base_stats(BaseStats {
            attack,
            magic_attack,
            defense: 0,
            magic_defense: 0,
            speed: 30,
            armor_bonus: 0,
        })
    }

    fn defender(defense: i32, magic_defense: i32) -> Combatant {
        Combatant::monster("Target", MonsterProfile::new(1.0, 100), 50).with_base_stats(
            BaseStats {
                attack: 1,
                magic_attack: 1,
                defense,
                magic_defense,
                speed: 30,
                armor_bonus: 0,
            },
        )
    }

    #[test]
    fn test_physical_uses_attack_and_defense() {
        // 10 + floor(17 * 0.3) = 15, minus 4 defense = 11
        let outcome = compute_damage(
            &attacker(17, 50),
            &defender(4, 40),
            DamageRequest::new(10, DamageType::Slashing),
        );
        assert_eq!(outcome.amount, 11);
        assert_eq!(outcome.to_hp, 11);
    }

    #[test]
    fn test_magical_uses_magic_stats() {
        // 10 + floor(20 * 0.3) = 16, minus 6 magic defense = 10
        let outcome = compute_damage(
            &attacker(50, 20),
            &defender(40, 6),
            DamageRequest::new(10, DamageType::Radiant),
        );
        assert_eq!(outcome.amount, 10);
    }

    #[test]
    fn test_unknown_type_falls_back_to_physical() {
        assert_eq!(DamageType::Unknown.category(), DamageCategory::Physical);
        let parsed: DamageType = serde_json::from_str("\"void\"").unwrap();
        assert_eq!(parsed, DamageType::Unknown);
    }

    #[test]
    fn test_critical_doubles_before_defense() {
        // (10 + 3) * 2 = 26, minus 6 = 20
        let outcome = compute_damage(
            &attacker(10, 10),
            &defender(6, 0),
            DamageRequest::new(10, DamageType::Piercing).critical(true),
        );
        assert_eq!(outcome.amount, 20);
        assert!(outcome.critical);
    }

    #[test]
    fn test_floor_of_one_against_heavy_defense() {
        let outcome = compute_damage(
            &attacker(1, 1),
            &defender(100, 100),
            DamageRequest::new(1, DamageType::Bludgeoning),
        );
        assert_eq!(outcome.amount, 1);
    }

    #[test]
    fn test_resistance_halves_after_defense() {
        // 20 + 6 (magic attack 20 * 0.3) = 26, minus 6 magic defense = 20, resisted = 10
        let target = defender(0, 6).with_resistance(DamageType::Fire);
        let outcome = compute_damage(
            &attacker(0, 20),
            &target,
            DamageRequest::new(20, DamageType::Fire),
        );
        assert_eq!(outcome.amount, 10);
        assert_eq!(outcome.interaction, TypeInteraction::Resisted);
    }

    #[test]
    fn test_immunity_is_exactly_zero() {
        let target = defender(0, 0).with_immunity(DamageType::Poison);
        let outcome = compute_damage(
            &attacker(30, 30),
            &target,
            DamageRequest::new(50, DamageType::Poison).critical(true),
        );
        assert_eq!(outcome.amount, 0);
        assert_eq!(outcome.to_hp, 0);
        assert_eq!(outcome.interaction, TypeInteraction::Immune);
    }

    #[test]
    fn test_vulnerability_doubles() {
        let target = defender(0, 0).with_vulnerability(DamageType::Radiant);
        let outcome = compute_damage(
            &attacker(0, 0),
            &target,
            DamageRequest::new(7, DamageType::Radiant),
        );
        assert_eq!(outcome.amount, 14);
    }

    #[test]
    fn test_custom_reduction_replaces_resistance() {
        let mut knight = attacker(0, 0).with_resistance(DamageType::Cold);
        if let Some(p) = knight.player_profile_mut() {
            p.passives.damage_reduction.insert(DamageType::Cold, 25);
        }
        let outcome = compute_damage(
            &defender(0, 0),
            &knight,
            DamageRequest::new(20, DamageType::Cold),
        );
        assert_eq!(outcome.amount, 15);
        assert_eq!(outcome.interaction, TypeInteraction::Reduced(25));
    }

    #[test]
    fn test_tag_bonus_only_against_matching_creature() {
        let smite = Skill::new("Smite", SkillTarget::SingleEnemy, 3)
            .with_bonus_vs(CreatureTag::Undead, 8);
        let zombie = defender(0, 0).with_tag(CreatureTag::Undead);
        let wolf = defender(0, 0).with_tag(CreatureTag::Beast);
        let hero = attacker(0, 0);

        let vs_zombie = compute_damage(
            &hero,
            &zombie,
            DamageRequest::new(5, DamageType::Radiant).with_skill(&smite),
        );
        let vs_wolf = compute_damage(
            &hero,
            &wolf,
            DamageRequest::new(5, DamageType::Radiant).with_skill(&smite),
        );
        assert_eq!(vs_zombie.amount, 13);
        assert_eq!(vs_wolf.amount, 5);
    }

    #[test]
    fn test_saved_halves_and_can_be_no_effect() {
        let outcome = compute_damage(
            &attacker(0, 0),
            &defender(0, 0),
            DamageRequest::new(9, DamageType::Thunder).saved(true),
        );
        assert_eq!(outcome.amount, 4);

        let outcome = compute_damage(
            &attacker(0, 0),
            &defender(0, 50),
            DamageRequest::new(9, DamageType::Thunder).saved(true),
        );
        assert!(outcome.no_effect);
        assert_eq!(outcome.amount, 0);
    }

    #[test]
    fn test_temporary_hp_absorbs_first() {
        let mut target = defender(0, 0);
        target.hit_points.grant_temporary(5);
        let outcome = compute_damage(
            &attacker(0, 0),
            &target,
            DamageRequest::new(12, DamageType::Slashing),
        );
        assert_eq!(outcome.amount, 12);
        assert_eq!(outcome.absorbed, 5);
        assert_eq!(outcome.to_hp, 7);
    }
}
