//! Attack and saving throw resolution.
//!
//! These functions roll dice and decide outcomes but never mutate a
//! combatant. The session applies their results to the roster.

use crate::combatant::{Ability, AttackKind, Combatant, Condition};
use crate::dice::{self, Advantage, DiceRoll, DiceSource};
use serde::{Deserialize, Serialize};

/// Result of an attack roll against a defender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub roll: DiceRoll,
    pub total_bonus: i32,
    pub total: i32,
    pub target_defense: i32,
    pub hit: bool,
    pub critical_hit: bool,
    pub critical_miss: bool,
}

/// Decide an attack from an already-rolled d20.
///
/// A natural 20 always hits, a natural 1 always misses.
pub fn judge_attack(roll: DiceRoll, target_defense: i32) -> AttackOutcome {
    let critical_hit = roll.critical_hit;
    let critical_miss = roll.critical_miss;
    let total = roll.total;
    let hit = critical_hit || (total >= target_defense && !critical_miss);

    AttackOutcome {
        total_bonus: roll.modifier,
        total,
        target_defense,
        hit,
        critical_hit,
        critical_miss,
        roll,
    }
}

/// Attack bonus: ability modifier + proficiency + contextual bonus.
pub fn attack_bonus(attacker: &Combatant, kind: AttackKind, finesse: bool, contextual: i32) -> i32 {
    attacker.attack_ability_modifier(kind, finesse) + attacker.proficiency_bonus() + contextual
}

/// Roll an attack against the defender's armor class.
pub fn resolve_attack(
    dice: &mut dyn DiceSource,
    attacker: &Combatant,
    defender: &Combatant,
    kind: AttackKind,
    finesse: bool,
    advantage: Advantage,
    contextual_bonus: i32,
) -> AttackOutcome {
    let bonus = attack_bonus(attacker, kind, finesse, contextual_bonus);
    let roll = dice::roll_d20(dice, bonus, advantage);
    let outcome = judge_attack(roll, defender.stats.armor_class);

    tracing::debug!(
        attacker = %attacker.name,
        defender = %defender.name,
        roll = %outcome.roll,
        armor_class = outcome.target_defense,
        hit = outcome.hit,
        "attack rolled"
    );

    outcome
}

/// Aggregate conditions on both sides into one advantage state.
///
/// Sources are boolean: two reasons for advantage are the same as one, and
/// any advantage plus any disadvantage is a straight roll.
pub fn attack_advantage(attacker: &Combatant, defender: &Combatant, reckless_attack: bool) -> Advantage {
    let advantage = reckless_attack
        || attacker.has_condition(Condition::Reckless)
        || defender.has_condition(Condition::Reckless)
        || defender.has_condition(Condition::Frozen)
        || defender.has_condition(Condition::Prone)
        || defender.has_condition(Condition::Blinded);

    let disadvantage =
        attacker.has_condition(Condition::Blinded) || attacker.has_condition(Condition::Prone);

    Advantage::from_flags(advantage, disadvantage)
}

/// Result of a saving throw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingThrow {
    pub ability: Ability,
    pub roll: DiceRoll,
    pub total_bonus: i32,
    pub difficulty_class: i32,
    pub success: bool,
}

/// Roll a saving throw. Success when the total meets the DC.
pub fn resolve_saving_throw(
    dice: &mut dyn DiceSource,
    target: &Combatant,
    ability: Ability,
    difficulty_class: i32,
) -> SavingThrow {
    let total_bonus = target.saving_throw_modifier(ability);
    // Frozen creatures cannot dodge.
    let advantage = if target.has_condition(Condition::Frozen)
        && matches!(ability, Ability::Strength | Ability::Dexterity)
    {
        Advantage::Disadvantage
    } else {
        Advantage::Normal
    };
    let roll = dice::roll_d20(dice, total_bonus, advantage);
    let success = roll.meets_dc(difficulty_class);

    tracing::debug!(
        target_name = %target.name,
        ability = %ability,
        roll = %roll,
        dc = difficulty_class,
        success,
        "saving throw"
    );

    SavingThrow {
        ability,
        roll,
        total_bonus,
        difficulty_class,
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{AbilityScores, BaseStats, CharacterClass, MonsterProfile};
    use crate::testing::ScriptedDice;

    fn fighter() -> Combatant {
        // STR 16 (+3), level 1 (+2): attack bonus +5
        Combatant::player("Roland", CharacterClass::Fighter, 1, 12)
            .with_abilities(AbilityScores::new(16, 12, 14, 10, 10, 10))
    }

    fn armored(ac: i32) -> Combatant {
        // DEX 10 so AC is 10 + armor bonus
        Combatant::monster("Knight", MonsterProfile::new(3.0, 700), 52).with_base_stats(
            BaseStats {
                armor_bonus: ac - 10,
                ..BaseStats::default()
            },
        )
    }

    #[test]
    fn test_hit_when_total_meets_ac() {
        let mut dice = ScriptedDice::new([15]);
        let outcome = resolve_attack(
            &mut dice,
            &fighter(),
            &armored(18),
            AttackKind::Weapon,
            false,
            Advantage::Normal,
            0,
        );
        assert_eq!(outcome.total_bonus, 5);
        assert_eq!(outcome.total, 20);
        assert_eq!(outcome.target_defense, 18);
        assert!(outcome.hit);
        assert!(!outcome.critical_hit);
    }

    #[test]
    fn test_natural_twenty_hits_anything() {
        let outcome = judge_attack(DiceRoll::d20(20, -5), 40);
        assert!(outcome.hit);
        assert!(outcome.critical_hit);
    }

    #[test]
    fn test_natural_one_misses_anything() {
        let outcome = judge_attack(DiceRoll::d20(1, 30), 5);
        assert!(!outcome.hit);
        assert!(outcome.critical_miss);
    }

    #[test]
    fn test_miss_below_ac() {
        let outcome = judge_attack(DiceRoll::d20(10, 2), 13);
        assert!(!outcome.hit);
        assert!(!outcome.critical_miss);
    }

    #[test]
    fn test_advantage_sources_cancel() {
        let mut attacker = fighter();
        let mut defender = armored(12);
        defender.add_condition(Condition::Frozen, "Ice", 1);
        assert_eq!(attack_advantage(&attacker, &defender, false), Advantage::Advantage);

        attacker.add_condition(Condition::Blinded, "Darkness", 1);
        assert_eq!(attack_advantage(&attacker, &defender, false), Advantage::Normal);

        // A second advantage source does not outweigh the disadvantage.
        assert_eq!(attack_advantage(&attacker, &defender, true), Advantage::Normal);
    }

    #[test]
    fn test_reckless_attacker_is_easier_to_hit() {
        let mut berserker = fighter();
        berserker.add_condition(Condition::Reckless, "Reckless Attack", 1);
        let goblin = armored(12);
        assert_eq!(attack_advantage(&goblin, &berserker, false), Advantage::Advantage);
    }

    #[test]
    fn test_saving_throw_against_dc() {
        // CON 14 (+2) with proficiency (+2) for a fighter
        let mut dice = ScriptedDice::new([9, 8]);
        let save = resolve_saving_throw(&mut dice, &fighter(), Ability::Constitution, 13);
        assert_eq!(save.total_bonus, 4);
        assert!(save.success);

        let save = resolve_saving_throw(&mut dice, &fighter(), Ability::Constitution, 13);
        assert!(!save.success);
    }

    #[test]
    fn test_spell_attack_uses_casting_ability() {
        let wizard = Combatant::player("Elara", CharacterClass::Wizard, 5, 22)
            .with_abilities(AbilityScores::new(8, 14, 12, 18, 12, 10));
        // INT +4, proficiency +3 at level 5
        assert_eq!(attack_bonus(&wizard, AttackKind::Spell, false, 0), 7);
        assert_eq!(attack_bonus(&wizard, AttackKind::Weapon, false, 1), 3);
    }
}
