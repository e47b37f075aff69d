//! Testing utilities for the combat engine.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice` for exact rolls, picks and chances
//! - `ScriptedDialogue` and `RecordingAck` for the presentation seams
//! - Ready-made combatants and assertion helpers

use crate::behavior::{DialogueMoment, DialogueSource};
use crate::buffs::BuffKind;
use crate::combatant::{
    Ability, AbilityScores, BaseStats, BuffTemplate, CharacterClass, Combatant, CombatantId, Condition,
    CreatureTag, GroupEffect, LegendaryAction, LegendaryEffect, LegendaryPool, LootDrop, MonsterProfile,
    Skill, SkillTarget, Ultimate, Weapon,
};
use crate::damage::DamageType;
use crate::dice::{DamageDice, DiceSource, DieType, RngDice};
use crate::session::CombatSession;
use crate::sync::{Acknowledge, SuspensionPoint};
use async_trait::async_trait;
use rand::rngs::StdRng;
use std::collections::{HashMap, VecDeque};

/// Dice that return queued values.
///
/// Rolls are clamped to the die. Once a queue runs dry, rolls come from a
/// fixed-seed generator, picks return 0 and chances return false.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    rolls: VecDeque<u32>,
    picks: VecDeque<usize>,
    chances: VecDeque<bool>,
    fallback: RngDice<StdRng>,
}

impl Default for ScriptedDice {
    fn default() -> Self {
        Self {
            rolls: VecDeque::new(),
            picks: VecDeque::new(),
            chances: VecDeque::new(),
            fallback: RngDice::seeded(0),
        }
    }
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self::default().with_rolls(rolls)
    }

    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = u32>) -> Self {
        self.rolls.extend(rolls);
        self
    }

    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks.extend(picks);
        self
    }

    pub fn with_chances(mut self, chances: impl IntoIterator<Item = bool>) -> Self {
        self.chances.extend(chances);
        self
    }

    pub fn push_rolls(&mut self, rolls: impl IntoIterator<Item = u32>) {
        self.rolls.extend(rolls);
    }

    /// Scripted rolls not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        match self.rolls.pop_front() {
            Some(value) => value.clamp(1, sides.max(1)),
            None => self.fallback.roll_die(sides),
        }
    }

    fn pick(&mut self, len: usize) -> usize {
        self.picks.pop_front().unwrap_or(0).min(len.saturating_sub(1))
    }

    fn chance(&mut self, _p: f64) -> bool {
        self.chances.pop_front().unwrap_or(false)
    }
}

/// Dialogue that returns scripted lines per moment, in order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDialogue {
    lines: HashMap<DialogueMoment, VecDeque<String>>,
}

impl ScriptedDialogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, moment: DialogueMoment, line: impl Into<String>) -> Self {
        self.lines.entry(moment).or_default().push_back(line.into());
        self
    }
}

impl DialogueSource for ScriptedDialogue {
    fn line(&mut self, _speaker: &Combatant, moment: DialogueMoment) -> Option<String> {
        self.lines.get_mut(&moment).and_then(VecDeque::pop_front)
    }
}

/// Proceeds at once and remembers every suspension point.
#[derive(Debug, Clone, Default)]
pub struct RecordingAck {
    pub points: Vec<SuspensionPoint>,
}

impl RecordingAck {
    pub fn labels(&self) -> Vec<&'static str> {
        self.points.iter().map(SuspensionPoint::label).collect()
    }
}

#[async_trait]
impl Acknowledge for RecordingAck {
    async fn acknowledge(&mut self, point: &SuspensionPoint) {
        self.points.push(point.clone());
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Level 1 fighter: STR 16, DEX 12, AC 17, longsword.
pub fn fighter(name: &str) -> Combatant {
    Combatant::player(name, CharacterClass::Fighter, 1, 12)
        .with_abilities(AbilityScores::new(16, 12, 14, 10, 10, 10))
        .with_base_stats(BaseStats {
            attack: 14,
            magic_attack: 4,
            defense: 4,
            magic_defense: 2,
            speed: 30,
            armor_bonus: 6,
        })
        .with_weapon(Weapon::new(
            "Longsword",
            DamageDice::new(1, DieType::D8, 0),
            DamageType::Slashing,
        ))
        .with_skill(
            Skill::new("Power Strike", SkillTarget::SingleEnemy, 2)
                .with_damage(DamageDice::new(1, DieType::D10, 2), DamageType::Slashing),
        )
        .with_skill(Skill::new("Shield Wall", SkillTarget::Myself, 4).with_buff(BuffTemplate {
            kind: BuffKind::DamageReflect,
            magnitude: 25,
            turns: 2,
            taunt: true,
        }))
}

/// Level 1 wizard: INT 16, DEX 14, AC 12, fire and frost spells.
pub fn wizard(name: &str) -> Combatant {
    Combatant::player(name, CharacterClass::Wizard, 1, 8)
        .with_abilities(AbilityScores::new(8, 14, 12, 16, 12, 10))
        .with_base_stats(BaseStats {
            attack: 4,
            magic_attack: 16,
            defense: 1,
            magic_defense: 4,
            speed: 30,
            armor_bonus: 0,
        })
        .with_weapon(Weapon::new(
            "Quarterstaff",
            DamageDice::new(1, DieType::D6, 0),
            DamageType::Bludgeoning,
        ))
        .with_skill(
            Skill::new("Fireball", SkillTarget::AllEnemies, 3)
                .with_damage(DamageDice::new(3, DieType::D6, 0), DamageType::Fire)
                .spell()
                .with_save(Ability::Dexterity, 13),
        )
        .with_skill(
            Skill::new("Ray of Frost", SkillTarget::SingleEnemy, 2)
                .with_damage(DamageDice::new(1, DieType::D8, 0), DamageType::Cold)
                .spell()
                .with_condition(Condition::Frozen, 1),
        )
}

/// Level 1 cleric: WIS 16, AC 16, heals and blesses.
pub fn cleric(name: &str) -> Combatant {
    Combatant::player(name, CharacterClass::Cleric, 1, 10)
        .with_abilities(AbilityScores::new(12, 10, 14, 10, 16, 12))
        .with_base_stats(BaseStats {
            attack: 8,
            magic_attack: 12,
            defense: 3,
            magic_defense: 4,
            speed: 30,
            armor_bonus: 6,
        })
        .with_weapon(Weapon::new(
            "Mace",
            DamageDice::new(1, DieType::D6, 0),
            DamageType::Bludgeoning,
        ))
        .with_skill(
            Skill::new("Cure Wounds", SkillTarget::SingleAlly, 1)
                .with_heal(DamageDice::new(1, DieType::D8, 3)),
        )
        .with_skill(Skill::new("Bless", SkillTarget::AllAllies, 4).with_buff(BuffTemplate {
            kind: BuffKind::Attack,
            magnitude: 2,
            turns: 3,
            taunt: false,
        }))
        .with_skill(
            Skill::new("Sacred Flame", SkillTarget::SingleEnemy, 0)
                .with_damage(DamageDice::new(1, DieType::D8, 0), DamageType::Radiant)
                .spell()
                .with_save(Ability::Dexterity, 13)
                .with_bonus_vs(CreatureTag::Undead, 4),
        )
}

/// 7 HP goblin with AC 12. Always drops a Goblin Ear.
pub fn goblin(name: &str) -> Combatant {
    let mut profile = MonsterProfile::new(0.25, 50);
    profile.loot = vec![LootDrop::guaranteed("Goblin Ear")];
    Combatant::monster(name, profile, 7)
        .with_abilities(AbilityScores::new(8, 10, 10, 10, 8, 8))
        .with_base_stats(BaseStats {
            attack: 8,
            magic_attack: 2,
            defense: 2,
            magic_defense: 0,
            speed: 30,
            armor_bonus: 2,
        })
        .with_weapon(Weapon::new("Scimitar", DamageDice::new(1, DieType::D6, 0), DamageType::Slashing).finesse())
        .with_tag(CreatureTag::Humanoid)
}

/// A fire-immune boss with two legendary actions per round and an
/// ultimate that unlocks after two full rounds.
pub fn dragon_boss() -> Combatant {
    let mut profile = MonsterProfile::new(5.0, 1800);
    profile.boss = true;
    profile.legendary = Some(LegendaryPool::new(
        vec![
            LegendaryAction {
                name: "Tail Swipe".into(),
                cost: 1,
                effect: LegendaryEffect::Strike {
                    damage: DamageDice::new(1, DieType::D8, 2),
                    damage_type: DamageType::Bludgeoning,
                },
            },
            LegendaryAction {
                name: "Smolder".into(),
                cost: 2,
                effect: LegendaryEffect::Regenerate { amount: 5 },
            },
        ],
        2,
    ));
    profile.ultimate = Some(Ultimate {
        name: "Inferno".into(),
        damage: DamageDice::new(4, DieType::D6, 0),
        damage_type: DamageType::Fire,
        effect: Some(GroupEffect::DebuffAll {
            kind: BuffKind::Defense,
            magnitude: -2,
            turns: 2,
        }),
        lifesteal_percent: 25,
        round_trigger: 2,
        used: false,
    });
    profile.loot = vec![LootDrop::guaranteed("Dragon Scale")];

    Combatant::monster("Ashen Wyrm", profile, 60)
        .with_abilities(AbilityScores::new(18, 12, 16, 12, 12, 14))
        .with_base_stats(BaseStats {
            attack: 16,
            magic_attack: 14,
            defense: 5,
            magic_defense: 4,
            speed: 40,
            armor_bonus: 6,
        })
        .with_weapon(Weapon::new("Bite", DamageDice::new(2, DieType::D6, 0), DamageType::Piercing))
        .with_immunity(DamageType::Fire)
        .with_tag(CreatureTag::Dragon)
}

// ============================================================================
// Assertion Helpers
// ============================================================================

fn find<'a>(session: &'a CombatSession, name: &str) -> &'a Combatant {
    session
        .roster()
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("No combatant named '{name}'"))
}

/// Id of the combatant with the given name.
#[track_caller]
pub fn id_of(session: &CombatSession, name: &str) -> CombatantId {
    find(session, name).id
}

/// Assert a combatant's HP is at expected values.
#[track_caller]
pub fn assert_hp(session: &CombatSession, name: &str, current: i32, max: i32) {
    let hp = find(session, name).hit_points;
    assert_eq!(
        (hp.current, hp.maximum),
        (current, max),
        "Expected {name} at {current}/{max}, got {}/{}",
        hp.current,
        hp.maximum
    );
}

/// Assert a combatant is down.
#[track_caller]
pub fn assert_down(session: &CombatSession, name: &str) {
    assert!(find(session, name).is_down(), "Expected {name} to be down");
}

/// Assert whose turn it is.
#[track_caller]
pub fn assert_turn_of(session: &CombatSession, name: &str) {
    let actor = session.current_actor().map(|c| c.name.as_str());
    assert_eq!(actor, Some(name), "Expected it to be {name}'s turn");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_rolls_then_fallback() {
        let mut dice = ScriptedDice::new([25, 0, 4]);
        assert_eq!(dice.roll_die(20), 20);
        assert_eq!(dice.roll_die(6), 1);
        assert_eq!(dice.remaining(), 1);
        assert_eq!(dice.roll_die(8), 4);
        for _ in 0..50 {
            assert!((1..=6).contains(&dice.roll_die(6)));
        }
    }

    #[test]
    fn test_picks_and_chances_default() {
        let mut dice = ScriptedDice::default().with_picks([5]).with_chances([true]);
        assert_eq!(dice.pick(3), 2);
        assert_eq!(dice.pick(3), 0);
        assert!(dice.chance(0.1));
        assert!(!dice.chance(0.9));
    }

    #[test]
    fn test_scripted_dialogue() {
        let dragon = dragon_boss();
        let mut dialogue = ScriptedDialogue::new().say(DialogueMoment::Engage, "Burn!");
        assert_eq!(dialogue.line(&dragon, DialogueMoment::Engage).as_deref(), Some("Burn!"));
        assert_eq!(dialogue.line(&dragon, DialogueMoment::Engage), None);
        assert_eq!(dialogue.line(&dragon, DialogueMoment::Defeated), None);
    }

    #[test]
    fn test_fixtures_are_consistent() {
        assert_eq!(fighter("Roland").stats.armor_class, 17);
        assert_eq!(goblin("Snik").stats.armor_class, 12);
        let dragon = dragon_boss();
        assert!(dragon.is_boss());
        assert_eq!(dragon.stats.armor_class, 17);
    }
}
