//! Experience thresholds and leveling.

use crate::combatant::{Ability, Combatant, CombatantId, CombatantKind};
use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u8 = 20;

/// Cumulative XP needed to reach each level, index 0 is level 1.
const XP_THRESHOLDS: [u32; MAX_LEVEL as usize] = [
    0, 300, 900, 2_700, 6_500, 14_000, 23_000, 34_000, 48_000, 64_000, 85_000, 100_000, 120_000,
    140_000, 165_000, 195_000, 225_000, 265_000, 305_000, 355_000,
];

/// Levels at which a talent (ability score improvement or feat) is chosen.
const TALENT_LEVELS: [u8; 5] = [4, 8, 12, 16, 19];

pub fn experience_for_level(level: u8) -> u32 {
    let index = level.clamp(1, MAX_LEVEL) as usize - 1;
    XP_THRESHOLDS[index]
}

pub fn level_for_experience(experience: u32) -> u8 {
    XP_THRESHOLDS
        .iter()
        .rposition(|threshold| experience >= *threshold)
        .map(|i| i as u8 + 1)
        .unwrap_or(1)
}

pub fn proficiency_for_level(level: u8) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

/// Max HP from hit die: full die at level 1, rounded-up average after,
/// CON modifier every level, never below 1 per level.
pub fn max_hit_points(combatant: &Combatant) -> Option<i32> {
    let CombatantKind::Player(profile) = &combatant.kind else {
        return None;
    };
    let die = profile.class.hit_die();
    let con = combatant.modifier(Ability::Constitution);
    let first = (die.sides() as i32 + con).max(1);
    let later = (die.average() + con).max(1) * (profile.level as i32 - 1);
    Some(first + later)
}

/// A level gained at the end of combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub combatant: CombatantId,
    pub name: String,
    pub from_level: u8,
    pub to_level: u8,
    pub new_max_hp: i32,
    pub talent_choice: bool,
}

/// Add experience to a player and level up as far as the table allows.
///
/// Gained max HP is also added to current HP. Monsters are ignored.
pub fn award_experience(combatant: &mut Combatant, amount: u32) -> Option<LevelUp> {
    let old_max = combatant.hit_points.maximum;
    let profile = combatant.player_profile_mut()?;
    profile.experience = profile.experience.saturating_add(amount);

    let from_level = profile.level;
    let to_level = level_for_experience(profile.experience).max(from_level);
    if to_level == from_level {
        return None;
    }

    let talent_choice = (from_level + 1..=to_level).any(|l| TALENT_LEVELS.contains(&l));
    profile.level = to_level;
    profile.pending_talent_choice |= talent_choice;

    let new_max = max_hit_points(combatant).unwrap_or(old_max).max(old_max);
    combatant.hit_points.maximum = new_max;
    combatant.hit_points.heal(new_max - old_max);

    tracing::info!(
        name = %combatant.name,
        from_level,
        to_level,
        new_max_hp = new_max,
        "level up"
    );

    Some(LevelUp {
        combatant: combatant.id,
        name: combatant.name.clone(),
        from_level,
        to_level,
        new_max_hp: new_max,
        talent_choice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{AbilityScores, CharacterClass, MonsterProfile};

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_experience(0), 1);
        assert_eq!(level_for_experience(299), 1);
        assert_eq!(level_for_experience(300), 2);
        assert_eq!(level_for_experience(6_500), 5);
        assert_eq!(level_for_experience(1_000_000), 20);
        assert_eq!(experience_for_level(3), 900);
    }

    #[test]
    fn test_max_hit_points_from_hit_die() {
        // Fighter d10, CON 14 (+2): 12 at level 1, +8 per level after
        let mut fighter = Combatant::player("Roland", CharacterClass::Fighter, 3, 12)
            .with_abilities(AbilityScores::new(16, 12, 14, 10, 10, 10));
        assert_eq!(max_hit_points(&fighter), Some(28));
        fighter.kind = CombatantKind::Monster(MonsterProfile::new(1.0, 10));
        assert_eq!(max_hit_points(&fighter), None);
    }

    #[test]
    fn test_award_levels_up_and_heals_gain() {
        let mut wizard = Combatant::player("Elara", CharacterClass::Wizard, 1, 6)
            .with_abilities(AbilityScores::new(8, 14, 12, 16, 12, 10));
        wizard.hit_points.current = 3;

        let level_up = award_experience(&mut wizard, 300).unwrap();
        assert_eq!(level_up.from_level, 1);
        assert_eq!(level_up.to_level, 2);
        // d6 (6) + 1 at level 1, then avg 4 + 1
        assert_eq!(wizard.hit_points.maximum, 12);
        assert_eq!(wizard.hit_points.current, 9);
        assert!(!level_up.talent_choice);
    }

    #[test]
    fn test_talent_flag_when_crossing_level_four() {
        let mut rogue = Combatant::player("Vex", CharacterClass::Rogue, 3, 20);
        let level_up = award_experience(&mut rogue, 2_000).unwrap();
        assert_eq!(level_up.to_level, 4);
        assert!(level_up.talent_choice);
        assert!(rogue.player_profile().unwrap().pending_talent_choice);
    }

    #[test]
    fn test_no_level_up_below_threshold() {
        let mut cleric = Combatant::player("Mira", CharacterClass::Cleric, 1, 9);
        assert!(award_experience(&mut cleric, 100).is_none());
        assert_eq!(cleric.player_profile().unwrap().experience, 100);
    }
}
