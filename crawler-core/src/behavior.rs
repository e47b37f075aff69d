//! Monster and boss decision making.
//!
//! Decisions only read the roster and draw from the dice; the session
//! carries them out.

use crate::combatant::{Combatant, CombatantId, SkillTarget};
use crate::config::EngineConfig;
use crate::dice::DiceSource;

/// What a monster does on its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonsterAction {
    Ultimate,
    Skill {
        index: usize,
        target: Option<CombatantId>,
    },
    Attack {
        target: CombatantId,
    },
    /// No valid target; only reachable in a finished fight.
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorPolicy {
    pub skill_chance: f64,
    pub legendary_chance: f64,
}

impl Default for BehaviorPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl BehaviorPolicy {
    pub fn new(skill_chance: f64, legendary_chance: f64) -> Self {
        Self {
            skill_chance,
            legendary_chance,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.monster_skill_chance, config.legendary_action_chance)
    }

    /// Uniform pick among taunting candidates if any, else among all
    /// living candidates.
    pub fn choose_target(dice: &mut dyn DiceSource, candidates: &[&Combatant]) -> Option<CombatantId> {
        let living: Vec<&Combatant> = candidates.iter().copied().filter(|c| c.is_alive()).collect();
        let taunting: Vec<&Combatant> = living.iter().copied().filter(|c| c.is_taunting()).collect();
        let pool = if taunting.is_empty() { living } else { taunting };
        if pool.is_empty() {
            return None;
        }
        Some(pool[dice.pick(pool.len())].id)
    }

    /// Ultimate first, then maybe a ready skill, then a plain attack.
    pub fn decide(
        &self,
        dice: &mut dyn DiceSource,
        actor: &Combatant,
        allies: &[&Combatant],
        foes: &[&Combatant],
        full_rounds_elapsed: u32,
    ) -> MonsterAction {
        if ultimate_ready(actor, full_rounds_elapsed) && foes.iter().any(|f| f.is_alive()) {
            tracing::debug!(monster = %actor.name, "ultimate unlocked");
            return MonsterAction::Ultimate;
        }

        let ready = actor.ready_skills();
        if !ready.is_empty() && dice.chance(self.skill_chance) {
            let index = ready[dice.pick(ready.len())];
            let skill = &actor.skills[index];
            let target = match skill.target {
                SkillTarget::SingleEnemy => Self::choose_target(dice, foes),
                SkillTarget::SingleAlly => most_wounded(allies).or(Some(actor.id)),
                SkillTarget::AllEnemies | SkillTarget::AllAllies | SkillTarget::Myself => None,
            };
            if target.is_some() || !skill.target.needs_target() {
                tracing::debug!(monster = %actor.name, skill = %skill.name, "monster uses skill");
                return MonsterAction::Skill { index, target };
            }
        }

        match Self::choose_target(dice, foes) {
            Some(target) => MonsterAction::Attack { target },
            None => MonsterAction::Pass,
        }
    }

    /// After a player turn, maybe pick a legendary action the boss can
    /// still afford this round.
    pub fn legendary_opportunity(&self, dice: &mut dyn DiceSource, boss: &Combatant) -> Option<usize> {
        let pool = boss.monster_profile()?.legendary.as_ref()?;
        if boss.is_down() || boss.is_incapacitated() {
            return None;
        }
        let affordable = pool.affordable();
        if affordable.is_empty() || !dice.chance(self.legendary_chance) {
            return None;
        }
        Some(affordable[dice.pick(affordable.len())])
    }
}

fn ultimate_ready(actor: &Combatant, full_rounds_elapsed: u32) -> bool {
    actor.is_boss()
        && actor
            .monster_profile()
            .and_then(|m| m.ultimate.as_ref())
            .is_some_and(|u| !u.used && full_rounds_elapsed >= u.round_trigger)
}

/// Living ally with the lowest HP ratio that is missing any HP.
pub fn most_wounded(allies: &[&Combatant]) -> Option<CombatantId> {
    allies
        .iter()
        .filter(|a| a.is_alive() && a.hit_points.missing() > 0)
        .min_by(|a, b| a.hit_points.ratio().total_cmp(&b.hit_points.ratio()))
        .map(|a| a.id)
}

/// When in a fight a line of dialogue is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogueMoment {
    Engage,
    Ultimate,
    LegendaryAction,
    Defeated,
}

/// Opaque flavor text. The engine only displays what it returns.
pub trait DialogueSource: Send {
    fn line(&mut self, speaker: &Combatant, moment: DialogueMoment) -> Option<String>;
}

/// Says nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentDialogue;

impl DialogueSource for SilentDialogue {
    fn line(&mut self, _speaker: &Combatant, _moment: DialogueMoment) -> Option<String> {
        None
    }
}
