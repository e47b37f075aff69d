//! Headless combat for programmatic use.
//!
//! Runs a whole encounter without a presentation layer. It's designed for:
//! - Balance simulation over many seeded fights
//! - Integration tests
//! - Script-driven sessions
//!
//! # Example
//!
//! ```ignore
//! use crawler_core::headless::HeadlessCombat;
//! use crawler_core::{testing, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let party = vec![testing::fighter("Roland"), testing::cleric("Mira")];
//!     let encounter = vec![testing::goblin("Snik"), testing::goblin("Grik")];
//!
//!     let combat = HeadlessCombat::new(party, encounter, EngineConfig::new().with_seed(7))?;
//!     let closure = combat.run().await?;
//!     println!("{:?} after {} events", closure.result, closure.log.len());
//!     Ok(())
//! }
//! ```

use crate::behavior::most_wounded;
use crate::combatant::{Combatant, SkillTarget};
use crate::config::EngineConfig;
use crate::outcome::CombatClosure;
use crate::session::{CombatError, CombatSession, PlayerAction};
use crate::sync::{self, Acknowledge};
use thiserror::Error;

/// Default cap on turns before a headless run gives up.
pub const DEFAULT_TURN_LIMIT: u32 = 500;

#[derive(Debug, Error)]
pub enum HeadlessError {
    #[error("Combat error: {0}")]
    Combat(#[from] CombatError),

    #[error("Combat did not finish within {0} turns")]
    TurnLimit(u32),
}

/// A combat that plays itself.
#[derive(Debug)]
pub struct HeadlessCombat {
    session: CombatSession,
    turn_limit: u32,
}

impl HeadlessCombat {
    pub fn new(
        party: Vec<Combatant>,
        encounter: Vec<Combatant>,
        config: EngineConfig,
    ) -> Result<Self, HeadlessError> {
        Ok(Self::from_session(CombatSession::new(party, encounter, config)?))
    }

    /// Take over an existing session, e.g. one built with scripted dice.
    pub fn from_session(session: CombatSession) -> Self {
        Self {
            session,
            turn_limit: DEFAULT_TURN_LIMIT,
        }
    }

    pub fn with_turn_limit(mut self, limit: u32) -> Self {
        self.turn_limit = limit;
        self
    }

    pub fn session(&self) -> &CombatSession {
        &self.session
    }

    /// Play to the end using the acknowledgement mode from the config.
    /// Manual mode has nobody to press proceed, so it runs straight
    /// through.
    pub async fn run(self) -> Result<CombatClosure, HeadlessError> {
        let (mut ack, handle) = sync::acknowledger(&self.session.config().acknowledgement);
        drop(handle);
        self.run_with(ack.as_mut()).await
    }

    /// Play to the end, assign loot round-robin and close the combat.
    pub async fn run_with(mut self, ack: &mut dyn Acknowledge) -> Result<CombatClosure, HeadlessError> {
        let mut turns = 0;
        while !self.session.is_over() {
            if turns >= self.turn_limit {
                tracing::warn!(turns, "headless combat hit its turn limit");
                return Err(HeadlessError::TurnLimit(self.turn_limit));
            }
            if self.session.is_player_turn() {
                let actor = self.session.current_actor().ok_or(CombatError::CombatOver)?;
                let action = autopilot(&self.session, actor);
                self.session.act(action, ack).await?;
            } else {
                self.session.run_monster_turn(ack).await?;
            }
            turns += 1;
        }

        self.distribute_loot()?;
        let closure = self.session.finish().map_err(|e| e.error)?;
        tracing::info!(turns, victory = closure.result.is_victory(), "headless combat finished");
        Ok(closure)
    }

    fn distribute_loot(&mut self) -> Result<(), CombatError> {
        let living: Vec<_> = self
            .session
            .party()
            .filter(|c| c.is_alive())
            .map(|c| c.id)
            .collect();
        if living.is_empty() {
            return Ok(());
        }
        let pending: Vec<_> = self.session.pending_loot().map(|l| l.item.id).collect();
        for (i, item) in pending.into_iter().enumerate() {
            self.session.assign_loot(item, living[i % living.len()])?;
        }
        Ok(())
    }
}

/// Pick an action for a player with no human behind it.
///
/// Heal the most wounded ally below half HP if a heal is ready, else use
/// the first ready damaging skill, else attack the weakest monster.
pub fn autopilot(session: &CombatSession, actor: &Combatant) -> PlayerAction {
    let hurt: Vec<&Combatant> = session
        .party()
        .filter(|c| c.is_alive() && c.hit_points.current * 2 < c.hit_points.maximum)
        .collect();
    if let Some(patient) = most_wounded(&hurt) {
        let heal = actor.skills.iter().enumerate().find_map(|(i, s)| {
            if !s.is_ready() || s.heal.is_none() {
                return None;
            }
            match s.target {
                SkillTarget::SingleAlly => Some((i, Some(patient))),
                SkillTarget::AllAllies => Some((i, None)),
                SkillTarget::Myself if patient == actor.id => Some((i, None)),
                _ => None,
            }
        });
        if let Some((skill, target)) = heal {
            return PlayerAction::UseSkill { skill, target };
        }
    }

    let weakest = session
        .enemies()
        .filter(|c| c.is_alive())
        .min_by_key(|c| c.hit_points.current)
        .map(|c| c.id);
    let Some(weakest) = weakest else {
        return PlayerAction::Pass;
    };

    let strike = actor
        .skills
        .iter()
        .position(|s| s.is_ready() && s.deals_damage() && s.target.is_hostile());
    if let Some(skill) = strike {
        let target = actor.skills[skill].target.needs_target().then_some(weakest);
        return PlayerAction::UseSkill { skill, target };
    }

    PlayerAction::Attack { target: weakest }
}
