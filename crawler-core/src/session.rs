//! CombatSession - the primary public API for running a fight.
//!
//! The session owns the roster and is the only place combatants change.
//! Players go through select, then confirm (or cancel); monsters act through
//! [`CombatSession::run_monster_turn`]. Every roll that the presentation
//! layer shows is followed by an [`Acknowledge`] wait, and values are read
//! back from the roster after each wait.

use crate::behavior::{BehaviorPolicy, DialogueMoment, DialogueSource, MonsterAction, SilentDialogue};
use crate::buffs::{self, ActiveBuff, BuffKind, TickReport};
use crate::combatant::{
    AttackKind, Combatant, CombatantId, Condition, GroupEffect, ItemId, LegendaryEffect, SaveRequirement,
    Side, Skill, SkillTarget,
};
use crate::config::EngineConfig;
use crate::damage::{self, DamageOutcome, DamageRequest, DamageType, TypeInteraction};
use crate::dice::{DamageDice, DiceSource};
use crate::events::{CombatEvent, CombatLog};
use crate::outcome::{self, CombatClosure, CombatResult, LootItem, PostCombatPhase, Verdict};
use crate::persist::{CombatSnapshot, PersistError};
use crate::rules;
use crate::sync::{Acknowledge, SuspensionPoint};
use crate::turns::{TurnOrder, TurnSequencer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors from CombatSession operations. None of them change the roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("{name} is not ready ({turns} turn(s) of cooldown left)")]
    SkillUnavailable { name: String, turns: u32 },

    #[error("No skill at index {0}")]
    UnknownSkill(usize),

    #[error("It is not a player's turn")]
    NotPlayerTurn,

    #[error("It is not a monster's turn")]
    NotMonsterTurn,

    #[error("No action has been selected")]
    NoPendingAction,

    #[error("Combat is already over")]
    CombatOver,

    #[error("Combat is still in progress")]
    CombatNotOver,

    #[error("The party has no living members")]
    EmptyParty,

    #[error("The encounter has no living monsters")]
    EmptyEncounter,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No loot item {0:?}")]
    UnknownLoot(ItemId),

    #[error("{0} has already been assigned")]
    LootAlreadyAssigned(String),

    #[error("{0} loot item(s) still need an owner")]
    LootPending(usize),
}

/// Returned by [`CombatSession::finish`] when the session cannot close yet.
/// The session is handed back untouched.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FinishError {
    pub session: Box<CombatSession>,
    pub error: CombatError,
}

/// What the acting player wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAction {
    Attack {
        target: CombatantId,
    },
    /// `skill` indexes the actor's skill list. `target` is required for
    /// single-target skills and ignored otherwise.
    UseSkill {
        skill: usize,
        target: Option<CombatantId>,
    },
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatPhase {
    InProgress,
    /// Enemies are down; loot may still need owners.
    Victory,
    Defeat,
}

/// One attack's worth of parameters, from a weapon, skill or legendary
/// action.
#[derive(Debug, Clone)]
struct Strike {
    label: String,
    damage: DamageDice,
    damage_type: DamageType,
    kind: AttackKind,
    finesse: bool,
    accuracy_bonus: i32,
    reckless: bool,
    skill: Option<Skill>,
}

impl Strike {
    fn weapon(attacker: &Combatant) -> Self {
        let weapon = &attacker.weapon;
        Self {
            label: weapon.name.clone(),
            damage: weapon.damage,
            damage_type: weapon.damage_type,
            kind: weapon.kind,
            finesse: weapon.finesse,
            accuracy_bonus: 0,
            reckless: false,
            skill: None,
        }
    }

    fn skill(skill: &Skill, damage: DamageDice) -> Self {
        Self {
            label: skill.name.clone(),
            damage,
            damage_type: skill.damage_type,
            kind: skill.kind,
            finesse: false,
            accuracy_bonus: skill.accuracy_bonus,
            reckless: skill.reckless,
            skill: Some(skill.clone()),
        }
    }

    fn legendary(name: &str, damage: DamageDice, damage_type: DamageType) -> Self {
        Self {
            label: name.to_string(),
            damage,
            damage_type,
            kind: AttackKind::Weapon,
            finesse: false,
            accuracy_bonus: 0,
            reckless: false,
            skill: None,
        }
    }

    /// Thorns and reflect only answer weapon blows.
    fn reflectable(&self) -> bool {
        self.kind == AttackKind::Weapon
    }
}

/// A single fight between a party and an encounter.
pub struct CombatSession {
    roster: Vec<Combatant>,
    sequencer: TurnSequencer,
    log: CombatLog,
    loot: Vec<LootItem>,
    experience_pool: u32,
    phase: CombatPhase,
    pending: Option<PlayerAction>,
    defeated: HashSet<CombatantId>,
    config: EngineConfig,
    policy: BehaviorPolicy,
    dice: Box<dyn DiceSource + Send>,
    dialogue: Box<dyn DialogueSource>,
}

impl fmt::Debug for CombatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombatSession")
            .field("roster", &self.roster)
            .field("sequencer", &self.sequencer)
            .field("phase", &self.phase)
            .field("pending", &self.pending)
            .field("loot", &self.loot)
            .field("experience_pool", &self.experience_pool)
            .finish_non_exhaustive()
    }
}

impl CombatSession {
    /// Start a combat with dice built from the config.
    pub fn new(
        party: Vec<Combatant>,
        encounter: Vec<Combatant>,
        config: EngineConfig,
    ) -> Result<Self, CombatError> {
        let dice = config.dice();
        Self::with_dice(party, encounter, config, dice)
    }

    /// Start a combat with an explicit dice source.
    ///
    /// Resets every skill cooldown and legendary budget and fixes the
    /// initiative order. The first combatant's turn is opened immediately.
    /// The config is validated first.
    pub fn with_dice(
        party: Vec<Combatant>,
        encounter: Vec<Combatant>,
        config: EngineConfig,
        dice: Box<dyn DiceSource + Send>,
    ) -> Result<Self, CombatError> {
        config
            .validate()
            .map_err(|e| CombatError::InvalidConfig(e.to_string()))?;
        if !party.iter().any(|c| c.is_player() && c.is_alive()) {
            return Err(CombatError::EmptyParty);
        }
        if !encounter.iter().any(|c| !c.is_player() && c.is_alive()) {
            return Err(CombatError::EmptyEncounter);
        }

        let mut roster: Vec<Combatant> = party.into_iter().chain(encounter).collect();
        for combatant in &mut roster {
            combatant.reset_cooldowns();
            if let Some(pool) = combatant
                .monster_profile_mut()
                .and_then(|m| m.legendary.as_mut())
            {
                pool.refresh();
            }
            buffs::recompute_stats(combatant);
        }

        let sequencer = TurnSequencer::new(TurnOrder::new(roster.iter()));
        let defeated = roster.iter().filter(|c| c.is_down()).map(|c| c.id).collect();

        tracing::info!(
            party = roster.iter().filter(|c| c.is_player()).count(),
            monsters = roster.iter().filter(|c| !c.is_player()).count(),
            "combat started"
        );

        let mut session = Self {
            roster,
            sequencer,
            log: CombatLog::new(),
            loot: Vec::new(),
            experience_pool: 0,
            phase: CombatPhase::InProgress,
            pending: None,
            defeated,
            policy: BehaviorPolicy::from_config(&config),
            config,
            dice,
            dialogue: Box::new(SilentDialogue),
        };
        session.log.push(CombatEvent::system(session.sequencer.turn_number(), "Round 1"));
        session.open_turn();
        Ok(session)
    }

    /// Rebuild a session from a snapshot. Dice come from the config; any
    /// selected-but-unconfirmed action is not part of a snapshot.
    pub fn restore(snapshot: CombatSnapshot, config: EngineConfig) -> Result<Self, PersistError> {
        snapshot.validate()?;
        config.validate()?;
        let dice = config.dice();
        let order = TurnOrder::from_ids(snapshot.turn_order);
        let mut sequencer = TurnSequencer::restore(
            order,
            snapshot.turn_index,
            snapshot.full_rounds_elapsed,
            snapshot.turn_number,
        );
        if snapshot.phase == CombatPhase::InProgress {
            sequencer.begin_turn();
        } else {
            sequencer.terminate();
        }
        let defeated = snapshot
            .roster
            .iter()
            .filter(|c| c.is_down())
            .map(|c| c.id)
            .collect();

        Ok(Self {
            roster: snapshot.roster,
            sequencer,
            log: CombatLog::from_events(snapshot.log),
            loot: snapshot.loot,
            experience_pool: snapshot.experience_pool,
            phase: snapshot.phase,
            pending: None,
            defeated,
            policy: BehaviorPolicy::from_config(&config),
            config,
            dice,
            dialogue: Box::new(SilentDialogue),
        })
    }

    /// Install a dialogue source. Bosses announce themselves right away.
    pub fn with_dialogue(mut self, dialogue: Box<dyn DialogueSource>) -> Self {
        self.dialogue = dialogue;
        let turn = self.sequencer.turn_number();
        for combatant in self.roster.iter().filter(|c| c.is_boss() && c.is_alive()) {
            if let Some(line) = self.dialogue.line(combatant, DialogueMoment::Engage) {
                self.log
                    .push(CombatEvent::new(turn, combatant, "Speaks").with_effect(line));
            }
        }
        self
    }

    /// Capture the state a caller needs to persist.
    pub fn snapshot(&self) -> CombatSnapshot {
        CombatSnapshot::new(
            self.roster.clone(),
            self.sequencer.order().ids().to_vec(),
            self.sequencer.index().unwrap_or(0),
            self.sequencer.full_rounds_elapsed(),
            self.sequencer.turn_number(),
            self.phase,
            self.loot.clone(),
            self.experience_pool,
            self.log.events().to_vec(),
        )
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn roster(&self) -> &[Combatant] {
        &self.roster
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.roster.iter().find(|c| c.id == id)
    }

    pub fn party(&self) -> impl Iterator<Item = &Combatant> {
        self.roster.iter().filter(|c| c.is_player())
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Combatant> {
        self.roster.iter().filter(|c| !c.is_player())
    }

    pub fn current_actor(&self) -> Option<&Combatant> {
        self.sequencer.current().and_then(|id| self.combatant(id))
    }

    pub fn is_player_turn(&self) -> bool {
        self.phase == CombatPhase::InProgress && self.current_actor().is_some_and(|c| c.is_player())
    }

    pub fn phase(&self) -> CombatPhase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        self.phase != CombatPhase::InProgress
    }

    pub fn turn_order(&self) -> &TurnOrder {
        self.sequencer.order()
    }

    pub fn round(&self) -> u32 {
        self.sequencer.round()
    }

    pub fn full_rounds_elapsed(&self) -> u32 {
        self.sequencer.full_rounds_elapsed()
    }

    pub fn turn_number(&self) -> u32 {
        self.sequencer.turn_number()
    }

    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    pub fn loot(&self) -> &[LootItem] {
        &self.loot
    }

    pub fn pending_loot(&self) -> impl Iterator<Item = &LootItem> {
        self.loot.iter().filter(|l| l.assigned_to.is_none())
    }

    pub fn experience_pool(&self) -> u32 {
        self.experience_pool
    }

    pub fn pending_action(&self) -> Option<&PlayerAction> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Player turns
    // ========================================================================

    /// Choose an action for the current player. Rejected actions leave the
    /// session untouched; a valid one replaces any earlier selection.
    pub fn select_action(&mut self, action: PlayerAction) -> Result<(), CombatError> {
        let actor = self.current_player_index()?;
        self.validate(actor, &action)?;
        tracing::debug!(actor = %self.roster[actor].name, ?action, "action selected");
        self.pending = Some(action);
        Ok(())
    }

    /// Drop the selected action. Nothing has been rolled yet.
    pub fn cancel_action(&mut self) -> Result<PlayerAction, CombatError> {
        self.pending.take().ok_or(CombatError::NoPendingAction)
    }

    /// Run the selected action to completion, then give bosses their
    /// legendary opportunity and move to the next turn. Returns the events
    /// logged along the way.
    pub async fn confirm_action(
        &mut self,
        ack: &mut dyn Acknowledge,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        let actor = self.current_player_index()?;
        let action = self.pending.ok_or(CombatError::NoPendingAction)?;
        self.validate(actor, &action)?;
        self.pending = None;

        let cursor = self.log.len();
        match action {
            PlayerAction::Attack { target } => {
                let strike = Strike::weapon(&self.roster[actor]);
                let target = self.index_of(target);
                self.perform_strike(ack, actor, target, &strike).await;
            }
            PlayerAction::UseSkill { skill, target } => {
                self.perform_skill(ack, actor, skill, target).await;
            }
            PlayerAction::Pass => {
                let turn = self.sequencer.turn_number();
                self.log.push(CombatEvent::new(turn, &self.roster[actor], "Pass"));
            }
        }

        if !self.resolve_outcome() {
            self.legendary_phase(ack).await;
        }
        self.end_turn();
        Ok(self.log.since(cursor).to_vec())
    }

    /// Select and confirm in one call.
    pub async fn act(
        &mut self,
        action: PlayerAction,
        ack: &mut dyn Acknowledge,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        self.select_action(action)?;
        self.confirm_action(ack).await
    }

    fn current_player_index(&self) -> Result<usize, CombatError> {
        if self.phase != CombatPhase::InProgress {
            return Err(CombatError::CombatOver);
        }
        let id = self.sequencer.current().ok_or(CombatError::CombatOver)?;
        let index = self.index_of(id);
        if !self.roster[index].is_player() {
            return Err(CombatError::NotPlayerTurn);
        }
        Ok(index)
    }

    fn validate(&self, actor: usize, action: &PlayerAction) -> Result<(), CombatError> {
        let side = self.roster[actor].side();
        match *action {
            PlayerAction::Attack { target } => self.require_living(Some(target), side.opposing()),
            PlayerAction::UseSkill { skill, target } => {
                let skill_ref = self.roster[actor]
                    .skills
                    .get(skill)
                    .ok_or(CombatError::UnknownSkill(skill))?;
                if !skill_ref.is_ready() {
                    return Err(CombatError::SkillUnavailable {
                        name: skill_ref.name.clone(),
                        turns: skill_ref.cooldown_remaining,
                    });
                }
                match skill_ref.target {
                    SkillTarget::SingleEnemy => self.require_living(target, side.opposing()),
                    SkillTarget::SingleAlly => self.require_living(target, side),
                    SkillTarget::AllEnemies | SkillTarget::AllAllies | SkillTarget::Myself => Ok(()),
                }
            }
            PlayerAction::Pass => Ok(()),
        }
    }

    fn require_living(&self, target: Option<CombatantId>, side: Side) -> Result<(), CombatError> {
        let id = target.ok_or_else(|| CombatError::InvalidTarget("no target given".to_string()))?;
        let combatant = self
            .combatant(id)
            .ok_or_else(|| CombatError::InvalidTarget(format!("{id} is not in this combat")))?;
        if combatant.is_down() {
            return Err(CombatError::InvalidTarget(format!("{} is down", combatant.name)));
        }
        if combatant.side() != side {
            return Err(CombatError::InvalidTarget(format!(
                "{} is on the wrong side",
                combatant.name
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Monster turns
    // ========================================================================

    /// Let the current monster act and move to the next turn.
    pub async fn run_monster_turn(
        &mut self,
        ack: &mut dyn Acknowledge,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        if self.phase != CombatPhase::InProgress {
            return Err(CombatError::CombatOver);
        }
        let id = self.sequencer.current().ok_or(CombatError::CombatOver)?;
        let actor = self.index_of(id);
        if self.roster[actor].is_player() {
            return Err(CombatError::NotMonsterTurn);
        }

        let cursor = self.log.len();
        let decision = {
            let me = &self.roster[actor];
            let allies: Vec<&Combatant> = self
                .roster
                .iter()
                .filter(|c| c.side() == me.side() && c.is_alive())
                .collect();
            let foes: Vec<&Combatant> = self.roster.iter().filter(|c| c.side() != me.side()).collect();
            self.policy.decide(
                self.dice.as_mut(),
                me,
                &allies,
                &foes,
                self.sequencer.full_rounds_elapsed(),
            )
        };

        match decision {
            MonsterAction::Ultimate => self.perform_ultimate(ack, actor).await,
            MonsterAction::Skill { index, target } => {
                self.perform_skill(ack, actor, index, target).await;
            }
            MonsterAction::Attack { target } => {
                let strike = Strike::weapon(&self.roster[actor]);
                let target = self.index_of(target);
                self.perform_strike(ack, actor, target, &strike).await;
            }
            MonsterAction::Pass => {
                let turn = self.sequencer.turn_number();
                self.log.push(CombatEvent::new(turn, &self.roster[actor], "Pass"));
            }
        }

        self.end_turn();
        Ok(self.log.since(cursor).to_vec())
    }

    /// Run monster turns until a player is up or the fight ends.
    pub async fn run_until_player_turn(
        &mut self,
        ack: &mut dyn Acknowledge,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        let cursor = self.log.len();
        while self.phase == CombatPhase::InProgress && !self.is_player_turn() {
            self.run_monster_turn(ack).await?;
        }
        Ok(self.log.since(cursor).to_vec())
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Attack roll, then damage. Returns whether it hit.
    async fn perform_strike(
        &mut self,
        ack: &mut dyn Acknowledge,
        attacker: usize,
        defender: usize,
        strike: &Strike,
    ) -> bool {
        let turn = self.sequencer.turn_number();
        let advantage =
            rules::attack_advantage(&self.roster[attacker], &self.roster[defender], strike.reckless);
        let mut outcome = rules::resolve_attack(
            self.dice.as_mut(),
            &self.roster[attacker],
            &self.roster[defender],
            strike.kind,
            strike.finesse,
            advantage,
            strike.accuracy_bonus,
        );

        let mut evaded = false;
        let evasion = self.roster[defender].passives().map_or(0, |p| p.evasion_percent);
        if outcome.hit && evasion > 0 && self.dice.chance(f64::from(evasion) / 100.0) {
            outcome.hit = false;
            outcome.critical_hit = false;
            evaded = true;
        }
        let critical = self.roster[attacker].passives().map_or(0, |p| p.critical_percent);
        if outcome.hit
            && !outcome.critical_hit
            && critical > 0
            && self.dice.chance(f64::from(critical) / 100.0)
        {
            outcome.critical_hit = true;
        }

        let point = SuspensionPoint::AttackRoll {
            attacker: self.roster[attacker].name.clone(),
            target: self.roster[defender].name.clone(),
            outcome: outcome.clone(),
        };
        ack.acknowledge(&point).await;

        if !outcome.hit {
            let text = if evaded {
                "Evaded"
            } else if outcome.critical_miss {
                "Critical miss"
            } else {
                "Miss"
            };
            let event = CombatEvent::new(turn, &self.roster[attacker], &strike.label)
                .with_target(self.roster[defender].name.clone())
                .with_effect(text);
            self.log.push(event);
            return false;
        }

        let base = strike.damage.roll(self.dice.as_mut());
        let mut request = DamageRequest::new(base, strike.damage_type)
            .critical(outcome.critical_hit)
            .stat_bonus_percent(self.config.stat_bonus_percent);
        if let Some(skill) = &strike.skill {
            request = request.with_skill(skill);
        }
        let result = damage::compute_damage(&self.roster[attacker], &self.roster[defender], request);

        let point = SuspensionPoint::DamageResult {
            target: self.roster[defender].name.clone(),
            damage_type: strike.damage_type,
            outcome: result,
        };
        ack.acknowledge(&point).await;

        self.apply_damage(
            attacker,
            defender,
            result,
            strike.damage_type,
            &strike.label,
            strike.reflectable(),
        );
        true
    }

    /// Saving throw, then (half) damage. Returns whether the target saved.
    async fn perform_save(
        &mut self,
        ack: &mut dyn Acknowledge,
        caster: usize,
        target: usize,
        skill: &Skill,
        save: SaveRequirement,
    ) -> bool {
        let turn = self.sequencer.turn_number();
        let throw = rules::resolve_saving_throw(self.dice.as_mut(), &self.roster[target], save.ability, save.dc);
        let success = throw.success;

        let point = SuspensionPoint::SavingThrow {
            target: self.roster[target].name.clone(),
            save: throw,
        };
        ack.acknowledge(&point).await;

        let Some(dice) = skill.damage else {
            let text = if success { "Saved" } else { "Failed save" };
            let event = CombatEvent::new(turn, &self.roster[caster], &skill.name)
                .with_target(self.roster[target].name.clone())
                .with_effect(text);
            self.log.push(event);
            return success;
        };

        let base = dice.roll(self.dice.as_mut());
        let request = DamageRequest::new(base, skill.damage_type)
            .with_skill(skill)
            .saved(success)
            .stat_bonus_percent(self.config.stat_bonus_percent);
        let result = damage::compute_damage(&self.roster[caster], &self.roster[target], request);

        let point = SuspensionPoint::DamageResult {
            target: self.roster[target].name.clone(),
            damage_type: skill.damage_type,
            outcome: result,
        };
        ack.acknowledge(&point).await;

        if result.no_effect {
            let event = CombatEvent::new(turn, &self.roster[caster], &skill.name)
                .with_target(self.roster[target].name.clone())
                .with_effect("No effect");
            self.log.push(event);
        } else {
            self.apply_damage(caster, target, result, skill.damage_type, &skill.name, false);
        }
        success
    }

    /// Put a computed damage outcome onto the roster, with lifesteal,
    /// thorns and reflect. Returns HP actually lost.
    fn apply_damage(
        &mut self,
        attacker: usize,
        defender: usize,
        result: DamageOutcome,
        damage_type: DamageType,
        label: &str,
        reflectable: bool,
    ) -> i32 {
        let turn = self.sequencer.turn_number();

        let target = &mut self.roster[defender];
        target.hit_points.absorb(result.absorbed);
        let lost = target.hit_points.lose(result.to_hp);

        let mut effects = Vec::new();
        if result.critical {
            effects.push("Critical hit!".to_string());
        }
        match result.interaction {
            TypeInteraction::Normal => {}
            TypeInteraction::Resisted => effects.push("Resisted".to_string()),
            TypeInteraction::Reduced(pct) => effects.push(format!("Reduced {pct}%")),
            TypeInteraction::Vulnerable => effects.push("Vulnerable".to_string()),
            TypeInteraction::Immune => effects.push("Immune".to_string()),
        }
        if result.absorbed > 0 {
            effects.push(format!("{} absorbed", result.absorbed));
        }
        let mut event = CombatEvent::new(turn, &self.roster[attacker], label)
            .with_target(self.roster[defender].name.clone())
            .with_damage(result.amount, damage_type);
        if !effects.is_empty() {
            event = event.with_effect(effects.join(", "));
        }
        self.log.push(event);

        tracing::debug!(
            attacker = %self.roster[attacker].name,
            defender = %self.roster[defender].name,
            amount = result.amount,
            lost,
            "damage applied"
        );

        let lifesteal = self.roster[attacker].passives().map_or(0, |p| p.lifesteal_percent);
        if lost > 0 && lifesteal > 0 && self.roster[attacker].is_alive() {
            let healed = self.roster[attacker]
                .hit_points
                .heal(damage::percent_of(lost, i32::from(lifesteal)));
            if healed > 0 {
                let event = CombatEvent::new(turn, &self.roster[attacker], "Lifesteal").with_heal(healed);
                self.log.push(event);
            }
        }

        if reflectable && result.amount > 0 && self.roster[attacker].is_alive() {
            let thorns = self.roster[defender].passives().map_or(0, |p| i32::from(p.thorns_percent));
            let reflect: i32 = self.roster[defender]
                .buffs
                .iter()
                .filter(|b| b.kind == BuffKind::DamageReflect)
                .map(|b| b.magnitude)
                .sum();
            let reflected = damage::percent_of(result.amount, thorns + reflect);
            if reflected > 0 {
                let back = self.roster[attacker].hit_points.lose(reflected);
                let event = CombatEvent::new(turn, &self.roster[defender], "Reflect")
                    .with_target(self.roster[attacker].name.clone())
                    .with_damage(back, damage_type);
                self.log.push(event);
            }
        }

        if self.roster[defender].is_down() {
            self.on_defeated(defender);
        }
        if self.roster[attacker].is_down() {
            self.on_defeated(attacker);
        }
        lost
    }

    async fn perform_skill(
        &mut self,
        ack: &mut dyn Acknowledge,
        actor: usize,
        index: usize,
        target: Option<CombatantId>,
    ) {
        let skill = self.roster[actor].skills[index].clone();
        self.roster[actor].skills[index].cooldown_remaining = skill.cooldown;
        if skill.reckless {
            self.roster[actor].add_condition(Condition::Reckless, skill.name.clone(), 1);
        }

        let side = self.roster[actor].side();
        let targets: Vec<usize> = match skill.target {
            SkillTarget::SingleEnemy | SkillTarget::SingleAlly => target
                .and_then(|id| self.position_of(id))
                .filter(|&i| self.roster[i].is_alive())
                .into_iter()
                .collect(),
            SkillTarget::AllEnemies => self.living_indices(side.opposing()),
            SkillTarget::AllAllies => self.living_indices(side),
            SkillTarget::Myself => vec![actor],
        };

        tracing::debug!(
            actor = %self.roster[actor].name,
            skill = %skill.name,
            targets = targets.len(),
            "skill used"
        );

        if !skill.target.is_hostile() {
            for &t in &targets {
                self.apply_support(actor, t, &skill);
            }
            return;
        }

        for &t in &targets {
            if self.roster[actor].is_down() {
                break;
            }
            if self.roster[t].is_down() {
                continue;
            }
            let afflicted = match (skill.save, skill.damage) {
                (Some(save), _) => !self.perform_save(ack, actor, t, &skill, save).await,
                (None, Some(dice)) => {
                    let strike = Strike::skill(&skill, dice);
                    let mut landed = false;
                    for _ in 0..skill.hits {
                        if self.roster[t].is_down() || self.roster[actor].is_down() {
                            break;
                        }
                        landed |= self.perform_strike(ack, actor, t, &strike).await;
                    }
                    landed
                }
                (None, None) => true,
            };
            if afflicted && self.roster[t].is_alive() {
                self.apply_riders(actor, t, &skill, true);
            }
        }
    }

    fn apply_support(&mut self, caster: usize, target: usize, skill: &Skill) {
        let turn = self.sequencer.turn_number();
        let mut event = CombatEvent::new(turn, &self.roster[caster], &skill.name)
            .with_target(self.roster[target].name.clone());
        let mut logged = false;

        if let Some(heal) = skill.heal {
            let amount = heal.roll(self.dice.as_mut());
            let healed = self.roster[target].hit_points.heal(amount);
            event = event.with_heal(healed);
            logged = true;
        }
        if let Some(temporary) = skill.temporary_hp {
            self.roster[target].hit_points.grant_temporary(temporary);
            event = event.with_effect(format!("{temporary} temporary HP"));
            logged = true;
        }
        if logged {
            self.log.push(event);
        }
        self.apply_riders(caster, target, skill, false);
    }

    /// Conditions and buffs a skill leaves on its target. Debuffs belong
    /// to the holder; friendly buffs belong to the caster.
    fn apply_riders(&mut self, caster: usize, target: usize, skill: &Skill, hostile: bool) {
        let turn = self.sequencer.turn_number();
        let caster_id = self.roster[caster].id;
        let mut effects = Vec::new();

        if let Some((condition, rounds)) = skill.condition {
            self.roster[target].add_condition(condition, skill.name.clone(), rounds);
            effects.push(format!("{condition} for {rounds} round(s)"));
        }
        if let Some(template) = &skill.buff {
            let holder = &mut self.roster[target];
            let owner = if hostile { holder.id } else { caster_id };
            let mut buff = ActiveBuff::new(
                template.kind,
                template.magnitude,
                owner,
                template.turns,
                skill.name.clone(),
            );
            buff.icon = skill.icon.clone();
            buff.taunt = template.taunt;
            buffs::apply_buff(holder, buff);
            effects.push(format!(
                "{} {:+} for {} turn(s)",
                template.kind, template.magnitude, template.turns
            ));
        }

        if !effects.is_empty() {
            let event = CombatEvent::new(turn, &self.roster[caster], &skill.name)
                .with_target(self.roster[target].name.clone())
                .with_effect(effects.join(", "));
            self.log.push(event);
        }
    }

    /// Boss ultimate: damage to every living foe, a group effect, optional
    /// lifesteal. Usable once per fight.
    async fn perform_ultimate(&mut self, ack: &mut dyn Acknowledge, actor: usize) {
        let Some(ultimate) = self.roster[actor]
            .monster_profile_mut()
            .and_then(|m| m.ultimate.as_mut())
            .map(|u| {
                u.used = true;
                u.clone()
            })
        else {
            return;
        };
        let turn = self.sequencer.turn_number();

        let mut event = CombatEvent::new(turn, &self.roster[actor], &ultimate.name);
        if let Some(line) = self.dialogue.line(&self.roster[actor], DialogueMoment::Ultimate) {
            event = event.with_effect(line);
        }
        self.log.push(event);
        tracing::info!(boss = %self.roster[actor].name, ultimate = %ultimate.name, "ultimate unleashed");

        let targets = self.living_indices(self.roster[actor].side().opposing());
        let mut drained = 0;
        for t in targets {
            if self.roster[actor].is_down() {
                break;
            }
            let base = ultimate.damage.roll(self.dice.as_mut());
            let request = DamageRequest::new(base, ultimate.damage_type)
                .stat_bonus_percent(self.config.stat_bonus_percent);
            let result = damage::compute_damage(&self.roster[actor], &self.roster[t], request);

            let point = SuspensionPoint::DamageResult {
                target: self.roster[t].name.clone(),
                damage_type: ultimate.damage_type,
                outcome: result,
            };
            ack.acknowledge(&point).await;

            drained += self.apply_damage(actor, t, result, ultimate.damage_type, &ultimate.name, false);

            if self.roster[t].is_down() {
                continue;
            }
            let holder = &mut self.roster[t];
            let holder_id = holder.id;
            let effect = match &ultimate.effect {
                Some(GroupEffect::DebuffAll {
                    kind,
                    magnitude,
                    turns,
                }) => {
                    let debuff = ActiveBuff::new(*kind, *magnitude, holder_id, *turns, ultimate.name.clone());
                    buffs::apply_buff(holder, debuff);
                    Some(format!("{kind} {magnitude:+} for {turns} turn(s)"))
                }
                Some(GroupEffect::PoisonAll { damage, turns }) => {
                    let poison = ActiveBuff::new(BuffKind::Poison, *damage, holder_id, *turns, ultimate.name.clone());
                    buffs::apply_buff(holder, poison);
                    Some(format!("Poisoned for {turns} turn(s)"))
                }
                Some(GroupEffect::FreezeAll { rounds }) => {
                    holder.add_condition(Condition::Frozen, ultimate.name.clone(), *rounds);
                    Some(format!("Frozen for {rounds} round(s)"))
                }
                None => None,
            };
            if let Some(text) = effect {
                let event = CombatEvent::new(turn, &self.roster[actor], &ultimate.name)
                    .with_target(self.roster[t].name.clone())
                    .with_effect(text);
                self.log.push(event);
            }
        }

        if ultimate.lifesteal_percent > 0 && self.roster[actor].is_alive() {
            let healed = self.roster[actor]
                .hit_points
                .heal(damage::percent_of(drained, i32::from(ultimate.lifesteal_percent)));
            if healed > 0 {
                let event = CombatEvent::new(turn, &self.roster[actor], "Drain").with_heal(healed);
                self.log.push(event);
            }
        }
    }

    /// After a player turn each boss may spend from its legendary budget.
    async fn legendary_phase(&mut self, ack: &mut dyn Acknowledge) {
        let bosses: Vec<usize> = self
            .roster
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_alive() && c.monster_profile().is_some_and(|m| m.legendary.is_some()))
            .map(|(i, _)| i)
            .collect();

        for boss in bosses {
            if outcome::verdict(&self.roster) != Verdict::Ongoing {
                return;
            }
            let Some(choice) = self
                .policy
                .legendary_opportunity(self.dice.as_mut(), &self.roster[boss])
            else {
                continue;
            };
            let Some(action) = self.roster[boss]
                .monster_profile_mut()
                .and_then(|m| m.legendary.as_mut())
                .map(|pool| {
                    let action = pool.actions[choice].clone();
                    pool.remaining = pool.remaining.saturating_sub(action.cost);
                    action
                })
            else {
                continue;
            };

            let turn = self.sequencer.turn_number();
            let mut event = CombatEvent::new(turn, &self.roster[boss], format!("Legendary: {}", action.name));
            if let Some(line) = self.dialogue.line(&self.roster[boss], DialogueMoment::LegendaryAction) {
                event = event.with_effect(line);
            }
            self.log.push(event);
            tracing::info!(boss = %self.roster[boss].name, action = %action.name, "legendary action");

            match action.effect {
                LegendaryEffect::Strike { damage, damage_type } => {
                    let target = {
                        let foes: Vec<&Combatant> = self
                            .roster
                            .iter()
                            .filter(|c| c.side() != self.roster[boss].side())
                            .collect();
                        BehaviorPolicy::choose_target(self.dice.as_mut(), &foes)
                    };
                    if let Some(target) = target {
                        let strike = Strike::legendary(&action.name, damage, damage_type);
                        let target = self.index_of(target);
                        self.perform_strike(ack, boss, target, &strike).await;
                    }
                }
                LegendaryEffect::Regenerate { amount } => {
                    let healed = self.roster[boss].hit_points.heal(amount);
                    let event = CombatEvent::new(turn, &self.roster[boss], &action.name).with_heal(healed);
                    self.log.push(event);
                }
                LegendaryEffect::Empower {
                    kind,
                    magnitude,
                    turns,
                } => {
                    let holder = &mut self.roster[boss];
                    let buff = ActiveBuff::new(kind, magnitude, holder.id, turns, action.name.clone());
                    buffs::apply_buff(holder, buff);
                }
            }
        }
    }

    fn on_defeated(&mut self, index: usize) {
        let id = self.roster[index].id;
        if !self.defeated.insert(id) {
            return;
        }
        let turn = self.sequencer.turn_number();
        let mut event = CombatEvent::new(turn, &self.roster[index], "Defeated");
        if !self.roster[index].is_player() {
            if let Some(line) = self.dialogue.line(&self.roster[index], DialogueMoment::Defeated) {
                event = event.with_effect(line);
            }
        }
        self.log.push(event);

        // A downed caster gets no more turns; its buffs now tick with
        // their holders.
        for holder in self.roster.iter_mut().filter(|c| c.id != id) {
            let holder_id = holder.id;
            for buff in holder.buffs.iter_mut().filter(|b| b.owner == id) {
                buff.owner = holder_id;
            }
        }

        if let Some(profile) = self.roster[index].monster_profile() {
            self.experience_pool += profile.experience_reward;
            let drops = outcome::roll_loot(self.dice.as_mut(), &self.roster[index]);
            self.loot.extend(drops);
        }
        tracing::info!(name = %self.roster[index].name, "combatant defeated");
    }

    // ========================================================================
    // Turn flow
    // ========================================================================

    /// Check for a winner. Returns true once the combat is over.
    fn resolve_outcome(&mut self) -> bool {
        if self.phase != CombatPhase::InProgress {
            return true;
        }
        let phase = match outcome::verdict(&self.roster) {
            Verdict::Ongoing => return false,
            Verdict::Victory => CombatPhase::Victory,
            Verdict::Defeat => CombatPhase::Defeat,
        };

        for player in self.roster.iter_mut().filter(|c| c.is_player()) {
            player.conditions.clear();
            buffs::clear_buffs(player);
        }
        self.phase = phase;
        self.pending = None;
        self.sequencer.terminate();

        let turn = self.sequencer.turn_number();
        let text = match phase {
            CombatPhase::Victory => "Victory",
            _ => "Defeat",
        };
        self.log.push(CombatEvent::system(turn, text));
        tracing::info!(
            outcome = text,
            loot = self.loot.len(),
            experience = self.experience_pool,
            "combat over"
        );
        true
    }

    fn end_turn(&mut self) {
        if self.resolve_outcome() {
            return;
        }
        self.advance();
        self.open_turn();
    }

    fn advance(&mut self) {
        let roster = &self.roster;
        let step = self
            .sequencer
            .advance(|id| roster.iter().any(|c| c.id == id && c.is_alive()));
        if step.round_completed {
            self.round_boundary();
        }
    }

    /// Start turns until someone is able to act or the fight ends.
    fn open_turn(&mut self) {
        loop {
            if self.resolve_outcome() || self.start_turn() {
                return;
            }
            self.advance();
        }
    }

    fn round_boundary(&mut self) {
        let turn = self.sequencer.turn_number();
        let round = self.sequencer.round();
        self.log.push(CombatEvent::system(turn, format!("Round {round}")));

        for combatant in &mut self.roster {
            if let Some(pool) = combatant
                .monster_profile_mut()
                .and_then(|m| m.legendary.as_mut())
            {
                pool.refresh();
            }
            for condition in combatant.tick_conditions() {
                let event = CombatEvent::new(turn, combatant, "Recovered")
                    .with_effect(format!("No longer {condition}"));
                self.log.push(event);
            }
        }
        tracing::info!(round, "round started");
    }

    /// Start-of-turn upkeep. Returns false if the actor cannot act.
    fn start_turn(&mut self) -> bool {
        let Some(actor_id) = self.sequencer.current() else {
            return false;
        };
        let actor = self.index_of(actor_id);
        let turn = self.sequencer.turn_number();

        let report = buffs::tick_start_of_turn(&mut self.roster[actor]);
        self.log_tick(turn, actor, &report);
        for holder in 0..self.roster.len() {
            if holder == actor || !self.roster[holder].buffs.iter().any(|b| b.owner == actor_id) {
                continue;
            }
            let report = buffs::tick_owned(&mut self.roster[holder], actor_id);
            self.log_tick(turn, holder, &report);
        }

        self.roster[actor].tick_cooldowns();

        let regeneration = self.roster[actor].passives().map_or(0, |p| p.regeneration);
        if regeneration > 0 && self.roster[actor].is_alive() {
            let healed = self.roster[actor].hit_points.heal(regeneration);
            if healed > 0 {
                let event = CombatEvent::new(turn, &self.roster[actor], "Regeneration").with_heal(healed);
                self.log.push(event);
            }
        }

        for index in 0..self.roster.len() {
            if self.roster[index].is_down() {
                self.on_defeated(index);
            }
        }

        let combatant = &self.roster[actor];
        if combatant.is_down() {
            return false;
        }
        if combatant.is_incapacitated() {
            let event = CombatEvent::new(turn, combatant, "Pass").with_effect("Frozen and cannot act");
            self.log.push(event);
            tracing::info!(name = %combatant.name, "turn skipped");
            return false;
        }

        self.sequencer.begin_turn();
        tracing::info!(
            name = %combatant.name,
            round = self.sequencer.round(),
            turn,
            "turn started"
        );
        true
    }

    fn log_tick(&mut self, turn: u32, holder: usize, report: &TickReport) {
        let combatant = &self.roster[holder];
        if report.poisoned > 0 {
            self.log.push(
                CombatEvent::new(turn, combatant, "Poison")
                    .with_target(combatant.name.clone())
                    .with_damage(report.poisoned, DamageType::Poison),
            );
        }
        if report.healed > 0 {
            self.log
                .push(CombatEvent::new(turn, combatant, "Regeneration").with_heal(report.healed));
        }
        for expired in &report.expired {
            self.log.push(
                CombatEvent::new(turn, combatant, "Expired")
                    .with_effect(format!("{} ({}) wore off", expired.origin, expired.kind)),
            );
        }
    }

    // ========================================================================
    // Closing
    // ========================================================================

    /// Give a dropped item to a living party member.
    pub fn assign_loot(&mut self, item: ItemId, recipient: CombatantId) -> Result<(), CombatError> {
        if self.phase == CombatPhase::InProgress {
            return Err(CombatError::CombatNotOver);
        }
        let slot = self
            .loot
            .iter()
            .position(|l| l.item.id == item)
            .ok_or(CombatError::UnknownLoot(item))?;
        if self.loot[slot].assigned_to.is_some() {
            return Err(CombatError::LootAlreadyAssigned(self.loot[slot].item.name.clone()));
        }
        let owner = self
            .roster
            .iter()
            .position(|c| c.id == recipient && c.is_player())
            .ok_or_else(|| CombatError::InvalidTarget(format!("{recipient} is not a party member")))?;
        if self.roster[owner].is_down() {
            return Err(CombatError::InvalidTarget(format!(
                "{} is down",
                self.roster[owner].name
            )));
        }

        self.loot[slot].assigned_to = Some(recipient);
        let loot_item = self.loot[slot].item.clone();
        tracing::info!(item = %loot_item.name, recipient = %self.roster[owner].name, "loot assigned");
        if let Some(profile) = self.roster[owner].player_profile_mut() {
            profile.inventory.push(loot_item);
        }
        Ok(())
    }

    /// Whether [`CombatSession::finish`] would succeed.
    pub fn ready_to_finish(&self) -> Result<(), CombatError> {
        match self.phase {
            CombatPhase::InProgress => Err(CombatError::CombatNotOver),
            CombatPhase::Victory => match self.pending_loot().count() {
                0 => Ok(()),
                pending => Err(CombatError::LootPending(pending)),
            },
            CombatPhase::Defeat => Ok(()),
        }
    }

    /// Close the combat: split experience, resolve level-ups and hand back
    /// the party. Consumes the session.
    pub fn finish(self) -> Result<CombatClosure, FinishError> {
        if let Err(error) = self.ready_to_finish() {
            return Err(FinishError {
                session: Box::new(self),
                error,
            });
        }

        let victory = self.phase == CombatPhase::Victory;
        let Self {
            roster,
            log,
            loot,
            experience_pool,
            ..
        } = self;
        let mut party: Vec<Combatant> = roster.into_iter().filter(Combatant::is_player).collect();

        let (result, level_ups) = if victory {
            let level_ups = outcome::distribute_experience(&mut party, experience_pool);
            (
                CombatResult::Victory {
                    loot,
                    experience: experience_pool,
                },
                level_ups,
            )
        } else {
            (CombatResult::Defeat, Vec::new())
        };
        let next_phase = PostCombatPhase::after(&result, &party);
        tracing::info!(?next_phase, level_ups = level_ups.len(), "combat closed");

        Ok(CombatClosure {
            result,
            party,
            level_ups,
            next_phase,
            log: log.into_events(),
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn position_of(&self, id: CombatantId) -> Option<usize> {
        self.roster.iter().position(|c| c.id == id)
    }

    fn index_of(&self, id: CombatantId) -> usize {
        self.position_of(id)
            .unwrap_or_else(|| panic!("combatant {id} is not in the roster"))
    }

    fn living_indices(&self, side: Side) -> Vec<usize> {
        self.roster
            .iter()
            .enumerate()
            .filter(|(_, c)| c.side() == side && c.is_alive())
            .map(|(i, _)| i)
            .collect()
    }
}
