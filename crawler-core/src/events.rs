//! Combat log events for the presentation layer.

use crate::combatant::Combatant;
use crate::damage::DamageType;
use serde::{Deserialize, Serialize};

/// One line of the combat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEvent {
    pub turn: u32,
    pub actor_name: String,
    pub actor_portrait: String,
    pub action: String,
    pub target: Option<String>,
    pub damage: Option<i32>,
    pub heal: Option<i32>,
    pub effect_text: Option<String>,
    pub damage_type: Option<DamageType>,
    pub is_player_action: bool,
}

impl CombatEvent {
    pub fn new(turn: u32, actor: &Combatant, action: impl Into<String>) -> Self {
        Self {
            turn,
            actor_name: actor.name.clone(),
            actor_portrait: actor.portrait.clone(),
            action: action.into(),
            target: None,
            damage: None,
            heal: None,
            effect_text: None,
            damage_type: None,
            is_player_action: actor.is_player(),
        }
    }

    /// An event with no acting combatant (round changes, outcomes).
    pub fn system(turn: u32, action: impl Into<String>) -> Self {
        Self {
            turn,
            actor_name: String::new(),
            actor_portrait: String::new(),
            action: action.into(),
            target: None,
            damage: None,
            heal: None,
            effect_text: None,
            damage_type: None,
            is_player_action: false,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_damage(mut self, amount: i32, damage_type: DamageType) -> Self {
        self.damage = Some(amount);
        self.damage_type = Some(damage_type);
        self
    }

    pub fn with_heal(mut self, amount: i32) -> Self {
        self.heal = Some(amount);
        self
    }

    pub fn with_effect(mut self, text: impl Into<String>) -> Self {
        self.effect_text = Some(text.into());
        self
    }
}

/// Append-only event stream. Callers keep a cursor and read what is new.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLog {
    events: Vec<CombatEvent>,
}

impl CombatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<CombatEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: CombatEvent) {
        tracing::debug!(
            turn = event.turn,
            actor = %event.actor_name,
            action = %event.action,
            "combat event"
        );
        self.events.push(event);
    }

    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Events logged after `cursor` events had already been seen.
    pub fn since(&self, cursor: usize) -> &[CombatEvent] {
        self.events.get(cursor..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&CombatEvent> {
        self.events.last()
    }

    pub fn into_events(self) -> Vec<CombatEvent> {
        self.events
    }
}
