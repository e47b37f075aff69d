//! Initiative order and turn sequencing.
//!
//! The order is fixed when combat starts. Only the index moves; down
//! combatants are skipped by checking live hit points through the
//! caller-supplied predicate, never a cached copy.

use crate::combatant::{Combatant, CombatantId};
use serde::{Deserialize, Serialize};

/// Fixed initiative order for one combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOrder {
    entries: Vec<CombatantId>,
}

impl TurnOrder {
    /// Living combatants by descending DEX modifier. The sort is stable, so
    /// ties keep the order they were passed in (party before encounter).
    pub fn new<'a>(combatants: impl IntoIterator<Item = &'a Combatant>) -> Self {
        let mut ranked: Vec<(i32, CombatantId)> = combatants
            .into_iter()
            .filter(|c| c.is_alive())
            .map(|c| (c.initiative_modifier(), c.id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        Self {
            entries: ranked.into_iter().map(|(_, id)| id).collect(),
        }
    }

    pub fn from_ids(entries: Vec<CombatantId>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<CombatantId> {
        self.entries.get(index).copied()
    }

    pub fn ids(&self) -> &[CombatantId] {
        &self.entries
    }
}

/// Where the sequencer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    AwaitingTurn(usize),
    TurnInProgress(usize),
    Terminal,
}

/// Result of moving to the next combatant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub index: usize,
    pub actor: CombatantId,
    /// The index wrapped past 0; a full round has elapsed.
    pub round_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSequencer {
    order: TurnOrder,
    state: TurnState,
    full_rounds_elapsed: u32,
    /// Monotonic turn counter for the combat log.
    turn_number: u32,
}

impl TurnSequencer {
    pub fn new(order: TurnOrder) -> Self {
        assert!(!order.is_empty(), "turn order must contain a living combatant");
        Self {
            order,
            state: TurnState::AwaitingTurn(0),
            full_rounds_elapsed: 0,
            turn_number: 1,
        }
    }

    /// Rebuild from a snapshot.
    pub fn restore(order: TurnOrder, index: usize, full_rounds_elapsed: u32, turn_number: u32) -> Self {
        assert!(index < order.len(), "turn index {index} out of range");
        Self {
            order,
            state: TurnState::AwaitingTurn(index),
            full_rounds_elapsed,
            turn_number,
        }
    }

    pub fn order(&self) -> &TurnOrder {
        &self.order
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn full_rounds_elapsed(&self) -> u32 {
        self.full_rounds_elapsed
    }

    pub fn turn_number(&self) -> u32 {
        self.turn_number
    }

    /// 1-based round currently being played.
    pub fn round(&self) -> u32 {
        self.full_rounds_elapsed + 1
    }

    pub fn index(&self) -> Option<usize> {
        match self.state {
            TurnState::AwaitingTurn(i) | TurnState::TurnInProgress(i) => Some(i),
            TurnState::Terminal => None,
        }
    }

    pub fn current(&self) -> Option<CombatantId> {
        self.index().and_then(|i| self.order.get(i))
    }

    pub fn is_terminal(&self) -> bool {
        self.state == TurnState::Terminal
    }

    pub fn begin_turn(&mut self) {
        if let TurnState::AwaitingTurn(i) = self.state {
            self.state = TurnState::TurnInProgress(i);
        }
    }

    pub fn terminate(&mut self) {
        self.state = TurnState::Terminal;
    }

    /// Move to the next living combatant.
    ///
    /// Tries at most `len` entries. Crossing index 0 completes a round,
    /// counted once even if entry 0 itself is skipped. Panics if nobody is
    /// alive, since terminal detection must run first.
    pub fn advance(&mut self, is_alive: impl Fn(CombatantId) -> bool) -> Advance {
        let from = self
            .index()
            .unwrap_or_else(|| panic!("advance called on a terminal turn sequencer"));
        let len = self.order.len();
        let mut round_completed = false;
        let mut index = from;

        for _ in 0..len {
            index = (index + 1) % len;
            if index == 0 {
                round_completed = true;
            }
            let id = self.order.entries[index];
            if is_alive(id) {
                if round_completed {
                    self.full_rounds_elapsed += 1;
                }
                self.turn_number += 1;
                self.state = TurnState::AwaitingTurn(index);
                return Advance {
                    index,
                    actor: id,
                    round_completed,
                };
            }
        }

        panic!("turn order has no living combatant; terminal detection must precede advance");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::{AbilityScores, CharacterClass, MonsterProfile};
    use std::collections::HashSet;

    fn with_dex(name: &str, dex: u8) -> Combatant {
        Combatant::player(name, CharacterClass::Fighter, 1, 10)
            .with_abilities(AbilityScores::new(10, dex, 10, 10, 10, 10))
    }

    #[test]
    fn test_order_by_dex_with_stable_ties() {
        let a = with_dex("A", 12);
        let b = with_dex("B", 18);
        let c = with_dex("C", 13);
        let goblin = Combatant::monster("Goblin", MonsterProfile::new(0.25, 50), 7)
            .with_abilities(AbilityScores::new(8, 14, 10, 10, 8, 8));
        let order = TurnOrder::new([&a, &b, &c, &goblin]);
        // B (+4), goblin (+2), A (+1), C (+1)
        assert_eq!(order.ids(), &[b.id, goblin.id, a.id, c.id]);
    }

    #[test]
    fn test_down_combatants_excluded_at_start() {
        let a = with_dex("A", 10);
        let mut b = with_dex("B", 10);
        b.hit_points.current = 0;
        let order = TurnOrder::new([&a, &b]);
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_advance_skips_down_and_counts_rounds_once() {
        let ids: Vec<CombatantId> = (0..4).map(|_| CombatantId::new()).collect();
        let mut seq = TurnSequencer::new(TurnOrder::from_ids(ids.clone()));
        let down: HashSet<CombatantId> = [ids[0], ids[2]].into_iter().collect();
        let alive = |id: CombatantId| !down.contains(&id);

        // 0 -> 1
        let step = seq.advance(alive);
        assert_eq!(step.actor, ids[1]);
        assert!(!step.round_completed);

        // 1 -> (2 down) -> 3
        let step = seq.advance(alive);
        assert_eq!(step.actor, ids[3]);
        assert!(!step.round_completed);

        // 3 -> (0 down) -> 1, round boundary crossed even though 0 is down
        let step = seq.advance(alive);
        assert_eq!(step.actor, ids[1]);
        assert!(step.round_completed);
        assert_eq!(seq.full_rounds_elapsed(), 1);

        let step = seq.advance(alive);
        assert!(!step.round_completed);
        assert_eq!(seq.full_rounds_elapsed(), 1);
    }

    #[test]
    fn test_single_survivor_completes_round_every_turn() {
        let ids: Vec<CombatantId> = (0..3).map(|_| CombatantId::new()).collect();
        let mut seq = TurnSequencer::new(TurnOrder::from_ids(ids.clone()));
        let survivor = ids[1];
        seq.advance(|id| id == survivor);
        for round in 1..=3 {
            let step = seq.advance(|id| id == survivor);
            assert_eq!(step.actor, survivor);
            assert!(step.round_completed);
            assert_eq!(seq.full_rounds_elapsed(), round);
        }
    }

    #[test]
    #[should_panic(expected = "no living combatant")]
    fn test_advance_with_everyone_down_fails_fast() {
        let ids: Vec<CombatantId> = (0..2).map(|_| CombatantId::new()).collect();
        let mut seq = TurnSequencer::new(TurnOrder::from_ids(ids));
        seq.advance(|_| false);
    }

    #[test]
    fn test_state_transitions() {
        let ids: Vec<CombatantId> = (0..2).map(|_| CombatantId::new()).collect();
        let mut seq = TurnSequencer::new(TurnOrder::from_ids(ids.clone()));
        assert_eq!(seq.state(), TurnState::AwaitingTurn(0));
        seq.begin_turn();
        assert_eq!(seq.state(), TurnState::TurnInProgress(0));
        seq.advance(|_| true);
        assert_eq!(seq.state(), TurnState::AwaitingTurn(1));
        assert_eq!(seq.turn_number(), 2);
        seq.terminate();
        assert!(seq.is_terminal());
        assert_eq!(seq.current(), None);
    }
}
