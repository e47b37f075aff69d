//! Turn-based combat rules engine for a D&D 5e style dungeon crawler.
//!
//! This crate provides:
//! - Dice, attack rolls, saving throws and the damage pipeline
//! - A buff/debuff ledger with turn-based expiry
//! - Initiative and round tracking
//! - Monster and boss behavior (skills, legendary actions, ultimates)
//! - Loot, experience and level-ups at the end of a fight
//!
//! # Quick Start
//!
//! ```ignore
//! use crawler_core::{testing, CombatSession, EngineConfig, PlayerAction};
//! use crawler_core::sync::Immediate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let party = vec![testing::fighter("Roland")];
//!     let encounter = vec![testing::goblin("Snik")];
//!     let mut session = CombatSession::new(party, encounter, EngineConfig::new().with_seed(7))?;
//!
//!     let target = session.enemies().next().unwrap().id;
//!     session.select_action(PlayerAction::Attack { target })?;
//!     for event in session.confirm_action(&mut Immediate).await? {
//!         println!("{} -> {}", event.actor_name, event.action);
//!     }
//!     Ok(())
//! }
//! ```

pub mod behavior;
pub mod buffs;
pub mod combatant;
pub mod config;
pub mod damage;
pub mod dice;
pub mod events;
pub mod headless;
pub mod outcome;
pub mod persist;
pub mod progression;
pub mod rules;
pub mod session;
pub mod sync;
pub mod testing;
pub mod turns;

// Primary public API
pub use combatant::{CharacterClass, Combatant, CombatantId, CombatantKind, Side};
pub use config::{AckMode, ConfigError, EngineConfig};
pub use events::{CombatEvent, CombatLog};
pub use headless::{HeadlessCombat, HeadlessError};
pub use outcome::{CombatClosure, CombatResult, PostCombatPhase};
pub use persist::{CombatSnapshot, PersistError};
pub use session::{CombatError, CombatPhase, CombatSession, FinishError, PlayerAction};
pub use sync::{Acknowledge, SuspensionPoint};
