//! The "present, then proceed" boundary between the engine and whatever
//! is showing the fight.
//!
//! The session awaits an [`Acknowledge`] after an attack roll, a damage
//! result and a saving throw. What happens to the roster afterwards does not
//! depend on how the acknowledgement arrived.

use crate::config::AckMode;
use crate::damage::{DamageOutcome, DamageType};
use crate::rules::{AttackOutcome, SavingThrow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// A result waiting to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspensionPoint {
    AttackRoll {
        attacker: String,
        target: String,
        outcome: AttackOutcome,
    },
    DamageResult {
        target: String,
        damage_type: DamageType,
        outcome: DamageOutcome,
    },
    SavingThrow {
        target: String,
        save: SavingThrow,
    },
}

impl SuspensionPoint {
    pub fn label(&self) -> &'static str {
        match self {
            SuspensionPoint::AttackRoll { .. } => "attack roll",
            SuspensionPoint::DamageResult { .. } => "damage result",
            SuspensionPoint::SavingThrow { .. } => "saving throw",
        }
    }
}

#[async_trait]
pub trait Acknowledge: Send {
    /// Resolve once the presentation layer is done with `point`.
    async fn acknowledge(&mut self, point: &SuspensionPoint);
}

/// Proceeds at once. Used headless and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

#[async_trait]
impl Acknowledge for Immediate {
    async fn acknowledge(&mut self, _point: &SuspensionPoint) {}
}

/// Proceeds after a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct AutoAdvance {
    delay: Duration,
}

impl AutoAdvance {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl Acknowledge for AutoAdvance {
    async fn acknowledge(&mut self, point: &SuspensionPoint) {
        tracing::debug!(point = point.label(), delay_ms = self.delay.as_millis() as u64, "auto advance");
        tokio::time::sleep(self.delay).await;
    }
}

/// Waits for an explicit [`ProceedHandle::proceed`].
///
/// Proceeds sent early are queued and resolve later suspensions at once.
/// Dropping every handle releases all waits.
#[derive(Debug)]
pub struct ManualAdvance {
    proceeds: mpsc::UnboundedReceiver<()>,
}

/// The presentation side of a [`ManualAdvance`].
#[derive(Debug, Clone)]
pub struct ProceedHandle {
    sender: mpsc::UnboundedSender<()>,
}

impl ManualAdvance {
    pub fn channel() -> (ManualAdvance, ProceedHandle) {
        let (sender, proceeds) = mpsc::unbounded_channel();
        (ManualAdvance { proceeds }, ProceedHandle { sender })
    }
}

impl ProceedHandle {
    /// Release the current (or next) suspension. Returns false once the
    /// engine side is gone.
    pub fn proceed(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

#[async_trait]
impl Acknowledge for ManualAdvance {
    async fn acknowledge(&mut self, point: &SuspensionPoint) {
        tracing::debug!(point = point.label(), "waiting for proceed");
        if self.proceeds.recv().await.is_none() {
            tracing::debug!(point = point.label(), "proceed handle dropped, continuing");
        }
    }
}

/// Build the acknowledger an [`AckMode`] asks for. Manual mode also
/// returns the handle that drives it.
pub fn acknowledger(mode: &AckMode) -> (Box<dyn Acknowledge>, Option<ProceedHandle>) {
    match mode {
        AckMode::Immediate => (Box::new(Immediate), None),
        AckMode::Auto { delay_ms } => (Box::new(AutoAdvance::from_millis(*delay_ms)), None),
        AckMode::Manual => {
            let (manual, handle) = ManualAdvance::channel();
            (Box::new(manual), Some(handle))
        }
    }
}
