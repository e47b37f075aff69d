//! Dice rolling primitives.
//!
//! Supports single dice, pooled rolls with a flat modifier, advantage and
//! disadvantage on d20 rolls, and the compact damage notation (`2d6+3`)
//! used by weapons and skills.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for damage dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Too many dice: {0} (at most {max})", max = MAX_DICE)]
    TooManyDice(u32),
}

/// Largest dice pool a single roll will throw.
pub const MAX_DICE: u32 = 100;

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Build from aggregated condition flags. Both present cancel out.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }

    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage)
            | (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (x, _) => x,
        }
    }
}

/// Standard die sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// Rounded-up average of one die, as used for fixed hit point gains.
    pub fn average(&self) -> i32 {
        (self.sides() / 2 + 1) as i32
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Source of randomness for every decision the engine makes.
///
/// The engine never touches a global RNG; sessions own a boxed source so
/// tests can script exact rolls.
pub trait DiceSource {
    /// Uniform roll in `[1, sides]`.
    fn roll_die(&mut self, sides: u32) -> u32;

    /// Uniform index in `[0, len)`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;

    /// Bernoulli trial with probability `p`.
    fn chance(&mut self, p: f64) -> bool;
}

/// [`DiceSource`] backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngDice<R> {
    rng: R,
}

impl<R: Rng> RngDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngDice<StdRng> {
    /// Deterministic dice for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Dice seeded from system entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> DiceSource for RngDice<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }

    fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }
}

/// Roll one die.
pub fn roll_die(dice: &mut dyn DiceSource, sides: u32) -> u32 {
    dice.roll_die(sides)
}

/// Result of rolling a pool of identical dice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub die_type: DieType,
    /// Every raw value rolled, including the discarded advantage die.
    pub rolls: Vec<u32>,
    /// Values that count toward the total.
    pub kept: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
    pub critical_hit: bool,
    pub critical_miss: bool,
}

impl DiceRoll {
    /// The kept face of a single-die roll.
    pub fn natural(&self) -> Option<u32> {
        match self.kept.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Build a single d20 roll from a known face. Used when replaying
    /// presented rolls and in tests.
    pub fn d20(natural: u32, modifier: i32) -> Self {
        Self {
            die_type: DieType::D20,
            rolls: vec![natural],
            kept: vec![natural],
            modifier,
            total: natural as i32 + modifier,
            critical_hit: natural == 20,
            critical_miss: natural == 1,
        }
    }

    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<String> = if self.rolls.len() > self.kept.len() {
            let mut kept_left = self.kept.clone();
            self.rolls
                .iter()
                .map(|r| match kept_left.iter().position(|k| k == r) {
                    Some(i) => {
                        kept_left.remove(i);
                        r.to_string()
                    }
                    None => format!("({r})"),
                })
                .collect()
        } else {
            self.rolls.iter().map(|r| r.to_string()).collect()
        };
        write!(f, "[{}]", shown.join(", "))?;
        match self.modifier {
            0 => {}
            m if m > 0 => write!(f, " + {m}")?,
            m => write!(f, " - {}", m.abs())?,
        }
        write!(f, " = {}", self.total)
    }
}

/// Roll `count` dice of one size plus a flat modifier.
///
/// Advantage only changes a single d20 roll: two dice are rolled, both are
/// kept in `rolls`, and the better (or worse) face drives the total and the
/// critical flags. Critical detection only applies to single d20 rolls.
/// Pools larger than [`MAX_DICE`] are cut down to it.
pub fn roll_many(
    dice: &mut dyn DiceSource,
    die_type: DieType,
    count: u32,
    modifier: i32,
    advantage: Advantage,
) -> DiceRoll {
    let count = count.min(MAX_DICE);
    let single_d20 = die_type == DieType::D20 && count == 1;

    let (rolls, kept) = if single_d20 && advantage != Advantage::Normal {
        let first = dice.roll_die(20);
        let second = dice.roll_die(20);
        let chosen = match advantage {
            Advantage::Advantage => first.max(second),
            _ => first.min(second),
        };
        (vec![first, second], vec![chosen])
    } else {
        let rolls: Vec<u32> = (0..count).map(|_| dice.roll_die(die_type.sides())).collect();
        (rolls.clone(), rolls)
    };

    let total = kept
        .iter()
        .fold(0i32, |sum, r| sum.saturating_add(*r as i32))
        .saturating_add(modifier);
    let natural = if single_d20 { kept.first().copied() } else { None };

    DiceRoll {
        die_type,
        rolls,
        kept,
        modifier,
        total,
        critical_hit: natural == Some(20),
        critical_miss: natural == Some(1),
    }
}

/// Roll a d20 check with a modifier.
pub fn roll_d20(dice: &mut dyn DiceSource, modifier: i32, advantage: Advantage) -> DiceRoll {
    roll_many(dice, DieType::D20, 1, modifier, advantage)
}

/// Damage dice in `XdY+Z` form. A bare number is a flat amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DamageDice {
    pub count: u32,
    pub die_type: Option<DieType>,
    pub bonus: i32,
}

impl DamageDice {
    pub fn new(count: u32, die_type: DieType, bonus: i32) -> Self {
        Self {
            count,
            die_type: Some(die_type),
            bonus,
        }
    }

    pub fn flat(amount: i32) -> Self {
        Self {
            count: 0,
            die_type: None,
            bonus: amount,
        }
    }

    /// Roll the dice. Never returns less than zero.
    pub fn roll(&self, dice: &mut dyn DiceSource) -> i32 {
        let rolled = match self.die_type {
            Some(die) => roll_many(dice, die, self.count, self.bonus, Advantage::Normal).total,
            None => self.bonus,
        };
        rolled.max(0)
    }

    /// Expected value, used by autopilots to rank options.
    pub fn average(&self) -> i32 {
        let per_die = self.die_type.map(|d| d.sides() as i32 + 1).unwrap_or(0);
        (self.count.min(MAX_DICE) as i32 * per_die) / 2 + self.bonus
    }
}

impl FromStr for DamageDice {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let notation: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::InvalidNotation(s.to_string()));
        }

        let Some(d_pos) = notation.find('d') else {
            let amount = notation
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            return Ok(DamageDice::flat(amount));
        };

        let count = match &notation[..d_pos] {
            "" => 1,
            digits => digits
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?,
        };
        if count > MAX_DICE {
            return Err(DiceError::TooManyDice(count));
        }

        let rest = &notation[d_pos + 1..];
        let (sides_str, bonus) = match rest.find(['+', '-']) {
            Some(pos) => {
                let bonus: i32 = rest[pos..]
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
                (&rest[..pos], bonus)
            }
            None => (rest, 0),
        };

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
        let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

        Ok(DamageDice::new(count, die_type, bonus))
    }
}

impl TryFrom<String> for DamageDice {
    type Error = DiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DamageDice> for String {
    fn from(value: DamageDice) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DamageDice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.die_type {
            None => write!(f, "{}", self.bonus),
            Some(die) => {
                write!(f, "{}{}", self.count, die)?;
                match self.bonus {
                    0 => Ok(()),
                    b if b > 0 => write!(f, "+{b}"),
                    b => write!(f, "{b}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDice;

    #[test]
    fn test_roll_range() {
        let mut dice = RngDice::seeded(7);
        for _ in 0..200 {
            let r = roll_die(&mut dice, 20);
            assert!((1..=20).contains(&r));
        }
    }

    #[test]
    fn test_roll_many_total_includes_modifier() {
        let mut dice = ScriptedDice::new([3, 5]);
        let roll = roll_many(&mut dice, DieType::D6, 2, 4, Advantage::Normal);
        assert_eq!(roll.rolls, vec![3, 5]);
        assert_eq!(roll.total, 12);
        assert!(!roll.critical_hit);
        assert!(!roll.critical_miss);
    }

    #[test]
    fn test_advantage_keeps_higher_and_retains_both() {
        let mut dice = ScriptedDice::new([4, 17]);
        let roll = roll_d20(&mut dice, 2, Advantage::Advantage);
        assert_eq!(roll.rolls, vec![4, 17]);
        assert_eq!(roll.kept, vec![17]);
        assert_eq!(roll.total, 19);
    }

    #[test]
    fn test_disadvantage_drives_critical_detection() {
        let mut dice = ScriptedDice::new([20, 1]);
        let roll = roll_d20(&mut dice, 0, Advantage::Disadvantage);
        assert_eq!(roll.natural(), Some(1));
        assert!(roll.critical_miss);
        assert!(!roll.critical_hit);

        let mut dice = ScriptedDice::new([20, 1]);
        let roll = roll_d20(&mut dice, 0, Advantage::Advantage);
        assert!(roll.critical_hit);
    }

    #[test]
    fn test_criticals_only_on_single_d20() {
        let mut dice = ScriptedDice::new([20, 20]);
        let roll = roll_many(&mut dice, DieType::D20, 2, 0, Advantage::Normal);
        assert!(!roll.critical_hit);
    }

    #[test]
    fn test_flags_cancel() {
        assert_eq!(Advantage::from_flags(true, true), Advantage::Normal);
        assert_eq!(Advantage::from_flags(false, false), Advantage::Normal);
        assert_eq!(Advantage::from_flags(true, false), Advantage::Advantage);
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(
            Advantage::Disadvantage.combine(Advantage::Disadvantage),
            Advantage::Disadvantage
        );
    }

    #[test]
    fn test_parse_damage_dice() {
        let dice: DamageDice = "2d6+3".parse().unwrap();
        assert_eq!(dice, DamageDice::new(2, DieType::D6, 3));

        let dice: DamageDice = "d8".parse().unwrap();
        assert_eq!(dice, DamageDice::new(1, DieType::D8, 0));

        let dice: DamageDice = "1d10 - 1".parse().unwrap();
        assert_eq!(dice.bonus, -1);

        let dice: DamageDice = "7".parse().unwrap();
        assert_eq!(dice, DamageDice::flat(7));
    }

    #[test]
    fn test_parse_rejects_bad_notation() {
        assert_eq!(
            "2d7".parse::<DamageDice>(),
            Err(DiceError::InvalidDieSize(7))
        );
        assert!("xd6".parse::<DamageDice>().is_err());
        assert!("".parse::<DamageDice>().is_err());
    }

    #[test]
    fn test_parse_caps_dice_pool() {
        assert!("100d6".parse::<DamageDice>().is_ok());
        assert_eq!(
            "101d6".parse::<DamageDice>(),
            Err(DiceError::TooManyDice(101))
        );
        assert_eq!(
            "4294967295d20".parse::<DamageDice>(),
            Err(DiceError::TooManyDice(u32::MAX))
        );
        assert!(serde_json::from_str::<DamageDice>("\"5000d8\"").is_err());
    }

    #[test]
    fn test_oversized_pool_is_cut_and_saturates() {
        let mut dice = ScriptedDice::default();
        let big = DamageDice::new(u32::MAX, DieType::D4, i32::MAX);
        assert_eq!(big.roll(&mut dice), i32::MAX);

        let roll = roll_many(&mut RngDice::seeded(1), DieType::D6, 1_000, 0, Advantage::Normal);
        assert_eq!(roll.rolls.len(), MAX_DICE as usize);
    }

    #[test]
    fn test_damage_dice_serde_uses_notation() {
        let dice = DamageDice::new(3, DieType::D4, -2);
        let json = serde_json::to_string(&dice).unwrap();
        assert_eq!(json, "\"3d4-2\"");
        let back: DamageDice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dice);
    }

    #[test]
    fn test_display_marks_dropped_die() {
        let mut dice = ScriptedDice::new([6, 15]);
        let roll = roll_d20(&mut dice, 3, Advantage::Advantage);
        assert_eq!(roll.to_string(), "[(6), 15] + 3 = 18");
    }
}
