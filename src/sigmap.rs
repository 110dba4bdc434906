//! Time-signature map: tick → signature event.
//!
//! Measure lengths and nominal signatures are `Fraction`s of a whole note.
//! Two fractions can be *equal* (same value, 4/4 == 2/2) without being
//! *identical* (same numerator and denominator); the measure pass relies on
//! the distinction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Tick, DIVISION};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: i32,
    pub denominator: i32,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { numerator: 0, denominator: 1 };

    pub fn new(numerator: i32, denominator: i32) -> Self {
        Self { numerator, denominator }
    }

    /// Same numerator and same denominator.
    pub fn identical(&self, other: &Fraction) -> bool {
        self.numerator == other.numerator && self.denominator == other.denominator
    }

    /// Length in ticks (a whole note is `4 * DIVISION`).
    pub fn ticks(&self) -> Tick {
        if self.denominator == 0 {
            return 0;
        }
        self.numerator * DIVISION * 4 / self.denominator
    }

    pub fn scaled(&self, factor: i32) -> Fraction {
        Fraction::new(self.numerator * factor, self.denominator)
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Fraction::ZERO
    }
}

/// Value equality by cross multiplication.
impl PartialEq for Fraction {
    fn eq(&self, other: &Fraction) -> bool {
        (self.numerator as i64) * (other.denominator as i64)
            == (other.numerator as i64) * (self.denominator as i64)
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// One entry of the signature map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SigEvent {
    /// Actual measure length.
    pub len: Fraction,
    /// Nominal (printed) signature.
    pub timesig: Fraction,
    /// Measure number the event starts at.
    pub bar: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SigMap {
    events: BTreeMap<Tick, SigEvent>,
}

impl SigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the event at `tick`.
    pub fn add(&mut self, tick: Tick, event: SigEvent) {
        self.events.insert(tick, event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_at(&self, tick: Tick) -> Option<&SigEvent> {
        self.events.get(&tick)
    }

    /// The event in effect at `tick`.
    pub fn timesig(&self, tick: Tick) -> Option<&SigEvent> {
        self.events.range(..=tick).next_back().map(|(_, e)| e)
    }

    /// Events with `from <= tick < to`.
    pub fn range(&self, from: Tick, to: Tick) -> impl Iterator<Item = (&Tick, &SigEvent)> {
        self.events.range(from..to)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tick, &SigEvent)> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_but_not_identical() {
        let common = Fraction::new(4, 4);
        let cut = Fraction::new(2, 2);
        assert_eq!(common, cut);
        assert!(!common.identical(&cut));
        assert_eq!(common.ticks(), cut.ticks());
    }

    #[test]
    fn lookup_finds_event_in_effect() {
        let mut map = SigMap::new();
        let ev = |n, d| SigEvent { len: Fraction::new(n, d), timesig: Fraction::new(n, d), bar: 0 };
        map.add(0, ev(4, 4));
        map.add(3840, ev(3, 4));
        assert_eq!(map.timesig(100).map(|e| e.len), Some(Fraction::new(4, 4)));
        assert_eq!(map.timesig(3840).map(|e| e.len), Some(Fraction::new(3, 4)));
        assert_eq!(map.range(1, 4000).count(), 1);
    }

    #[test]
    fn scaled_by_zero_is_zero_length() {
        assert_eq!(Fraction::new(4, 4).scaled(0), Fraction::ZERO);
    }
}
