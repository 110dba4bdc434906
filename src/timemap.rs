//! Tempo map: tick → tempo, plus pauses, answering "when does this tick
//! sound?" in wall-clock time.
//!
//! Layout writes into the map (tempo texts, section-break and breath pauses,
//! fermata stretches) but does not own its persistence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Tick, DIVISION};

/// Default tempo in quarter notes per second (120 BPM).
pub const DEFAULT_TEMPO: f64 = 2.0;

/// Tempo and/or pause registered at one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    /// New tempo in quarter notes per second, if this event changes it.
    pub tempo: Option<f64>,
    /// Pause in seconds taken before `tick` sounds.
    pub pause: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    events: BTreeMap<Tick, TempoEvent>,
    /// Fermata stretches already applied, keyed by segment tick.
    #[serde(default)]
    stretches: BTreeMap<Tick, f64>,
}

impl TempoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the tempo at `tick`.
    pub fn set_tempo(&mut self, tick: Tick, tempo: f64) {
        self.events.entry(tick).or_default().tempo = Some(tempo);
    }

    /// Insert or update the pause at `tick`.
    pub fn set_pause(&mut self, tick: Tick, pause: f64) {
        self.events.entry(tick).or_default().pause = pause;
    }

    /// Remove every pause, dropping events that carried nothing else.
    pub fn clear_pauses(&mut self) {
        for ev in self.events.values_mut() {
            ev.pause = 0.0;
        }
        self.events.retain(|_, ev| ev.tempo.is_some());
    }

    /// Tempo in effect at `tick`.
    pub fn tempo(&self, tick: Tick) -> f64 {
        self.events
            .range(..=tick)
            .rev()
            .find_map(|(_, ev)| ev.tempo)
            .unwrap_or(DEFAULT_TEMPO)
    }

    pub fn pause(&self, tick: Tick) -> f64 {
        self.events.get(&tick).map_or(0.0, |ev| ev.pause)
    }

    /// An event (tempo or pause) exists exactly at `tick`.
    pub fn find(&self, tick: Tick) -> Option<&TempoEvent> {
        self.events.get(&tick)
    }

    /// Events with `from <= tick < to`.
    pub fn range(&self, from: Tick, to: Tick) -> impl Iterator<Item = (&Tick, &TempoEvent)> {
        self.events.range(from..to)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Slow the tempo at `tick` down by `stretch`, restoring the previous
    /// tempo at `end_tick` unless an event already sits there.
    ///
    /// Applied once per tick and stretch: repeating the call is a no-op, and
    /// a different stretch at the same tick replaces the earlier one instead
    /// of compounding it. Returns whether the map changed.
    pub fn apply_fermata_stretch(&mut self, tick: Tick, end_tick: Tick, stretch: f64) -> bool {
        let previous = self.stretches.get(&tick).copied();
        if previous == Some(stretch) {
            return false;
        }
        let original = self.tempo(tick) * previous.unwrap_or(1.0);
        self.set_tempo(tick, original / stretch);
        if self.find(end_tick).is_none() {
            self.set_tempo(end_tick, original);
        }
        self.stretches.insert(tick, stretch);
        true
    }

    /// Wall-clock seconds at which `tick` sounds, counting every pause
    /// registered at or before it.
    pub fn tick_to_time(&self, tick: Tick) -> f64 {
        let mut time = 0.0;
        let mut last_tick: Tick = 0;
        let mut tempo = DEFAULT_TEMPO;
        for (&t, ev) in self.events.range(..=tick) {
            time += (t - last_tick) as f64 / (DIVISION as f64 * tempo);
            time += ev.pause;
            if let Some(new_tempo) = ev.tempo {
                tempo = new_tempo;
            }
            last_tick = t;
        }
        time + (tick - last_tick) as f64 / (DIVISION as f64 * tempo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_lookup_uses_latest_event() {
        let mut map = TempoMap::new();
        map.set_tempo(0, 2.0);
        map.set_tempo(1920, 1.0);
        map.set_pause(960, 0.5);
        assert_eq!(map.tempo(959), 2.0);
        assert_eq!(map.tempo(1000), 2.0);
        assert_eq!(map.tempo(1920), 1.0);
    }

    #[test]
    fn fermata_stretch_is_applied_once() {
        let mut map = TempoMap::new();
        map.set_tempo(0, 2.0);
        assert!(map.apply_fermata_stretch(480, 959, 2.0));
        assert_eq!(map.tempo(480), 1.0);
        assert_eq!(map.tempo(959), 2.0);
        assert!(!map.apply_fermata_stretch(480, 959, 2.0));
        assert_eq!(map.tempo(480), 1.0);
    }

    #[test]
    fn stretch_keeps_existing_end_event() {
        let mut map = TempoMap::new();
        map.set_tempo(959, 3.0);
        map.apply_fermata_stretch(480, 959, 2.0);
        assert_eq!(map.tempo(959), 3.0);
    }

    #[test]
    fn time_counts_pauses() {
        let mut map = TempoMap::new();
        map.set_tempo(0, 2.0);
        map.set_pause(960, 1.5);
        // two quarters at 2 quarters/s plus the pause
        assert!((map.tick_to_time(960) - 2.5).abs() < 1e-9);
        map.clear_pauses();
        assert!((map.tick_to_time(960) - 1.0).abs() < 1e-9);
        assert_eq!(map.len(), 1);
    }
}
