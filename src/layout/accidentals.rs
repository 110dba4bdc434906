//! Accidental state of one staff while walking a measure.

use crate::model::{Accidental, AccidentalType, Chord, ClefType, KeySigEvent};
use crate::geometry::{Point, Rect};

/// Order in which sharps, then flats, enter a key signature (steps, C = 0).
const SHARP_ORDER: [i32; 7] = [3, 0, 4, 1, 5, 2, 6];
const FLAT_ORDER: [i32; 7] = [6, 2, 5, 1, 4, 0, 3];

const OCTAVES: usize = 11;

/// Current alteration of every diatonic pitch, seeded from a key signature.
#[derive(Debug, Clone)]
pub struct AccidentalState {
    alter: [[i32; 7]; OCTAVES],
    clef: ClefType,
}

/// Alteration the key signature gives to `step`.
pub fn key_alter(fifths: i32, step: i32) -> i32 {
    let n = fifths.unsigned_abs().min(7) as usize;
    if fifths > 0 && SHARP_ORDER[..n].contains(&step) {
        1
    } else if fifths < 0 && FLAT_ORDER[..n].contains(&step) {
        -1
    } else {
        0
    }
}

impl AccidentalState {
    pub fn new(key: KeySigEvent, clef: ClefType) -> Self {
        let mut s = Self { alter: [[0; 7]; OCTAVES], clef };
        s.init(key, clef);
        s
    }

    /// Reset to the key signature.
    pub fn init(&mut self, key: KeySigEvent, clef: ClefType) {
        self.clef = clef;
        for octave in self.alter.iter_mut() {
            for (step, a) in octave.iter_mut().enumerate() {
                *a = key_alter(key.fifths, step as i32);
            }
        }
    }

    pub fn clef(&self) -> ClefType {
        self.clef
    }

    /// A clef change keeps the alterations already set in the measure.
    pub fn set_clef(&mut self, clef: ClefType) {
        self.clef = clef;
    }

    fn slot(step: i32, octave: i32) -> Option<(usize, usize)> {
        let o = usize::try_from(octave).ok().filter(|&o| o < OCTAVES)?;
        let s = usize::try_from(step).ok().filter(|&s| s < 7)?;
        Some((o, s))
    }

    pub fn alter(&self, step: i32, octave: i32) -> i32 {
        Self::slot(step, octave).map_or(0, |(o, s)| self.alter[o][s])
    }

    pub fn set_alter(&mut self, step: i32, octave: i32, alter: i32) {
        if let Some((o, s)) = Self::slot(step, octave) {
            self.alter[o][s] = alter;
        }
    }
}

/// Compute staff lines and accidentals of a chord (grace chords first),
/// updating the running state.
pub fn update_notes(chord: &mut Chord, state: &mut AccidentalState) {
    for g in chord.grace_notes.iter_mut() {
        update_notes(g, state);
    }
    let clef = state.clef();
    for n in chord.notes.iter_mut() {
        n.line = clef.line_of(n.step, n.octave);
        if state.alter(n.step, n.octave) != n.alter {
            n.accidental = Some(Accidental {
                accidental_type: AccidentalType::from_alter(n.alter),
                pos: Point::ZERO,
                bbox: Rect::default(),
            });
            state.set_alter(n.step, n.octave, n.alter);
        } else {
            n.accidental = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Note;
    use crate::model::DIVISION;

    #[test]
    fn key_signature_alters_expected_steps() {
        // D major: F# C#
        assert_eq!(key_alter(2, 3), 1);
        assert_eq!(key_alter(2, 0), 1);
        assert_eq!(key_alter(2, 4), 0);
        // B flat major: Bb Eb
        assert_eq!(key_alter(-2, 6), -1);
        assert_eq!(key_alter(-2, 2), -1);
        assert_eq!(key_alter(-2, 5), 0);
    }

    #[test]
    fn accidental_carries_through_the_measure() {
        let mut state = AccidentalState::new(KeySigEvent { fifths: 0 }, ClefType::Treble);
        let mut first = Chord::new(DIVISION, vec![Note::new(3, 4, 1)]);
        let mut second = Chord::new(DIVISION, vec![Note::new(3, 4, 1)]);
        let mut third = Chord::new(DIVISION, vec![Note::new(3, 4, 0)]);
        update_notes(&mut first, &mut state);
        update_notes(&mut second, &mut state);
        update_notes(&mut third, &mut state);
        assert!(first.notes[0].accidental.is_some());
        assert!(second.notes[0].accidental.is_none());
        assert_eq!(
            third.notes[0].accidental.as_ref().map(|a| a.accidental_type),
            Some(AccidentalType::Natural)
        );
    }

    #[test]
    fn lines_follow_clef() {
        let mut state = AccidentalState::new(KeySigEvent::default(), ClefType::Bass);
        let mut c = Chord::new(DIVISION, vec![Note::new(5, 3, 0)]);
        update_notes(&mut c, &mut state);
        assert_eq!(c.notes[0].line, 0);
    }
}
