//! Data model for a score that is about to be laid out.
//!
//! The editing layer (or [`crate::builder::ScoreBuilder`]) populates these
//! structures; the layout passes in [`crate::layout`] fill in positions,
//! bounding boxes and shapes.

mod element;
mod groups;
mod measure;
mod segment;
mod spanner;
mod system;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use element::*;
pub use groups::*;
pub use measure::*;
pub use segment::*;
pub use spanner::*;
pub use system::*;

use crate::error::LayoutError;
use crate::sigmap::{Fraction, SigMap};
use crate::spanner_map::SpannerMap;
use crate::style::{Style, StyleId};
use crate::timemap::TempoMap;

/// Absolute time position.
pub type Tick = i32;

/// Ticks per quarter note.
pub const DIVISION: Tick = 480;

/// Voices per staff; a track is `staff * VOICES + voice`.
pub const VOICES: usize = 4;

pub fn track2staff(track: usize) -> usize {
    track / VOICES
}

pub fn track2voice(track: usize) -> usize {
    track % VOICES
}

// ═══════════════════════════════════════════════════════════════════════
// Arena handles and element locations
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpannerId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeamId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TupletId(pub usize);

/// A track element: measure index, segment index within it, track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementLoc {
    pub measure: usize,
    pub segment: usize,
    pub track: usize,
}

/// A chord, or one of its grace chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChordRef {
    pub loc: ElementLoc,
    pub grace: Option<usize>,
}

impl ElementLoc {
    /// Location after segment `at` of `measure` was inserted or removed.
    pub fn shifted(self, measure: usize, at: usize, inserted: bool) -> Self {
        if self.measure != measure || self.segment < at {
            return self;
        }
        let segment = if inserted {
            self.segment + 1
        } else if self.segment > at {
            self.segment - 1
        } else {
            self.segment
        };
        ElementLoc { segment, ..self }
    }
}

impl From<ElementLoc> for ChordRef {
    fn from(loc: ElementLoc) -> Self {
        ChordRef { loc, grace: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteLoc {
    pub chord: ChordRef,
    pub note: usize,
}

/// An annotation of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnotationLoc {
    pub measure: usize,
    pub segment: usize,
    pub index: usize,
}

// ═══════════════════════════════════════════════════════════════════════
// Staves
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClefType {
    #[default]
    Treble,
    Treble8vb,
    Bass,
    Alto,
    Tenor,
    Percussion,
}

impl ClefType {
    /// Diatonic number (`octave * 7 + step`) of the pitch on the top line.
    pub fn top_line_pitch(self) -> i32 {
        match self {
            ClefType::Treble | ClefType::Percussion => 38, // F5
            ClefType::Treble8vb => 31,                     // F4
            ClefType::Bass => 26,                          // A3
            ClefType::Alto => 32,                          // G4
            ClefType::Tenor => 30,                         // E4
        }
    }

    /// Staff line (half spaces from the top line, downward) of a pitch.
    pub fn line_of(self, step: i32, octave: i32) -> i32 {
        self.top_line_pitch() - (octave * 7 + step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySigEvent {
    /// Sharps (positive) or flats (negative).
    pub fifths: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HideMode {
    /// Follow the `HideEmptyStaves` style.
    #[default]
    Auto,
    /// Hide the staff in every system where it is empty, whatever the style.
    /// A staff with content is still shown.
    Always,
    /// Show the staff even when it is empty.
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    /// Instrument name printed in the system's left margin.
    pub name: Option<String>,
    /// Staves of one part are joined by the akkolade distance.
    pub part: usize,
    pub lines: i32,
    pub mag: f64,
    /// User visibility of the whole staff.
    pub visible: bool,
    pub hide_when_empty: HideMode,
    /// Number of staves a barline starting here spans.
    pub bar_line_span: usize,
    pub clefs: BTreeMap<Tick, ClefType>,
    pub keys: BTreeMap<Tick, KeySigEvent>,
    /// Written by the measure pass.
    #[serde(default)]
    pub time_sigs: BTreeMap<Tick, Fraction>,
}

impl Staff {
    pub fn new(part: usize) -> Self {
        Self {
            name: None,
            part,
            lines: 5,
            mag: 1.0,
            visible: true,
            hide_when_empty: HideMode::Auto,
            bar_line_span: 1,
            clefs: BTreeMap::new(),
            keys: BTreeMap::new(),
            time_sigs: BTreeMap::new(),
        }
    }

    pub fn show(&self) -> bool {
        self.visible
    }

    pub fn clef(&self, tick: Tick) -> ClefType {
        self.clefs.range(..=tick).next_back().map(|(_, c)| *c).unwrap_or_default()
    }

    pub fn key_sig_event(&self, tick: Tick) -> KeySigEvent {
        self.keys.range(..=tick).next_back().map(|(_, k)| *k).unwrap_or_default()
    }

    pub fn time_sig(&self, tick: Tick) -> Option<Fraction> {
        self.time_sigs.range(..=tick).next_back().map(|(_, t)| *t)
    }

    pub fn add_time_sig(&mut self, tick: Tick, sig: Fraction) {
        self.time_sigs.insert(tick, sig);
    }

    /// Distance from the top to the bottom staff line.
    pub fn height(&self, style: &Style) -> f64 {
        (self.lines - 1).max(0) as f64 * style.spatium() * self.mag
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Score
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    pub staves: Vec<Staff>,
    pub measures: Vec<MeasureBase>,
    /// Arena of every spanner, indexed by `SpannerId`.
    pub spanners: Vec<Spanner>,
    /// Interval index over the managed spanners.
    pub spanner_map: SpannerMap,
    /// Spanners laid out individually, outside the index.
    #[serde(default)]
    pub unmanaged_spanners: Vec<SpannerId>,
    /// Rebuilt by the beaming collaborator on every layout.
    #[serde(default)]
    pub beams: Vec<Beam>,
    #[serde(default)]
    pub tuplets: Vec<Tuplet>,
    #[serde(default)]
    pub sig_map: SigMap,
    #[serde(default)]
    pub tempo_map: TempoMap,
    #[serde(default)]
    pub style: Style,
    /// False for derived part scores.
    pub is_master: bool,
    /// Output of the last layout.
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Score {
    pub fn new(nstaves: usize) -> Self {
        Self {
            staves: (0..nstaves).map(Staff::new).collect(),
            measures: Vec::new(),
            spanners: Vec::new(),
            spanner_map: SpannerMap::new(),
            unmanaged_spanners: Vec::new(),
            beams: Vec::new(),
            tuplets: Vec::new(),
            sig_map: SigMap::new(),
            tempo_map: TempoMap::new(),
            style: Style::new(),
            is_master: true,
            pages: Vec::new(),
        }
    }

    pub fn nstaves(&self) -> usize {
        self.staves.len()
    }

    pub fn ntracks(&self) -> usize {
        self.staves.len() * VOICES
    }

    pub fn staff(&self, idx: usize) -> Option<&Staff> {
        self.staves.get(idx)
    }

    pub fn spanner(&self, id: SpannerId) -> Option<&Spanner> {
        self.spanners.get(id.0)
    }

    pub fn measure(&self, idx: usize) -> Option<&Measure> {
        self.measures.get(idx).and_then(MeasureBase::as_measure)
    }

    pub fn element(&self, loc: ElementLoc) -> Option<&Element> {
        self.measure(loc.measure)?.segments.get(loc.segment)?.element(loc.track)
    }

    pub fn element_mut(&mut self, loc: ElementLoc) -> Option<&mut Element> {
        self.measures
            .get_mut(loc.measure)?
            .as_measure_mut()?
            .segments
            .get_mut(loc.segment)?
            .element_mut(loc.track)
    }

    pub fn chord(&self, r: ChordRef) -> Option<&Chord> {
        chord_at(&self.measures, r)
    }

    pub fn annotation(&self, loc: AnnotationLoc) -> Option<&Element> {
        self.measure(loc.measure)?.segments.get(loc.segment)?.annotations.get(loc.index)
    }

    pub fn page(&self) -> Option<&Page> {
        self.pages.first()
    }

    pub fn system(&self) -> Option<&System> {
        self.pages.first().and_then(|p| p.systems.first())
    }

    /// Preconditions owned by the editing layer. Layout itself never checks
    /// them; the JSON boundary does.
    pub fn check_invariants(&self) -> Result<(), LayoutError> {
        let ntracks = self.ntracks();
        let mut last_tick: Option<Tick> = None;
        for (mi, mb) in self.measures.iter().enumerate() {
            let Some(m) = mb.as_measure() else { continue };
            if m.ticks() <= 0 {
                return Err(LayoutError::InvalidInput(format!(
                    "measure {mi} has non-positive length {}",
                    m.len
                )));
            }
            if let Some(t) = last_tick {
                if m.tick <= t {
                    return Err(LayoutError::InvalidInput(format!(
                        "measure {mi} tick {} does not follow {t}",
                        m.tick
                    )));
                }
            }
            last_tick = Some(m.tick);
            for (si, pair) in m.segments.windows(2).enumerate() {
                if pair[0].sort_key() > pair[1].sort_key() {
                    return Err(LayoutError::InvalidInput(format!(
                        "measure {mi} segment {si} out of order"
                    )));
                }
            }
            if m.segments.iter().any(|s| s.elements.len() > ntracks) {
                return Err(LayoutError::InvalidInput(format!(
                    "measure {mi} has segments with more than {ntracks} tracks"
                )));
            }
        }
        for (i, sp) in self.spanners.iter().enumerate() {
            if sp.tick2 < sp.tick {
                return Err(LayoutError::InvalidInput(format!(
                    "spanner {i} ends at {} before it starts at {}",
                    sp.tick2, sp.tick
                )));
            }
        }
        Ok(())
    }

    /// Keep every stored element location valid after segment `at` of
    /// measure `mi` was inserted or removed.
    pub(crate) fn shift_segment_refs(&mut self, mi: usize, at: usize, inserted: bool) {
        let shift = |loc: ElementLoc| loc.shifted(mi, at, inserted);
        for beam in &mut self.beams {
            for r in &mut beam.elements {
                r.loc = shift(r.loc);
            }
        }
        for t in &mut self.tuplets {
            for de in &mut t.elements {
                if let DurationRef::ChordRest(loc) = de {
                    *loc = shift(*loc);
                }
            }
        }
        for sp in &mut self.spanners {
            sp.start_element = sp.start_element.map(shift);
            sp.end_element = sp.end_element.map(shift);
            if let Some(r) = sp.start_chord.as_mut() {
                r.loc = shift(r.loc);
            }
            for n in [&mut sp.start_note, &mut sp.end_note].into_iter().flatten() {
                n.chord.loc = shift(n.chord.loc);
            }
        }
    }

    /// Find or create a segment of measure `mi`, keeping stored locations
    /// valid. `None` if `mi` is not a measure.
    pub(crate) fn ensure_segment(&mut self, mi: usize, st: SegmentType, rtick: Tick) -> Option<usize> {
        let ntracks = self.ntracks();
        let m = self.measures.get_mut(mi)?.as_measure_mut()?;
        if let Some(i) = m.find_segment_r(st, rtick) {
            return Some(i);
        }
        let i = m.get_segment_r(st, rtick, ntracks);
        self.shift_segment_refs(mi, i, true);
        Some(i)
    }

    /// Remove the segments of measure `mi` failing `keep`, keeping stored
    /// locations valid.
    pub(crate) fn retain_segments(&mut self, mi: usize, keep: impl Fn(&Segment) -> bool) {
        let Some(m) = self.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return };
        let removed: Vec<usize> = (0..m.segments.len()).rev().filter(|&i| !keep(&m.segments[i])).collect();
        for i in removed {
            if let Some(m) = self.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) {
                m.remove_segment(i);
            }
            self.shift_segment_refs(mi, i, false);
        }
    }

    /// Whether a staff is shown in the current system.
    pub(crate) fn staff_shown(&self, system: &System, si: usize) -> bool {
        self.staves.get(si).is_some_and(Staff::show)
            && system.staves.get(si).map_or(true, |s| s.show)
    }

    pub(crate) fn min_vertical_distance(&self) -> f64 {
        self.style.sp(StyleId::MinVerticalDistance)
    }
}

/// Resolve a chord or grace chord by reference.
pub fn chord_at(measures: &[MeasureBase], r: ChordRef) -> Option<&Chord> {
    let chord = measures
        .get(r.loc.measure)?
        .as_measure()?
        .segments
        .get(r.loc.segment)?
        .element(r.loc.track)?
        .as_chord()?;
    match r.grace {
        Some(g) => chord.grace_notes.get(g),
        None => Some(chord),
    }
}

pub fn chord_at_mut(measures: &mut [MeasureBase], r: ChordRef) -> Option<&mut Chord> {
    let chord = measures
        .get_mut(r.loc.measure)?
        .as_measure_mut()?
        .segments
        .get_mut(r.loc.segment)?
        .element_mut(r.loc.track)?
        .as_chord_mut()?;
    match r.grace {
        Some(g) => chord.grace_notes.get_mut(g),
        None => Some(chord),
    }
}

/// Index of the measure whose time range contains `tick`.
pub fn find_measure(measures: &[MeasureBase], tick: Tick) -> Option<usize> {
    measures.iter().position(|mb| {
        mb.as_measure()
            .is_some_and(|m| tick >= m.tick && tick < m.end_tick())
    })
}

/// The ChordRest starting exactly at `tick` on `track`.
pub fn chord_rest_at(measures: &[MeasureBase], tick: Tick, track: usize) -> Option<ElementLoc> {
    let mi = find_measure(measures, tick)?;
    let m = measures[mi].as_measure()?;
    let rtick = tick - m.tick;
    m.segments.iter().enumerate().find_map(|(si, s)| {
        (s.segment_type == SegmentType::ChordRest && s.rtick == rtick && s.cr(track).is_some())
            .then_some(ElementLoc { measure: mi, segment: si, track })
    })
}

/// The ChordRest sounding at `tick` on `track`.
pub fn chord_rest_covering(measures: &[MeasureBase], tick: Tick, track: usize) -> Option<ElementLoc> {
    let mi = find_measure(measures, tick)?;
    let m = measures[mi].as_measure()?;
    let rtick = tick - m.tick;
    m.segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.segment_type == SegmentType::ChordRest && s.rtick <= rtick)
        .filter_map(|(si, s)| {
            let cr = s.cr(track)?.chord_rest()?;
            (s.rtick + cr.ticks > rtick).then_some(ElementLoc { measure: mi, segment: si, track })
        })
        .last()
}
