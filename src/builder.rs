//! Population API for a well-formed [`Score`].
//!
//! Measures are appended in time order; chords and rests are appended per
//! track at a running cursor. Segments are kept sorted. Inserting a segment
//! in front of an existing one of the same measure shifts the segment index
//! of every later element, so structural items (clef changes, breaths) are
//! best added before the chords they precede. Locations stored in the score
//! (beams, tuplets, spanners) are kept valid either way.

use std::collections::HashMap;

use crate::model::*;
use crate::sigmap::Fraction;
use crate::style::Style;

pub struct ScoreBuilder {
    score: Score,
    /// Next free relative tick per (measure, track).
    cursors: HashMap<(usize, usize), Tick>,
    next_tick: Tick,
    last_timesig: Option<Fraction>,
}

impl ScoreBuilder {
    /// A score with `nstaves` staves, each in its own part.
    pub fn new(nstaves: usize) -> Self {
        Self {
            score: Score::new(nstaves),
            cursors: HashMap::new(),
            next_tick: 0,
            last_timesig: None,
        }
    }

    pub fn staff_mut(&mut self, idx: usize) -> &mut Staff {
        &mut self.score.staves[idx]
    }

    pub fn style_mut(&mut self) -> &mut Style {
        &mut self.score.style
    }

    /// Mark the score as a derived part.
    pub fn part_score(&mut self) -> &mut Self {
        self.score.is_master = false;
        self
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    // ── Measures and frames ──

    /// Append a measure whose length equals its signature.
    pub fn add_measure(&mut self, len: Fraction) -> usize {
        self.add_measure_with_timesig(len, len)
    }

    /// Append a measure. A time signature is inserted on every staff when
    /// the nominal signature changes (and in the first measure).
    pub fn add_measure_with_timesig(&mut self, len: Fraction, timesig: Fraction) -> usize {
        debug_assert!(len.ticks() > 0, "measure length must be positive");
        let ntracks = self.score.ntracks();
        let mut m = Measure::new(len, timesig);
        m.tick = self.next_tick;
        if self.last_timesig.map_or(true, |t| !t.identical(&timesig)) {
            let si = m.get_segment_r(SegmentType::TimeSig, 0, ntracks);
            for staff in 0..self.score.nstaves() {
                let ts = TimeSig { numerator: timesig.numerator, denominator: timesig.denominator };
                m.segments[si].add(Element::new(ElementKind::TimeSig(ts), staff * VOICES));
            }
        }
        self.last_timesig = Some(timesig);
        self.next_tick += len.ticks();
        self.score.measures.push(MeasureBase::Measure(m));
        self.score.measures.len() - 1
    }

    pub fn add_hbox(&mut self, width: f64) -> usize {
        self.score.measures.push(MeasureBase::HBox(HBox {
            tick: self.next_tick,
            width,
            top_gap: 0.0,
            section_break: false,
            pos: Default::default(),
            bbox: Default::default(),
        }));
        self.score.measures.len() - 1
    }

    pub fn add_vbox(&mut self, height: f64) -> usize {
        self.score.measures.push(MeasureBase::VBox(VBox {
            tick: self.next_tick,
            height,
            section_break: false,
            pos: Default::default(),
            bbox: Default::default(),
        }));
        self.score.measures.len() - 1
    }

    pub fn measure_mut(&mut self, mi: usize) -> Option<&mut Measure> {
        self.score.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut)
    }

    /// Absolute tick of `rtick` in measure `mi`.
    pub fn tick_of(&self, mi: usize, rtick: Tick) -> Tick {
        self.score.measures.get(mi).map_or(0, MeasureBase::tick) + rtick
    }

    /// Absolute tick of the segment holding `loc`.
    pub fn loc_tick(&self, loc: ElementLoc) -> Tick {
        let rtick = self
            .score
            .measure(loc.measure)
            .and_then(|m| m.segments.get(loc.segment))
            .map_or(0, |s| s.rtick);
        self.tick_of(loc.measure, rtick)
    }

    fn segment(&mut self, mi: usize, st: SegmentType, rtick: Tick) -> usize {
        debug_assert!(self.score.measure(mi).is_some(), "measure {mi} is a frame or missing");
        self.score.ensure_segment(mi, st, rtick).unwrap_or(0)
    }

    // ── Chords and rests ──

    fn add_chord_rest(&mut self, mi: usize, track: usize, ticks: Tick, kind: ElementKind) -> ElementLoc {
        debug_assert!(track < self.score.ntracks(), "track {track} out of range");
        let rtick = self.cursors.get(&(mi, track)).copied().unwrap_or(0);
        debug_assert!(
            self.score.measure(mi).is_some_and(|m| rtick + ticks <= m.ticks()),
            "chord/rest overflows measure {mi}"
        );
        let si = self.segment(mi, SegmentType::ChordRest, rtick);
        self.cursors.insert((mi, track), rtick + ticks);
        if let Some(m) = self.measure_mut(mi) {
            m.segments[si].add(Element::new(kind, track));
        }
        ElementLoc { measure: mi, segment: si, track }
    }

    /// Append a chord of pitch names (`"C4"`, `"F#5"`) on `track`.
    pub fn add_chord(&mut self, mi: usize, track: usize, ticks: Tick, names: &[&str]) -> ElementLoc {
        let notes = names.iter().filter_map(|n| Note::from_name(n)).collect();
        self.add_chord_rest(mi, track, ticks, ElementKind::Chord(Chord::new(ticks, notes)))
    }

    pub fn add_rest(&mut self, mi: usize, track: usize, ticks: Tick) -> ElementLoc {
        self.add_chord_rest(mi, track, ticks, ElementKind::Rest(Rest { cr: ChordRest::new(ticks) }))
    }

    /// Move the cursor of `track` without adding anything.
    pub fn skip(&mut self, mi: usize, track: usize, ticks: Tick) {
        *self.cursors.entry((mi, track)).or_insert(0) += ticks;
    }

    pub fn element_mut(&mut self, loc: ElementLoc) -> Option<&mut Element> {
        self.score.element_mut(loc)
    }

    pub fn chord_mut(&mut self, r: impl Into<ChordRef>) -> Option<&mut Chord> {
        chord_at_mut(&mut self.score.measures, r.into())
    }

    /// Grace chord in front of the chord at `loc`.
    pub fn add_grace(&mut self, loc: ElementLoc, names: &[&str]) -> ChordRef {
        let notes = names.iter().filter_map(|n| Note::from_name(n)).collect();
        let mut g = Chord::new(DIVISION / 2, notes);
        g.stem_direction = Direction::Up;
        let grace = self.chord_mut(loc).map(|c| {
            c.grace_notes.push(g);
            c.grace_notes.len() - 1
        });
        debug_assert!(grace.is_some(), "grace notes need a chord");
        ChordRef { loc, grace }
    }

    pub fn add_lyrics(&mut self, loc: ElementLoc, text: &str, verse: usize) {
        if let Some(cr) = self.score.element_mut(loc).and_then(Element::chord_rest_mut) {
            cr.lyrics.push(Lyrics::new(text, verse));
        }
    }

    // ── Annotations and structure ──

    /// Attach an annotation to the ChordRest segment at `rtick`.
    pub fn add_annotation(&mut self, mi: usize, rtick: Tick, e: Element) -> AnnotationLoc {
        let si = self.segment(mi, SegmentType::ChordRest, rtick);
        let index = self.measure_mut(mi).map_or(0, |m| {
            m.segments[si].annotations.push(e);
            m.segments[si].annotations.len() - 1
        });
        AnnotationLoc { measure: mi, segment: si, index }
    }

    /// Jump or marker attached to the measure.
    pub fn add_measure_element(&mut self, mi: usize, e: Element) -> usize {
        self.measure_mut(mi).map_or(0, |m| {
            m.el.push(e);
            m.el.len() - 1
        })
    }

    /// Breath mark with a pause in seconds before the chords at `rtick`.
    pub fn add_breath(&mut self, mi: usize, rtick: Tick, track: usize, pause: f64) {
        let si = self.segment(mi, SegmentType::Breath, rtick);
        if let Some(m) = self.measure_mut(mi) {
            m.segments[si].add(Element::new(ElementKind::Breath(Breath { pause }), track));
        }
    }

    pub fn add_clef_change(&mut self, mi: usize, rtick: Tick, staff: usize, clef_type: ClefType) {
        let tick = self.tick_of(mi, rtick);
        self.score.staves[staff].clefs.insert(tick, clef_type);
        let si = self.segment(mi, SegmentType::Clef, rtick);
        if let Some(m) = self.measure_mut(mi) {
            let clef = Clef { clef_type, small: false };
            m.segments[si].add(Element::new(ElementKind::Clef(clef), staff * VOICES));
        }
    }

    /// Key signature from the start of measure `mi` on.
    pub fn add_key_change(&mut self, mi: usize, staff: usize, fifths: i32) {
        let tick = self.tick_of(mi, 0);
        self.score.staves[staff].keys.insert(tick, KeySigEvent { fifths });
        let si = self.segment(mi, SegmentType::KeySig, 0);
        if let Some(m) = self.measure_mut(mi) {
            m.segments[si].add(Element::new(ElementKind::KeySig(KeySig { fifths }), staff * VOICES));
        }
    }

    // ── Spanners ──

    fn push_spanner(&mut self, sp: Spanner) -> SpannerId {
        debug_assert!(sp.tick2 >= sp.tick, "spanner ends before it starts");
        self.score.spanners.push(sp);
        SpannerId(self.score.spanners.len() - 1)
    }

    /// A spanner found through the interval index.
    pub fn add_spanner(&mut self, sp: Spanner) -> SpannerId {
        let (tick, tick2) = (sp.tick, sp.tick2);
        let id = self.push_spanner(sp);
        self.score.spanner_map.insert(tick, tick2, id);
        id
    }

    /// A spanner laid out on its own, outside the index.
    pub fn add_unmanaged_spanner(&mut self, sp: Spanner) -> SpannerId {
        let id = self.push_spanner(sp);
        self.score.unmanaged_spanners.push(id);
        id
    }

    fn note_spanner(&mut self, kind: SpannerKind, from: NoteLoc, to: NoteLoc) -> Spanner {
        let mut sp = Spanner::new(kind, self.loc_tick(from.chord.loc), self.loc_tick(to.chord.loc), from.chord.loc.track);
        sp.track2 = to.chord.loc.track;
        sp.start_note = Some(from);
        sp.end_note = Some(to);
        sp
    }

    /// Tie between two notes; laid out through the start note.
    pub fn add_tie(&mut self, from: NoteLoc, to: NoteLoc) -> SpannerId {
        let sp = self.note_spanner(SpannerKind::Tie, from, to);
        let id = self.push_spanner(sp);
        if let Some(n) = self.chord_mut(from.chord).and_then(|c| c.notes.get_mut(from.note)) {
            n.tie_for = Some(id);
        }
        id
    }

    pub fn add_glissando(&mut self, from: NoteLoc, to: NoteLoc) -> SpannerId {
        let sp = self.note_spanner(SpannerKind::Glissando, from, to);
        let id = self.push_spanner(sp);
        if let Some(n) = self.chord_mut(from.chord).and_then(|c| c.notes.get_mut(from.note)) {
            n.spanner_for.push(id);
        }
        id
    }

    /// Slur from a grace chord to its main chord.
    pub fn add_grace_slur(&mut self, grace: ChordRef) -> SpannerId {
        let tick = self.loc_tick(grace.loc);
        let mut sp = Spanner::new(SpannerKind::Slur, tick, tick, grace.loc.track);
        sp.start_chord = Some(grace);
        let id = self.push_spanner(sp);
        if let Some(g) = self.chord_mut(grace) {
            g.grace_slurs.push(id);
        }
        id
    }

    /// Tuplet over `elements`, which must be in time order on `track`.
    pub fn add_tuplet(&mut self, track: usize, actual: i32, normal: i32, elements: Vec<DurationRef>) -> TupletId {
        let id = TupletId(self.score.tuplets.len());
        let mut t = Tuplet::new(track, actual, normal, elements.clone());
        t.measure = match elements.first() {
            Some(DurationRef::ChordRest(loc)) => loc.measure,
            Some(DurationRef::Tuplet(inner)) => self.score.tuplets.get(inner.0).map_or(0, |t| t.measure),
            None => 0,
        };
        self.score.tuplets.push(t);
        for de in elements {
            match de {
                DurationRef::ChordRest(loc) => {
                    if let Some(cr) = self.score.element_mut(loc).and_then(Element::chord_rest_mut) {
                        cr.tuplet = Some(id);
                    }
                }
                DurationRef::Tuplet(inner) => {
                    if let Some(t) = self.score.tuplets.get_mut(inner.0) {
                        t.tuplet = Some(id);
                    }
                }
            }
        }
        id
    }

    pub fn build(self) -> Score {
        debug_assert!(self.score.check_invariants().is_ok(), "{:?}", self.score.check_invariants());
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn measures_get_consecutive_ticks() {
        let mut b = ScoreBuilder::new(1);
        b.add_measure(Fraction::new(4, 4));
        b.add_hbox(20.0);
        b.add_measure(Fraction::new(3, 4));
        let score = b.build();
        let ticks: Vec<Tick> = score.measures.iter().map(MeasureBase::tick).collect();
        assert_eq!(ticks, vec![0, 1920, 1920]);
    }

    #[test]
    fn time_signature_only_where_it_changes() {
        let mut b = ScoreBuilder::new(2);
        let m0 = b.add_measure(Fraction::new(4, 4));
        let m1 = b.add_measure(Fraction::new(4, 4));
        let m2 = b.add_measure(Fraction::new(3, 4));
        let score = b.build();
        let has_ts = |mi| score.measure(mi).is_some_and(|m| m.find_segment_r(SegmentType::TimeSig, 0).is_some());
        assert_eq!((has_ts(m0), has_ts(m1), has_ts(m2)), (true, false, true));
    }

    #[test]
    fn chords_advance_the_track_cursor() {
        let mut b = ScoreBuilder::new(1);
        let m = b.add_measure(Fraction::new(4, 4));
        let a = b.add_chord(m, 0, 960, &["C4"]);
        let c = b.add_chord(m, 0, 960, &["E4"]);
        let r = b.add_rest(m, 1, 1920);
        let score = b.build();
        let rticks: Vec<Tick> = [a, c, r]
            .iter()
            .map(|l| score.measure(l.measure).map_or(-1, |m| m.segments[l.segment].rtick))
            .collect();
        assert_eq!(rticks, vec![0, 960, 0]);
        assert_eq!(a.segment, r.segment);
    }

    #[test]
    fn tie_is_attached_to_its_start_note() {
        let mut b = ScoreBuilder::new(1);
        let m = b.add_measure(Fraction::new(2, 4));
        let a = b.add_chord(m, 0, 480, &["G4"]);
        let c = b.add_chord(m, 0, 480, &["G4"]);
        let from = NoteLoc { chord: a.into(), note: 0 };
        let to = NoteLoc { chord: c.into(), note: 0 };
        let id = b.add_tie(from, to);
        let score = b.build();
        assert_eq!(score.chord(a.into()).and_then(|c| c.notes[0].tie_for), Some(id));
        assert_eq!(score.spanner(id).map(|s| (s.tick, s.tick2)), Some((0, 480)));
        assert!(score.spanner_map.is_empty());
    }

    #[test]
    fn nested_tuplets_link_to_their_parent() {
        let mut b = ScoreBuilder::new(1);
        let m = b.add_measure(Fraction::new(2, 4));
        let locs: Vec<ElementLoc> = (0..3).map(|_| b.add_chord(m, 0, 160, &["A4"])).collect();
        let inner = b.add_tuplet(0, 3, 2, locs.iter().map(|&l| DurationRef::ChordRest(l)).collect());
        let rest = b.add_rest(m, 0, 480);
        let outer = b.add_tuplet(0, 2, 2, vec![DurationRef::Tuplet(inner), DurationRef::ChordRest(rest)]);
        let score = b.build();
        assert_eq!(score.tuplets[inner.0].tuplet, Some(outer));
        assert_eq!(score.element(locs[1]).and_then(|e| e.chord_rest()).and_then(|c| c.tuplet), Some(inner));
        assert_eq!(score.tuplets[outer.0].measure, m);
    }
}
