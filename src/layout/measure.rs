//! Measure pass: note lines, accidentals, stems and beams of one measure,
//! and the horizontal packing used when the measure is placed.

use log::{debug, trace};

use super::accidentals::{update_notes, AccidentalState};
use super::elements::*;
use super::{Collaborators, LayoutContext};
use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::shape::Shape;
use crate::sigmap::{Fraction, SigEvent};
use crate::style::{Style, StyleId};

/// Spacing grows with the logarithm of the duration ratio.
const DURATION_STRETCH: f64 = 0.865617;

// ═══════════════════════════════════════════════════════════════════════
// Measure pass
// ═══════════════════════════════════════════════════════════════════════

/// Advance the running measure number. Frames are never counted; a section
/// break restarts the count.
pub(crate) fn adjust_measure_no(lc: &mut LayoutContext, mb: &mut MeasureBase) {
    if let MeasureBase::Measure(m) = mb {
        lc.measure_no += m.no_offset;
        m.no = lc.measure_no;
        if !m.irregular {
            lc.measure_no += 1;
        }
    }
    if mb.section_break() {
        lc.measure_no = 0;
    }
}

/// Lay out measure base `mi`, starting at the context's tick cursor.
pub(crate) fn layout_measure_linear(
    score: &mut Score,
    lc: &mut LayoutContext,
    mi: usize,
    collab: &Collaborators,
) {
    let ntracks = score.ntracks();
    let prev_timesig = lc.prev_measure.and_then(|p| score.measure(p)).map(|m| m.timesig);
    let Score { measures, staves, style, beams, tempo_map, sig_map, is_master, .. } = score;
    let Some(mb) = measures.get_mut(mi) else { return };

    adjust_measure_no(lc, mb);
    if !mb.is_measure() {
        mb.set_tick(lc.tick);
        lc.prev_measure = Some(mi);
        return;
    }
    let Some(m) = mb.as_measure_mut() else { return };

    m.tick = lc.tick;
    let mtick = m.tick;
    update_segment_ticks(m);
    if m.section_break && m.pause != 0.0 {
        tempo_map.set_pause(m.end_tick(), m.pause);
    }

    // ── Lines, accidentals, stem directions ──
    for (si, staff) in staves.iter().enumerate() {
        let mut state = AccidentalState::new(staff.key_sig_event(mtick), staff.clef(mtick));
        let multi_voice = has_voices(m, si);
        let strack = si * VOICES;
        for seg in m.segments.iter_mut() {
            let tick = mtick + seg.rtick;
            let ctx = ElementContext::new(style, Some(staff), tick);
            match seg.segment_type {
                SegmentType::KeySig => {
                    state.init(staff.key_sig_event(tick), staff.clef(tick));
                    if let Some(e) = seg.element_mut(strack) {
                        layout_element(e, &ctx);
                    }
                }
                SegmentType::ChordRest => {
                    for track in strack..strack + VOICES {
                        if let Some(e) = seg.element_mut(track) {
                            prepare_chord_rest(e, track, multi_voice, &mut state, &ctx);
                        }
                    }
                }
                SegmentType::Clef => {
                    if let Some(e) = seg.element_mut(strack) {
                        if let ElementKind::Clef(c) = &mut e.kind {
                            c.small = true;
                            state.set_clef(c.clef_type);
                        }
                        layout_element(e, &ctx);
                    }
                }
                SegmentType::TimeSig | SegmentType::Ambitus | SegmentType::HeaderClef => {
                    if let Some(e) = seg.element_mut(strack) {
                        layout_element(e, &ctx);
                    }
                }
                _ => {}
            }
        }
    }

    clear_beam_refs(m);
    collab.beaming.create_beams(mi, m, beams, ntracks);

    // ── Chord spacing, lyrics, articulations ──
    for (si, staff) in staves.iter().enumerate() {
        let multi_voice = has_voices(m, si);
        for seg in m.segments.iter_mut().filter(|s| s.is_chord_rest_type()) {
            let ctx = ElementContext::new(style, Some(staff), mtick + seg.rtick);
            layout_chords1(seg, si, multi_voice, &ctx);
            for track in si * VOICES..(si + 1) * VOICES {
                let Some(e) = seg.element_mut(track) else { continue };
                if let Some(cr) = e.chord_rest_mut() {
                    let mag = cr.mag;
                    for l in cr.lyrics.iter_mut() {
                        layout_lyrics_item(l, &ctx, mag);
                    }
                }
                if let Some(c) = e.as_chord_mut() {
                    layout_articulations(c, &ctx);
                }
            }
        }
    }

    // ── Pauses, signatures, annotations ──
    for seg in m.segments.iter_mut() {
        let tick = mtick + seg.rtick;
        match seg.segment_type {
            SegmentType::Breath => {
                let mut pause = 0.0_f64;
                for e in seg.elements.iter_mut().flatten() {
                    if let ElementKind::Breath(b) = &e.kind {
                        pause = pause.max(b.pause);
                    }
                    let ctx = ElementContext::new(style, staves.get(e.staff_idx()), tick);
                    layout_element(e, &ctx);
                }
                if pause != 0.0 {
                    tempo_map.set_pause(tick, pause);
                }
            }
            SegmentType::TimeSig => {
                for (si, staff) in staves.iter_mut().enumerate() {
                    if let Some(ElementKind::TimeSig(ts)) = seg.element(si * VOICES).map(|e| &e.kind) {
                        staff.add_time_sig(tick, Fraction::new(ts.numerator, ts.denominator));
                    }
                }
            }
            SegmentType::ChordRest if *is_master => {
                let mut stretch = 0.0_f64;
                for e in seg.annotations.iter_mut() {
                    if let ElementKind::Fermata(f) = &e.kind {
                        stretch = stretch.max(f.time_stretch);
                    } else if !laid_out_by_system(&e.kind) {
                        let ctx = ElementContext::new(style, staves.get(e.staff_idx()), tick);
                        layout_element(e, &ctx);
                    }
                }
                if stretch != 0.0
                    && stretch != 1.0
                    && tempo_map.apply_fermata_stretch(tick, tick + seg.ticks - 1, stretch)
                {
                    trace!("fermata stretch {stretch} at tick {tick}");
                }
            }
            SegmentType::ChordRest => {
                // chord symbols are laid out in parts too
                for e in seg.annotations.iter_mut() {
                    if matches!(e.kind, ElementKind::Harmony(_)) {
                        let ctx = ElementContext::new(style, staves.get(e.staff_idx()), tick);
                        layout_element(e, &ctx);
                    }
                }
            }
            _ => {}
        }
    }

    // A signature event is written when the length differs from the last
    // one (even 4/4 vs 2/2) or the nominal signature changed.
    if *is_master {
        let len_changed = !m.len.identical(&lc.sig) && m.len != lc.sig.scaled(m.mm_rest_count);
        let timesig_changed = prev_timesig.is_some_and(|t| !m.timesig.identical(&t));
        if len_changed || timesig_changed {
            lc.sig = m.len;
            sig_map.add(mtick, SigEvent { len: lc.sig, timesig: m.timesig, bar: m.no });
            debug!("signature {} ({}) at tick {mtick}, bar {}", m.len, m.timesig, m.no);
        }
    }

    // ── Start repeat ──
    let start_repeat = m.find_segment_r(SegmentType::StartRepeatBarLine, 0);
    let mut moved = None;
    if m.repeat_start {
        let si = m.get_segment_r(SegmentType::StartRepeatBarLine, 0, ntracks);
        if start_repeat.is_none() {
            moved = Some((si, true));
        }
        let seg = &mut m.segments[si];
        seg.elements.iter_mut().for_each(|e| *e = None);
        for (staff, span) in bar_line_spans(staves) {
            let mut b = Element::new(
                ElementKind::BarLine(BarLine { bar_type: BarLineType::StartRepeat, span }),
                staff * VOICES,
            );
            layout_element(&mut b, &ElementContext::new(style, staves.get(staff), mtick));
            seg.add(b);
        }
    } else if let Some(si) = start_repeat {
        m.remove_segment(si);
        moved = Some((si, false));
    }

    // ── Final sweep ──
    let nstaves = staves.len();
    for seg in m.segments.iter_mut() {
        let tick = mtick + seg.rtick;
        if seg.is_chord_rest_type() {
            for e in seg.elements.iter_mut().flatten() {
                if e.as_chord().is_none() {
                    continue;
                }
                let ctx = ElementContext::new(style, staves.get(e.staff_idx()), tick);
                layout_element(e, &ctx);
                if let Some(c) = e.as_chord_mut().filter(|c| c.tremolo.is_some()) {
                    layout_tremolo(c, &ctx);
                }
                e.bbox = e.shape().bbox();
            }
        } else if seg.segment_type == SegmentType::EndBarLine {
            continue;
        }
        create_shapes(seg, nstaves);
    }

    lc.tick += m.ticks();
    lc.prev_measure = Some(mi);
    if let Some((at, inserted)) = moved {
        score.shift_segment_refs(mi, at, inserted);
    }
}

/// Items the system pass lays out once neighbouring shapes are known.
fn laid_out_by_system(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::TempoText(_)
            | ElementKind::Dynamic(_)
            | ElementKind::Fermata(_)
            | ElementKind::RehearsalMark(_)
            | ElementKind::FretDiagram(_)
            | ElementKind::Harmony(_)
            | ElementKind::StaffText(_)
            | ElementKind::FiguredBass(_)
    )
}

/// Each ChordRest segment lasts until the next one (or the measure end).
fn update_segment_ticks(m: &mut Measure) {
    let ticks = m.ticks();
    let crs = m.segments_of(SegmentType::ChordRest);
    for (i, &si) in crs.iter().enumerate() {
        let next = crs.get(i + 1).map_or(ticks, |&n| m.segments[n].rtick);
        m.segments[si].ticks = next - m.segments[si].rtick;
    }
}

/// Some voice other than the first has a chord or rest on the staff.
fn has_voices(m: &Measure, staff: usize) -> bool {
    let tracks = staff * VOICES + 1..(staff + 1) * VOICES;
    m.segments
        .iter()
        .filter(|s| s.is_chord_rest_type())
        .any(|s| tracks.clone().any(|t| s.cr(t).is_some()))
}

fn prepare_chord_rest(
    e: &mut Element,
    track: usize,
    multi_voice: bool,
    state: &mut AccidentalState,
    ctx: &ElementContext,
) {
    let Some(cr) = e.chord_rest_mut() else { return };
    let mag = if cr.small { ctx.style.value(StyleId::SmallNoteMag) } else { 1.0 };
    cr.mag = mag;
    e.mag = mag;
    let Some(chord) = e.as_chord_mut() else { return };

    update_notes(chord, state);
    let grace_mag = mag * ctx.style.value(StyleId::GraceNoteMag);
    for g in chord.grace_notes.iter_mut() {
        g.cr.mag = grace_mag;
        g.up = match g.stem_direction {
            Direction::Up => true,
            Direction::Down => false,
            Direction::Auto => track % 2 == 0,
        };
        layout_stem1(g, ctx, false);
    }
    compute_up(chord, track, multi_voice);
    layout_stem1(chord, ctx, true);
}

fn clear_beam_refs(m: &mut Measure) {
    for seg in m.segments.iter_mut().filter(|s| s.is_chord_rest_type()) {
        for e in seg.elements.iter_mut().flatten() {
            if let Some(cr) = e.chord_rest_mut() {
                cr.beam = None;
            }
            if let Some(c) = e.as_chord_mut() {
                for g in c.grace_notes.iter_mut() {
                    g.cr.beam = None;
                }
            }
        }
    }
}

/// Mirrored seconds and accidental columns of the chords of one staff;
/// rests move out of the way of other voices. Stems are recomputed since
/// beaming may have turned them.
fn layout_chords1(seg: &mut Segment, staff: usize, multi_voice: bool, ctx: &ElementContext) {
    for track in staff * VOICES..(staff + 1) * VOICES {
        let Some(e) = seg.element_mut(track) else { continue };
        if let Some(c) = e.as_chord_mut() {
            layout_stem1(c, ctx, true);
            for g in c.grace_notes.iter_mut() {
                layout_stem1(g, ctx, false);
            }
            compute_mirror(c);
            place_accidentals(c, ctx);
        } else {
            layout_rest(e, ctx, voice_rest_offset(track, multi_voice, ctx.sp()));
        }
    }
}

/// Collision shapes of a segment, one per staff, from its elements.
pub(crate) fn create_shapes(seg: &mut Segment, nstaves: usize) {
    let mut shapes = vec![Shape::new(); nstaves];
    for e in seg.elements.iter().flatten().filter(|e| e.visible) {
        if let Some(s) = shapes.get_mut(e.staff_idx()) {
            s.add(&e.shape().translated(e.pos));
        }
    }
    seg.shapes = shapes;
}

/// First staff and span of every barline, following the staves'
/// `bar_line_span`.
pub(crate) fn bar_line_spans(staves: &[Staff]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut si = 0;
    while si < staves.len() {
        let span = staves[si].bar_line_span.clamp(1, staves.len() - si);
        spans.push((si, span));
        si += span;
    }
    spans
}

// ═══════════════════════════════════════════════════════════════════════
// System header and end barlines
// ═══════════════════════════════════════════════════════════════════════

/// Clef and key signature in front of the first measure of the system.
pub(crate) fn add_system_header(score: &mut Score, mi: usize) {
    let Some(ci) = score.ensure_segment(mi, SegmentType::HeaderClef, 0) else { return };
    let existing = score.measure(mi).and_then(|m| m.find_segment_r(SegmentType::KeySig, 0));
    let tick = score.measures[mi].tick();
    let needs_key = existing.is_some() || score.staves.iter().any(|s| s.key_sig_event(tick).fifths != 0);
    let ki = if needs_key { score.ensure_segment(mi, SegmentType::KeySig, 0) } else { None };
    // the key segment sorts after the header clef
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return };

    let seg = &mut m.segments[ci];
    seg.header = true;
    seg.enabled = true;
    for (si, staff) in staves.iter().enumerate() {
        let ctx = ElementContext::new(style, Some(staff), tick);
        let mut clef = Element::new(
            ElementKind::Clef(Clef { clef_type: staff.clef(tick), small: false }),
            si * VOICES,
        );
        layout_element(&mut clef, &ctx);
        seg.add(clef);
    }
    create_shapes(seg, staves.len());

    let Some(ki) = ki else { return };
    let seg = &mut m.segments[ki];
    if existing.is_none() {
        seg.header = true;
    }
    for (si, staff) in staves.iter().enumerate() {
        if seg.element(si * VOICES).is_some() {
            continue;
        }
        let ctx = ElementContext::new(style, Some(staff), tick);
        let mut key = Element::new(
            ElementKind::KeySig(KeySig { fifths: staff.key_sig_event(tick).fifths }),
            si * VOICES,
        );
        layout_element(&mut key, &ctx);
        seg.add(key);
    }
    create_shapes(seg, staves.len());
}

pub(crate) fn remove_system_header(score: &mut Score, mi: usize) {
    score.retain_segments(mi, |s| !s.header);
}

/// Barlines closing the measure, one per barline span.
pub(crate) fn create_end_barlines(score: &mut Score, mi: usize) {
    let spans = bar_line_spans(&score.staves);
    let Some(rtick) = score.measure(mi).map(Measure::ticks) else { return };
    let Some(si) = score.ensure_segment(mi, SegmentType::EndBarLine, rtick) else { return };
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return };
    let bar_type = if m.repeat_end { BarLineType::EndRepeat } else { m.end_barline };
    let tick = m.tick + rtick;

    let seg = &mut m.segments[si];
    seg.elements.iter_mut().for_each(|e| *e = None);
    for (staff, span) in spans {
        let mut b = Element::new(ElementKind::BarLine(BarLine { bar_type, span }), staff * VOICES);
        layout_element(&mut b, &ElementContext::new(style, staves.get(staff), tick));
        seg.add(b);
    }
    create_shapes(seg, staves.len());
}

// ═══════════════════════════════════════════════════════════════════════
// Horizontal spacing
// ═══════════════════════════════════════════════════════════════════════

/// Space before the first segment of a measure.
fn leading_space(st: SegmentType, style: &Style) -> f64 {
    match st {
        SegmentType::HeaderClef | SegmentType::Clef => style.sp(StyleId::ClefLeftMargin),
        SegmentType::KeySig => style.sp(StyleId::KeysigLeftMargin),
        SegmentType::TimeSig => style.sp(StyleId::TimesigLeftMargin),
        SegmentType::ChordRest => style.sp(StyleId::BarNoteDistance),
        _ => 0.0,
    }
}

/// Minimum gap between the shapes of two neighbouring segments.
fn segment_gap(prev: SegmentType, cur: SegmentType, style: &Style) -> f64 {
    use SegmentType::*;
    match (prev, cur) {
        (ChordRest, ChordRest) => style.sp(StyleId::MinNoteDistance),
        (ChordRest, EndBarLine) | (Breath, EndBarLine) => style.sp(StyleId::NoteBarDistance),
        (HeaderClef | KeySig | TimeSig | Ambitus | BeginBarLine | StartRepeatBarLine, ChordRest) => {
            style.sp(StyleId::ClefKeyRightMargin)
        }
        (_, KeySig) => style.sp(StyleId::KeysigLeftMargin),
        (_, TimeSig) => style.sp(StyleId::TimesigLeftMargin),
        (_, Clef) => style.sp(StyleId::ClefLeftMargin),
        _ => style.sp(StyleId::MinNoteDistance),
    }
}

/// Space a ChordRest segment claims for its duration, relative to the
/// shortest one of the measure.
fn duration_space(ticks: Tick, min_ticks: Tick, style: &Style) -> f64 {
    let ratio = ticks.max(1) as f64 / min_ticks.max(1) as f64;
    let stretch = 1.0 + DURATION_STRETCH * ratio.ln();
    style.sp(StyleId::NoteDistance) * style.value(StyleId::MeasureSpacing) * stretch
}

/// Pack the enabled segments left to right as close as their shapes allow
/// and set the measure width. Returns the width.
pub(crate) fn compute_min_width(score: &mut Score, mi: usize) -> f64 {
    let Score { measures, style, .. } = score;
    let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return 0.0 };

    let min_ticks = m
        .segments
        .iter()
        .filter(|s| s.enabled && s.is_chord_rest_type() && s.ticks > 0)
        .map(|s| s.ticks)
        .min()
        .unwrap_or(DIVISION);

    let mut prev: Option<usize> = None;
    let mut x = 0.0;
    let mut width = 0.0;
    for i in 0..m.segments.len() {
        if !m.segments[i].enabled {
            m.segments[i].pos = Point::new(x, 0.0);
            continue;
        }
        let seg = &m.segments[i];
        x = match prev {
            None => {
                let left = seg.shapes.iter().flat_map(|s| s.rects()).map(Rect::left).fold(0.0, f64::min);
                leading_space(seg.segment_type, style) - left
            }
            Some(p) => {
                let ps = &m.segments[p];
                let overlap = ps
                    .shapes
                    .iter()
                    .zip(seg.shapes.iter())
                    .filter_map(|(a, b)| a.min_horizontal_distance(b))
                    .fold(0.0, f64::max);
                let mut d = overlap + segment_gap(ps.segment_type, seg.segment_type, style);
                if ps.is_chord_rest_type() {
                    d = d.max(duration_space(ps.ticks, min_ticks, style));
                }
                ps.pos.x + d
            }
        };
        let right = m.segments[i].shapes.iter().flat_map(|s| s.rects()).map(Rect::right).fold(0.0, f64::max);
        width = x + right;
        if m.segments[i].segment_type != SegmentType::EndBarLine {
            width += style.sp(StyleId::NoteBarDistance);
        }
        m.segments[i].pos = Point::new(x, 0.0);
        prev = Some(i);
    }
    m.width = width;
    trace!("measure {mi}: min width {width}");
    width
}

/// Widen the measure to `target`, giving the extra space to ChordRest
/// segments in proportion to their duration.
pub(crate) fn stretch_measure(m: &mut Measure, target: f64) {
    let extra = target - m.width;
    if extra > 0.0 {
        let total: Tick = m
            .segments
            .iter()
            .filter(|s| s.enabled && s.is_chord_rest_type())
            .map(|s| s.ticks)
            .sum();
        if total > 0 {
            let mut shift = 0.0;
            for seg in m.segments.iter_mut() {
                seg.pos.x += shift;
                if seg.enabled && seg.is_chord_rest_type() {
                    shift += extra * seg.ticks as f64 / total as f64;
                }
            }
        }
        m.width = target;
    }
    for i in 0..m.segments.len() {
        let next = m.segments.get(i + 1).map_or(m.width, |s| s.pos.x);
        m.segments[i].width = (next - m.segments[i].pos.x).max(0.0);
    }
}

/// One staff-line box per staff, spanning the measure.
pub(crate) fn layout_staff_lines(score: &mut Score, mi: usize) {
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return };
    m.staff_lines = staves
        .iter()
        .map(|s| Rect::new(0.0, 0.0, m.width, s.height(style)))
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn measure(no_offset: i32, irregular: bool, section_break: bool) -> MeasureBase {
        let mut m = Measure::new(Fraction::new(4, 4), Fraction::new(4, 4));
        m.no_offset = no_offset;
        m.irregular = irregular;
        m.section_break = section_break;
        MeasureBase::Measure(m)
    }

    fn numbers(bases: &mut [MeasureBase]) -> Vec<i32> {
        let mut lc = LayoutContext::new();
        bases
            .iter_mut()
            .filter_map(|mb| {
                adjust_measure_no(&mut lc, mb);
                mb.as_measure().map(|m| m.no)
            })
            .collect()
    }

    #[test]
    fn irregular_measures_share_the_next_number() {
        let mut bases = vec![
            measure(0, true, false),
            measure(0, false, false),
            measure(2, false, false),
            measure(0, false, false),
        ];
        assert_eq!(numbers(&mut bases), vec![0, 0, 3, 4]);
    }

    #[test]
    fn section_break_restarts_the_count() {
        let mut bases = vec![measure(0, false, false), measure(0, false, true), measure(0, false, false)];
        assert_eq!(numbers(&mut bases), vec![0, 1, 0]);
    }

    #[test]
    fn barline_spans_cover_every_staff() {
        let mut staves = vec![Staff::new(0), Staff::new(0), Staff::new(1)];
        staves[0].bar_line_span = 2;
        assert_eq!(bar_line_spans(&staves), vec![(0, 2), (2, 1)]);
        staves[2].bar_line_span = 5;
        assert_eq!(bar_line_spans(&staves), vec![(0, 2), (2, 1)]);
    }

    #[test]
    fn longer_notes_claim_more_space() {
        let style = Style::new();
        let quarter = duration_space(DIVISION, DIVISION / 2, &style);
        let eighth = duration_space(DIVISION / 2, DIVISION / 2, &style);
        assert!(quarter > eighth);
        assert_eq!(eighth, style.sp(StyleId::NoteDistance) * style.value(StyleId::MeasureSpacing));
    }
}
