//! Slurs, grace notes, lines, measure texts and part scores.

mod support;

use pretty_assertions::assert_eq;
use scorelayout::timemap::DEFAULT_TEMPO;
use scorelayout::*;
use support::*;

fn cr_at(score: &Score, tick: Tick, track: usize) -> ElementLoc {
    chord_rest_at(&score.measures, tick, track).expect("chord/rest at tick")
}

fn segments_of(score: &Score, kind: SpannerKind) -> Vec<&SpannerSegment> {
    system(score).spanner_segments.iter().filter(|s| s.kind == kind).collect()
}

/// Horizontal center of a chord's note heads in system coordinates.
fn head_center_x(score: &Score, r: ChordRef) -> f64 {
    let m = measure(score, r.loc.measure);
    let seg = &m.segments[r.loc.segment];
    let e = seg.element(r.loc.track).expect("element");
    let c = score.chord(r).expect("chord");
    let heads = c.notes.iter().fold(Rect::default(), |acc, n| acc.united(&n.bbox.translated(n.pos)));
    m.pos.x + seg.pos.x + e.pos.x + c.offset.x + heads.x + heads.width / 2.0
}

/// Element rectangle in system coordinates.
fn element_rect(score: &Score, loc: ElementLoc) -> Rect {
    let m = measure(score, loc.measure);
    let seg = &m.segments[loc.segment];
    seg.element(loc.track).expect("element").canvas_bbox().translated(m.pos + seg.pos)
}

fn four_quarters() -> ScoreBuilder {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    for name in ["E4", "F4", "G4", "A4"] {
        b.add_chord(m, 0, QUARTER, &[name]);
    }
    b
}

// ═══════════════════════════════════════════════════════════════════════
// Slurs
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn slur_between_two_chords_is_a_single_segment() {
    let mut b = four_quarters();
    b.add_spanner(Spanner::new(SpannerKind::Slur, 0, 2 * QUARTER, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Slur);
    assert_eq!(segs.len(), 1);
    let s = segs[0];
    assert_eq!(s.segment_type, SpannerSegmentType::Single);
    let (first, last) = (cr_at(&score, 0, 0), cr_at(&score, 2 * QUARTER, 0));
    assert!(approx(s.start.x, head_center_x(&score, first.into())));
    assert!(approx(s.end.x, head_center_x(&score, last.into())));
    assert!(s.end.x < system(&score).width);
}

#[test]
fn slur_without_an_end_chord_runs_to_the_system_edge() {
    let mut b = four_quarters();
    b.add_spanner(Spanner::new(SpannerKind::Slur, QUARTER, 3 * WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Slur);
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].segment_type, SpannerSegmentType::Begin);
    assert!(approx(segs[0].end.x, system(&score).width));
    assert!(approx(segs[0].start.x, head_center_x(&score, cr_at(&score, QUARTER, 0).into())));
}

#[test]
fn slur_without_a_start_chord_comes_in_from_the_first_measure() {
    let mut b = four_quarters();
    b.add_spanner(Spanner::new(SpannerKind::Slur, 100, 3 * QUARTER, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Slur);
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].segment_type, SpannerSegmentType::End);
    assert!(approx(segs[0].start.x, measure(&score, 0).pos.x));
    assert!(approx(segs[0].end.x, head_center_x(&score, cr_at(&score, 3 * QUARTER, 0).into())));
}

// ═══════════════════════════════════════════════════════════════════════
// Grace notes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn grace_slur_runs_from_the_grace_to_its_main_chord() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, QUARTER, &["C5"]);
    let main = b.add_chord(m, 0, QUARTER, &["E5"]);
    b.add_chord(m, 0, 2 * QUARTER, &["C5"]);
    let grace = b.add_grace(main, &["D5"]);
    b.add_grace_slur(grace);
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Slur);
    assert_eq!(segs.len(), 1);
    let s = segs[0];
    let main = cr_at(&score, QUARTER, 0);
    let grace = ChordRef { loc: main, grace: Some(0) };
    assert_eq!(s.segment_type, SpannerSegmentType::Single);
    assert!(approx(s.start.x, head_center_x(&score, grace)), "{} vs grace", s.start.x);
    assert!(approx(s.end.x, head_center_x(&score, main.into())), "{} vs main", s.end.x);
    assert!(s.start.x < s.end.x);
    assert!(s.end.x < head_center_x(&score, cr_at(&score, 2 * QUARTER, 0).into()));
}

#[test]
fn short_graces_share_a_beam_reached_by_their_stems() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    let main = b.add_chord(m, 0, WHOLE, &["C5"]);
    b.add_grace(main, &["E5"]);
    b.add_grace(main, &["D5"]);
    let mut score = b.build();
    score.layout_linear();

    assert_eq!(score.beams.len(), 1);
    let beam = &score.beams[0];
    let main = cr_at(&score, 0, 0);
    let graces: Vec<ChordRef> = (0..2).map(|g| ChordRef { loc: main, grace: Some(g) }).collect();
    assert_eq!(beam.elements, graces);
    let level0 = beam.segments.first().expect("grace beam is laid out");
    for r in graces {
        let stem = score.chord(r).and_then(|c| c.stem.clone()).expect("grace stem");
        assert!(approx(stem.tip(), level0.y), "grace {:?}: {} vs {}", r.grace, stem.tip(), level0.y);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Cross-staff beams
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn cross_staff_beam_follows_the_final_staff_distance() {
    let mut b = ScoreBuilder::new(2);
    let m = b.add_measure(Fraction::new(2, 4));
    b.add_chord(m, 0, QUARTER / 2, &["G4"]);
    let moved = b.add_chord(m, 0, QUARTER / 2, &["A4"]);
    b.add_chord(m, 0, QUARTER, &["B4"]);
    b.add_chord(m, 4, 2 * QUARTER, &["C4"]);
    if let Some(c) = b.chord_mut(moved) {
        c.cr.staff_move = 1;
    }
    let mut score = b.build();
    score.layout_linear();

    assert_eq!(score.beams.len(), 1);
    let beam = &score.beams[0];
    assert!(beam.cross);
    let beam_y = beam.segments.first().expect("cross beam is laid out").y;

    let sys = system(&score);
    let dy = sys.staff_y(1) - sys.staff_y(0);
    assert!(dy > 0.0);
    let tip = |tick| {
        let r = ChordRef::from(cr_at(&score, tick, 0));
        score.chord(r).and_then(|c| c.stem.as_ref()).expect("stem").tip()
    };
    assert!(approx(tip(0), beam_y), "{} vs {beam_y}", tip(0));
    assert!(approx(tip(QUARTER / 2) + dy, beam_y), "{} + {dy} vs {beam_y}", tip(QUARTER / 2));
}

// ═══════════════════════════════════════════════════════════════════════
// Lines
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn ottava_clears_a_high_chord() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, WHOLE, &["C7"]);
    b.add_spanner(Spanner::new(SpannerKind::Ottava, 0, WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Ottava);
    assert_eq!(segs.len(), 1);
    let r = segs[0].canvas_bbox();
    let chord = element_rect(&score, cr_at(&score, 0, 0));
    assert!(chord.top() < 0.0, "C7 sits above the staff");
    assert!(r.bottom() <= chord.top() + 1e-6, "{r:?} vs {chord:?}");
    assert!(segs[0].user_off.y < 0.0);
}

#[test]
fn unmanaged_text_line_is_laid_out_once() {
    let mut b = whole_notes(1, 2);
    let mut line = Spanner::new(SpannerKind::TextLine, 0, WHOLE, 0);
    line.text = Some("rit.".into());
    b.add_unmanaged_spanner(line);
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::TextLine);
    assert_eq!(segs.len(), 1);
    assert!(segs[0].canvas_bbox().bottom() <= 0.0, "text lines sit above the staff");
    assert!(segs[0].end.x > segs[0].start.x);
}

#[test]
fn lyrics_line_starts_after_its_syllable() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    let first = b.add_chord(m, 0, 2 * QUARTER, &["G4"]);
    b.add_chord(m, 0, 2 * QUARTER, &["A4"]);
    b.add_lyrics(first, "la", 0);
    b.add_spanner(Spanner::new(SpannerKind::LyricsLine, 0, 2 * QUARTER, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::LyricsLine);
    assert_eq!(segs.len(), 1);
    let first = cr_at(&score, 0, 0);
    let m = measure(&score, first.measure);
    let seg = &m.segments[first.segment];
    let e = seg.element(first.track).expect("chord");
    let l = &e.chord_rest().expect("chord/rest").lyrics[0];
    let syllable = l.bbox.translated(m.pos + seg.pos + e.pos + l.pos);

    let s = segs[0];
    assert!(approx(s.start.x, syllable.right()));
    assert!(approx(s.start.y, syllable.bottom()), "line sits on the syllable's baseline");
    assert!(approx(s.end.y, s.start.y));
    assert!(s.end.x > s.start.x);
}

#[test]
fn glissando_rises_between_its_notes() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    let low = b.add_chord(m, 0, 2 * QUARTER, &["G4"]);
    let high = b.add_chord(m, 0, 2 * QUARTER, &["C5"]);
    b.add_glissando(NoteLoc { chord: low.into(), note: 0 }, NoteLoc { chord: high.into(), note: 0 });
    let mut score = b.build();
    score.layout_linear();

    let segs = segments_of(&score, SpannerKind::Glissando);
    assert_eq!(segs.len(), 1);
    let s = segs[0];
    let (low, high) = (element_rect(&score, cr_at(&score, 0, 0)), element_rect(&score, cr_at(&score, 2 * QUARTER, 0)));
    assert!(s.start.x > low.left() && s.end.x < high.right());
    assert!(s.start.x < s.end.x);
    assert!(s.end.y < s.start.y, "C5 is above G4");
}

// ═══════════════════════════════════════════════════════════════════════
// Measure texts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn rehearsal_marks_sit_above_staff_texts_above_fret_diagrams() {
    let mut b = whole_notes(1, 1);
    let mark = b.add_annotation(0, 0, text(ElementKind::RehearsalMark, "A", 0));
    let staff_text = b.add_annotation(0, 0, text(ElementKind::StaffText, "dolce", 0));
    let fret = b.add_annotation(0, 0, Element::new(ElementKind::FretDiagram(FretDiagram { strings: 6, frets: 4 }), 0));
    let mut score = b.build();
    score.layout_linear();

    let at = |d: AnnotationLoc| {
        let seg = cr_at(&score, 0, 0).segment;
        annotation(&score, AnnotationLoc { segment: seg, ..d }).canvas_bbox()
    };
    let (mark, staff_text, fret) = (at(mark), at(staff_text), at(fret));
    assert!(fret.bottom() <= 0.0, "fret diagram above the staff");
    assert!(staff_text.bottom() <= fret.top() + 1e-6, "{staff_text:?} over {fret:?}");
    assert!(mark.bottom() <= staff_text.top() + 1e-6, "{mark:?} over {staff_text:?}");
}

#[test]
fn jumps_and_markers_are_autoplaced_above_the_staff() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, WHOLE, &["A5"]);
    let marker = b.add_measure_element(m, text(ElementKind::Marker, "Segno", 0));
    let jump = b.add_measure_element(m, text(ElementKind::Jump, "D.S. al Fine", 0));
    let mut score = b.build();
    score.layout_linear();

    let m = measure(&score, 0);
    for i in [marker, jump] {
        let e = &m.el[i];
        assert!(e.autoplace_offset.is_some(), "{:?} autoplaced", e.kind);
        assert!(e.canvas_bbox().bottom() <= 0.0);
    }
    let (marker, jump) = (m.el[marker].canvas_bbox(), m.el[jump].canvas_bbox());
    assert!(jump.bottom() <= marker.top() + 1e-6, "the jump avoids the marker placed before it");
}

// ═══════════════════════════════════════════════════════════════════════
// Start repeats
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn start_repeat_follows_the_measure_flag_across_relayouts() {
    let mut b = whole_notes(1, 2);
    if let Some(m) = b.measure_mut(1) {
        m.repeat_start = true;
    }
    let mut score = b.build();
    score.layout_linear();

    let repeat = |score: &Score| measure(score, 1).find_segment_r(SegmentType::StartRepeatBarLine, 0);
    let si = repeat(&score).expect("start repeat segment");
    let bar = measure(&score, 1).segments[si].element(0).map(|e| e.kind.clone());
    assert!(
        matches!(bar, Some(ElementKind::BarLine(BarLine { bar_type: BarLineType::StartRepeat, .. }))),
        "{bar:?}"
    );
    assert!(score.element(cr_at(&score, WHOLE, 0)).is_some_and(Element::is_chord_rest));

    if let Some(m) = score.measures[1].as_measure_mut() {
        m.repeat_start = false;
    }
    score.layout_linear();
    assert_eq!(repeat(&score), None);
    assert!(score.element(cr_at(&score, WHOLE, 0)).is_some_and(Element::is_chord_rest));
}

// ═══════════════════════════════════════════════════════════════════════
// Part scores
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn part_scores_skip_signatures_and_fermata_stretches() {
    let build = |part: bool| {
        let mut b = whole_notes(1, 1);
        if part {
            b.part_score();
        }
        let m = b.add_measure(Fraction::new(2, 2));
        b.add_chord(m, 0, WHOLE, &["C5"]);
        b.add_annotation(m, 0, Element::new(ElementKind::Fermata(Fermata { time_stretch: 2.0 }), 0));
        b.add_annotation(m, 0, text(ElementKind::Symbol, "*", 0));
        b.add_annotation(m, 0, text(ElementKind::Harmony, "Cmaj7", 0));
        let mut score = b.build();
        score.layout_linear();
        score
    };
    let symbol_and_harmony = |score: &Score| {
        let seg = &measure(score, 1).segments[cr_at(score, WHOLE, 0).segment];
        let find = |is: fn(&ElementKind) -> bool| {
            seg.annotations.iter().find(|a| is(&a.kind)).expect("annotation").bbox
        };
        (
            find(|k| matches!(k, ElementKind::Symbol(_))),
            find(|k| matches!(k, ElementKind::Harmony(_))),
        )
    };

    let master = build(false);
    assert!(master.sig_map.event_at(WHOLE).is_some());
    assert_eq!(master.tempo_map.tempo(WHOLE), DEFAULT_TEMPO / 2.0);
    let (symbol, harmony) = symbol_and_harmony(&master);
    assert!(symbol.width > 0.0 && harmony.width > 0.0);

    let part = build(true);
    assert!(part.sig_map.is_empty());
    assert_eq!(part.tempo_map.tempo(WHOLE), DEFAULT_TEMPO);
    let (symbol, harmony) = symbol_and_harmony(&part);
    assert_eq!(symbol, Rect::default(), "only chord symbols are laid out in parts");
    assert!(harmony.width > 0.0);
}

// ═══════════════════════════════════════════════════════════════════════
// Hidden staves
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn always_hidden_staves_still_show_their_content() {
    let mut b = ScoreBuilder::new(3);
    for staff in [1, 2] {
        b.staff_mut(staff).hide_when_empty = HideMode::Always;
    }
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, WHOLE, &["C5"]);
    b.add_chord(m, 4, WHOLE, &["E4"]);
    b.add_rest(m, 8, WHOLE);
    let mut score = b.build();
    score.layout_linear();

    let shown: Vec<bool> = system(&score).staves.iter().map(|s| s.show).collect();
    assert_eq!(shown, vec![true, true, false]);
}
