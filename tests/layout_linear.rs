//! Linear layout tests: placement, shapes, spanners, maps and the page index.

mod support;

use pretty_assertions::assert_eq;
use scorelayout::*;
use support::*;

/// The chord or rest starting at `tick` on `track`, located after layout.
fn cr_at(score: &Score, tick: Tick, track: usize) -> ElementLoc {
    chord_rest_at(&score.measures, tick, track).expect("chord/rest at tick")
}

/// The dynamic on `track` attached at `tick`.
fn dynamic_at(score: &Score, tick: Tick, track: usize) -> AnnotationLoc {
    let loc = cr_at(score, tick, track);
    let seg = &measure(score, loc.measure).segments[loc.segment];
    let index = seg
        .annotations
        .iter()
        .position(|a| a.is_dynamic() && a.track == track)
        .expect("dynamic at tick");
    AnnotationLoc { measure: loc.measure, segment: loc.segment, index }
}

/// Two staves over three measures: beamed eighths, a hairpin between two
/// dynamics, a triplet, texts, lyrics and a tempo change.
fn rich_score() -> Score {
    let mut b = ScoreBuilder::new(2);
    let m0 = b.add_measure(common_time());
    for _ in 0..8 {
        b.add_chord(m0, 0, QUARTER / 2, &["G4"]);
    }
    b.add_chord(m0, 4, WHOLE, &["C4"]);
    b.add_annotation(m0, 0, dynamic("p", 0));

    let m1 = b.add_measure(common_time());
    let triplet: Vec<DurationRef> = (0..3)
        .map(|_| DurationRef::ChordRest(b.add_chord(m1, 0, QUARTER / 3, &["A4"])))
        .collect();
    b.add_tuplet(0, 3, 2, triplet);
    b.add_chord(m1, 0, QUARTER, &["B4"]);
    b.add_chord(m1, 0, 2 * QUARTER, &["C5"]);
    b.add_chord(m1, 4, WHOLE, &["E4"]);
    b.add_annotation(m1, 0, dynamic("f", 0));
    b.add_annotation(m1, QUARTER, text(ElementKind::StaffText, "dolce", 0));
    b.add_spanner(Spanner::new(SpannerKind::Hairpin(HairpinType::Crescendo), 0, WHOLE, 0));

    let m2 = b.add_measure(common_time());
    let e5 = b.add_chord(m2, 0, WHOLE, &["E5"]);
    b.add_lyrics(e5, "la", 0);
    b.add_chord(m2, 4, WHOLE, &["G4"]);
    let tempo = TempoText { text: "Allegro".into(), tempo: 2.5 };
    b.add_annotation(m2, 0, Element::new(ElementKind::TempoText(tempo), 0));
    b.add_annotation(m2, 0, text(ElementKind::RehearsalMark, "A", 0));
    b.build()
}

// ═══════════════════════════════════════════════════════════════════════
// Placement
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn one_measure_system_is_measure_plus_margin() {
    let mut score = whole_notes(2, 1).build();
    score.layout_linear();

    let sys = system(&score);
    let m = measure(&score, 0);
    assert_eq!(sys.measures, vec![0]);
    assert!(sys.left_margin > 0.0, "two staves need a bracket margin");
    assert!(approx(m.pos.x, sys.left_margin));
    assert!(approx(sys.width, sys.left_margin + m.width), "{} vs {}", sys.width, m.width);
}

#[test]
fn one_measure_shape_is_segments_plus_staff_lines() {
    let mut score = whole_notes(2, 1).build();
    score.layout_linear();

    let m = measure(&score, 0);
    for staff in 0..2 {
        let expected = m
            .segments
            .iter()
            .filter(|s| s.segment_type != SegmentType::TimeSig)
            .filter_map(|s| s.staff_shape(staff).map(|sh| sh.translated(s.pos).bbox()))
            .fold(m.staff_lines[staff], |acc, r| acc.united(&r));
        let actual = m.staff_shape(staff).expect("staff shape").bbox();
        for (a, e) in [(actual.left(), expected.left()), (actual.right(), expected.right())] {
            assert!(approx(a, e), "staff {staff}: {a} vs {e}");
        }
        assert!(approx(actual.top(), expected.top()));
        assert!(approx(actual.bottom(), expected.bottom()));
    }
}

#[test]
fn system_width_sums_measures_and_frames() {
    let mut b = whole_notes(1, 2);
    b.add_hbox(30.0);
    b.add_vbox(80.0);
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, WHOLE, &["D5"]);
    let mut score = b.build();
    score.layout_linear();

    let sys = system(&score);
    assert_eq!(sys.measures, vec![0, 1, 2, 4], "vertical frames stay out of the system");
    let total: f64 = sys.measures.iter().map(|&mi| score.measures[mi].width()).sum();
    assert!(approx(sys.width, sys.left_margin + total), "{} vs {}", sys.width, total);

    for pair in sys.measures.windows(2) {
        let (a, b) = (&score.measures[pair[0]], &score.measures[pair[1]]);
        assert!(a.pos().x + a.width() <= b.pos().x + 1e-6, "measures {pair:?} overlap");
    }
    let MeasureBase::VBox(vbox) = &score.measures[3] else { panic!("expected a vertical frame") };
    assert!(approx(vbox.bbox.height, 80.0));
}

#[test]
fn only_the_first_measure_carries_the_header() {
    let mut score = whole_notes(1, 3).build();
    score.layout_linear();

    let header = |mi| measure(&score, mi).find_segment_r(SegmentType::HeaderClef, 0).is_some();
    assert_eq!((header(0), header(1), header(2)), (true, false, false));
    assert!(measure(&score, 0).header());
}

#[test]
fn measure_numbers_every_fifth_measure() {
    let mut score = whole_notes(1, 6).build();
    score.layout_linear();

    let shown: Vec<Option<String>> = (0..6)
        .map(|mi| {
            measure(&score, mi).measure_number.as_ref().and_then(|e| match &e.kind {
                ElementKind::MeasureNumber(t) => Some(t.text.clone()),
                _ => None,
            })
        })
        .collect();
    assert_eq!(shown, vec![None, None, None, None, Some("5".to_string()), None]);
}

#[test]
fn empty_staves_are_hidden_when_the_style_says_so() {
    let mut b = ScoreBuilder::new(2);
    b.style_mut().set(StyleId::HideEmptyStaves, 1.0);
    b.style_mut().set(StyleId::DontHideStavesInFirstSystem, 0.0);
    let m = b.add_measure(common_time());
    b.add_chord(m, 0, WHOLE, &["C5"]);
    b.add_rest(m, 4, WHOLE);
    let mut score = b.build();
    score.layout_linear();

    let sys = system(&score);
    let shown: Vec<bool> = sys.staves.iter().map(|s| s.show).collect();
    assert_eq!(shown, vec![true, false]);
    assert!(approx(sys.height, score.staves[0].height(&score.style)));
}

// ═══════════════════════════════════════════════════════════════════════
// Shapes and idempotence
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn measure_shapes_contain_their_segments() {
    let mut score = rich_score();
    score.layout_linear();

    for &mi in &system(&score).measures {
        let m = measure(&score, mi);
        for staff in 0..score.nstaves() {
            let ms = m.staff_shape(staff).expect("staff shape");
            for seg in m.segments.iter().filter(|s| s.segment_type != SegmentType::TimeSig) {
                if let Some(ss) = seg.staff_shape(staff) {
                    assert!(
                        ms.encloses(&ss.translated(seg.pos)),
                        "measure {mi} staff {staff}: {:?} segment escapes the measure shape",
                        seg.segment_type
                    );
                }
            }
            assert!(ms.encloses(&Shape::from_rect(m.staff_lines[staff])));
        }
    }
}

#[test]
fn relayout_is_idempotent() {
    let mut score = rich_score();
    let first = score.layout_linear().clone();
    let tempo = score.tempo_map.clone();
    let second = score.layout_linear().clone();
    assert_eq!(first, second);
    assert_eq!(tempo, score.tempo_map);
}

// ═══════════════════════════════════════════════════════════════════════
// Beams, tuplets
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn eighths_are_beamed_per_beat_and_stems_reach_the_beam() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(Fraction::new(2, 4));
    for _ in 0..4 {
        b.add_chord(m, 0, QUARTER / 2, &["G4"]);
    }
    let mut score = b.build();
    score.layout_linear();

    assert_eq!(score.beams.len(), 2);
    for beam in &score.beams {
        assert_eq!(beam.elements.len(), 2);
        assert!(beam.up);
        let level0 = beam.segments.first().expect("beam has a segment");
        for &r in &beam.elements {
            let stem = score.chord(r).and_then(|c| c.stem.clone()).expect("beamed chord has a stem");
            assert!(approx(stem.tip(), level0.y), "stem tip {} vs beam {}", stem.tip(), level0.y);
        }
    }
}

#[test]
fn nested_tuplet_brackets_sit_outside_inner_ones() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(Fraction::new(2, 4));
    let locs: Vec<DurationRef> = (0..3)
        .map(|_| DurationRef::ChordRest(b.add_chord(m, 0, QUARTER / 3, &["A4"])))
        .collect();
    let inner = b.add_tuplet(0, 3, 2, locs);
    let rest = b.add_rest(m, 0, QUARTER);
    let outer = b.add_tuplet(0, 2, 2, vec![DurationRef::Tuplet(inner), DurationRef::ChordRest(rest)]);
    let mut score = b.build();
    score.layout_linear();

    let (i, o) = (score.tuplets[inner.0].bbox, score.tuplets[outer.0].bbox);
    assert!(i.width > 0.0 && o.width > 0.0);
    assert!(o.bottom() <= i.top() + 1e-9, "outer {o:?} must clear inner {i:?}");
    assert!(o.left() <= i.left() + 1e-9 && o.right() >= i.right() - 1e-9);
}

#[test]
fn tuplets_on_hidden_staves_are_skipped() {
    let mut b = ScoreBuilder::new(2);
    b.staff_mut(1).visible = false;
    let m = b.add_measure(Fraction::new(2, 4));
    let mut tuplets = Vec::new();
    for track in [0, 4] {
        let locs = (0..3)
            .map(|_| DurationRef::ChordRest(b.add_chord(m, track, QUARTER / 3, &["A4"])))
            .collect();
        tuplets.push(b.add_tuplet(track, 3, 2, locs));
        b.add_rest(m, track, QUARTER);
    }
    let mut score = b.build();
    score.layout_linear();

    assert!(score.tuplets[tuplets[0].0].bbox.width > 0.0);
    assert_eq!(score.tuplets[tuplets[1].0].bbox, Rect::default());
}

// ═══════════════════════════════════════════════════════════════════════
// Dynamics and spanners
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn dynamics_anchoring_a_hairpin_are_not_autoplaced() {
    let mut b = whole_notes(1, 3);
    b.add_annotation(0, 0, dynamic("p", 0));
    b.add_annotation(1, 0, dynamic("f", 0));
    b.add_annotation(2, 0, dynamic("mf", 0));
    b.add_spanner(Spanner::new(SpannerKind::Hairpin(HairpinType::Crescendo), 0, WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let offset = |tick| annotation(&score, dynamic_at(&score, tick, 0)).autoplace_offset;
    assert_eq!(offset(0), None, "start dynamic of the hairpin");
    assert_eq!(offset(WHOLE), None, "end dynamic of the hairpin");
    assert!(offset(2 * WHOLE).is_some(), "a free dynamic is autoplaced");
}

#[test]
fn hairpin_over_two_measures_has_one_segment() {
    let mut b = whole_notes(1, 2);
    b.add_annotation(0, 0, dynamic("p", 0));
    b.add_annotation(1, 0, dynamic("f", 0));
    b.add_spanner(Spanner::new(SpannerKind::Hairpin(HairpinType::Crescendo), 0, WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = &system(&score).spanner_segments;
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].segment_type, SpannerSegmentType::Single);
    assert!(segs[0].end.x > segs[0].start.x);
}

#[test]
fn voltas_share_the_highest_offset() {
    let mut b = ScoreBuilder::new(1);
    for notes in [["C5"], ["C7"], ["C5"]] {
        let m = b.add_measure(common_time());
        b.add_chord(m, 0, WHOLE, &notes);
    }
    b.add_spanner(Spanner::new(SpannerKind::Volta, WHOLE, 2 * WHOLE, 0));
    b.add_spanner(Spanner::new(SpannerKind::Volta, 2 * WHOLE, 3 * WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let voltas: Vec<&SpannerSegment> =
        system(&score).spanner_segments.iter().filter(|s| s.kind == SpannerKind::Volta).collect();
    assert_eq!(voltas.len(), 2);
    assert_eq!(voltas[0].user_off.y, voltas[1].user_off.y);
    assert!(voltas[0].user_off.y < 0.0, "the volta over the high C lifts both");
    for s in voltas {
        let mid = s.pos().y + s.bbox.height / 2.0;
        assert!(approx(s.start.y, mid) && approx(s.end.y, mid), "{s:?}");
    }
}

#[test]
fn pedals_share_one_baseline() {
    let mut b = ScoreBuilder::new(1);
    for notes in [["C3"], ["C5"]] {
        let m = b.add_measure(common_time());
        b.add_chord(m, 0, WHOLE, &notes);
    }
    b.add_spanner(Spanner::new(SpannerKind::Pedal, 0, WHOLE, 0));
    b.add_spanner(Spanner::new(SpannerKind::Pedal, WHOLE, 2 * WHOLE, 0));
    let mut score = b.build();
    score.layout_linear();

    let segs = &system(&score).spanner_segments;
    assert_eq!(segs.len(), 2);
    assert!(approx(segs[0].pos().y, segs[1].pos().y), "{segs:?}");
    assert!(segs[1].user_off.y > 0.0, "the second pedal is pulled down to the low C");
    for s in segs {
        let mid = s.pos().y + s.bbox.height / 2.0;
        assert!(approx(s.start.y, mid) && approx(s.end.y, mid), "{s:?}");
    }
}

#[test]
fn tie_gets_one_segment_between_its_notes() {
    let mut b = ScoreBuilder::new(1);
    let m0 = b.add_measure(common_time());
    let a = b.add_chord(m0, 0, WHOLE, &["G4"]);
    let m1 = b.add_measure(common_time());
    let c = b.add_chord(m1, 0, WHOLE, &["G4"]);
    b.add_tie(NoteLoc { chord: a.into(), note: 0 }, NoteLoc { chord: c.into(), note: 0 });
    let mut score = b.build();
    score.layout_linear();

    let segs = &system(&score).spanner_segments;
    assert_eq!(segs.len(), 1);
    assert_eq!((segs[0].kind, segs[0].segment_type), (SpannerKind::Tie, SpannerSegmentType::Single));
    assert!(segs[0].end.x > segs[0].start.x);
}

// ═══════════════════════════════════════════════════════════════════════
// Signature and tempo maps
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn signature_change_registers_an_event() {
    let mut b = whole_notes(1, 1);
    for _ in 0..2 {
        let m = b.add_measure(Fraction::new(2, 2));
        b.add_chord(m, 0, WHOLE, &["C5"]);
    }
    let mut score = b.build();
    score.layout_linear();

    let ev = score.sig_map.event_at(WHOLE).expect("event at the 2/2 measure");
    assert!(ev.timesig.identical(&Fraction::new(2, 2)));
    assert_eq!(ev.bar, 1);
    assert!(score.sig_map.event_at(0).is_some());
    assert!(score.sig_map.event_at(2 * WHOLE).is_none(), "no change at the third measure");
}

#[test]
fn section_break_and_breath_pauses_land_in_the_tempo_map() {
    let mut b = whole_notes(1, 1);
    if let Some(m) = b.measure_mut(0) {
        m.section_break = true;
        m.pause = 1.5;
    }
    let m1 = b.add_measure(common_time());
    b.add_breath(m1, 2 * QUARTER, 0, 0.5);
    b.add_chord(m1, 0, 2 * QUARTER, &["C5"]);
    b.add_chord(m1, 0, 2 * QUARTER, &["D5"]);
    let mut score = b.build();
    score.layout_linear();

    assert_eq!(score.tempo_map.pause(WHOLE), 1.5);
    assert_eq!(score.tempo_map.pause(WHOLE + 2 * QUARTER), 0.5);
    assert_eq!(measure(&score, 1).no, 0, "a section break restarts the count");

    score.layout_linear();
    assert_eq!(score.tempo_map.pause(WHOLE), 1.5, "pauses are rebuilt, not accumulated");
}

#[test]
fn fermata_stretches_the_tempo_once() {
    let mut b = ScoreBuilder::new(1);
    let m = b.add_measure(common_time());
    for _ in 0..4 {
        b.add_chord(m, 0, QUARTER, &["C5"]);
    }
    b.add_annotation(m, 0, Element::new(ElementKind::Fermata(Fermata { time_stretch: 2.0 }), 0));
    let mut score = b.build();
    score.layout_linear();
    score.layout_linear();

    assert_eq!(score.tempo_map.tempo(0), 1.0);
    assert_eq!(score.tempo_map.tempo(QUARTER - 1), 2.0);
    assert_eq!(score.tempo_map.tempo(QUARTER), 2.0);
    assert_eq!(score.tempo_map.len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
// Page
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn spatial_index_finds_a_chord_by_position() {
    let mut score = whole_notes(1, 2).build();
    score.layout_linear();

    let loc = cr_at(&score, WHOLE, 0);
    let sys = system(&score);
    let m = measure(&score, loc.measure);
    let seg = &m.segments[loc.segment];
    let e = score.element(loc).expect("chord");
    let r = e.canvas_bbox();
    let p = sys.pos
        + Point::new(0.0, sys.staff_y(0))
        + m.pos
        + seg.pos
        + Point::new(r.x + r.width / 2.0, r.y + r.height / 2.0);

    let page = score.page().expect("page");
    assert!(page.index.items_at(p).contains(&ItemRef::Element(loc)));
    assert!(page.index.items_at(Point::new(-1000.0, -1000.0)).is_empty());
}

#[test]
fn system_sits_at_the_page_margins() {
    let mut score = whole_notes(1, 1).build();
    let style = score.style.clone();
    score.layout_linear();

    let page = score.page().expect("page");
    let sys = system(&score);
    assert_eq!(page.pos, Point::ZERO);
    assert!(approx(sys.pos.x, style.value(StyleId::PageLeftMargin)));
    assert!(approx(
        sys.pos.y,
        style.value(StyleId::PageTopMargin) + style.sp(StyleId::StaffUpperBorder)
    ));
    assert!(approx(page.bbox.width, sys.width));
}
