//! System assembly: places every measure on one system and runs the
//! system-wide passes over the result.

use log::{debug, trace};

use super::autoplace::{autoplace_measure_element, autoplace_segment_element};
use super::beams::{is_top_beam, layout_beam, not_top_beam};
use super::elements::*;
use super::measure::*;
use super::spanners::{layout_spanner, lookup_dynamic, process_lines, resolve_anchors};
use super::tuplets::{layout_tuplet, tuplet_of};
use super::{Collaborators, LayoutContext};
use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::shape::Shape;
use crate::style::StyleId;

/// Build the one system of the linear layout.
pub(crate) fn layout_linear_system(
    score: &mut Score,
    lc: &mut LayoutContext,
    collab: &Collaborators,
) -> System {
    let mut system = System::new();
    system.staves = score
        .staves
        .iter()
        .map(|s| SysStaff { y: 0.0, height: 0.0, show: s.show() })
        .collect();

    place_measures(score, lc, &mut system, collab);
    hide_empty_staves(score, &mut system, true);
    seed_measure_shapes(score, &system);

    let (stick, etick) = system_ticks(score, &system);
    if etick > stick {
        let slurs = overlapping(score, stick, etick, |sp| {
            sp.kind == SpannerKind::Slur && sp.tick < etick && sp.tick2 >= stick
        });
        process_lines(score, &mut system, &slurs, false);
    }

    let dynamics = layout_chord_rests(score, &mut system);
    layout_tuplets(score, &system);
    fold_dynamics(score, &dynamics);

    if etick > stick {
        layout_system_spanners(score, &mut system, stick, etick);
    }

    layout_tempo_and_fermatas(score, &system);
    layout_jumps_and_markers(score, &system);
    layout_texts(score, &system);

    collab.lyrics.layout_lyrics(score, &mut system);
    layout2(score, &mut system);
    layout_final(score, &mut system);
    system
}

// ═══════════════════════════════════════════════════════════════════════
// Placement
// ═══════════════════════════════════════════════════════════════════════

fn place_measures(
    score: &mut Score,
    lc: &mut LayoutContext,
    system: &mut System,
    collab: &Collaborators,
) {
    let mut x = 0.0;
    let mut first = true;
    for mi in 0..score.measures.len() {
        if score.measures[mi].is_vbox() {
            layout_vbox(score, mi, lc.tick);
            continue;
        }
        system.measures.push(mi);
        layout_measure_linear(score, lc, mi, collab);

        let width = if score.measures[mi].is_measure() {
            if first {
                layout_system(score, system);
                if let Some(m) = score.measures[mi].as_measure_mut() {
                    if m.repeat_start {
                        if let Some(si) = m.find_segment_r(SegmentType::StartRepeatBarLine, 0) {
                            m.segments[si].enabled = true;
                        }
                    }
                }
                add_system_header(score, mi);
                x += system.left_margin;
                first = false;
            } else if score.measure(mi).is_some_and(Measure::header) {
                remove_system_header(score, mi);
            }
            create_end_barlines(score, mi);
            let w = compute_min_width(score, mi);
            if let Some(m) = score.measures[mi].as_measure_mut() {
                stretch_measure(m, w);
                m.pos = Point::new(x, 0.0);
            }
            layout_staff_lines(score, mi);
            w
        } else {
            layout_hbox(score, mi, x)
        };
        x += width;
    }
    system.width = x;
    debug!("placed {} measure bases, system width {x}", system.measures.len());
}

/// Left margin for instrument names and the bracket, and provisional
/// staff positions.
fn layout_system(score: &Score, system: &mut System) {
    let style = &score.style;
    let sp = style.spatium();
    let names = score
        .staves
        .iter()
        .filter_map(|s| s.name.as_deref())
        .map(|n| text_width(n, style, sp))
        .fold(0.0, f64::max);
    let mut margin = 0.0;
    if names > 0.0 {
        margin += names + style.sp(StyleId::InstrumentNameOffset);
    }
    if score.nstaves() > 1 {
        margin += style.sp(StyleId::BracketWidth) + style.sp(StyleId::BracketDistance);
    }
    system.left_margin = margin;

    let mut y = 0.0;
    for (staff, ss) in score.staves.iter().zip(system.staves.iter_mut()) {
        ss.y = y;
        ss.height = staff.height(style);
        y += ss.height + style.sp(StyleId::StaffDistance);
    }
}

fn layout_hbox(score: &mut Score, mi: usize, x: f64) -> f64 {
    let height = score.staves.iter().map(|s| s.height(&score.style)).sum::<f64>();
    let MeasureBase::HBox(b) = &mut score.measures[mi] else { return 0.0 };
    b.pos = Point::new(x + b.top_gap, 0.0);
    b.bbox = Rect::new(0.0, 0.0, b.width, height);
    b.width
}

/// Vertical frames stay out of the system; they only get their own size.
fn layout_vbox(score: &mut Score, mi: usize, tick: Tick) {
    let style = &score.style;
    let width = style.value(StyleId::PageWidth) - 2.0 * style.value(StyleId::PageLeftMargin);
    let MeasureBase::VBox(b) = &mut score.measures[mi] else { return };
    b.tick = tick;
    b.pos = Point::ZERO;
    b.bbox = Rect::new(0.0, 0.0, width, b.height);
}

// ═══════════════════════════════════════════════════════════════════════
// Hidden staves and measure shapes
// ═══════════════════════════════════════════════════════════════════════

/// Nothing but rests or empty tracks on the staff in this measure.
fn staff_is_empty(m: &Measure, staff: usize) -> bool {
    let tracks = staff * VOICES..(staff + 1) * VOICES;
    m.segments.iter().filter(|s| s.is_chord_rest_type()).all(|s| {
        tracks.clone().all(|t| s.element(t).and_then(Element::as_chord).is_none())
            && s.annotations.iter().all(|a| a.staff_idx() != staff)
    })
}

/// Hide staves with nothing to show, as configured per staff or by style.
pub(crate) fn hide_empty_staves(score: &Score, system: &mut System, is_first_system: bool) {
    let style = &score.style;
    let nstaves = score.nstaves();
    let mut any_shown = false;
    for (si, staff) in score.staves.iter().enumerate() {
        let candidate = match staff.hide_when_empty {
            HideMode::Always => true,
            HideMode::Never => false,
            HideMode::Auto => {
                style.flag(StyleId::HideEmptyStaves)
                    && nstaves > 1
                    && !(is_first_system && style.flag(StyleId::DontHideStavesInFirstSystem))
            }
        };
        let hide = candidate
            && system
                .measures
                .iter()
                .filter_map(|&mi| score.measure(mi))
                .all(|m| staff_is_empty(m, si));
        if let Some(ss) = system.staves.get_mut(si) {
            ss.show = !hide && staff.show();
            any_shown |= ss.show;
        }
        if hide {
            trace!("staff {si} hidden in this system");
        }
    }
    if !any_shown {
        // an empty system still shows its staves
        for (ss, staff) in system.staves.iter_mut().zip(&score.staves) {
            ss.show = staff.show();
        }
    }
}

/// Measure staff shape = segment shapes at their positions (time
/// signatures excluded) + the staff-line box.
fn seed_measure_shapes(score: &mut Score, system: &System) {
    let nstaves = score.nstaves();
    for &mi in &system.measures {
        let Some(m) = score.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { continue };
        let mut shapes = vec![Shape::new(); nstaves];
        for (si, shape) in shapes.iter_mut().enumerate() {
            for s in m.segments.iter().filter(|s| s.segment_type != SegmentType::TimeSig) {
                if let Some(ss) = s.staff_shape(si) {
                    shape.add(&ss.translated(s.pos));
                }
            }
            if let Some(r) = m.staff_lines.get(si) {
                shape.add_rect(*r);
            }
        }
        m.staff_shapes = shapes;
    }
}

fn system_ticks(score: &Score, system: &System) -> (Tick, Tick) {
    let stick = system.first_measure().map_or(0, |mi| score.measures[mi].tick());
    let etick = system.last_measure().map_or(0, |mi| score.measures[mi].end_tick());
    (stick, etick)
}

/// Managed spanners overlapping `[stick, etick]` that pass `keep`.
fn overlapping(score: &Score, stick: Tick, etick: Tick, keep: impl Fn(&Spanner) -> bool) -> Vec<SpannerId> {
    score
        .spanner_map
        .find_overlapping(stick, etick)
        .into_iter()
        .map(|iv| iv.value)
        .filter(|&id| score.spanner(id).is_some_and(&keep))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Chord/rest pass: beams, ties, articulations, dynamics
// ═══════════════════════════════════════════════════════════════════════

fn chord_rest_segments(score: &Score, mi: usize) -> Vec<usize> {
    score.measure(mi).map_or_else(Vec::new, |m| m.segments_of(SegmentType::ChordRest))
}

/// Fold a laid-out beam into the shapes of the segment and measure of its
/// first chord.
fn fold_beam(score: &mut Score, loc: ElementLoc, id: BeamId) {
    let Some(beam) = score.beams.get(id.0) else { return };
    let staff = beam.staff_idx();
    let shape = beam.shape();
    let Some(m) = score.measures.get_mut(loc.measure).and_then(MeasureBase::as_measure_mut) else { return };
    let m_pos = m.pos;
    let Some(seg) = m.segments.get_mut(loc.segment) else { return };
    let seg_pos = seg.pos;
    let local = shape.translated(-(seg_pos + m_pos));
    seg.staff_shape_mut(staff).add(&local);
    m.staff_shape_mut(staff).add(&local.translated(seg_pos));
}

/// Ties and note spanners starting on a chord's notes.
fn layout_note_spanners(score: &mut Score, system: &mut System, r: ChordRef) {
    let Some(c) = score.chord(r) else { return };
    let ids: Vec<SpannerId> = c
        .notes
        .iter()
        .flat_map(|n| n.tie_for.into_iter().chain(n.spanner_for.iter().copied()))
        .collect();
    for id in ids {
        layout_spanner(score, system, id);
    }
}

fn layout_ties(score: &mut Score, system: &mut System, r: ChordRef) {
    let Some(c) = score.chord(r) else { return };
    let ties: Vec<SpannerId> = c.notes.iter().filter_map(|n| n.tie_for).collect();
    for id in ties {
        layout_spanner(score, system, id);
    }
}

/// Staff articulations once the beam has fixed the stem length.
fn layout_chord_articulations(score: &mut Score, loc: ElementLoc) {
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(loc.measure).and_then(MeasureBase::as_measure_mut) else { return };
    let tick = m.tick;
    let Some(seg) = m.segments.get_mut(loc.segment) else { return };
    let tick = tick + seg.rtick;
    let Some(e) = seg.element_mut(loc.track) else { return };
    let ctx = ElementContext::new(style, staves.get(e.staff_idx()), tick);
    if let Some(c) = e.as_chord_mut() {
        layout_articulations2(c, &ctx);
    }
    e.bbox = e.shape().bbox();
}

/// A hairpin overlapping the dynamic's tick starts or ends on it.
fn anchors_hairpin(score: &mut Score, d: AnnotationLoc) -> bool {
    let Some(m) = score.measure(d.measure) else { return false };
    let Some(seg) = m.segments.get(d.segment) else { return false };
    let tick = m.tick + seg.rtick;
    let candidates: Vec<SpannerId> = score
        .spanner_map
        .find_overlapping(tick, tick)
        .into_iter()
        .map(|iv| iv.value)
        .collect();
    let mut anchored = false;
    for id in candidates {
        resolve_anchors(score, id);
        let Some(sp) = score.spanner(id) else { continue };
        if sp.is_hairpin()
            && (lookup_dynamic(score, sp.start_element) == Some(d)
                || lookup_dynamic(score, sp.end_element) == Some(d))
        {
            anchored = true;
        }
    }
    anchored
}

/// How a laid-out annotation interacts with the measure shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Autoplace {
    /// Layout only.
    Off,
    /// Move clear of the shape without adding to it.
    Avoid,
    /// Move clear of the shape and add to it.
    Add,
}

/// Lay out one annotation at its default position and autoplace it
/// against its staff's measure shape.
fn place_annotation(score: &mut Score, d: AnnotationLoc, mode: Autoplace) {
    let min_distance = score.min_vertical_distance();
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(d.measure).and_then(MeasureBase::as_measure_mut) else { return };
    let mtick = m.tick;
    let Measure { segments, staff_shapes, .. } = m;
    let Some(seg) = segments.get_mut(d.segment) else { return };
    let tick = mtick + seg.rtick;
    let seg_pos = seg.pos;
    let Some(e) = seg.annotations.get_mut(d.index) else { return };
    let staff = e.staff_idx();
    layout_element(e, &ElementContext::new(style, staves.get(staff), tick));
    if mode == Autoplace::Off {
        return;
    }
    if staff_shapes.len() <= staff {
        staff_shapes.resize(staff + 1, Shape::new());
    }
    let add = mode == Autoplace::Add;
    if let Some(r) = autoplace_segment_element(e, seg_pos, &staff_shapes[staff], min_distance, add) {
        staff_shapes[staff].add_rect(r);
    }
}

/// Beams, ties and articulations of every chord/rest, then dynamics and
/// figured bass. Returns the dynamics to fold into the shapes later.
fn layout_chord_rests(score: &mut Score, system: &mut System) -> Vec<AnnotationLoc> {
    let ntracks = score.ntracks();
    let mut dynamics = Vec::new();
    for mi in system.measures.clone() {
        for si in chord_rest_segments(score, mi) {
            for track in 0..ntracks {
                let loc = ElementLoc { measure: mi, segment: si, track };
                let Some(e) = score.element(loc) else { continue };
                let Some(cr) = e.chord_rest() else { continue };
                if let Some(bid) = cr.beam {
                    if score.beams.get(bid.0).is_some_and(|b| is_top_beam(b, ChordRef::from(loc))) {
                        layout_beam(score, system, bid);
                        fold_beam(score, loc, bid);
                    }
                }
                let Some(graces) = score.element(loc).and_then(Element::as_chord).map(|c| c.grace_notes.len())
                else {
                    continue;
                };
                for g in 0..graces {
                    layout_ties(score, system, ChordRef { loc, grace: Some(g) });
                }
                layout_ties(score, system, ChordRef::from(loc));
                layout_chord_articulations(score, loc);
            }

            let count = score.measure(mi).map_or(0, |m| m.segments[si].annotations.len());
            for index in 0..count {
                let d = AnnotationLoc { measure: mi, segment: si, index };
                let Some(e) = score.annotation(d) else { continue };
                if e.visible && e.is_dynamic() {
                    place_annotation(score, d, Autoplace::Off);
                    let autoplace = score.annotation(d).is_some_and(|e| e.autoplace);
                    if autoplace && !anchors_hairpin(score, d) {
                        place_annotation(score, d, Autoplace::Avoid);
                        dynamics.push(d);
                    }
                } else if matches!(e.kind, ElementKind::FiguredBass(_)) {
                    place_annotation(score, d, Autoplace::Off);
                }
            }
        }
    }
    dynamics
}

/// Brackets of tuplets starting at each chord/rest, innermost first.
fn layout_tuplets(score: &mut Score, system: &System) {
    let ntracks = score.ntracks();
    for &mi in &system.measures {
        let segs = chord_rest_segments(score, mi);
        for track in 0..ntracks {
            if !score.staff_shown(system, track2staff(track)) {
                continue;
            }
            for &si in &segs {
                let loc = ElementLoc { measure: mi, segment: si, track };
                if score.element(loc).and_then(Element::chord_rest).is_none() {
                    continue;
                }
                let mut de = DurationRef::ChordRest(loc);
                while let Some(tid) = tuplet_of(score, de) {
                    if score.tuplets.get(tid.0).and_then(|t| t.elements.first()) != Some(&de) {
                        break;
                    }
                    layout_tuplet(score, tid);
                    fold_tuplet(score, tid, loc);
                    de = DurationRef::Tuplet(tid);
                }
            }
        }
    }
}

fn fold_tuplet(score: &mut Score, id: TupletId, loc: ElementLoc) {
    let Some(t) = score.tuplets.get(id.0) else { return };
    let staff = t.staff_idx();
    let shape = t.shape();
    let Some(m) = score.measures.get_mut(loc.measure).and_then(MeasureBase::as_measure_mut) else { return };
    if let Some(seg) = m.segments.get_mut(loc.segment) {
        let seg_pos = seg.pos;
        seg.staff_shape_mut(staff).add(&shape.translated(-seg_pos));
    }
    m.staff_shape_mut(staff).add(&shape);
}

fn fold_dynamics(score: &mut Score, dynamics: &[AnnotationLoc]) {
    for &d in dynamics {
        let Some(m) = score.measures.get_mut(d.measure).and_then(MeasureBase::as_measure_mut) else { continue };
        let Some(seg) = m.segments.get_mut(d.segment) else { continue };
        let Some(e) = seg.annotations.get(d.index) else { continue };
        let staff = e.staff_idx();
        let shape = e.shape().translated(e.pos);
        let seg_pos = seg.pos;
        seg.staff_shape_mut(staff).add(&shape);
        m.staff_shape_mut(staff).add(&shape.translated(seg_pos));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Spanners
// ═══════════════════════════════════════════════════════════════════════

/// Ottavas, pedals (aligned) and the other lines, voltas sharing one
/// height, unmanaged spanners, then every segment folded into the
/// shapes of the measures it crosses.
fn layout_system_spanners(score: &mut Score, system: &mut System, stick: Tick, etick: Tick) {
    let spanners = overlapping(score, stick, etick, |sp| sp.tick < etick && sp.tick2 > stick);
    let (mut ottavas, mut pedals, mut others) = (Vec::new(), Vec::new(), Vec::new());
    for id in spanners {
        match score.spanner(id).map(|sp| sp.kind) {
            Some(SpannerKind::Ottava) => ottavas.push(id),
            Some(SpannerKind::Pedal) => pedals.push(id),
            Some(SpannerKind::Slur) | None => {}
            Some(_) => others.push(id),
        }
    }
    process_lines(score, system, &ottavas, false);
    process_lines(score, system, &pedals, true);
    process_lines(score, system, &others, false);

    let voltas: Vec<usize> = system
        .spanner_segments
        .iter()
        .enumerate()
        .filter(|(_, ss)| ss.kind == SpannerKind::Volta)
        .map(|(i, _)| i)
        .collect();
    if voltas.len() > 1 {
        let y = voltas
            .iter()
            .map(|&i| system.spanner_segments[i].user_off.y)
            .fold(0.0, f64::min);
        for &i in &voltas {
            system.spanner_segments[i].set_offset_y(y);
        }
    }

    for id in score.unmanaged_spanners.clone() {
        let Some(sp) = score.spanner(id) else { continue };
        if sp.tick >= etick || sp.tick2 < stick {
            continue;
        }
        layout_spanner(score, system, id);
    }

    for &mi in &system.measures {
        let Some(m) = score.measure(mi) else { continue };
        let (tick, end_tick, m_pos) = (m.tick, m.end_tick(), m.pos);
        let adds: Vec<(usize, Shape)> = system
            .spanner_segments
            .iter()
            .filter_map(|ss| {
                let sp = score.spanner(ss.spanner)?;
                if !(sp.tick < end_tick && sp.tick2 > tick) {
                    return None;
                }
                let shape = match ss.kind {
                    SpannerKind::LyricsLine => ss.shape().translated(-m_pos),
                    _ => ss.shape().translated(ss.pos() - m_pos),
                };
                Some((sp.staff_idx(), shape))
            })
            .collect();
        let Some(m) = score.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { continue };
        for (staff, shape) in adds {
            m.staff_shape_mut(staff).add(&shape);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tempo, fermatas and texts
// ═══════════════════════════════════════════════════════════════════════

fn annotation_locs(score: &Score, system: &System, keep: impl Fn(&Element) -> bool) -> Vec<AnnotationLoc> {
    let mut locs = Vec::new();
    for &mi in &system.measures {
        let Some(m) = score.measure(mi) else { continue };
        for (si, seg) in m.segments.iter().enumerate().filter(|(_, s)| s.is_chord_rest_type()) {
            for (index, e) in seg.annotations.iter().enumerate() {
                if keep(e) {
                    locs.push(AnnotationLoc { measure: mi, segment: si, index });
                }
            }
        }
    }
    locs
}

fn layout_tempo_and_fermatas(score: &mut Score, system: &System) {
    let locs = annotation_locs(score, system, |e| {
        matches!(e.kind, ElementKind::TempoText(_) | ElementKind::Fermata(_))
    });
    for d in locs {
        let Some(m) = score.measure(d.measure) else { continue };
        let tick = m.tick + m.segments[d.segment].rtick;
        match score.annotation(d).map(|e| &e.kind) {
            Some(ElementKind::TempoText(t)) => {
                let tempo = t.tempo;
                score.tempo_map.set_tempo(tick, tempo);
                place_annotation(score, d, Autoplace::Add);
            }
            Some(ElementKind::Fermata(_)) => layout_fermata_annotation(score, d, tick),
            _ => {}
        }
    }
}

/// Fermata above the chord on its track, folded into the shapes.
fn layout_fermata_annotation(score: &mut Score, d: AnnotationLoc, tick: Tick) {
    let min_distance = score.min_vertical_distance();
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(d.measure).and_then(MeasureBase::as_measure_mut) else { return };
    let Measure { segments, staff_shapes, .. } = m;
    let Some(seg) = segments.get_mut(d.segment) else { return };
    let Some(track) = seg.annotations.get(d.index).map(|e| e.track) else { return };
    let (anchor_x, anchor_top) = seg
        .element(track)
        .map_or((0.0, 0.0), |c| (c.pos.x, c.canvas_bbox().top()));
    let seg_pos = seg.pos;
    let Some(e) = seg.annotations.get_mut(d.index) else { return };
    let staff = e.staff_idx();
    let ctx = ElementContext::new(style, staves.get(staff), tick);
    layout_fermata(e, &ctx, anchor_top);
    e.pos.x += anchor_x;
    if staff_shapes.len() <= staff {
        staff_shapes.resize(staff + 1, Shape::new());
    }
    autoplace_segment_element(e, seg_pos, &staff_shapes[staff], min_distance, false);
    let shape = e.shape().translated(e.pos);
    seg.staff_shape_mut(staff).add(&shape);
    staff_shapes[staff].add(&shape.translated(seg_pos));
}

fn layout_jumps_and_markers(score: &mut Score, system: &System) {
    let min_distance = score.min_vertical_distance();
    for &mi in &system.measures {
        let Score { measures, staves, style, .. } = &mut *score;
        let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { continue };
        let tick = m.tick;
        let Measure { el, staff_shapes, .. } = m;
        for e in el.iter_mut() {
            if !e.visible || !matches!(e.kind, ElementKind::Jump(_) | ElementKind::Marker(_)) {
                continue;
            }
            let staff = e.staff_idx();
            layout_element(e, &ElementContext::new(style, staves.get(staff), tick));
            if staff_shapes.len() <= staff {
                staff_shapes.resize(staff + 1, Shape::new());
            }
            if let Some(r) = autoplace_measure_element(e, &staff_shapes[staff], min_distance, true) {
                staff_shapes[staff].add_rect(r);
            }
        }
    }
}

/// Fret diagrams, then staff texts and chord symbols, then rehearsal
/// marks; each kind avoids the ones placed before it.
fn layout_texts(score: &mut Score, system: &System) {
    for &mi in &system.measures {
        let Some(m) = score.measure(mi) else { continue };
        let segs = m.segments_of(SegmentType::ChordRest);
        for si in segs {
            let kinds: [fn(&ElementKind) -> bool; 3] = [
                |k| matches!(k, ElementKind::FretDiagram(_)),
                |k| matches!(k, ElementKind::StaffText(_) | ElementKind::Harmony(_)),
                |k| matches!(k, ElementKind::RehearsalMark(_)),
            ];
            for is_kind in kinds {
                let count = score.measure(mi).map_or(0, |m| m.segments[si].annotations.len());
                for index in 0..count {
                    let d = AnnotationLoc { measure: mi, segment: si, index };
                    if score.annotation(d).is_some_and(|e| e.visible && is_kind(&e.kind)) {
                        place_annotation(score, d, Autoplace::Add);
                    }
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Staff distances and final pass
// ═══════════════════════════════════════════════════════════════════════

/// Union of a staff's measure shapes in system coordinates.
fn staff_shape_in_system(score: &Score, system: &System, staff: usize) -> Shape {
    let mut shape = Shape::new();
    for &mi in &system.measures {
        if let Some(s) = score.measure(mi).and_then(|m| Some(m.staff_shape(staff)?.translated(m.pos))) {
            shape.add(&s);
        }
    }
    shape
}

/// Staff positions: the style distance, or more if the shapes of two
/// neighbouring staves would collide. Hidden staves take no room.
pub(crate) fn layout2(score: &mut Score, system: &mut System) {
    let style = &score.style;
    let min_distance = score.min_vertical_distance();
    let mut prev: Option<(usize, Shape)> = None;
    let mut y = 0.0;
    for si in 0..score.nstaves() {
        let shown = score.staff_shown(system, si);
        if !shown {
            if let Some(ss) = system.staves.get_mut(si) {
                ss.y = y;
                ss.height = 0.0;
            }
            continue;
        }
        let staff = &score.staves[si];
        let shape = staff_shape_in_system(score, system, si);
        if let Some((p, upper)) = &prev {
            let same_part = score.staves[*p].part == staff.part;
            let dist = if same_part { StyleId::AkkoladeDistance } else { StyleId::StaffDistance };
            let py = system.staff_y(*p);
            let ph = system.staff(*p).map_or(0.0, |s| s.height);
            y = py + ph + style.sp(dist);
            if let Some(d) = upper.min_vertical_distance(&shape) {
                y = y.max(py + d + min_distance);
            }
        }
        if let Some(ss) = system.staves.get_mut(si) {
            ss.y = y;
            ss.height = staff.height(style);
        }
        prev = Some((si, shape));
    }
    system.height = prev.map_or(0.0, |(p, _)| system.staff_y(p) + system.staff(p).map_or(0.0, |s| s.height));
    for &mi in &system.measures {
        if let Some(MeasureBase::HBox(b)) = score.measures.get_mut(mi) {
            b.bbox.height = system.height;
        }
    }
}

/// Barlines spanning several staves reach the bottom of the last one.
fn barline_layout2(score: &mut Score, system: &System, loc: ElementLoc) {
    let staff = track2staff(loc.track);
    let shown = score.staff_shown(system, staff);
    let Some(e) = score.element_mut(loc) else { return };
    let ElementKind::BarLine(b) = &e.kind else { return };
    if !shown {
        e.bbox.height = 0.0;
        return;
    }
    let last = staff + b.span.max(1) - 1;
    let bottom = system.staff_y(last) + system.staff(last).map_or(0.0, |s| s.height);
    let height = bottom - system.staff_y(staff);
    if height > e.bbox.height {
        e.bbox.height = height;
    }
}

/// Measure number over the first shown staff every `MeasureNumberInterval`
/// measures.
fn measure_layout2(score: &mut Score, system: &System, mi: usize) {
    let min_distance = score.min_vertical_distance();
    let staff = (0..score.nstaves()).find(|&si| score.staff_shown(system, si)).unwrap_or(0);
    let Score { measures, staves, style, .. } = score;
    let Some(m) = measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { return };
    let interval = style.value(StyleId::MeasureNumberInterval) as i32;
    let show = style.flag(StyleId::ShowMeasureNumber) && interval > 0 && m.no > 0 && (m.no + 1) % interval == 0;
    if !show {
        m.measure_number = None;
        return;
    }
    let mut e = Element::new(ElementKind::MeasureNumber(Text::new((m.no + 1).to_string())), staff * VOICES);
    layout_element(&mut e, &ElementContext::new(style, staves.get(staff), m.tick));
    let shape = m.staff_shape_mut(staff).clone();
    if let Some(r) = autoplace_measure_element(&mut e, &shape, min_distance, true) {
        m.staff_shape_mut(staff).add_rect(r);
    }
    m.measure_number = Some(e);
}

/// Vertical extent of an arpeggio spanning several staves.
fn layout_arpeggio(score: &mut Score, system: &System, loc: ElementLoc) {
    let staff = track2staff(loc.track);
    let Some(span) = score
        .element(loc)
        .and_then(Element::as_chord)
        .and_then(|c| c.arpeggio.as_ref())
        .map(|a| a.span)
    else {
        return;
    };
    if span <= 1 {
        return;
    }
    let last = (staff + span - 1).min(score.nstaves().saturating_sub(1));
    let bottom = system.staff_y(last) + system.staff(last).map_or(0.0, |s| s.height) - system.staff_y(staff);
    let Some(e) = score.element_mut(loc) else { return };
    if let Some(c) = e.as_chord_mut() {
        layout_arpeggio2(c, bottom);
    }
    e.bbox = e.shape().bbox();
}

/// Everything that needs the final staff distances: cross-staff beams,
/// grace beams and slurs, arpeggios, ties and note spanners, barlines and
/// measure numbers.
fn layout_final(score: &mut Score, system: &mut System) {
    let ntracks = score.ntracks();
    for mi in system.measures.clone() {
        let Some(nsegs) = score.measure(mi).map(|m| m.segments.len()) else { continue };
        for track in 0..ntracks {
            for si in 0..nsegs {
                let loc = ElementLoc { measure: mi, segment: si, track };
                let Some(e) = score.element(loc) else { continue };
                if matches!(e.kind, ElementKind::BarLine(_)) {
                    barline_layout2(score, system, loc);
                    continue;
                }
                let Some(cr) = e.chord_rest() else { continue };
                if !score.staff_shown(system, track2staff(track)) {
                    continue;
                }
                if let Some(bid) = cr.beam {
                    if score.beams.get(bid.0).is_some_and(|b| not_top_beam(b, ChordRef::from(loc))) {
                        layout_beam(score, system, bid);
                    }
                }
                let Some(c) = score.element(loc).and_then(Element::as_chord) else { continue };
                let graces: Vec<(Option<BeamId>, Vec<SpannerId>)> = c
                    .grace_notes
                    .iter()
                    .map(|g| (g.cr.beam, g.grace_slurs.clone()))
                    .collect();
                for (g, (beam, slurs)) in graces.into_iter().enumerate() {
                    let r = ChordRef { loc, grace: Some(g) };
                    if let Some(bid) = beam {
                        if score.beams.get(bid.0).is_some_and(|b| b.first() == Some(r)) {
                            layout_beam(score, system, bid);
                        }
                    }
                    layout_note_spanners(score, system, r);
                    for id in slurs {
                        layout_spanner(score, system, id);
                    }
                }
                layout_arpeggio(score, system, loc);
                layout_note_spanners(score, system, ChordRef::from(loc));
            }
        }
        measure_layout2(score, system, mi);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Page
// ═══════════════════════════════════════════════════════════════════════

/// Put the system on a page at the margins and index everything on it.
pub(crate) fn finalize_page(score: &Score, mut system: System) -> Page {
    let style = &score.style;
    let mut page = Page::new(0);
    page.pos = Point::ZERO;
    system.pos = Point::new(
        style.value(StyleId::PageLeftMargin),
        style.value(StyleId::PageTopMargin) + style.sp(StyleId::StaffUpperBorder),
    );
    page.bbox = Rect::new(0.0, 0.0, system.width, style.value(StyleId::PageHeight));
    rebuild_index(score, &system, &mut page.index);
    debug!("page finalized: {} indexed items", page.index.len());
    page.systems.push(system);
    page
}

fn rebuild_index(score: &Score, system: &System, index: &mut SpatialIndex) {
    index.clear();
    let origin = system.pos;
    let staff_origin = |staff: usize| origin + Point::new(0.0, system.staff_y(staff));

    for &mi in &system.measures {
        let mb = &score.measures[mi];
        let frame = Rect::new(0.0, 0.0, mb.width(), system.height);
        index.insert(frame.translated(origin + mb.pos()), ItemRef::Measure(mi));
        let Some(m) = mb.as_measure() else { continue };
        for (si, seg) in m.segments.iter().enumerate().filter(|(_, s)| s.enabled) {
            let seg_origin = m.pos + seg.pos;
            for (track, e) in seg.elements.iter().enumerate() {
                let Some(e) = e.as_ref().filter(|e| e.visible) else { continue };
                if !score.staff_shown(system, e.staff_idx()) {
                    continue;
                }
                let r = e.canvas_bbox().translated(staff_origin(e.staff_idx()) + seg_origin);
                index.insert(r, ItemRef::Element(ElementLoc { measure: mi, segment: si, track }));
            }
            for (ai, e) in seg.annotations.iter().enumerate().filter(|(_, e)| e.visible) {
                let r = e.canvas_bbox().translated(staff_origin(e.staff_idx()) + seg_origin);
                index.insert(r, ItemRef::Annotation(AnnotationLoc { measure: mi, segment: si, index: ai }));
            }
        }
        for (i, e) in m.el.iter().enumerate().filter(|(_, e)| e.visible) {
            let r = e.canvas_bbox().translated(staff_origin(e.staff_idx()) + m.pos);
            index.insert(r, ItemRef::MeasureElement(mi, i));
        }
    }
    for (i, ss) in system.spanner_segments.iter().enumerate().filter(|(_, s)| s.visible) {
        index.insert(ss.canvas_bbox().translated(staff_origin(ss.staff_idx)), ItemRef::SpannerSegment(i));
    }
    for (i, beam) in score.beams.iter().enumerate() {
        index.insert(beam.bbox().translated(staff_origin(beam.staff_idx())), ItemRef::Beam(BeamId(i)));
    }
    for (i, t) in score.tuplets.iter().enumerate() {
        let Some(m) = score.measures.get(t.measure) else { continue };
        index.insert(t.bbox.translated(staff_origin(t.staff_idx()) + m.pos()), ItemRef::Tuplet(TupletId(i)));
    }
}
