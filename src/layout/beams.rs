//! Beam grouping (a pluggable collaborator) and beam geometry.

use log::trace;

use crate::geometry::Rect;
use crate::model::*;
use crate::style::StyleId;

/// Groups the chords of one measure into beams.
///
/// Implementations push new beams into `beams` and point the members'
/// `beam` fields at them. Back-references are already cleared, and the
/// arena holds the beams of earlier measures of the same layout.
pub trait Beaming {
    fn create_beams(&self, measure_idx: usize, measure: &mut Measure, beams: &mut Vec<Beam>, ntracks: usize);
}

/// Beams chords shorter than a quarter within each beat; `BeamMode`
/// overrides the beat rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBeaming;

/// Beat length used for grouping: dotted quarters in compound meters.
fn beat_ticks(timesig: crate::sigmap::Fraction) -> Tick {
    if timesig.denominator == 8 && timesig.numerator % 3 == 0 && timesig.numerator > 3 {
        3 * DIVISION / 2
    } else if timesig.denominator > 0 {
        (4 * DIVISION / timesig.denominator).max(1)
    } else {
        DIVISION
    }
}

impl Beaming for DefaultBeaming {
    fn create_beams(&self, measure_idx: usize, m: &mut Measure, beams: &mut Vec<Beam>, ntracks: usize) {
        let beat = beat_ticks(m.timesig);
        let crs = m.segments_of(SegmentType::ChordRest);
        for track in 0..ntracks {
            let mut group: Vec<usize> = Vec::new();
            let mut group_beat = 0;
            for &si in &crs {
                let loc = ElementLoc { measure: measure_idx, segment: si, track };
                beam_graces(m, loc, beams);

                let Some(e) = m.segments[si].cr(track) else { continue };
                let Some(cr) = e.chord_rest() else { continue };
                let beamable =
                    e.as_chord().is_some() && cr.ticks < DIVISION && cr.beam_mode != BeamMode::NoBeam;
                if !beamable {
                    make_beam(m, measure_idx, track, &group, beams);
                    group.clear();
                    continue;
                }
                let b = m.segments[si].rtick / beat;
                let split = match cr.beam_mode {
                    BeamMode::Begin => true,
                    BeamMode::Mid => false,
                    _ => !group.is_empty() && b != group_beat,
                };
                if split {
                    make_beam(m, measure_idx, track, &group, beams);
                    group.clear();
                }
                if group.is_empty() {
                    group_beat = b;
                }
                group.push(si);
            }
            make_beam(m, measure_idx, track, &group, beams);
        }
    }
}

fn make_beam(m: &mut Measure, measure_idx: usize, track: usize, group: &[usize], beams: &mut Vec<Beam>) {
    if group.len() < 2 {
        return;
    }
    let id = BeamId(beams.len());
    let mut members = Vec::with_capacity(group.len());
    let mut explicit: Option<bool> = None;
    let (mut ups, mut downs) = (0, 0);
    let mut cross = false;
    for &si in group {
        if let Some(c) = m.segments[si].element(track).and_then(Element::as_chord) {
            members.push(ChordRef::from(ElementLoc { measure: measure_idx, segment: si, track }));
            cross |= c.cr.staff_move != 0;
            if explicit.is_none() {
                explicit = match c.stem_direction {
                    Direction::Up => Some(true),
                    Direction::Down => Some(false),
                    Direction::Auto => None,
                };
            }
            if c.up {
                ups += 1;
            } else {
                downs += 1;
            }
        }
    }
    let up = explicit.unwrap_or(ups >= downs);
    for &si in group {
        if let Some(c) = m.segments[si].element_mut(track).and_then(Element::as_chord_mut) {
            c.cr.beam = Some(id);
            c.up = up;
        }
    }
    trace!("beam {} on track {track}: {} chords", id.0, members.len());
    let mut beam = Beam::new(track, members);
    beam.up = up;
    beam.cross = cross;
    beams.push(beam);
}

/// Consecutive short grace chords of one main chord share a beam.
fn beam_graces(m: &mut Measure, loc: ElementLoc, beams: &mut Vec<Beam>) {
    let Some(chord) = m.segments[loc.segment]
        .element_mut(loc.track)
        .and_then(Element::as_chord_mut)
    else {
        return;
    };
    let mut run: Vec<usize> = Vec::new();
    let n = chord.grace_notes.len();
    for i in 0..=n {
        let short = i < n && chord.grace_notes[i].cr.ticks < DIVISION;
        if short {
            run.push(i);
            continue;
        }
        if run.len() >= 2 {
            let id = BeamId(beams.len());
            let members = run
                .iter()
                .map(|&g| ChordRef { loc, grace: Some(g) })
                .collect();
            for &g in &run {
                chord.grace_notes[g].cr.beam = Some(id);
                chord.grace_notes[g].up = true;
            }
            beams.push(Beam::new(loc.track, members));
        }
        run.clear();
    }
}

/// A beam is laid out from its first member unless it is cross-staff.
pub(crate) fn is_top_beam(beam: &Beam, r: ChordRef) -> bool {
    !beam.cross && beam.first() == Some(r)
}

/// A cross-staff beam, laid out after the staves have their final
/// vertical positions.
pub(crate) fn not_top_beam(beam: &Beam, r: ChordRef) -> bool {
    beam.cross && beam.first() == Some(r)
}

struct Member {
    r: ChordRef,
    x: f64,
    start_y: f64,
    tip_y: f64,
    dy: f64,
    levels: i32,
    mag: f64,
}

/// Flat beam through the extreme stem tips; member stems are stretched to
/// reach it. Beam rectangles use system x and the beam staff's y.
pub(crate) fn layout_beam(score: &mut Score, system: &System, id: BeamId) {
    let Some(beam) = score.beams.get(id.0) else { return };
    let up = beam.up;
    let staff = beam.staff_idx();
    let base_y = system.staff_y(staff);
    let style = &score.style;
    let sp = style.spatium() * score.staves.get(staff).map_or(1.0, |s| s.mag);
    let staff_height = score.staves.get(staff).map_or(4.0 * sp, |s| s.height(style));

    let mut members: Vec<Member> = Vec::new();
    for &r in &beam.elements {
        let Some(m) = score.measures.get(r.loc.measure).and_then(MeasureBase::as_measure) else { continue };
        let Some(seg) = m.segments.get(r.loc.segment) else { continue };
        let Some(e) = seg.element(r.loc.track) else { continue };
        let Some(c) = chord_at(&score.measures, r) else { continue };
        let Some(stem) = &c.stem else { continue };
        let target = (staff as i32 + c.cr.staff_move).max(0) as usize;
        members.push(Member {
            r,
            x: m.pos.x + seg.pos.x + e.pos.x + c.offset.x + stem.pos.x,
            start_y: stem.pos.y,
            tip_y: stem.tip(),
            dy: system.staff_y(target) - base_y,
            levels: c.cr.beam_levels().max(1),
            mag: c.cr.mag,
        });
    }
    if members.is_empty() {
        return;
    }

    let grace = members.iter().any(|m| m.r.grace.is_some());
    let mid = staff_height / 2.0;
    let beam_y = if up {
        let y = members.iter().map(|m| m.tip_y + m.dy).fold(f64::INFINITY, f64::min);
        if grace { y } else { y.min(mid) }
    } else {
        let y = members.iter().map(|m| m.tip_y + m.dy).fold(f64::NEG_INFINITY, f64::max);
        if grace { y } else { y.max(mid) }
    };

    let mag = members[0].mag;
    let bw = style.value(StyleId::BeamWidth) * sp * mag;
    let bd = style.value(StyleId::BeamDistance) * sp * mag;
    let stem_w = style.value(StyleId::StemWidth) * sp * mag;

    for mem in &members {
        if let Some(c) = chord_at_mut(&mut score.measures, mem.r) {
            if let Some(stem) = c.stem.as_mut() {
                stem.length = beam_y - mem.dy - mem.start_y;
            }
            c.hook = None;
        }
        if let Some(e) = score.element_mut(mem.r.loc) {
            if let ElementKind::Chord(c) = &e.kind {
                e.bbox = c.shape().bbox();
            }
        }
    }

    let max_levels = members.iter().map(|m| m.levels).max().unwrap_or(1);
    let mut segments = Vec::new();
    for level in 0..max_levels {
        let xs: Vec<f64> = members
            .iter()
            .filter(|m| m.levels > level)
            .map(|m| m.x)
            .collect();
        let (Some(&x1), Some(&x2)) = (xs.first(), xs.last()) else { continue };
        let x2 = if x2 > x1 { x2 } else { x1 + sp };
        let offset = level as f64 * (bw + bd);
        let y = if up { beam_y + offset } else { beam_y - bw - offset };
        segments.push(Rect::new(x1, y, x2 - x1 + stem_w, bw));
    }
    if let Some(beam) = score.beams.get_mut(id.0) {
        beam.segments = segments;
    }
}
