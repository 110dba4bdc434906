//! Spanner anchoring and per-system spanner segments.

use log::{debug, trace};

use super::autoplace::{clearance, system_staff_shape};
use super::constants::*;
use super::lyrics::find_lyrics;
use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::style::StyleId;

// ═══════════════════════════════════════════════════════════════════════
// Anchors
// ═══════════════════════════════════════════════════════════════════════

/// Resolve the start and end elements of a spanner.
///
/// The start is the ChordRest at `tick` on `track`; the end is the
/// ChordRest at `tick2` on `track2`, or the one still sounding at
/// `tick2 - 1`. Note-anchored spanners use their notes' chords.
pub(crate) fn resolve_anchors(score: &mut Score, id: SpannerId) {
    let Some(sp) = score.spanners.get(id.0) else { return };
    let (start, end) = match sp.anchor {
        Anchor::Measure => (None, None),
        Anchor::Note => (
            sp.start_note.map(|n| n.chord.loc),
            sp.end_note.map(|n| n.chord.loc),
        ),
        Anchor::Segment | Anchor::Chord => {
            let start = match sp.start_chord {
                Some(r) => Some(r.loc),
                None => chord_rest_at(&score.measures, sp.tick, sp.track),
            };
            let end = chord_rest_at(&score.measures, sp.tick2, sp.track2)
                .or_else(|| chord_rest_covering(&score.measures, sp.tick2 - 1, sp.track2));
            (start, end)
        }
    };
    if let Some(sp) = score.spanners.get_mut(id.0) {
        sp.start_element = start;
        sp.end_element = end;
    }
}

/// The Dynamic attached to a chord's segment on the chord's own track.
pub(crate) fn lookup_dynamic(score: &Score, loc: Option<ElementLoc>) -> Option<AnnotationLoc> {
    let loc = loc?;
    score.element(loc)?.as_chord()?;
    let seg = score.measure(loc.measure)?.segments.get(loc.segment)?;
    seg.annotations
        .iter()
        .position(|a| a.is_dynamic() && a.track == loc.track)
        .map(|index| AnnotationLoc { measure: loc.measure, segment: loc.segment, index })
}

fn loc_tick(score: &Score, loc: ElementLoc) -> Option<Tick> {
    let m = score.measure(loc.measure)?;
    Some(m.tick + m.segments.get(loc.segment)?.rtick)
}

/// Position of an element in system coordinates.
fn element_origin(score: &Score, loc: ElementLoc) -> Option<Point> {
    let m = score.measure(loc.measure)?;
    let seg = m.segments.get(loc.segment)?;
    Some(m.pos + seg.pos + seg.element(loc.track)?.pos)
}

fn element_rect(score: &Score, loc: ElementLoc) -> Option<Rect> {
    let m = score.measure(loc.measure)?;
    let seg = m.segments.get(loc.segment)?;
    Some(seg.element(loc.track)?.canvas_bbox().translated(m.pos + seg.pos))
}

fn annotation_rect(score: &Score, loc: AnnotationLoc) -> Option<Rect> {
    let m = score.measure(loc.measure)?;
    let seg = m.segments.get(loc.segment)?;
    Some(seg.annotations.get(loc.index)?.canvas_bbox().translated(m.pos + seg.pos))
}

fn chord_origin(score: &Score, r: ChordRef) -> Option<Point> {
    Some(element_origin(score, r.loc)? + score.chord(r)?.offset)
}

fn staff_space(score: &Score, staff: usize) -> f64 {
    score.style.spatium() * score.staves.get(staff).map_or(1.0, |s| s.mag)
}

// ═══════════════════════════════════════════════════════════════════════
// Spanner segments
// ═══════════════════════════════════════════════════════════════════════

/// Resolve anchors and lay out the system segment of one spanner.
/// Returns its index in the system's segment list.
pub(crate) fn layout_spanner(score: &mut Score, system: &mut System, id: SpannerId) -> Option<usize> {
    resolve_anchors(score, id);
    let kind = score.spanner(id)?.kind;
    let seg = match kind {
        SpannerKind::Slur => layout_slur(score, system, id),
        SpannerKind::Tie => layout_tie(score, system, id),
        SpannerKind::Glissando => layout_glissando(score, system, id),
        SpannerKind::LyricsLine => layout_lyrics_line(score, system, id),
        SpannerKind::Hairpin(_)
        | SpannerKind::Ottava
        | SpannerKind::Pedal
        | SpannerKind::Volta
        | SpannerKind::TextLine => layout_line(score, system, id),
    };
    let Some(seg) = seg else {
        debug!("spanner {} ({kind:?}) has no anchor in this system", id.0);
        return None;
    };
    Some(system.add_spanner_segment(seg))
}

fn curve_above(score: &Score, sp: &Spanner, start: Option<ChordRef>) -> bool {
    match sp.direction {
        Direction::Up => true,
        Direction::Down => false,
        Direction::Auto => start.and_then(|r| score.chord(r)).map_or(true, |c| !c.up),
    }
}

/// Slur between the first and last chord, bending away from the stems.
/// A grace slur starts on its grace chord and ends on the main chord.
fn layout_slur(score: &Score, system: &System, id: SpannerId) -> Option<SpannerSegment> {
    let sp = score.spanner(id)?;
    let staff = sp.staff_idx();
    let space = staff_space(score, staff);
    let start = sp.start_chord.or(sp.start_element.map(ChordRef::from));
    let end = sp.end_element.map(ChordRef::from).filter(|&e| Some(e) != start);
    let above = curve_above(score, sp, start.or(end));
    let dist = SLUR_NOTE_DISTANCE * space;

    let anchor_point = |r: ChordRef| -> Option<Point> {
        let (x, y) = match score.chord(r) {
            Some(c) => {
                let heads = c.notes.iter().fold(Rect::default(), |acc, n| acc.united(&n.bbox.translated(n.pos)));
                let heads = heads.translated(chord_origin(score, r)?);
                let y = if above { heads.top() - dist } else { heads.bottom() + dist };
                (heads.x + heads.width / 2.0, y)
            }
            None => {
                let r = element_rect(score, r.loc)?;
                (r.x + r.width / 2.0, if above { r.top() - dist } else { r.bottom() + dist })
            }
        };
        Some(Point::new(x, y))
    };

    // an unresolved end runs to the system edge
    let left = system.first_measure().map_or(0.0, |mi| score.measures[mi].pos().x);
    let (p1, p2, segment_type) = match (start.and_then(anchor_point), end.and_then(anchor_point)) {
        (Some(p1), Some(p2)) => (p1, p2, SpannerSegmentType::Single),
        (Some(p1), None) => (p1, Point::new(system.width.max(p1.x), p1.y), SpannerSegmentType::Begin),
        (None, Some(p2)) => (Point::new(left.min(p2.x), p2.y), p2, SpannerSegmentType::End),
        (None, None) => return None,
    };

    let style = &score.style;
    let dx = (p2.x - p1.x).max(0.0);
    let height = (dx * style.value(StyleId::SlurHeightFactor))
        .clamp(style.value(StyleId::SlurMinHeight) * space, style.value(StyleId::SlurMaxHeight) * space);
    let (top, bottom) = if above {
        (p1.y.min(p2.y) - height, p1.y.max(p2.y))
    } else {
        (p1.y.min(p2.y), p1.y.max(p2.y) + height)
    };

    let mut seg = SpannerSegment::new(id, sp);
    seg.base = Point::new(p1.x, 0.0);
    seg.bbox = Rect::new(0.0, top, dx, bottom - top);
    seg.start = p1;
    seg.end = p2;
    seg.segment_type = segment_type;
    seg.autoplace = false;
    trace!("slur {} {segment_type:?} from {:?} to {:?}", id.0, p1, p2);
    Some(seg)
}

/// Note head position in system coordinates.
fn note_rect(score: &Score, n: NoteLoc) -> Option<Rect> {
    let origin = chord_origin(score, n.chord)?;
    let note = score.chord(n.chord)?.notes.get(n.note)?;
    Some(note.bbox.translated(origin + note.pos))
}

fn layout_tie(score: &Score, system: &System, id: SpannerId) -> Option<SpannerSegment> {
    let sp = score.spanner(id)?;
    let start_note = sp.start_note?;
    let space = staff_space(score, sp.staff_idx());
    let above = curve_above(score, sp, Some(start_note.chord));
    let gap = TIE_NOTE_GAP * space;
    let h = score.style.value(StyleId::TieHeight) * space;

    let r1 = note_rect(score, start_note)?;
    let y = if above { r1.top() } else { r1.bottom() };
    let x1 = r1.right() + gap;
    let (x2, segment_type) = match sp.end_note.and_then(|n| note_rect(score, n)) {
        Some(r2) => (r2.left() - gap, SpannerSegmentType::Single),
        None => (system.width, SpannerSegmentType::Begin),
    };
    let x2 = x2.max(x1);

    let mut seg = SpannerSegment::new(id, sp);
    seg.segment_type = segment_type;
    seg.base = Point::new(x1, 0.0);
    seg.bbox = if above {
        Rect::new(0.0, y - h, x2 - x1, h)
    } else {
        Rect::new(0.0, y, x2 - x1, h)
    };
    seg.start = Point::new(x1, y);
    seg.end = Point::new(x2, y);
    seg.autoplace = false;
    Some(seg)
}

fn layout_glissando(score: &Score, _system: &System, id: SpannerId) -> Option<SpannerSegment> {
    let sp = score.spanner(id)?;
    let r1 = note_rect(score, sp.start_note?)?;
    let r2 = note_rect(score, sp.end_note?)?;
    let space = staff_space(score, sp.staff_idx());
    let p1 = Point::new(r1.right() + TIE_NOTE_GAP * space, r1.y + r1.height / 2.0);
    let p2 = Point::new(r2.left() - TIE_NOTE_GAP * space, r2.y + r2.height / 2.0);
    let base = Point::new(p1.x, 0.0);
    let mut bbox = Rect::from_points(p1 - base, p2 - base);
    let thickness = LEDGER_LINE_WIDTH * space;
    if bbox.height < thickness {
        bbox.y -= thickness / 2.0;
        bbox.height = thickness;
    }
    let mut seg = SpannerSegment::new(id, sp);
    seg.base = base;
    seg.bbox = bbox;
    seg.start = p1;
    seg.end = p2;
    seg.autoplace = false;
    Some(seg)
}

/// Melisma line after a syllable. The bbox is kept in system coordinates.
fn layout_lyrics_line(score: &Score, system: &System, id: SpannerId) -> Option<SpannerSegment> {
    let sp = score.spanner(id)?;
    let start = sp.start_element?;
    let (l, lpos) = find_lyrics(score, start, sp.verse)?;
    let space = staff_space(score, sp.staff_idx());
    let thickness = score.style.value(StyleId::LyricsLineThickness) * space;
    let x1 = lpos.x + l.bbox.right();
    let y = lpos.y + l.bbox.bottom();
    let x2 = sp
        .end_element
        .filter(|&e| e != start)
        .and_then(|e| element_rect(score, e))
        .map_or(system.width, |r| r.right())
        .max(x1);

    let mut seg = SpannerSegment::new(id, sp);
    seg.bbox = Rect::new(x1, y - thickness, x2 - x1, thickness);
    seg.start = Point::new(x1, y);
    seg.end = Point::new(x2, y);
    seg.autoplace = false;
    Some(seg)
}

/// Default distance from the staff and line height, per line kind.
fn line_metrics(kind: SpannerKind) -> (StyleId, StyleId) {
    match kind {
        SpannerKind::Hairpin(_) => (StyleId::HairpinPosBelow, StyleId::HairpinHeight),
        SpannerKind::Ottava => (StyleId::OttavaPosAbove, StyleId::TextHeight),
        SpannerKind::Pedal => (StyleId::PedalPosBelow, StyleId::TextHeight),
        SpannerKind::Volta => (StyleId::VoltaPosAbove, StyleId::VoltaHook),
        _ => (StyleId::TextLinePosAbove, StyleId::TextHeight),
    }
}

/// Hairpins, ottavas, pedals, voltas and text lines: a horizontal band
/// at the default distance, then autoplaced against the staff.
fn layout_line(score: &mut Score, system: &System, id: SpannerId) -> Option<SpannerSegment> {
    let sp = score.spanner(id)?.clone();
    let staff = sp.staff_idx();
    let space = staff_space(score, staff);
    let staff_height = score.staves.get(staff).map_or(4.0 * space, |s| s.height(&score.style));

    let (mut x1, mut x2) = if sp.kind == SpannerKind::Volta {
        let x1 = find_measure(&score.measures, sp.tick)
            .map(|mi| score.measures[mi].pos().x)?;
        let x2 = find_measure(&score.measures, sp.tick2 - 1)
            .map_or(system.width, |mi| score.measures[mi].pos().x + score.measures[mi].width());
        (x1, x2)
    } else {
        let x1 = element_rect(score, sp.start_element?)?.left();
        let x2 = match sp.end_element {
            Some(e) => {
                let r = element_rect(score, e)?;
                if loc_tick(score, e).is_some_and(|t| t >= sp.tick2) && e != sp.start_element? {
                    r.left()
                } else {
                    r.right()
                }
            }
            None => system.width,
        };
        (x1, x2)
    };

    let (start_dyn, end_dyn) = if sp.is_hairpin() {
        (lookup_dynamic(score, sp.start_element), lookup_dynamic(score, sp.end_element))
    } else {
        (None, None)
    };
    let gap = HAIRPIN_DYNAMIC_GAP * space;
    if let Some(r) = start_dyn.and_then(|d| annotation_rect(score, d)) {
        x1 = x1.max(r.right() + gap);
    }
    if let Some(r) = end_dyn.filter(|&d| Some(d) != start_dyn).and_then(|d| annotation_rect(score, d)) {
        x2 = x2.min(r.left() - gap);
    }
    if x2 <= x1 {
        x2 = x1 + space;
    }

    let style = &score.style;
    let (dist_id, height_id) = line_metrics(sp.kind);
    let h = style.value(height_id) * space;
    let y = match sp.placement {
        Placement::Above => -(style.value(dist_id) * space) - h,
        Placement::Below => staff_height + style.value(dist_id) * space,
    };
    let mut seg = SpannerSegment::new(id, &sp);
    seg.base = Point::new(x1, y);
    seg.bbox = Rect::new(0.0, 0.0, x2 - x1, h);
    if sp.end_element.is_none() && sp.kind != SpannerKind::Volta {
        seg.segment_type = SpannerSegmentType::Begin;
    }

    if seg.autoplace && sp.visible {
        let obstacles = system_staff_shape(score, system, staff, x1, x2);
        let r = seg.bbox.translated(seg.base);
        seg.user_off.y = clearance(r, sp.placement, &obstacles, score.min_vertical_distance());
    }
    let mid = seg.pos().y + h / 2.0;
    seg.start = Point::new(x1, mid);
    seg.end = Point::new(x2, mid);
    trace!("line {} ({:?}) at y {} over {x1}..{x2}", id.0, sp.kind, seg.pos().y);

    for d in [start_dyn, end_dyn].into_iter().flatten() {
        align_dynamic(score, d, mid);
    }
    Some(seg)
}

/// Center a dynamic vertically on a hairpin.
fn align_dynamic(score: &mut Score, d: AnnotationLoc, center: f64) {
    let Some(e) = score
        .measures
        .get_mut(d.measure)
        .and_then(MeasureBase::as_measure_mut)
        .and_then(|m| m.segments.get_mut(d.segment))
        .and_then(|s| s.annotations.get_mut(d.index))
    else {
        return;
    };
    e.pos.y = center - (e.bbox.y + e.bbox.height / 2.0);
}

/// Lay out a list of spanners; with `align`, all autoplaced segments are
/// moved to the most extreme offset among them.
pub(crate) fn process_lines(score: &mut Score, system: &mut System, ids: &[SpannerId], align: bool) {
    let mut placed = Vec::new();
    for &id in ids {
        if let Some(idx) = layout_spanner(score, system, id) {
            if system.spanner_segments[idx].autoplace {
                placed.push((idx, id));
            }
        }
    }
    if !align || placed.len() < 2 {
        return;
    }
    let below = placed
        .first()
        .and_then(|&(_, id)| score.spanner(id))
        .is_some_and(|sp| sp.placement == Placement::Below);
    let offsets = placed.iter().map(|&(idx, _)| system.spanner_segments[idx].user_off.y);
    let y = if below {
        offsets.fold(f64::NEG_INFINITY, f64::max)
    } else {
        offsets.fold(f64::INFINITY, f64::min)
    };
    for &(idx, _) in &placed {
        system.spanner_segments[idx].set_offset_y(y);
    }
}
