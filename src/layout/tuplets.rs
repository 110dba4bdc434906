//! Tuplet brackets.

use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::style::StyleId;

/// Tuplet owning a duration element directly.
pub(crate) fn tuplet_of(score: &Score, de: DurationRef) -> Option<TupletId> {
    match de {
        DurationRef::ChordRest(loc) => score.element(loc)?.chord_rest()?.tuplet,
        DurationRef::Tuplet(t) => score.tuplets.get(t.0)?.tuplet,
    }
}

/// Extent of a member in measure coordinates of `measure`, and whether it
/// votes for an up bracket.
fn member_extent(score: &Score, measure: usize, de: DurationRef) -> Option<(Rect, Option<bool>)> {
    match de {
        DurationRef::ChordRest(loc) => {
            let m = score.measure(loc.measure)?;
            let seg = m.segments.get(loc.segment)?;
            let e = seg.element(loc.track)?;
            let mut r = e.canvas_bbox().translated(seg.pos);
            // members spilling into the next measure
            if loc.measure != measure {
                let dx = m.pos.x - score.measures.get(measure)?.pos().x;
                r = r.translated(Point::new(dx, 0.0));
            }
            Some((r, e.as_chord().map(|c| c.up)))
        }
        DurationRef::Tuplet(t) => Some((score.tuplets.get(t.0)?.bbox, None)),
    }
}

/// Bracket over (or under) the members, clear of their heads and stems.
/// Nested tuplets are laid out before their parent.
pub(crate) fn layout_tuplet(score: &mut Score, id: TupletId) {
    let Some(t) = score.tuplets.get(id.0) else { return };
    let measure = match t.elements.first() {
        Some(DurationRef::ChordRest(loc)) => loc.measure,
        _ => t.measure,
    };
    let mut extents = Vec::new();
    let (mut ups, mut downs) = (0, 0);
    for &de in &t.elements {
        if let Some((r, up)) = member_extent(score, measure, de) {
            match up {
                Some(true) => ups += 1,
                Some(false) => downs += 1,
                None => {}
            }
            extents.push(r);
        }
    }
    let Some(first) = extents.first().copied() else { return };
    let above = match t.placement {
        Some(p) => p == Placement::Above,
        None => ups >= downs,
    };

    let style = &score.style;
    let sp = style.spatium() * score.staves.get(t.staff_idx()).map_or(1.0, |s| s.mag);
    let dist = style.value(StyleId::TupletBracketDistance) * sp;
    let height = style.value(StyleId::TupletHeight) * sp;
    let x1 = extents.iter().map(Rect::left).fold(first.left(), f64::min);
    let x2 = extents.iter().map(Rect::right).fold(first.right(), f64::max);
    let bbox = if above {
        let top = extents.iter().map(Rect::top).fold(0.0_f64, f64::min);
        Rect::new(x1, top - dist - height, x2 - x1, height)
    } else {
        let staff_height = score.staves.get(t.staff_idx()).map_or(4.0 * sp, |s| s.height(style));
        let bottom = extents.iter().map(Rect::bottom).fold(staff_height, f64::max);
        Rect::new(x1, bottom + dist, x2 - x1, height)
    };

    if let Some(t) = score.tuplets.get_mut(id.0) {
        t.measure = measure;
        t.bbox = bbox;
        t.number_pos = Point::new(bbox.x + bbox.width / 2.0, bbox.y + bbox.height / 2.0);
    }
}
