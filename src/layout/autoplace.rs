//! Vertical collision avoidance against the shapes of a measure or system.

use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::shape::Shape;

/// Distance to move a rectangle, placed at `placement`, so it keeps
/// `min_distance` from `obstacles`. Negative moves up.
pub(crate) fn clearance(r: Rect, placement: Placement, obstacles: &Shape, min_distance: f64) -> f64 {
    let el = Shape::from_rect(r);
    match placement {
        Placement::Above => match el.min_vertical_distance(obstacles) {
            Some(d) if d + min_distance > 0.0 => -(d + min_distance),
            _ => 0.0,
        },
        Placement::Below => match obstacles.min_vertical_distance(&el) {
            Some(d) if d + min_distance > 0.0 => d + min_distance,
            _ => 0.0,
        },
    }
}

/// Move an element of a segment (at `seg_pos` in the measure) clear of the
/// measure staff shape. Returns the element's final rectangle in measure
/// coordinates when it should be folded into the shape.
pub(crate) fn autoplace_segment_element(
    e: &mut Element,
    seg_pos: Point,
    staff_shape: &Shape,
    min_distance: f64,
    add: bool,
) -> Option<Rect> {
    if !e.autoplace || !e.visible {
        return None;
    }
    let r = e.bbox.translated(seg_pos + e.pos);
    let dy = clearance(r, e.placement, staff_shape, min_distance);
    e.pos.y += dy;
    e.autoplace_offset = Some(dy);
    add.then(|| r.translated(Point::new(0.0, dy)))
}

/// Same as [`autoplace_segment_element`] for items attached to the measure
/// itself (jumps, markers, measure numbers).
pub(crate) fn autoplace_measure_element(
    e: &mut Element,
    staff_shape: &Shape,
    min_distance: f64,
    add: bool,
) -> Option<Rect> {
    autoplace_segment_element(e, Point::ZERO, staff_shape, min_distance, add)
}

/// Shape of one staff across the system, in system coordinates, limited
/// to the horizontal band `[x1, x2]`.
pub(crate) fn system_staff_shape(score: &Score, system: &System, staff: usize, x1: f64, x2: f64) -> Shape {
    let mut shape = Shape::new();
    for &mi in &system.measures {
        let Some(m) = score.measures.get(mi).and_then(MeasureBase::as_measure) else { continue };
        if m.pos.x > x2 || m.pos.x + m.width < x1 {
            continue;
        }
        if let Some(s) = m.staff_shape(staff) {
            shape.add(&s.translated(m.pos).horizontal_slice(x1, x2));
        }
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Text;

    #[test]
    fn element_below_moves_down_when_it_collides() {
        let staff = Shape::from_rect(Rect::new(0.0, 0.0, 100.0, 60.0));
        let mut e = Element::new(ElementKind::Dynamic(Text::new("p")), 0);
        e.pos = Point::new(10.0, 50.0);
        e.bbox = Rect::new(0.0, 0.0, 10.0, 10.0);
        let r = autoplace_segment_element(&mut e, Point::ZERO, &staff, 5.0, true);
        assert_eq!(e.autoplace_offset, Some(15.0));
        assert_eq!(r.map(|r| r.top()), Some(65.0));
    }

    #[test]
    fn element_with_room_stays_put() {
        let staff = Shape::from_rect(Rect::new(0.0, 0.0, 100.0, 40.0));
        let mut e = Element::new(ElementKind::StaffText(Text::new("dolce")), 0);
        e.pos = Point::new(10.0, -30.0);
        e.bbox = Rect::new(0.0, 0.0, 30.0, 16.0);
        autoplace_segment_element(&mut e, Point::ZERO, &staff, 5.0, false);
        assert_eq!(e.autoplace_offset, Some(0.0));
        assert_eq!(e.pos.y, -30.0);
    }
}
