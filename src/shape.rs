//! Collision shapes: unions of bounding rectangles.
//!
//! Every segment and every measure keeps one `Shape` per staff. Passes that
//! autoplace an element compare the element's shape against the shape of
//! everything placed before it, then fold the element back in.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    rects: Vec<Rect>,
}

impl Shape {
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    pub fn from_rect(r: Rect) -> Self {
        let mut s = Self::new();
        s.add_rect(r);
        s
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Null rectangles carry no collision information and are dropped.
    pub fn add_rect(&mut self, r: Rect) {
        if !r.is_null() {
            self.rects.push(r);
        }
    }

    /// Union with another shape.
    pub fn add(&mut self, other: &Shape) {
        self.rects.extend(other.rects.iter().copied());
    }

    pub fn translate(&mut self, offset: Point) {
        for r in &mut self.rects {
            *r = r.translated(offset);
        }
    }

    pub fn translated(&self, offset: Point) -> Shape {
        let mut s = self.clone();
        s.translate(offset);
        s
    }

    /// Bounding box of all rectangles, or a null rect for an empty shape.
    pub fn bbox(&self) -> Rect {
        self.rects.iter().fold(Rect::default(), |acc, r| acc.united(r))
    }

    pub fn top(&self) -> f64 {
        self.rects.iter().map(|r| r.top()).fold(f64::INFINITY, f64::min)
    }

    pub fn bottom(&self) -> f64 {
        self.rects.iter().map(|r| r.bottom()).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Restrict to rectangles overlapping the horizontal band `[left, right)`.
    pub fn horizontal_slice(&self, left: f64, right: f64) -> Shape {
        let band = Rect::new(left, 0.0, right - left, 0.0);
        Shape {
            rects: self
                .rects
                .iter()
                .filter(|r| r.overlaps_horizontally(&band))
                .copied()
                .collect(),
        }
    }

    /// How far `below` has to move down to clear `self` entirely.
    ///
    /// Only rectangle pairs that overlap horizontally constrain the result.
    /// Returns `None` when no pair does; a negative value is the free space
    /// already between the two shapes.
    pub fn min_vertical_distance(&self, below: &Shape) -> Option<f64> {
        let mut dist: Option<f64> = None;
        for a in &self.rects {
            for b in &below.rects {
                if a.overlaps_horizontally(b) {
                    let d = a.bottom() - b.top();
                    dist = Some(dist.map_or(d, |cur| cur.max(d)));
                }
            }
        }
        dist
    }

    /// How far `right` has to move right to clear `self`; only pairs that
    /// overlap vertically count.
    pub fn min_horizontal_distance(&self, right: &Shape) -> Option<f64> {
        let mut dist: Option<f64> = None;
        for a in &self.rects {
            for b in &right.rects {
                if a.top() < b.bottom() && b.top() < a.bottom() {
                    let d = a.right() - b.left();
                    dist = Some(dist.map_or(d, |cur| cur.max(d)));
                }
            }
        }
        dist
    }

    pub fn intersects(&self, other: &Shape) -> bool {
        self.rects
            .iter()
            .any(|a| other.rects.iter().any(|b| a.intersects(b)))
    }

    /// True when every rectangle of `other` lies inside this shape's bbox.
    pub fn encloses(&self, other: &Shape) -> bool {
        let bb = self.bbox();
        other.rects.iter().all(|r| {
            r.left() >= bb.left() - 1e-9
                && r.right() <= bb.right() + 1e-9
                && r.top() >= bb.top() - 1e-9
                && r.bottom() <= bb.bottom() + 1e-9
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_is_union_of_rects() {
        let mut s = Shape::new();
        s.add_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        s.add_rect(Rect::new(5.0, -5.0, 10.0, 5.0));
        assert_eq!(s.bbox(), Rect::new(0.0, -5.0, 15.0, 15.0));
    }

    #[test]
    fn null_rects_are_dropped() {
        let mut s = Shape::new();
        s.add_rect(Rect::default());
        assert!(s.is_empty());
    }

    #[test]
    fn translation_moves_every_rect() {
        let s = Shape::from_rect(Rect::new(1.0, 2.0, 3.0, 4.0)).translated(Point::new(10.0, -2.0));
        assert_eq!(s.rects()[0], Rect::new(11.0, 0.0, 3.0, 4.0));
    }

    #[test]
    fn vertical_distance_only_counts_horizontal_overlap() {
        let staff = Shape::from_rect(Rect::new(0.0, 0.0, 100.0, 40.0));
        let far_right = Shape::from_rect(Rect::new(200.0, 10.0, 10.0, 10.0));
        assert_eq!(staff.min_vertical_distance(&far_right), None);

        let inside = Shape::from_rect(Rect::new(10.0, 30.0, 10.0, 10.0));
        assert_eq!(staff.min_vertical_distance(&inside), Some(10.0));

        let clear = Shape::from_rect(Rect::new(10.0, 50.0, 10.0, 10.0));
        assert_eq!(staff.min_vertical_distance(&clear), Some(-10.0));
    }

    #[test]
    fn horizontal_slice_filters_by_band() {
        let mut s = Shape::new();
        s.add_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        s.add_rect(Rect::new(50.0, 0.0, 10.0, 10.0));
        assert_eq!(s.horizontal_slice(45.0, 70.0).rects().len(), 1);
    }
}
