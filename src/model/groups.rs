//! Beams and tuplets: groups of chords/rests held in arenas on the score.

use serde::{Deserialize, Serialize};

use super::{track2staff, ChordRef, ElementLoc, Placement, TupletId};
use crate::geometry::{Point, Rect};
use crate::shape::Shape;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub track: usize,
    /// Members in time order.
    pub elements: Vec<ChordRef>,
    pub up: bool,
    /// Some member is moved to another staff.
    pub cross: bool,
    /// One rectangle per beam level: system x, staff-local y.
    #[serde(default)]
    pub segments: Vec<Rect>,
}

impl Beam {
    pub fn new(track: usize, elements: Vec<ChordRef>) -> Self {
        Self { track, elements, up: true, cross: false, segments: Vec::new() }
    }

    pub fn staff_idx(&self) -> usize {
        track2staff(self.track)
    }

    pub fn first(&self) -> Option<ChordRef> {
        self.elements.first().copied()
    }

    pub fn shape(&self) -> Shape {
        let mut s = Shape::new();
        for r in &self.segments {
            s.add_rect(*r);
        }
        s
    }

    pub fn bbox(&self) -> Rect {
        self.shape().bbox()
    }
}

/// A tuplet member: a chord/rest or a nested tuplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationRef {
    ChordRest(ElementLoc),
    Tuplet(TupletId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuplet {
    pub track: usize,
    /// Notes played …
    pub actual: i32,
    /// … in the time of.
    pub normal: i32,
    pub elements: Vec<DurationRef>,
    /// Enclosing tuplet.
    #[serde(default)]
    pub tuplet: Option<TupletId>,
    /// Forced side; `None` follows the stem directions.
    #[serde(default)]
    pub placement: Option<Placement>,
    /// Measure owning the first member.
    #[serde(default)]
    pub measure: usize,
    /// Bracket in measure coordinates.
    #[serde(default)]
    pub bbox: Rect,
    #[serde(default)]
    pub number_pos: Point,
}

impl Tuplet {
    pub fn new(track: usize, actual: i32, normal: i32, elements: Vec<DurationRef>) -> Self {
        Self {
            track,
            actual,
            normal,
            elements,
            tuplet: None,
            placement: None,
            measure: 0,
            bbox: Rect::default(),
            number_pos: Point::ZERO,
        }
    }

    pub fn staff_idx(&self) -> usize {
        track2staff(self.track)
    }

    pub fn shape(&self) -> Shape {
        Shape::from_rect(self.bbox)
    }
}
