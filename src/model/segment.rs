use serde::{Deserialize, Serialize};

use super::{Element, Tick};
use crate::geometry::Point;
use crate::shape::Shape;

/// Kinds of segments, in the order they sort within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    BeginBarLine,
    HeaderClef,
    KeySig,
    Ambitus,
    TimeSig,
    StartRepeatBarLine,
    Clef,
    BarLine,
    Breath,
    ChordRest,
    EndBarLine,
}

/// One time slice of a measure holding at most one element per track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_type: SegmentType,
    /// Tick relative to the measure start.
    pub rtick: Tick,
    /// Distance to the next ChordRest segment (or the measure end).
    #[serde(default)]
    pub ticks: Tick,
    /// Indexed by track; `None` where the track is empty.
    pub elements: Vec<Option<Element>>,
    /// Dynamics, texts, fermatas and other items attached to this tick.
    #[serde(default)]
    pub annotations: Vec<Element>,
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Created by the system header, removed when the measure stops
    /// starting a system.
    #[serde(default)]
    pub header: bool,
    /// Relative to the measure.
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub width: f64,
    /// One collision shape per staff, relative to the segment.
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

fn yes() -> bool {
    true
}

impl Segment {
    pub fn new(segment_type: SegmentType, rtick: Tick, ntracks: usize) -> Self {
        Self {
            segment_type,
            rtick,
            ticks: 0,
            elements: vec![None; ntracks],
            annotations: Vec::new(),
            enabled: true,
            header: false,
            pos: Point::ZERO,
            width: 0.0,
            shapes: Vec::new(),
        }
    }

    pub fn sort_key(&self) -> (Tick, SegmentType) {
        (self.rtick, self.segment_type)
    }

    pub fn is_chord_rest_type(&self) -> bool {
        self.segment_type == SegmentType::ChordRest
    }

    pub fn element(&self, track: usize) -> Option<&Element> {
        self.elements.get(track).and_then(Option::as_ref)
    }

    pub fn element_mut(&mut self, track: usize) -> Option<&mut Element> {
        self.elements.get_mut(track).and_then(Option::as_mut)
    }

    /// Store `e` at its track, growing the track vector if needed.
    pub fn add(&mut self, e: Element) {
        let track = e.track;
        if self.elements.len() <= track {
            self.elements.resize(track + 1, None);
        }
        self.elements[track] = Some(e);
    }

    /// The chord or rest on `track`, if any.
    pub fn cr(&self, track: usize) -> Option<&Element> {
        self.element(track).filter(|e| e.is_chord_rest())
    }

    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(Option::is_none)
    }

    pub fn staff_shape(&self, staff_idx: usize) -> Option<&Shape> {
        self.shapes.get(staff_idx)
    }

    pub fn staff_shape_mut(&mut self, staff_idx: usize) -> &mut Shape {
        if self.shapes.len() <= staff_idx {
            self.shapes.resize(staff_idx + 1, Shape::new());
        }
        &mut self.shapes[staff_idx]
    }
}
