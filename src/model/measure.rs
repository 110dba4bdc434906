use serde::{Deserialize, Serialize};

use super::{BarLineType, Element, Segment, SegmentType, Tick};
use crate::geometry::{Point, Rect};
use crate::shape::Shape;
use crate::sigmap::Fraction;

/// An entry of the measure list: a measure or a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeasureBase {
    Measure(Measure),
    HBox(HBox),
    VBox(VBox),
}

impl MeasureBase {
    pub fn as_measure(&self) -> Option<&Measure> {
        match self {
            MeasureBase::Measure(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_measure_mut(&mut self) -> Option<&mut Measure> {
        match self {
            MeasureBase::Measure(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_measure(&self) -> bool {
        matches!(self, MeasureBase::Measure(_))
    }

    pub fn is_vbox(&self) -> bool {
        matches!(self, MeasureBase::VBox(_))
    }

    pub fn tick(&self) -> Tick {
        match self {
            MeasureBase::Measure(m) => m.tick,
            MeasureBase::HBox(b) => b.tick,
            MeasureBase::VBox(b) => b.tick,
        }
    }

    pub fn set_tick(&mut self, tick: Tick) {
        match self {
            MeasureBase::Measure(m) => m.tick = tick,
            MeasureBase::HBox(b) => b.tick = tick,
            MeasureBase::VBox(b) => b.tick = tick,
        }
    }

    pub fn end_tick(&self) -> Tick {
        match self {
            MeasureBase::Measure(m) => m.end_tick(),
            _ => self.tick(),
        }
    }

    pub fn pos(&self) -> Point {
        match self {
            MeasureBase::Measure(m) => m.pos,
            MeasureBase::HBox(b) => b.pos,
            MeasureBase::VBox(b) => b.pos,
        }
    }

    pub fn width(&self) -> f64 {
        match self {
            MeasureBase::Measure(m) => m.width,
            MeasureBase::HBox(b) => b.width,
            MeasureBase::VBox(b) => b.bbox.width,
        }
    }

    pub fn section_break(&self) -> bool {
        match self {
            MeasureBase::Measure(m) => m.section_break,
            MeasureBase::HBox(b) => b.section_break,
            MeasureBase::VBox(b) => b.section_break,
        }
    }
}

/// Horizontal frame inside the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HBox {
    #[serde(default)]
    pub tick: Tick,
    pub width: f64,
    /// Gap before the frame.
    #[serde(default)]
    pub top_gap: f64,
    #[serde(default)]
    pub section_break: bool,
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

/// Vertical frame; never part of the linear system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VBox {
    #[serde(default)]
    pub tick: Tick,
    pub height: f64,
    #[serde(default)]
    pub section_break: bool,
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Absolute start tick; rewritten by the measure pass.
    #[serde(default)]
    pub tick: Tick,
    /// Actual length.
    pub len: Fraction,
    /// Nominal signature.
    pub timesig: Fraction,
    /// Computed measure number (0-based).
    #[serde(default)]
    pub no: i32,
    /// User adjustment added to the running number.
    #[serde(default)]
    pub no_offset: i32,
    /// Excluded from the measure count.
    #[serde(default)]
    pub irregular: bool,
    #[serde(default)]
    pub repeat_start: bool,
    #[serde(default)]
    pub repeat_end: bool,
    #[serde(default)]
    pub end_barline: BarLineType,
    #[serde(default)]
    pub section_break: bool,
    /// Pause in seconds after a section break.
    #[serde(default)]
    pub pause: f64,
    /// Measures a multi-measure rest here stands for.
    #[serde(default)]
    pub mm_rest_count: i32,
    pub segments: Vec<Segment>,
    /// Jumps and markers.
    #[serde(default)]
    pub el: Vec<Element>,
    #[serde(default)]
    pub measure_number: Option<Element>,
    /// Relative to the system.
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub width: f64,
    /// One collision shape per staff, relative to the measure.
    #[serde(default)]
    pub staff_shapes: Vec<Shape>,
    #[serde(default)]
    pub staff_lines: Vec<Rect>,
}

impl Measure {
    pub fn new(len: Fraction, timesig: Fraction) -> Self {
        Self {
            tick: 0,
            len,
            timesig,
            no: 0,
            no_offset: 0,
            irregular: false,
            repeat_start: false,
            repeat_end: false,
            end_barline: BarLineType::Normal,
            section_break: false,
            pause: 0.0,
            mm_rest_count: 0,
            segments: Vec::new(),
            el: Vec::new(),
            measure_number: None,
            pos: Point::ZERO,
            width: 0.0,
            staff_shapes: Vec::new(),
            staff_lines: Vec::new(),
        }
    }

    pub fn ticks(&self) -> Tick {
        self.len.ticks()
    }

    pub fn end_tick(&self) -> Tick {
        self.tick + self.ticks()
    }

    pub fn find_segment_r(&self, st: SegmentType, rtick: Tick) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| s.segment_type == st && s.rtick == rtick)
    }

    /// Find or create the segment, keeping segments sorted.
    pub fn get_segment_r(&mut self, st: SegmentType, rtick: Tick, ntracks: usize) -> usize {
        if let Some(i) = self.find_segment_r(st, rtick) {
            return i;
        }
        let key = (rtick, st);
        let at = self.segments.partition_point(|s| s.sort_key() < key);
        self.segments.insert(at, Segment::new(st, rtick, ntracks));
        at
    }

    pub fn remove_segment(&mut self, idx: usize) -> Segment {
        self.segments.remove(idx)
    }

    /// Indices of the segments of one type, in order.
    pub fn segments_of(&self, st: SegmentType) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.segment_type == st)
            .map(|(i, _)| i)
            .collect()
    }

    /// The measure carries a system header.
    pub fn header(&self) -> bool {
        self.segments.iter().any(|s| s.header)
    }

    pub fn staff_shape_mut(&mut self, staff_idx: usize) -> &mut Shape {
        if self.staff_shapes.len() <= staff_idx {
            self.staff_shapes.resize(staff_idx + 1, Shape::new());
        }
        &mut self.staff_shapes[staff_idx]
    }

    pub fn staff_shape(&self, staff_idx: usize) -> Option<&Shape> {
        self.staff_shapes.get(staff_idx)
    }
}
