use serde::{Deserialize, Serialize};

use super::{AnnotationLoc, BeamId, ElementLoc, SpannerSegment, TupletId};
use crate::geometry::{Point, Rect};

/// Per-staff state of a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysStaff {
    /// Top staff line relative to the system.
    pub y: f64,
    pub height: f64,
    pub show: bool,
}

/// A horizontal run of measures. The linear layout produces exactly one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct System {
    /// Indices into the score's measure list (measures and horizontal frames).
    pub measures: Vec<usize>,
    pub staves: Vec<SysStaff>,
    pub spanner_segments: Vec<SpannerSegment>,
    /// Room for instrument names and brackets.
    pub left_margin: f64,
    pub width: f64,
    pub height: f64,
    /// Relative to the page.
    pub pos: Point,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staff(&self, idx: usize) -> Option<&SysStaff> {
        self.staves.get(idx)
    }

    /// Vertical offset of the top line of `idx`, zero if unknown.
    pub fn staff_y(&self, idx: usize) -> f64 {
        self.staves.get(idx).map_or(0.0, |s| s.y)
    }

    /// Insert a segment for `seg.spanner`, replacing an earlier one.
    /// Returns its index.
    pub fn add_spanner_segment(&mut self, seg: SpannerSegment) -> usize {
        if let Some(i) = self
            .spanner_segments
            .iter()
            .position(|s| s.spanner == seg.spanner)
        {
            self.spanner_segments[i] = seg;
            i
        } else {
            self.spanner_segments.push(seg);
            self.spanner_segments.len() - 1
        }
    }

    pub fn first_measure(&self) -> Option<usize> {
        self.measures.first().copied()
    }

    pub fn last_measure(&self) -> Option<usize> {
        self.measures.last().copied()
    }
}

/// Something the spatial index can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemRef {
    Measure(usize),
    Element(ElementLoc),
    Annotation(AnnotationLoc),
    /// Jump or marker: measure index and position in its element list.
    MeasureElement(usize, usize),
    SpannerSegment(usize),
    Beam(BeamId),
    Tuplet(TupletId),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedItem {
    /// Page coordinates.
    pub rect: Rect,
    pub item: ItemRef,
}

/// Rectangle index over everything placed on a page, sorted by left edge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialIndex {
    items: Vec<IndexedItem>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn insert(&mut self, rect: Rect, item: ItemRef) {
        if rect.is_null() {
            return;
        }
        let at = self.items.partition_point(|i| i.rect.x <= rect.x);
        self.items.insert(at, IndexedItem { rect, item });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items whose rectangle overlaps `area` (touching counts).
    pub fn items_in(&self, area: Rect) -> Vec<ItemRef> {
        let end = self.items.partition_point(|i| i.rect.x <= area.right());
        self.items[..end]
            .iter()
            .filter(|i| {
                i.rect.right() >= area.left()
                    && i.rect.top() <= area.bottom()
                    && i.rect.bottom() >= area.top()
            })
            .map(|i| i.item)
            .collect()
    }

    pub fn items_at(&self, p: Point) -> Vec<ItemRef> {
        self.items_in(Rect::new(p.x, p.y, 0.0, 0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    pub no: usize,
    pub bbox: Rect,
    pub pos: Point,
    pub systems: Vec<System>,
    #[serde(default)]
    pub index: SpatialIndex,
}

impl Page {
    pub fn new(no: usize) -> Self {
        Self { no, ..Self::default() }
    }

    pub fn system(&self) -> Option<&System> {
        self.systems.first()
    }
}
