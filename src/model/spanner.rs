use serde::{Deserialize, Serialize};

use super::{track2staff, ChordRef, Direction, ElementLoc, NoteLoc, Placement, SpannerId, Tick};
use crate::geometry::{Point, Rect};
use crate::shape::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HairpinType {
    Crescendo,
    Decrescendo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpannerKind {
    Slur,
    Tie,
    Hairpin(HairpinType),
    Ottava,
    Pedal,
    Volta,
    TextLine,
    LyricsLine,
    Glissando,
}

/// What the ends of a spanner attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anchor {
    Segment,
    Chord,
    Note,
    Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanner {
    pub kind: SpannerKind,
    pub anchor: Anchor,
    pub tick: Tick,
    pub tick2: Tick,
    pub track: usize,
    pub track2: usize,
    #[serde(default)]
    pub placement: Placement,
    /// Curve direction of slurs and ties; `Auto` bends away from the stem.
    #[serde(default)]
    pub direction: Direction,
    pub visible: bool,
    pub autoplace: bool,
    /// End notes of ties and glissandi.
    #[serde(default)]
    pub start_note: Option<NoteLoc>,
    #[serde(default)]
    pub end_note: Option<NoteLoc>,
    /// Lyrics verse a melisma line continues.
    #[serde(default)]
    pub verse: usize,
    #[serde(default)]
    pub text: Option<String>,
    /// Chord a chord-anchored spanner starts on when that is a grace chord.
    #[serde(default)]
    pub start_chord: Option<ChordRef>,
    /// Resolved by the layout passes.
    #[serde(default)]
    pub start_element: Option<ElementLoc>,
    #[serde(default)]
    pub end_element: Option<ElementLoc>,
}

impl Spanner {
    pub fn new(kind: SpannerKind, tick: Tick, tick2: Tick, track: usize) -> Self {
        let anchor = match kind {
            SpannerKind::Slur => Anchor::Chord,
            SpannerKind::Tie | SpannerKind::Glissando => Anchor::Note,
            SpannerKind::Volta => Anchor::Measure,
            _ => Anchor::Segment,
        };
        let placement = match kind {
            SpannerKind::Hairpin(_) | SpannerKind::Pedal | SpannerKind::LyricsLine => {
                Placement::Below
            }
            _ => Placement::Above,
        };
        Self {
            kind,
            anchor,
            tick,
            tick2,
            track,
            track2: track,
            placement,
            direction: Direction::Auto,
            visible: true,
            autoplace: true,
            start_note: None,
            end_note: None,
            verse: 0,
            text: None,
            start_chord: None,
            start_element: None,
            end_element: None,
        }
    }

    pub fn staff_idx(&self) -> usize {
        track2staff(self.track)
    }

    pub fn ticks(&self) -> Tick {
        self.tick2 - self.tick
    }

    pub fn is_hairpin(&self) -> bool {
        matches!(self.kind, SpannerKind::Hairpin(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpannerSegmentType {
    /// The spanner starts and ends in this system.
    #[default]
    Single,
    Begin,
    Middle,
    End,
}

/// The part of a spanner drawn in one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpannerSegment {
    pub spanner: SpannerId,
    pub kind: SpannerKind,
    pub segment_type: SpannerSegmentType,
    pub staff_idx: usize,
    /// Layout position: system x, staff-local y.
    pub base: Point,
    /// Autoplace or user displacement added to `base`.
    pub user_off: Point,
    /// Relative to `pos()`; lyrics lines keep system coordinates here.
    pub bbox: Rect,
    /// Curve or line end points in system coordinates.
    pub start: Point,
    pub end: Point,
    pub autoplace: bool,
    pub visible: bool,
}

impl SpannerSegment {
    pub fn new(id: SpannerId, sp: &Spanner) -> Self {
        Self {
            spanner: id,
            kind: sp.kind,
            segment_type: SpannerSegmentType::Single,
            staff_idx: sp.staff_idx(),
            base: Point::ZERO,
            user_off: Point::ZERO,
            bbox: Rect::default(),
            start: Point::ZERO,
            end: Point::ZERO,
            autoplace: sp.autoplace,
            visible: sp.visible,
        }
    }

    pub fn pos(&self) -> Point {
        self.base + self.user_off
    }

    /// Set the vertical offset, moving the line endpoints with the segment.
    pub fn set_offset_y(&mut self, y: f64) {
        let dy = y - self.user_off.y;
        self.user_off.y = y;
        self.start.y += dy;
        self.end.y += dy;
    }

    pub fn shape(&self) -> Shape {
        Shape::from_rect(self.bbox)
    }

    /// Bounding box in system coordinates.
    pub fn canvas_bbox(&self) -> Rect {
        match self.kind {
            SpannerKind::LyricsLine => self.bbox,
            _ => self.bbox.translated(self.pos()),
        }
    }
}
