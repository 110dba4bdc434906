use serde::{Deserialize, Serialize};

use super::{track2staff, BeamId, SpannerId, Tick, TupletId, DIVISION};
use crate::geometry::{Point, Rect};
use crate::shape::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Auto,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeamMode {
    #[default]
    Auto,
    /// Start a new beam at this chord.
    Begin,
    /// Continue the current beam even across a beat.
    Mid,
    NoBeam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BarLineType {
    #[default]
    Normal,
    Double,
    StartRepeat,
    EndRepeat,
    End,
}

// ═══════════════════════════════════════════════════════════════════════
// Element: common header + kind payload
// ═══════════════════════════════════════════════════════════════════════

/// Any item placed in a segment, a measure, or a segment's annotation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub track: usize,
    /// Relative to the parent segment (or measure for measure elements).
    #[serde(default)]
    pub pos: Point,
    /// Bounding box relative to `pos`.
    #[serde(default)]
    pub bbox: Rect,
    pub visible: bool,
    pub autoplace: bool,
    #[serde(default)]
    pub placement: Placement,
    /// Vertical displacement applied by the last autoplace, if it ran.
    #[serde(default)]
    pub autoplace_offset: Option<f64>,
    #[serde(default = "one")]
    pub mag: f64,
    pub kind: ElementKind,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    Chord(Chord),
    Rest(Rest),
    Clef(Clef),
    KeySig(KeySig),
    TimeSig(TimeSig),
    BarLine(BarLine),
    Breath(Breath),
    Ambitus(Ambitus),
    Dynamic(Text),
    TempoText(TempoText),
    Fermata(Fermata),
    StaffText(Text),
    SystemText(Text),
    Harmony(Text),
    RehearsalMark(Text),
    FretDiagram(FretDiagram),
    FiguredBass(Text),
    Symbol(Text),
    InstrumentChange(Text),
    Jump(Text),
    Marker(Text),
    MeasureNumber(Text),
}

impl Element {
    pub fn new(kind: ElementKind, track: usize) -> Self {
        let placement = match &kind {
            ElementKind::Dynamic(_) | ElementKind::FiguredBass(_) => Placement::Below,
            _ => Placement::Above,
        };
        Self {
            track,
            pos: Point::ZERO,
            bbox: Rect::default(),
            visible: true,
            autoplace: true,
            placement,
            autoplace_offset: None,
            mag: 1.0,
            kind,
        }
    }

    pub fn staff_idx(&self) -> usize {
        track2staff(self.track)
    }

    pub fn is_chord_rest(&self) -> bool {
        matches!(self.kind, ElementKind::Chord(_) | ElementKind::Rest(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, ElementKind::Dynamic(_))
    }

    pub fn as_chord(&self) -> Option<&Chord> {
        match &self.kind {
            ElementKind::Chord(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_chord_mut(&mut self) -> Option<&mut Chord> {
        match &mut self.kind {
            ElementKind::Chord(c) => Some(c),
            _ => None,
        }
    }

    pub fn chord_rest(&self) -> Option<&ChordRest> {
        match &self.kind {
            ElementKind::Chord(c) => Some(&c.cr),
            ElementKind::Rest(r) => Some(&r.cr),
            _ => None,
        }
    }

    pub fn chord_rest_mut(&mut self) -> Option<&mut ChordRest> {
        match &mut self.kind {
            ElementKind::Chord(c) => Some(&mut c.cr),
            ElementKind::Rest(r) => Some(&mut r.cr),
            _ => None,
        }
    }

    /// Collision shape relative to `pos`.
    pub fn shape(&self) -> Shape {
        match &self.kind {
            ElementKind::Chord(c) => c.shape(),
            _ => Shape::from_rect(self.bbox),
        }
    }

    /// Bounding box relative to the parent.
    pub fn canvas_bbox(&self) -> Rect {
        self.bbox.translated(self.pos)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Chords and rests
// ═══════════════════════════════════════════════════════════════════════

/// Data shared by chords and rests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordRest {
    /// Duration in ticks.
    pub ticks: Tick,
    /// Cue-size rendering.
    #[serde(default)]
    pub small: bool,
    /// Cue and grace magnification on top of the staff's own. Computed.
    #[serde(default = "one")]
    pub mag: f64,
    /// Cross-staff move: -1 up, 0 none, 1 down.
    #[serde(default)]
    pub staff_move: i32,
    #[serde(default)]
    pub beam_mode: BeamMode,
    /// Assigned by the beaming collaborator.
    #[serde(default)]
    pub beam: Option<BeamId>,
    #[serde(default)]
    pub tuplet: Option<TupletId>,
    #[serde(default)]
    pub lyrics: Vec<Lyrics>,
}

impl ChordRest {
    pub fn new(ticks: Tick) -> Self {
        Self {
            ticks,
            small: false,
            mag: 1.0,
            staff_move: 0,
            beam_mode: BeamMode::Auto,
            beam: None,
            tuplet: None,
            lyrics: Vec::new(),
        }
    }

    /// Number of beam levels (flags) the duration needs.
    pub fn beam_levels(&self) -> i32 {
        match self.ticks {
            t if t >= DIVISION => 0,
            t if t >= DIVISION / 2 => 1,
            t if t >= DIVISION / 4 => 2,
            t if t >= DIVISION / 8 => 3,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub cr: ChordRest,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub grace_notes: Vec<Chord>,
    /// Position of a grace chord relative to its main chord.
    #[serde(default)]
    pub offset: Point,
    #[serde(default)]
    pub stem_direction: Direction,
    /// Computed stem direction.
    #[serde(default)]
    pub up: bool,
    #[serde(default)]
    pub stem: Option<Stem>,
    #[serde(default)]
    pub hook: Option<Rect>,
    #[serde(default)]
    pub dots: i32,
    /// Area covered by the augmentation dots.
    #[serde(default)]
    pub dots_rect: Option<Rect>,
    #[serde(default)]
    pub ledger_lines: Vec<Rect>,
    #[serde(default)]
    pub articulations: Vec<Articulation>,
    #[serde(default)]
    pub arpeggio: Option<Arpeggio>,
    #[serde(default)]
    pub tremolo: Option<Tremolo>,
    /// Slurs from this grace chord to its main chord.
    #[serde(default)]
    pub grace_slurs: Vec<SpannerId>,
}

impl Chord {
    pub fn new(ticks: Tick, notes: Vec<Note>) -> Self {
        Self {
            cr: ChordRest::new(ticks),
            notes,
            grace_notes: Vec::new(),
            offset: Point::ZERO,
            stem_direction: Direction::Auto,
            up: true,
            stem: None,
            hook: None,
            dots: 0,
            dots_rect: None,
            ledger_lines: Vec::new(),
            articulations: Vec::new(),
            arpeggio: None,
            tremolo: None,
            grace_slurs: Vec::new(),
        }
    }

    /// Note with the highest pitch (smallest line).
    pub fn up_note(&self) -> Option<&Note> {
        self.notes.iter().min_by_key(|n| n.line)
    }

    pub fn down_note(&self) -> Option<&Note> {
        self.notes.iter().max_by_key(|n| n.line)
    }

    /// Shape of the note heads, accidentals and attached symbols.
    pub fn shape(&self) -> Shape {
        let mut s = Shape::new();
        for n in &self.notes {
            s.add_rect(n.bbox.translated(n.pos));
            if let Some(a) = &n.accidental {
                s.add_rect(a.bbox.translated(a.pos));
            }
        }
        if let Some(stem) = &self.stem {
            s.add_rect(stem.rect());
        }
        if let Some(h) = &self.hook {
            s.add_rect(*h);
        }
        if let Some(d) = &self.dots_rect {
            s.add_rect(*d);
        }
        for l in &self.ledger_lines {
            s.add_rect(*l);
        }
        for a in &self.articulations {
            s.add_rect(a.bbox.translated(a.pos));
        }
        if let Some(a) = &self.arpeggio {
            s.add_rect(a.bbox.translated(a.pos));
        }
        if let Some(t) = &self.tremolo {
            s.add_rect(t.bbox.translated(t.pos));
        }
        for g in &self.grace_notes {
            s.add(&g.shape().translated(g.offset));
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rest {
    pub cr: ChordRest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccidentalType {
    Flat2,
    Flat,
    Natural,
    Sharp,
    Sharp2,
}

impl AccidentalType {
    pub fn from_alter(alter: i32) -> Self {
        match alter {
            a if a <= -2 => AccidentalType::Flat2,
            -1 => AccidentalType::Flat,
            0 => AccidentalType::Natural,
            1 => AccidentalType::Sharp,
            _ => AccidentalType::Sharp2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accidental {
    pub accidental_type: AccidentalType,
    /// Relative to the chord.
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Diatonic step, C = 0 … B = 6.
    pub step: i32,
    pub octave: i32,
    /// Chromatic alteration in semitones.
    pub alter: i32,
    /// Staff line (half spaces below the top line). Computed.
    #[serde(default)]
    pub line: i32,
    /// Computed from the accidental state of the measure.
    #[serde(default)]
    pub accidental: Option<Accidental>,
    /// Head placed on the other side of the stem.
    #[serde(default)]
    pub mirror: bool,
    /// Relative to the chord.
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
    #[serde(default)]
    pub tie_for: Option<SpannerId>,
    /// Note-anchored spanners (glissandi) starting here.
    #[serde(default)]
    pub spanner_for: Vec<SpannerId>,
}

impl Note {
    pub fn new(step: i32, octave: i32, alter: i32) -> Self {
        Self {
            step,
            octave,
            alter,
            line: 0,
            accidental: None,
            mirror: false,
            pos: Point::ZERO,
            bbox: Rect::default(),
            tie_for: None,
            spanner_for: Vec::new(),
        }
    }

    /// Parse a pitch name like `C4`, `F#5` or `Bb3`.
    pub fn from_name(name: &str) -> Option<Note> {
        let mut chars = name.chars();
        let step = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 1,
            'E' => 2,
            'F' => 3,
            'G' => 4,
            'A' => 5,
            'B' => 6,
            _ => return None,
        };
        let rest = chars.as_str();
        let digits_at = rest.find(|c: char| c.is_ascii_digit() || c == '-')?;
        let (accidentals, octave) = rest.split_at(digits_at);
        let mut alter = 0;
        for c in accidentals.chars() {
            match c {
                '#' => alter += 1,
                'b' => alter -= 1,
                _ => return None,
            }
        }
        Some(Note::new(step, octave.parse().ok()?, alter))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stem {
    /// Start of the stem (at the note head) relative to the chord.
    pub pos: Point,
    /// Signed length; negative for an up stem.
    pub length: f64,
    pub width: f64,
}

impl Stem {
    pub fn rect(&self) -> Rect {
        let (top, h) = if self.length < 0.0 {
            (self.pos.y + self.length, -self.length)
        } else {
            (self.pos.y, self.length)
        };
        Rect::new(self.pos.x, top, self.width, h)
    }

    /// Y of the free end.
    pub fn tip(&self) -> f64 {
        self.pos.y + self.length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArticulationKind {
    Staccato,
    Tenuto,
    Accent,
    Marcato,
    Staccatissimo,
    UpBow,
    DownBow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArticulationAnchor {
    /// Next to the note heads.
    #[default]
    Chord,
    TopStaff,
    BottomStaff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Articulation {
    pub kind: ArticulationKind,
    #[serde(default)]
    pub anchor: ArticulationAnchor,
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

impl Articulation {
    pub fn new(kind: ArticulationKind) -> Self {
        let anchor = match kind {
            ArticulationKind::Marcato | ArticulationKind::UpBow | ArticulationKind::DownBow => {
                ArticulationAnchor::TopStaff
            }
            _ => ArticulationAnchor::Chord,
        };
        Self { kind, anchor, pos: Point::ZERO, bbox: Rect::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arpeggio {
    /// Number of staves the arpeggio spans.
    pub span: usize,
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tremolo {
    pub strokes: i32,
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Syllabic {
    #[default]
    Single,
    Begin,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lyrics {
    pub text: String,
    pub verse: usize,
    #[serde(default)]
    pub syllabic: Syllabic,
    /// Relative to the chord or rest.
    #[serde(default)]
    pub pos: Point,
    #[serde(default)]
    pub bbox: Rect,
}

impl Lyrics {
    pub fn new(text: impl Into<String>, verse: usize) -> Self {
        Self {
            text: text.into(),
            verse,
            syllabic: Syllabic::Single,
            pos: Point::ZERO,
            bbox: Rect::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Other segment elements
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clef {
    pub clef_type: super::ClefType,
    /// Mid-measure clef changes are drawn small.
    #[serde(default)]
    pub small: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySig {
    pub fifths: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSig {
    pub numerator: i32,
    pub denominator: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarLine {
    pub bar_type: BarLineType,
    /// Number of staves spanned.
    #[serde(default = "one_usize")]
    pub span: usize,
}

fn one_usize() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breath {
    /// Pause in seconds.
    pub pause: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambitus {
    pub top: Note,
    pub bottom: Note,
}

/// Payload of every plain text item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoText {
    pub text: String,
    /// Quarter notes per second.
    pub tempo: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fermata {
    /// Tempo divisor applied while the fermata sounds.
    pub time_stretch: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FretDiagram {
    pub strings: i32,
    pub frets: i32,
}
