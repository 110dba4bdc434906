//! Layout of single elements: chords, rests, signatures, barlines and
//! text items. Positions are relative to the parent segment; y is
//! relative to the top line of the element's staff.

use super::constants::*;
use crate::geometry::{Point, Rect};
use crate::model::*;
use crate::style::{Style, StyleId};

/// What an element needs to know about its staff.
pub(crate) struct ElementContext<'a> {
    pub(crate) style: &'a Style,
    pub(crate) staff_height: f64,
    pub(crate) staff_mag: f64,
    pub(crate) clef: ClefType,
}

impl<'a> ElementContext<'a> {
    pub(crate) fn new(style: &'a Style, staff: Option<&Staff>, tick: Tick) -> Self {
        let sp = style.spatium();
        match staff {
            Some(s) => Self {
                style,
                staff_height: s.height(style),
                staff_mag: s.mag,
                clef: s.clef(tick),
            },
            None => Self { style, staff_height: 4.0 * sp, staff_mag: 1.0, clef: ClefType::Treble },
        }
    }

    /// Staff space of this staff.
    pub(crate) fn sp(&self) -> f64 {
        self.style.spatium() * self.staff_mag
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Dispatcher
// ═══════════════════════════════════════════════════════════════════════

/// Default layout of any element: size, and position at its default
/// placement.
pub(crate) fn layout_element(e: &mut Element, ctx: &ElementContext) {
    let sp = ctx.sp();
    let msp = sp * e.mag;
    let placement = e.placement;
    let text_style = text_offsets(&e.kind);
    let style = ctx.style;

    let (pos, bbox) = match &mut e.kind {
        ElementKind::Chord(c) => {
            layout_chord(c, ctx);
            (Point::ZERO, c.shape().bbox())
        }
        ElementKind::Rest(r) => rest_geometry(r.cr.ticks, r.cr.mag, ctx, 0.0),
        ElementKind::Clef(c) => {
            let m = if c.small { style.value(StyleId::SmallClefMag) } else { 1.0 };
            (Point::ZERO, clef_bbox(c.clef_type, msp * m))
        }
        ElementKind::KeySig(k) => (Point::ZERO, keysig_bbox(k.fifths, msp)),
        ElementKind::TimeSig(t) => {
            let digits = t.numerator.to_string().len().max(t.denominator.to_string().len());
            (Point::ZERO, Rect::new(0.0, 0.0, digits as f64 * TIMESIG_DIGIT_WIDTH * msp, ctx.staff_height))
        }
        ElementKind::BarLine(b) => (
            Point::ZERO,
            Rect::new(0.0, 0.0, barline_width(b.bar_type, style) * sp, ctx.staff_height),
        ),
        ElementKind::Breath(_) => (
            Point::ZERO,
            Rect::new(0.0, -1.5 * sp, BREATH_WIDTH * msp, BREATH_HEIGHT * msp),
        ),
        ElementKind::Ambitus(a) => {
            a.top.line = ctx.clef.line_of(a.top.step, a.top.octave);
            a.bottom.line = ctx.clef.line_of(a.bottom.step, a.bottom.octave);
            let top = a.top.line.min(a.bottom.line) as f64 * sp / 2.0;
            let bottom = a.top.line.max(a.bottom.line) as f64 * sp / 2.0;
            let hh = NOTEHEAD_HEIGHT * msp;
            (
                Point::ZERO,
                Rect::new(0.0, top - hh / 2.0, NOTEHEAD_WIDTH * msp, bottom - top + hh),
            )
        }
        ElementKind::Fermata(_) => fermata_geometry(ctx, e.mag, 0.0),
        ElementKind::FretDiagram(f) => {
            let w = (f.strings - 1).max(1) as f64 * FRET_CELL * msp;
            let h = (f.frets.max(1) as f64 + 1.0) * FRET_CELL * msp;
            let y = -(style.value(StyleId::FretPosAbove) * sp) - h;
            (Point::new(0.0, y), Rect::new(0.0, 0.0, w, h))
        }
        ElementKind::TempoText(t) => {
            let offsets = (StyleId::TempoPosAbove, StyleId::DynamicsPosBelow, false);
            text_geometry(&t.text, placement, offsets, ctx, e.mag)
        }
        ElementKind::Dynamic(t)
        | ElementKind::StaffText(t)
        | ElementKind::SystemText(t)
        | ElementKind::Harmony(t)
        | ElementKind::RehearsalMark(t)
        | ElementKind::FiguredBass(t)
        | ElementKind::Symbol(t)
        | ElementKind::InstrumentChange(t)
        | ElementKind::Jump(t)
        | ElementKind::Marker(t)
        | ElementKind::MeasureNumber(t) => {
            let offsets = text_style.unwrap_or((
                StyleId::StaffTextPosAbove,
                StyleId::DynamicsPosBelow,
                false,
            ));
            text_geometry(&t.text, placement, offsets, ctx, e.mag)
        }
    };
    e.pos = pos;
    e.bbox = bbox;
    e.autoplace_offset = None;
}

/// Default distances above / below the staff, and whether the text is
/// centered on the note head.
fn text_offsets(kind: &ElementKind) -> Option<(StyleId, StyleId, bool)> {
    use StyleId::*;
    Some(match kind {
        ElementKind::Dynamic(_) => (StaffTextPosAbove, DynamicsPosBelow, true),
        ElementKind::StaffText(_) => (StaffTextPosAbove, DynamicsPosBelow, false),
        ElementKind::SystemText(_) => (SystemTextPosAbove, DynamicsPosBelow, false),
        ElementKind::Harmony(_) => (HarmonyPosAbove, DynamicsPosBelow, false),
        ElementKind::RehearsalMark(_) => (RehearsalMarkPosAbove, DynamicsPosBelow, false),
        ElementKind::FiguredBass(_) => (StaffTextPosAbove, FiguredBassPosBelow, false),
        ElementKind::Jump(_) => (JumpPosAbove, DynamicsPosBelow, false),
        ElementKind::Marker(_) => (MarkerPosAbove, DynamicsPosBelow, false),
        ElementKind::MeasureNumber(_) => (MeasureNumberPosAbove, DynamicsPosBelow, false),
        ElementKind::Symbol(_) | ElementKind::InstrumentChange(_) => {
            (StaffTextPosAbove, DynamicsPosBelow, false)
        }
        _ => return None,
    })
}

/// Width of a text run at the style's average character width.
pub(crate) fn text_width(text: &str, style: &Style, msp: f64) -> f64 {
    text.chars().count().max(1) as f64 * style.value(StyleId::TextCharWidth) * msp
}

fn text_geometry(
    text: &str,
    placement: Placement,
    (above, below, centered): (StyleId, StyleId, bool),
    ctx: &ElementContext,
    mag: f64,
) -> (Point, Rect) {
    let sp = ctx.sp();
    let w = text_width(text, ctx.style, sp * mag);
    let h = ctx.style.value(StyleId::TextHeight) * sp * mag;
    let x = if centered { (NOTEHEAD_WIDTH * sp - w) / 2.0 } else { 0.0 };
    let y = match placement {
        Placement::Above => -(ctx.style.value(above) * sp) - h,
        Placement::Below => ctx.staff_height + ctx.style.value(below) * sp,
    };
    (Point::new(x, y), Rect::new(0.0, 0.0, w, h))
}

fn clef_bbox(clef: ClefType, msp: f64) -> Rect {
    let w = CLEF_WIDTH * msp;
    match clef {
        ClefType::Treble | ClefType::Treble8vb => Rect::new(0.0, -1.5 * msp, w, 7.0 * msp),
        ClefType::Bass => Rect::new(0.0, 0.0, w, 3.0 * msp),
        ClefType::Alto => Rect::new(0.0, 0.0, w, 4.0 * msp),
        ClefType::Tenor => Rect::new(0.0, -1.0 * msp, w, 4.0 * msp),
        ClefType::Percussion => Rect::new(0.0, 1.0 * msp, w * 0.6, 2.0 * msp),
    }
}

fn keysig_bbox(fifths: i32, msp: f64) -> Rect {
    if fifths == 0 {
        return Rect::default();
    }
    let per = if fifths > 0 { SHARP_WIDTH } else { FLAT_WIDTH };
    Rect::new(0.0, -1.0 * msp, fifths.abs() as f64 * per * msp, 5.0 * msp)
}

/// Barline width in staff spaces.
pub(crate) fn barline_width(bar_type: BarLineType, style: &Style) -> f64 {
    let bar = style.value(StyleId::BarWidth);
    let thick = style.value(StyleId::EndBarWidth);
    let gap = style.value(StyleId::DoubleBarDistance);
    match bar_type {
        BarLineType::Normal => bar,
        BarLineType::Double => 2.0 * bar + gap,
        BarLineType::End => bar + gap + thick,
        BarLineType::StartRepeat | BarLineType::EndRepeat => {
            thick + gap + bar + REPEAT_DOT_GAP + REPEAT_DOT_WIDTH
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Rests
// ═══════════════════════════════════════════════════════════════════════

/// Lay out a rest; `voice_offset` moves it away from other voices.
pub(crate) fn layout_rest(e: &mut Element, ctx: &ElementContext, voice_offset: f64) {
    if let ElementKind::Rest(r) = &e.kind {
        let (pos, bbox) = rest_geometry(r.cr.ticks, r.cr.mag, ctx, voice_offset);
        e.pos = pos;
        e.bbox = bbox;
    }
}

fn rest_geometry(ticks: Tick, mag: f64, ctx: &ElementContext, voice_offset: f64) -> (Point, Rect) {
    let sp = ctx.sp();
    let msp = sp * mag;
    if ticks >= 4 * DIVISION {
        // hangs from the second line
        let bbox = Rect::new(0.0, 0.0, BLOCK_REST_WIDTH * msp, BLOCK_REST_HEIGHT * msp);
        (Point::new(0.0, sp + voice_offset), bbox)
    } else if ticks >= 2 * DIVISION {
        // sits on the middle line
        let bbox = Rect::new(0.0, -BLOCK_REST_HEIGHT * msp, BLOCK_REST_WIDTH * msp, BLOCK_REST_HEIGHT * msp);
        (Point::new(0.0, 2.0 * sp + voice_offset), bbox)
    } else {
        let h = REST_HEIGHT * msp;
        let bbox = Rect::new(0.0, -h / 2.0, REST_WIDTH * msp, h);
        (Point::new(0.0, ctx.staff_height / 2.0 + voice_offset), bbox)
    }
}

/// Vertical rest offset when several voices share a staff.
pub(crate) fn voice_rest_offset(track: usize, multi_voice: bool, sp: f64) -> f64 {
    if !multi_voice {
        0.0
    } else if track2voice(track) % 2 == 0 {
        -VOICE_REST_OFFSET * sp
    } else {
        VOICE_REST_OFFSET * sp
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Chords
// ═══════════════════════════════════════════════════════════════════════

fn line_y(line: i32, sp: f64) -> f64 {
    line as f64 * sp / 2.0
}

/// Stem direction: explicit, else by voice when the staff has several
/// voices, else away from the middle line.
pub(crate) fn compute_up(chord: &mut Chord, track: usize, multi_voice: bool) {
    chord.up = match chord.stem_direction {
        Direction::Up => true,
        Direction::Down => false,
        Direction::Auto if multi_voice => track2voice(track) % 2 == 0,
        Direction::Auto => {
            if chord.notes.is_empty() {
                true
            } else {
                let sum: i32 = chord.notes.iter().map(|n| n.line).sum();
                sum as f64 / chord.notes.len() as f64 > 4.0
            }
        }
    };
}

/// Provisional stem from the note heads. Main-voice stems reach at least
/// to the middle line; `extend` is false for grace chords.
pub(crate) fn layout_stem1(chord: &mut Chord, ctx: &ElementContext, extend: bool) {
    let (Some(up), Some(down)) = (chord.up_note(), chord.down_note()) else {
        chord.stem = None;
        return;
    };
    if chord.cr.ticks >= 4 * DIVISION {
        chord.stem = None;
        return;
    }
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    let up_y = line_y(up.line, sp);
    let down_y = line_y(down.line, sp);
    let len = ctx.style.value(StyleId::StemLength) * msp;
    let width = ctx.style.value(StyleId::StemWidth) * msp;
    let mid = ctx.staff_height / 2.0;
    let head_w = NOTEHEAD_WIDTH * msp;
    chord.stem = Some(if chord.up {
        let mut tip = up_y - len;
        if extend {
            tip = tip.min(mid);
        }
        Stem { pos: Point::new(head_w - width, down_y), length: tip - down_y, width }
    } else {
        let mut tip = down_y + len;
        if extend {
            tip = tip.max(mid);
        }
        Stem { pos: Point::new(0.0, up_y), length: tip - up_y, width }
    });
}

/// Heads on the wrong side of the stem for seconds.
pub(crate) fn compute_mirror(chord: &mut Chord) {
    let mut order: Vec<usize> = (0..chord.notes.len()).collect();
    order.sort_by_key(|&i| chord.notes[i].line);
    if chord.up {
        order.reverse();
    }
    let mut prev: Option<(i32, bool)> = None;
    for i in order {
        let n = &mut chord.notes[i];
        n.mirror = matches!(prev, Some((line, false)) if (n.line - line).abs() == 1);
        prev = Some((n.line, n.mirror));
    }
}

fn head_x(chord: &Chord, note: &Note, head_w: f64, stem_w: f64) -> f64 {
    match (note.mirror, chord.up) {
        (false, _) => 0.0,
        (true, true) => head_w - stem_w,
        (true, false) => -(head_w - stem_w),
    }
}

/// Stack accidentals in columns left of the heads, top to bottom.
pub(crate) fn place_accidentals(chord: &mut Chord, ctx: &ElementContext) {
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    let head_w = NOTEHEAD_WIDTH * msp;
    let stem_w = ctx.style.value(StyleId::StemWidth) * msp;
    let left = chord
        .notes
        .iter()
        .map(|n| head_x(chord, n, head_w, stem_w))
        .fold(0.0, f64::min);
    let aw = ACCIDENTAL_WIDTH * msp;
    let ah = ACCIDENTAL_HEIGHT * msp;

    let mut order: Vec<usize> = (0..chord.notes.len())
        .filter(|&i| chord.notes[i].accidental.is_some())
        .collect();
    order.sort_by_key(|&i| chord.notes[i].line);
    let mut last_line: Option<i32> = None;
    let mut column = 0;
    for i in order {
        let line = chord.notes[i].line;
        column = match last_line {
            Some(l) if line - l < ACCIDENTAL_COLUMN_LINES => column + 1,
            _ => 0,
        };
        last_line = Some(line);
        if let Some(acc) = chord.notes[i].accidental.as_mut() {
            let x = left
                - ACCIDENTAL_NOTE_GAP * msp
                - aw
                - column as f64 * (aw + ACCIDENTAL_COLUMN_GAP * msp);
            acc.pos = Point::new(x, line_y(line, sp));
            acc.bbox = Rect::new(0.0, -ah / 2.0, aw, ah);
        }
    }
}

/// Full chord geometry: heads, stem, hook, dots, ledger lines, arpeggio
/// and grace chords. Keeps the stem length already decided.
pub(crate) fn layout_chord(chord: &mut Chord, ctx: &ElementContext) {
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    let head_w = NOTEHEAD_WIDTH * msp;
    let head_h = NOTEHEAD_HEIGHT * msp;
    let stem_w = ctx.style.value(StyleId::StemWidth) * msp;

    for i in 0..chord.notes.len() {
        let x = head_x(chord, &chord.notes[i], head_w, stem_w);
        let n = &mut chord.notes[i];
        n.pos = Point::new(x, line_y(n.line, sp));
        n.bbox = Rect::new(0.0, -head_h / 2.0, head_w, head_h);
    }
    let (Some(up_line), Some(down_line)) =
        (chord.up_note().map(|n| n.line), chord.down_note().map(|n| n.line))
    else {
        chord.stem = None;
        chord.hook = None;
        chord.ledger_lines.clear();
        return;
    };
    let up_y = line_y(up_line, sp);
    let down_y = line_y(down_line, sp);

    if let Some(stem) = chord.stem.as_mut() {
        stem.width = stem_w;
        stem.pos = if chord.up {
            Point::new(head_w - stem_w, down_y)
        } else {
            Point::new(0.0, up_y)
        };
    }

    chord.hook = match &chord.stem {
        Some(stem) if chord.cr.beam.is_none() && chord.cr.ticks < DIVISION => {
            let levels = chord.cr.beam_levels().max(1);
            let h = (HOOK_HEIGHT + HOOK_LEVEL_EXTRA * (levels - 1) as f64) * msp;
            let tip = stem.tip();
            let y = if chord.up { tip } else { tip - h };
            Some(Rect::new(stem.pos.x + stem.width, y, HOOK_WIDTH * msp, h))
        }
        _ => None,
    };

    let right = chord
        .notes
        .iter()
        .map(|n| n.pos.x + n.bbox.width)
        .fold(head_w, f64::max);
    chord.dots_rect = (chord.dots > 0).then(|| {
        let x = right + DOT_DISTANCE * msp;
        let w = chord.dots as f64 * (DOT_WIDTH + DOT_DISTANCE) * msp;
        Rect::new(x, up_y - DOT_WIDTH * msp / 2.0, w, down_y - up_y + DOT_WIDTH * msp)
    });

    chord.ledger_lines.clear();
    let ledger_w = head_w + 2.0 * LEDGER_LINE_EXTEND * msp;
    let ledger_h = LEDGER_LINE_WIDTH * sp;
    let bottom_line = 2 * (ctx.staff_lines() - 1);
    let mut lines: Vec<i32> = Vec::new();
    for n in &chord.notes {
        let mut l = -2;
        while l >= n.line {
            lines.push(l);
            l -= 2;
        }
        let mut l = bottom_line + 2;
        while l <= n.line {
            lines.push(l);
            l += 2;
        }
    }
    lines.sort_unstable();
    lines.dedup();
    for l in lines {
        chord.ledger_lines.push(Rect::new(
            -LEDGER_LINE_EXTEND * msp,
            line_y(l, sp) - ledger_h / 2.0,
            ledger_w,
            ledger_h,
        ));
    }

    let mut left = chord
        .notes
        .iter()
        .flat_map(|n| {
            let acc = n.accidental.as_ref().map(|a| a.pos.x + a.bbox.x);
            std::iter::once(n.pos.x).chain(acc)
        })
        .fold(0.0, f64::min);

    if let Some(arp) = chord.arpeggio.as_mut() {
        arp.pos = Point::new(left - (ARPEGGIO_DISTANCE + ARPEGGIO_WIDTH) * msp, 0.0);
        arp.bbox = Rect::new(0.0, up_y - head_h / 2.0, ARPEGGIO_WIDTH * msp, down_y - up_y + head_h);
        left = arp.pos.x;
    }

    let mut cursor = left - GRACE_GAP * sp;
    for g in chord.grace_notes.iter_mut().rev() {
        compute_mirror(g);
        place_accidentals(g, ctx);
        layout_chord(g, ctx);
        let bb = g.shape().bbox();
        g.offset = Point::new(cursor - bb.right(), 0.0);
        cursor = g.offset.x + bb.left() - GRACE_DISTANCE * sp;
    }
}

impl ElementContext<'_> {
    fn staff_lines(&self) -> i32 {
        let sp = self.sp();
        if sp <= 0.0 {
            5
        } else {
            (self.staff_height / sp).round() as i32 + 1
        }
    }
}

/// Chord-anchored articulations, on the note side opposite the stem.
pub(crate) fn layout_articulations(chord: &mut Chord, ctx: &ElementContext) {
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    let (Some(up_line), Some(down_line)) =
        (chord.up_note().map(|n| n.line), chord.down_note().map(|n| n.line))
    else {
        return;
    };
    let size = ARTICULATION_SIZE * msp;
    let dist = ctx.style.value(StyleId::ArticulationDistance) * sp;
    let head_h = NOTEHEAD_HEIGHT * msp;
    let cx = NOTEHEAD_WIDTH * msp / 2.0;
    let up = chord.up;
    let mut cur = if up {
        line_y(down_line, sp) + head_h / 2.0 + dist
    } else {
        line_y(up_line, sp) - head_h / 2.0 - dist
    };
    for a in chord
        .articulations
        .iter_mut()
        .filter(|a| a.anchor == ArticulationAnchor::Chord)
    {
        a.bbox = Rect::new(-size / 2.0, 0.0, size, size);
        if up {
            a.pos = Point::new(cx, cur);
            cur += size + ARTICULATION_GAP * msp;
        } else {
            a.pos = Point::new(cx, cur - size);
            cur -= size + ARTICULATION_GAP * msp;
        }
    }
}

/// Staff-anchored articulations, outside the staff and everything else of
/// the chord (including a stem stretched by its beam).
pub(crate) fn layout_articulations2(chord: &mut Chord, ctx: &ElementContext) {
    if chord
        .articulations
        .iter()
        .all(|a| a.anchor == ArticulationAnchor::Chord)
    {
        return;
    }
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    for a in chord
        .articulations
        .iter_mut()
        .filter(|a| a.anchor != ArticulationAnchor::Chord)
    {
        a.bbox = Rect::default();
    }
    let shape = chord.shape();
    let size = ARTICULATION_SIZE * msp;
    let dist = ctx.style.value(StyleId::ArticulationDistance) * sp;
    let cx = NOTEHEAD_WIDTH * msp / 2.0;
    let mut top = shape.top().min(0.0) - dist;
    let mut bottom = shape.bottom().max(ctx.staff_height) + dist;
    for a in chord.articulations.iter_mut() {
        match a.anchor {
            ArticulationAnchor::Chord => {}
            ArticulationAnchor::TopStaff => {
                a.pos = Point::new(cx, top - size);
                a.bbox = Rect::new(-size / 2.0, 0.0, size, size);
                top -= size + ARTICULATION_GAP * msp;
            }
            ArticulationAnchor::BottomStaff => {
                a.pos = Point::new(cx, bottom);
                a.bbox = Rect::new(-size / 2.0, 0.0, size, size);
                bottom += size + ARTICULATION_GAP * msp;
            }
        }
    }
}

/// Tremolo strokes across the middle of the stem, or above a stemless head.
pub(crate) fn layout_tremolo(chord: &mut Chord, ctx: &ElementContext) {
    let sp = ctx.sp();
    let msp = sp * chord.cr.mag;
    let up_y = chord.up_note().map_or(0.0, |n| line_y(n.line, sp));
    let anchor = match &chord.stem {
        Some(stem) => Point::new(stem.pos.x + stem.width / 2.0, stem.pos.y + stem.length / 2.0),
        None => Point::new(NOTEHEAD_WIDTH * msp / 2.0, up_y - 2.0 * sp),
    };
    if let Some(t) = chord.tremolo.as_mut() {
        let h = t.strokes.max(1) as f64 * TREMOLO_STROKE * msp;
        t.pos = anchor;
        t.bbox = Rect::new(-TREMOLO_WIDTH * msp / 2.0, -h / 2.0, TREMOLO_WIDTH * msp, h);
    }
}

/// Stretch an arpeggio down to `bottom` (chord coordinates) when it spans
/// several staves.
pub(crate) fn layout_arpeggio2(chord: &mut Chord, bottom: f64) {
    if let Some(arp) = chord.arpeggio.as_mut() {
        let top = arp.bbox.top();
        if bottom > top {
            arp.bbox.height = bottom - top;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Attached items
// ═══════════════════════════════════════════════════════════════════════

/// Provisional lyrics position under the note head, one line per verse.
pub(crate) fn layout_lyrics_item(l: &mut Lyrics, ctx: &ElementContext, mag: f64) {
    let sp = ctx.sp();
    let w = text_width(&l.text, ctx.style, sp * mag);
    let h = ctx.style.value(StyleId::TextHeight) * sp * mag;
    let head_w = NOTEHEAD_WIDTH * sp * mag;
    let y = ctx.staff_height
        + ctx.style.value(StyleId::LyricsPosBelow) * sp
        + l.verse as f64 * ctx.style.value(StyleId::LyricsLineHeight) * sp;
    l.pos = Point::new((head_w - w) / 2.0, y);
    l.bbox = Rect::new(0.0, 0.0, w, h);
}

fn fermata_geometry(ctx: &ElementContext, mag: f64, anchor_top: f64) -> (Point, Rect) {
    let sp = ctx.sp();
    let w = FERMATA_WIDTH * sp * mag;
    let h = FERMATA_HEIGHT * sp * mag;
    let y = anchor_top.min(0.0) - ctx.style.value(StyleId::FermataPosAbove) * sp - h;
    (Point::new((NOTEHEAD_WIDTH * sp - w) / 2.0, y), Rect::new(0.0, 0.0, w, h))
}

/// Fermata above the chord (or the staff, whichever is higher).
pub(crate) fn layout_fermata(e: &mut Element, ctx: &ElementContext, anchor_top: f64) {
    let (pos, bbox) = fermata_geometry(ctx, e.mag, anchor_top);
    e.pos = pos;
    e.bbox = bbox;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(style: &Style) -> ElementContext<'_> {
        ElementContext::new(style, None, 0)
    }

    fn chord(names: &[&str], ticks: Tick) -> Chord {
        let notes = names
            .iter()
            .filter_map(|n| Note::from_name(n))
            .map(|mut n| {
                n.line = ClefType::Treble.line_of(n.step, n.octave);
                n
            })
            .collect();
        Chord::new(ticks, notes)
    }

    #[test]
    fn low_notes_get_stem_up_reaching_middle_line() {
        let style = Style::new();
        let ctx = ctx(&style);
        let mut c = chord(&["C4"], DIVISION);
        compute_up(&mut c, 0, false);
        assert!(c.up, "C4 (line 10) should have its stem up");
        layout_stem1(&mut c, &ctx, true);
        layout_chord(&mut c, &ctx);
        let stem = c.stem.clone().expect("quarter note has a stem");
        assert!(stem.tip() <= ctx.staff_height / 2.0, "stem tip {} below middle line", stem.tip());
        assert_eq!(c.ledger_lines.len(), 1);
    }

    #[test]
    fn seconds_are_mirrored() {
        let style = Style::new();
        let ctx = ctx(&style);
        let mut c = chord(&["G4", "A4"], DIVISION);
        compute_up(&mut c, 0, false);
        compute_mirror(&mut c);
        let mirrored: Vec<bool> = c.notes.iter().map(|n| n.mirror).collect();
        assert_eq!(mirrored, vec![false, true]);
        layout_chord(&mut c, &ctx);
        assert!(c.notes[1].pos.x > 0.0);
    }

    #[test]
    fn multi_voice_follows_voice_parity() {
        let mut c = chord(&["C4"], DIVISION);
        compute_up(&mut c, 1, true);
        assert!(!c.up);
        c.stem_direction = Direction::Up;
        compute_up(&mut c, 1, true);
        assert!(c.up);
    }

    #[test]
    fn note_names_parse() {
        let n = Note::from_name("F#5").expect("valid name");
        assert_eq!((n.step, n.octave, n.alter), (3, 5, 1));
        assert!(Note::from_name("H2").is_none());
        assert_eq!(Note::from_name("Bb3").map(|n| n.alter), Some(-1));
    }

    #[test]
    fn staff_articulations_clear_the_staff() {
        let style = Style::new();
        let ctx = ctx(&style);
        let mut c = chord(&["E5"], DIVISION);
        c.articulations.push(Articulation::new(ArticulationKind::Marcato));
        compute_up(&mut c, 0, false);
        layout_stem1(&mut c, &ctx, true);
        layout_chord(&mut c, &ctx);
        layout_articulations2(&mut c, &ctx);
        let a = &c.articulations[0];
        assert!(a.pos.y + a.bbox.bottom() < 0.0, "marcato must sit above the top line");
    }
}
