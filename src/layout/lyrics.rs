//! System-wide lyrics placement (a pluggable collaborator).

use log::trace;

use crate::geometry::Point;
use crate::model::*;
use crate::style::StyleId;

/// Places the lyrics of a finished system vertically.
///
/// Runs after every other item has been folded into the measure shapes.
/// Implementations may move lyrics (and the melisma lines following them)
/// and fold them into the shapes; staff distances are computed afterwards.
pub trait LyricsLayout {
    fn layout_lyrics(&self, score: &mut Score, system: &mut System);
}

/// One baseline per verse and staff, below everything else on the staff.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLyricsLayout;

impl LyricsLayout for DefaultLyricsLayout {
    fn layout_lyrics(&self, score: &mut Score, system: &mut System) {
        for staff in 0..score.nstaves() {
            if !score.staff_shown(system, staff) {
                continue;
            }
            let tracks = staff * VOICES..(staff + 1) * VOICES;
            let mut verses = 0;
            let mut bottom = score.staves[staff].height(&score.style);
            for &mi in &system.measures {
                let Some(m) = score.measure(mi) else { continue };
                if let Some(s) = m.staff_shape(staff).filter(|s| !s.is_empty()) {
                    bottom = bottom.max(s.bottom());
                }
                for seg in m.segments.iter().filter(|s| s.is_chord_rest_type()) {
                    for t in tracks.clone() {
                        if let Some(cr) = seg.cr(t).and_then(Element::chord_rest) {
                            verses = verses.max(cr.lyrics.iter().map(|l| l.verse + 1).max().unwrap_or(0));
                        }
                    }
                }
            }
            if verses == 0 {
                continue;
            }
            let style = &score.style;
            let sp = style.spatium() * score.staves[staff].mag;
            let default_top = score.staves[staff].height(style) + style.value(StyleId::LyricsPosBelow) * sp;
            let first = default_top.max(bottom + style.value(StyleId::LyricsMinDistance) * sp);
            let line_height = style.value(StyleId::LyricsLineHeight) * sp;
            trace!("staff {staff}: {verses} verse(s), first baseline at {first}");

            for &mi in &system.measures {
                let Some(m) = score.measures.get_mut(mi).and_then(MeasureBase::as_measure_mut) else { continue };
                let mut folded = Vec::new();
                for seg in m.segments.iter_mut().filter(|s| s.is_chord_rest_type()) {
                    let seg_pos = seg.pos;
                    for t in tracks.clone() {
                        let Some(e) = seg.element_mut(t) else { continue };
                        let e_pos = e.pos;
                        let Some(cr) = e.chord_rest_mut() else { continue };
                        for l in cr.lyrics.iter_mut() {
                            let top = first + l.verse as f64 * line_height;
                            // lyrics are positioned relative to the chord
                            l.pos.y = top - e_pos.y - l.bbox.top();
                            folded.push(l.bbox.translated(seg_pos + e_pos + l.pos));
                        }
                    }
                }
                let shape = m.staff_shape_mut(staff);
                for r in folded {
                    shape.add_rect(r);
                }
            }
        }
        realign_lyrics_lines(score, system);
    }
}

/// Move melisma lines onto the baseline of the syllable they follow.
fn realign_lyrics_lines(score: &Score, system: &mut System) {
    for seg in system
        .spanner_segments
        .iter_mut()
        .filter(|s| s.kind == SpannerKind::LyricsLine)
    {
        let Some(sp) = score.spanner(seg.spanner) else { continue };
        let Some((l, lpos)) = sp.start_element.and_then(|loc| find_lyrics(score, loc, sp.verse)) else {
            continue;
        };
        let y = lpos.y + l.bbox.bottom();
        let thickness = seg.bbox.height;
        seg.bbox.y = y - thickness;
        seg.start.y = y;
        seg.end.y = y;
    }
}

/// Lyrics of `verse` on the chord/rest at `loc`, with its position in
/// system coordinates.
pub(crate) fn find_lyrics(score: &Score, loc: ElementLoc, verse: usize) -> Option<(&Lyrics, Point)> {
    let m = score.measure(loc.measure)?;
    let seg = m.segments.get(loc.segment)?;
    let e = seg.element(loc.track)?;
    let l = e.chord_rest()?.lyrics.iter().find(|l| l.verse == verse)?;
    Some((l, m.pos + seg.pos + e.pos + l.pos))
}
