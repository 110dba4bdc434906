//! Linear layout: every measure of the score on one endless system.
//!
//! The entry point is [`Score::layout_linear`]. It runs the measure pass
//! (note lines, accidentals, stems, beams) on each measure while placing it
//! left to right, then the system-wide passes (shapes, spanners, tuplets,
//! dynamics, texts, lyrics, staff distances) in a fixed order. Later passes
//! read the shapes written by earlier ones, so the order is part of the
//! contract.

mod accidentals;
mod autoplace;
mod beams;
mod constants;
mod elements;
mod lyrics;
mod measure;
mod spanners;
mod system;
mod tuplets;

use log::debug;

pub use accidentals::{key_alter, update_notes, AccidentalState};
pub use beams::{Beaming, DefaultBeaming};
pub use lyrics::{DefaultLyricsLayout, LyricsLayout};

use crate::model::{Page, Score, Tick};
use crate::sigmap::Fraction;

/// Pluggable parts of the layout.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub beaming: &'a dyn Beaming,
    pub lyrics: &'a dyn LyricsLayout,
}

impl Default for Collaborators<'static> {
    fn default() -> Self {
        Self { beaming: &DefaultBeaming, lyrics: &DefaultLyricsLayout }
    }
}

/// Running state of one layout invocation.
#[derive(Debug, Clone)]
pub(crate) struct LayoutContext {
    /// Start tick of the next measure base.
    pub(crate) tick: Tick,
    /// Length of the last signature event written.
    pub(crate) sig: Fraction,
    /// Number the next counted measure gets.
    pub(crate) measure_no: i32,
    /// The measure base laid out before the current one.
    pub(crate) prev_measure: Option<usize>,
}

impl LayoutContext {
    pub(crate) fn new() -> Self {
        Self { tick: 0, sig: Fraction::ZERO, measure_no: 0, prev_measure: None }
    }
}

impl Score {
    /// Lay out the whole score on one page holding one system, using the
    /// default beaming and lyrics collaborators.
    pub fn layout_linear(&mut self) -> &Page {
        layout_linear_with(self, &Collaborators::default())
    }
}

/// Lay out the whole score on one page holding one system.
///
/// The previous pages are discarded first; the new page is installed once
/// every pass has run.
pub fn layout_linear_with<'s>(score: &'s mut Score, collab: &Collaborators) -> &'s Page {
    debug!(
        "linear layout: {} staves, {} measure bases, {} spanners",
        score.nstaves(),
        score.measures.len(),
        score.spanners.len()
    );
    reset_derived_state(score);

    let mut lc = LayoutContext::new();
    let system = system::layout_linear_system(score, &mut lc, collab);
    let page = system::finalize_page(score, system);

    score.pages.push(page);
    &score.pages[score.pages.len() - 1]
}

/// Drop everything a previous layout wrote into the score's maps.
fn reset_derived_state(score: &mut Score) {
    score.pages.clear();
    score.beams.clear();
    score.sig_map.clear();
    score.tempo_map.clear_pauses();
    for staff in &mut score.staves {
        staff.time_sigs.clear();
    }
}
