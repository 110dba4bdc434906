//! scorelayout — linear (single-system) layout engine for music notation.
//!
//! Lays out a whole score as one endless horizontal system on one page:
//! measure widths, note placement, beams, spanners, texts and staff
//! distances, plus a spatial index for hit-testing.
//!
//! # Example
//! ```no_run
//! use scorelayout::{Fraction, ScoreBuilder};
//!
//! let mut b = ScoreBuilder::new(1);
//! let m = b.add_measure(Fraction::new(4, 4));
//! b.add_chord(m, 0, 1920, &["C4", "E4", "G4"]);
//! let mut score = b.build();
//! let page = score.layout_linear();
//! println!("System width: {}", page.systems[0].width);
//! ```

pub mod builder;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod shape;
pub mod sigmap;
pub mod spanner_map;
pub mod style;
pub mod timemap;

#[cfg(target_os = "android")]
pub mod android;

pub use builder::ScoreBuilder;
pub use error::LayoutError;
pub use geometry::{Point, Rect};
pub use layout::{layout_linear_with, Beaming, Collaborators, DefaultBeaming, DefaultLyricsLayout, LyricsLayout};
pub use model::*;
pub use shape::Shape;
pub use sigmap::{Fraction, SigEvent, SigMap};
pub use spanner_map::SpannerMap;
pub use style::{Style, StyleId};
pub use timemap::TempoMap;

/// Convert a score to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn score_to_json(score: &Score) -> Result<String, LayoutError> {
    Ok(serde_json::to_string(score)?)
}

pub fn page_to_json(page: &Page) -> Result<String, LayoutError> {
    Ok(serde_json::to_string(page)?)
}

/// Read a score from JSON, lay it out and return the page as JSON.
///
/// The input is checked against the layout preconditions first; a score
/// that violates them is rejected with [`LayoutError::InvalidInput`].
pub fn layout_json(json: &str) -> Result<String, LayoutError> {
    let mut score: Score = serde_json::from_str(json)?;
    score.spanner_map.reindex();
    score.check_invariants()?;
    let page = score.layout_linear();
    page_to_json(page)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI — for iOS (static library) and Android (JNI)
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Lay out a JSON score and return the page as a JSON C string.
/// The caller must free the returned string with `scorelayout_free_string`.
/// Returns null on invalid input.
///
/// # Safety
/// `json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn scorelayout_layout_json(json: *const c_char) -> *mut c_char {
    if json.is_null() {
        return std::ptr::null_mut();
    }
    let c_str = unsafe { CStr::from_ptr(json) };
    let result = c_str
        .to_str()
        .map_err(LayoutError::from)
        .and_then(layout_json);

    match result {
        Ok(page) => CString::new(page).unwrap_or_default().into_raw(),
        Err(e) => {
            log::debug!("layout_json failed: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by scorelayout functions.
///
/// # Safety
/// `ptr` must be a string previously returned by a scorelayout function, or null.
#[no_mangle]
pub unsafe extern "C" fn scorelayout_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
