//! The JSON and C entry points.

mod support;

use std::ffi::{CStr, CString};

use pretty_assertions::assert_eq;
use scorelayout::*;
use support::*;

#[test]
fn json_layout_matches_direct_layout() {
    let score = whole_notes(2, 3).build();
    let json = score_to_json(&score).unwrap();

    let out = layout_json(&json).unwrap();
    let page: Page = serde_json::from_str(&out).unwrap();

    let mut direct = score.clone();
    let expected = direct.layout_linear().clone();
    assert_eq!(page.systems.len(), 1);
    assert_eq!(page.systems[0].measures, expected.systems[0].measures);
    assert_eq!(page.index.len(), expected.index.len());
    assert!((page.systems[0].width - expected.systems[0].width).abs() < 1e-6);
    assert!((page.bbox.height - expected.bbox.height).abs() < 1e-6);
}

#[test]
fn malformed_json_is_a_json_error() {
    let err = layout_json("{ \"staves\": [").unwrap_err();
    assert!(matches!(err, LayoutError::Json(_)), "{err}");
}

#[test]
fn reversed_spanner_is_rejected() {
    let mut b = whole_notes(1, 2);
    b.add_spanner(Spanner::new(SpannerKind::Hairpin(HairpinType::Decrescendo), 0, WHOLE, 0));
    let mut score = b.build();
    score.spanners[0].tick2 = -1;

    let err = layout_json(&score_to_json(&score).unwrap()).unwrap_err();
    assert!(matches!(err, LayoutError::InvalidInput(_)), "{err}");
}

#[test]
fn c_entry_point_returns_page_json() {
    let json = CString::new(score_to_json(&whole_notes(1, 1).build()).unwrap()).unwrap();
    unsafe {
        let out = scorelayout_layout_json(json.as_ptr());
        assert!(!out.is_null());
        let text = CStr::from_ptr(out).to_str().unwrap().to_owned();
        scorelayout_free_string(out);
        let page: Page = serde_json::from_str(&text).unwrap();
        assert_eq!(page.systems.len(), 1);
    }
}

#[test]
fn c_entry_point_rejects_null_and_bad_input() {
    let bad = CString::new("not json").unwrap();
    unsafe {
        assert!(scorelayout_layout_json(std::ptr::null()).is_null());
        assert!(scorelayout_layout_json(bad.as_ptr()).is_null());
        scorelayout_free_string(std::ptr::null_mut());
    }
}
