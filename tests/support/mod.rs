//! Score fixtures shared by the integration tests.

#![allow(dead_code)]

use scorelayout::*;

pub const QUARTER: Tick = DIVISION;
pub const WHOLE: Tick = 4 * DIVISION;

pub fn common_time() -> Fraction {
    Fraction::new(4, 4)
}

/// `nmeasures` of 4/4 with one whole-note C5 per staff and measure.
pub fn whole_notes(nstaves: usize, nmeasures: usize) -> ScoreBuilder {
    let mut b = ScoreBuilder::new(nstaves);
    for _ in 0..nmeasures {
        let m = b.add_measure(common_time());
        for staff in 0..nstaves {
            b.add_chord(m, staff * VOICES, WHOLE, &["C5"]);
        }
    }
    b
}

pub fn text(kind: fn(Text) -> ElementKind, s: &str, track: usize) -> Element {
    Element::new(kind(Text::new(s)), track)
}

pub fn dynamic(s: &str, track: usize) -> Element {
    text(ElementKind::Dynamic, s, track)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

pub fn system(score: &Score) -> &System {
    score.system().expect("layout produced a system")
}

pub fn measure(score: &Score, mi: usize) -> &Measure {
    score.measure(mi).expect("measure exists")
}

pub fn annotation(score: &Score, loc: AnnotationLoc) -> &Element {
    score.annotation(loc).expect("annotation exists")
}
