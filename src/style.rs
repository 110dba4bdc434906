//! Resolved style values.
//!
//! Style editing happens elsewhere; layout only reads scalars. Distances are
//! stored in staff spaces (spatium units) and converted with [`Style::sp`];
//! magnifications and flags are unitless. Absolute page metrics are in the
//! same user units as the produced geometry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StyleId {
    // ── Page (absolute units) ───────────────────────────────────────
    Spatium,
    PageWidth,
    PageHeight,
    PageLeftMargin,
    PageTopMargin,

    // ── System / staff distances ────────────────────────────────────
    StaffUpperBorder,
    StaffDistance,
    AkkoladeDistance,
    MinVerticalDistance,
    BracketWidth,
    BracketDistance,
    InstrumentNameOffset,
    HideEmptyStaves,
    DontHideStavesInFirstSystem,

    // ── Magnification ───────────────────────────────────────────────
    SmallNoteMag,
    GraceNoteMag,
    SmallClefMag,

    // ── Horizontal spacing ──────────────────────────────────────────
    MinNoteDistance,
    NoteDistance,
    MeasureSpacing,
    BarNoteDistance,
    NoteBarDistance,
    ClefLeftMargin,
    KeysigLeftMargin,
    TimesigLeftMargin,
    ClefKeyRightMargin,
    BarWidth,
    EndBarWidth,
    DoubleBarDistance,

    // ── Chord geometry ──────────────────────────────────────────────
    StemLength,
    StemWidth,
    BeamWidth,
    BeamDistance,
    ArticulationDistance,
    TupletBracketDistance,
    TupletHeight,

    // ── Default element placement (staff spaces from the staff edge) ─
    DynamicsPosBelow,
    HairpinPosBelow,
    HairpinHeight,
    PedalPosBelow,
    OttavaPosAbove,
    VoltaPosAbove,
    VoltaHook,
    TextLinePosAbove,
    StaffTextPosAbove,
    SystemTextPosAbove,
    RehearsalMarkPosAbove,
    HarmonyPosAbove,
    FretPosAbove,
    TempoPosAbove,
    FermataPosAbove,
    FiguredBassPosBelow,
    JumpPosAbove,
    MarkerPosAbove,

    // ── Text metrics ────────────────────────────────────────────────
    TextCharWidth,
    TextHeight,

    // ── Lyrics ──────────────────────────────────────────────────────
    LyricsPosBelow,
    LyricsLineHeight,
    LyricsMinDistance,
    LyricsLineThickness,

    // ── Curves ──────────────────────────────────────────────────────
    SlurMinHeight,
    SlurMaxHeight,
    SlurHeightFactor,
    TieHeight,

    // ── Measure numbers ─────────────────────────────────────────────
    ShowMeasureNumber,
    MeasureNumberInterval,
    MeasureNumberPosAbove,
}

impl StyleId {
    /// Built-in default for every style value.
    pub fn default_value(self) -> f64 {
        use StyleId::*;
        match self {
            Spatium => 10.0,
            PageWidth => 820.0,
            PageHeight => 1160.0,
            PageLeftMargin => 50.0,
            PageTopMargin => 30.0,

            StaffUpperBorder => 7.0,
            StaffDistance => 6.5,
            AkkoladeDistance => 6.5,
            MinVerticalDistance => 0.5,
            BracketWidth => 0.45,
            BracketDistance => 0.25,
            InstrumentNameOffset => 1.0,
            HideEmptyStaves => 0.0,
            DontHideStavesInFirstSystem => 1.0,

            SmallNoteMag => 0.7,
            GraceNoteMag => 0.7,
            SmallClefMag => 0.8,

            MinNoteDistance => 0.25,
            NoteDistance => 1.5,
            MeasureSpacing => 1.2,
            BarNoteDistance => 1.2,
            NoteBarDistance => 1.0,
            ClefLeftMargin => 0.8,
            KeysigLeftMargin => 0.5,
            TimesigLeftMargin => 0.5,
            ClefKeyRightMargin => 1.75,
            BarWidth => 0.16,
            EndBarWidth => 0.5,
            DoubleBarDistance => 0.3,

            StemLength => 3.5,
            StemWidth => 0.13,
            BeamWidth => 0.5,
            BeamDistance => 0.25,
            ArticulationDistance => 0.5,
            TupletBracketDistance => 1.0,
            TupletHeight => 1.0,

            DynamicsPosBelow => 2.5,
            HairpinPosBelow => 2.5,
            HairpinHeight => 1.2,
            PedalPosBelow => 3.0,
            OttavaPosAbove => 3.0,
            VoltaPosAbove => 3.0,
            VoltaHook => 1.9,
            TextLinePosAbove => 2.5,
            StaffTextPosAbove => 2.0,
            SystemTextPosAbove => 2.0,
            RehearsalMarkPosAbove => 3.5,
            HarmonyPosAbove => 2.5,
            FretPosAbove => 2.0,
            TempoPosAbove => 3.0,
            FermataPosAbove => 1.0,
            FiguredBassPosBelow => 3.0,
            JumpPosAbove => 2.0,
            MarkerPosAbove => 2.0,

            TextCharWidth => 0.6,
            TextHeight => 1.6,

            LyricsPosBelow => 3.0,
            LyricsLineHeight => 2.5,
            LyricsMinDistance => 0.25,
            LyricsLineThickness => 0.1,

            SlurMinHeight => 0.5,
            SlurMaxHeight => 2.5,
            SlurHeightFactor => 0.15,
            TieHeight => 0.6,

            ShowMeasureNumber => 1.0,
            MeasureNumberInterval => 5.0,
            MeasureNumberPosAbove => 2.0,
        }
    }
}

/// Resolved style table. Unset entries fall back to [`StyleId::default_value`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    values: BTreeMap<StyleId, f64>,
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, id: StyleId) -> f64 {
        self.values.get(&id).copied().unwrap_or_else(|| id.default_value())
    }

    pub fn flag(&self, id: StyleId) -> bool {
        self.value(id) != 0.0
    }

    pub fn spatium(&self) -> f64 {
        self.value(StyleId::Spatium)
    }

    /// A spatium-unit value converted to absolute units.
    pub fn sp(&self, id: StyleId) -> f64 {
        self.value(id) * self.spatium()
    }

    pub fn set(&mut self, id: StyleId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn with(mut self, id: StyleId, value: f64) -> Self {
        self.set(id, value);
        self
    }
}
