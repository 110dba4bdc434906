//! Glyph metrics shared by the layout passes (all in staff spaces).

// ── Note heads ──────────────────────────────────────────────────────
pub(super) const NOTEHEAD_WIDTH: f64 = 1.18;
pub(super) const NOTEHEAD_HEIGHT: f64 = 1.0;
pub(super) const LEDGER_LINE_EXTEND: f64 = 0.3;
pub(super) const LEDGER_LINE_WIDTH: f64 = 0.16;
pub(super) const DOT_DISTANCE: f64 = 0.3;
pub(super) const DOT_WIDTH: f64 = 0.4;

// ── Accidentals ─────────────────────────────────────────────────────
pub(super) const ACCIDENTAL_WIDTH: f64 = 0.8;
pub(super) const ACCIDENTAL_HEIGHT: f64 = 2.5;
pub(super) const ACCIDENTAL_NOTE_GAP: f64 = 0.2;
pub(super) const ACCIDENTAL_COLUMN_GAP: f64 = 0.1;
/// Accidentals closer than this (in lines) go into separate columns.
pub(super) const ACCIDENTAL_COLUMN_LINES: i32 = 6;

// ── Stems and hooks ─────────────────────────────────────────────────
pub(super) const HOOK_WIDTH: f64 = 1.0;
pub(super) const HOOK_HEIGHT: f64 = 2.5;
pub(super) const HOOK_LEVEL_EXTRA: f64 = 0.5;

// ── Grace notes ─────────────────────────────────────────────────────
pub(super) const GRACE_GAP: f64 = 0.25;
pub(super) const GRACE_DISTANCE: f64 = 0.15;

// ── Articulations, arpeggios, tremolos ──────────────────────────────
pub(super) const ARTICULATION_SIZE: f64 = 0.6;
pub(super) const ARTICULATION_GAP: f64 = 0.2;
pub(super) const ARPEGGIO_WIDTH: f64 = 0.8;
pub(super) const ARPEGGIO_DISTANCE: f64 = 0.4;
pub(super) const TREMOLO_WIDTH: f64 = 1.2;
pub(super) const TREMOLO_STROKE: f64 = 0.4;

// ── Rests ───────────────────────────────────────────────────────────
pub(super) const REST_WIDTH: f64 = 1.0;
pub(super) const REST_HEIGHT: f64 = 3.0;
pub(super) const BLOCK_REST_WIDTH: f64 = 1.2;
pub(super) const BLOCK_REST_HEIGHT: f64 = 0.5;
pub(super) const VOICE_REST_OFFSET: f64 = 1.5;

// ── Signatures and clefs ────────────────────────────────────────────
pub(super) const CLEF_WIDTH: f64 = 2.6;
pub(super) const SHARP_WIDTH: f64 = 1.0;
pub(super) const FLAT_WIDTH: f64 = 0.9;
pub(super) const TIMESIG_DIGIT_WIDTH: f64 = 1.6;
pub(super) const REPEAT_DOT_WIDTH: f64 = 0.5;
pub(super) const REPEAT_DOT_GAP: f64 = 0.3;

// ── Misc ────────────────────────────────────────────────────────────
pub(super) const BREATH_WIDTH: f64 = 1.0;
pub(super) const BREATH_HEIGHT: f64 = 1.0;
pub(super) const FERMATA_WIDTH: f64 = 1.6;
pub(super) const FERMATA_HEIGHT: f64 = 1.0;
pub(super) const FRET_CELL: f64 = 0.8;
pub(super) const SLUR_NOTE_DISTANCE: f64 = 0.75;
pub(super) const TIE_NOTE_GAP: f64 = 0.2;
pub(super) const HAIRPIN_DYNAMIC_GAP: f64 = 0.5;
