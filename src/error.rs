//! Error types for the public entry points.
//!
//! Layout itself cannot fail on a well-formed score; errors only arise at
//! the JSON and C boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    /// Input or output JSON could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The score violates a precondition of layout
    #[error("Invalid score: {0}")]
    InvalidInput(String),

    /// A C string argument was not valid UTF-8
    #[error("Invalid UTF-8 input: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
