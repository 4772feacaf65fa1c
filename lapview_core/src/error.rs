//! Error types for dataset loading.

use thiserror::Error;

/// Errors raised while turning a session document into a `SeriesStore`.
///
/// Loading is all-or-nothing: any of these aborts the load and nothing of the
/// document is kept. Per-query conditions (empty series, `NaN` channels,
/// degenerate scales) are ordinary return values and never show up here.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A required field is missing or carries an unusable value.
    #[error("Malformed data at {path}: {reason}")]
    MalformedData {
        /// Location inside the document, e.g. `cars[1].points[4].time`
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// The document text is not valid JSON for the session schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadError {
    /// Creates a malformed-data error.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-field error.
    pub fn missing(path: impl Into<String>) -> Self {
        Self::malformed(path, "required field is missing")
    }
}
