//! Unified error handling for roadmatch.
//!
//! Per-record problems (unparseable mileposts, missing corridors, non-linear
//! geometry) are *not* errors: the source data is known to be inconsistently
//! formatted, so those classify as "unmatched" or "keep" at the call site.
//! The error type exists for structural I/O failures in the pipeline layer.

use thiserror::Error;

/// Result type alias using [`RoadMatchError`].
pub type Result<T> = std::result::Result<T, RoadMatchError>;

/// Errors raised by the roadmatch pipeline layer.
#[derive(Debug, Error)]
pub enum RoadMatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing column '{column}' in {context}")]
    MissingColumn { column: String, context: String },

    #[error("invalid geometry: {reason}")]
    InvalidGeometry { reason: String },
}

/// Extension trait converting `Option` lookups into structured errors.
pub trait OptionExt<T> {
    /// Convert a missing header/column lookup into [`RoadMatchError::MissingColumn`].
    fn ok_or_missing_column(self, column: &str, context: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_column(self, column: &str, context: &str) -> Result<T> {
        self.ok_or_else(|| RoadMatchError::MissingColumn {
            column: column.to_string(),
            context: context.to_string(),
        })
    }
}
