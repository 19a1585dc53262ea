//! Error taxonomy shared by every stage of the pipeline.
//!
//! - `Configuration`: invalid parameters, raised at construction time.
//! - `OutOfRange`: bad cell / edge / vertex index, a caller bug.
//! - `InvalidOperation`: querying something that was never computed, or an
//!   operation on inconsistent inputs (e.g. empty components).
//! - `NumericDegeneracy`: singular designs, empty mixtures, diverging message
//!   passing. The only recoverable kind: the processor marks the owning stage
//!   invalid and returns the partial result.
//!
//! The remaining variants wrap the IO layer used by the demo tooling.

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, TerrainError>;

#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl TerrainError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Self::NumericDegeneracy(msg.into())
    }

    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::OutOfRange { what, index, len }
    }

    /// True when the pipeline can continue with a partial result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NumericDegeneracy(_))
    }

    /// Short code used in logs and in the serialized pipeline trace.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::NumericDegeneracy(_) => "NUMERIC_DEGENERACY",
            Self::Io(_) => "IO",
            Self::Parse { .. } => "PARSE",
            Self::Json(_) => "JSON",
            Self::Image(_) => "IMAGE",
        }
    }
}
