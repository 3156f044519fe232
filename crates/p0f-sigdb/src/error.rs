//! Error types for signature database loading.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for signature database operations.
pub type SigDbResult<T> = Result<T, SigDbError>;

/// Errors raised while loading a signature database.
#[derive(Debug, Error)]
pub enum SigDbError {
    /// The database file could not be read.
    #[error("Failed to read signature database {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database is not valid JSON or does not match the expected shape.
    #[error("Malformed signature database: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two signatures share a label id.
    #[error("Duplicate label id {id:#x} (signatures #{first} and #{second})")]
    DuplicateLabelId { id: u32, first: usize, second: usize },

    /// The label index maps one id to two different labels.
    #[error("Label id {id:#x} maps to both '{first}' and '{second}'")]
    ConflictingLabel {
        id: u32,
        first: String,
        second: String,
    },
}
