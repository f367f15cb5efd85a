use std::io;
use thiserror::Error;

/// Error type for compaction.
///
/// `Format` and `Consistency` are never recovered from: the run aborts and
/// the composite file is not produced.
#[derive(Error, Debug)]
pub enum CompactError {
    /// Malformed input (positional index, pair file, chrom sizes, sites).
    #[error("Format error: {0}")]
    Format(String),

    /// Unknown chromosome or chromosome-pair name.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Shard or output file could not be opened, written or copied.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A bookkeeping invariant was violated (completion counter overflow,
    /// double finalization, duplicate pair write).
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CompactError {
    pub fn format(msg: impl Into<String>) -> Self {
        CompactError::Format(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        CompactError::Consistency(msg.into())
    }
}

/// Result type alias for compaction operations.
pub type Result<T> = std::result::Result<T, CompactError>;
