//! Error types for stagehand

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error raised by a stage callable.
///
/// Stages report failures as boxed errors so callers can return whatever
/// error type their work naturally produces.
pub type StageError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for pipeline execution and cache access
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A cache entry exists but its bytes cannot be decoded into a state
    /// snapshot. Recoverable: the traversal re-executes the stage and
    /// overwrites the entry.
    #[error("Corrupt cache entry '{path}': {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    /// The storage medium failed during a read, write, or delete. Not
    /// recoverable locally; the run cannot know whether prior results are
    /// durable.
    #[error("Cache I/O error at '{path}': {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error during directory-level operations (listing, sweeping)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage callable failed. Aborts the traversal; completed nodes keep
    /// their cache writes and no cleanup sweep runs.
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },
}
