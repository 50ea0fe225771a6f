//! Custom error types for the dsl-dict crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum DslError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// A byte sequence was invalid for the declared source encoding.
    #[error("Encoding error: invalid {encoding} sequence at byte {offset}")]
    Encoding {
        encoding: &'static str,
        offset: usize,
    },

    /// An error occurred during decompression of the source or an archive entry.
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// The index file is missing, truncated, from an older format version,
    /// or otherwise unusable. The caller is expected to rebuild.
    #[error("Index file is old or bad: {0}")]
    IndexOldOrBad(String),

    /// The file is structurally invalid for the format being parsed.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A requested resource was not found on disk or in the archive.
    #[error("Resource not found: {0}")]
    ResourceMissing(String),

    /// Deferred initialization failed; the stored message is returned for
    /// every subsequent operation on the dictionary.
    #[error("Dictionary initialization failed: {0}")]
    InitFailed(String),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for DslError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        DslError::LockPoisoned
    }
}

/// A convenience `Result` type alias using the crate's `DslError` type.
pub type Result<T> = std::result::Result<T, DslError>;
