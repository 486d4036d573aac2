//! Centralized error types for mboxrank.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxrank library.
///
/// Malformed mail (bad dates, missing `From:` lines, addresses without `@`)
/// never shows up here: those records are skipped where they are found.
#[derive(Error, Debug)]
pub enum RankError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The overflow store could not be opened or prepared for a run.
    #[error("Cannot initialize overflow store at '{path}': {reason}")]
    StoreInitialization { path: PathBuf, reason: String },

    /// A write into the overflow store failed.
    ///
    /// The engine recovers from this during a spill; it only escapes to the
    /// caller when a store primitive is used directly.
    #[error("Overflow store write failed for {domains} domain(s): {reason}")]
    StoreWrite { domains: usize, reason: String },

    /// Reading back from the overflow store failed.
    #[error("Overflow store read failed: {0}")]
    StoreRead(String),

    /// Reading or decoding the source failed mid-run.
    #[error(
        "Source read failed at offset {offset} ({bytes_processed} bytes processed, \
         {messages_counted} messages counted): {source}"
    )]
    Source {
        offset: u64,
        bytes_processed: u64,
        messages_counted: u64,
        source: std::io::Error,
    },

    /// The run was cancelled through its [`CancelToken`](crate::engine::CancelToken).
    #[error("Operation cancelled by user")]
    Cancelled,

    /// A configuration value is out of range or unknown.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, RankError>`.
pub type Result<T> = std::result::Result<T, RankError>;

impl RankError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the cooperative-cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `RankError::io`).
impl From<std::io::Error> for RankError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
