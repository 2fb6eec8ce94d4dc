//! Errors for the on-disk text formats.

use thiserror::Error;

/// A parameter, query or matrix file could not be understood. Always
/// terminal for the owning process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed header: {0:?}")]
    BadHeader(String),
    #[error("malformed value {0:?}")]
    BadValue(String),
    #[error("unexpected end of input while reading {0}")]
    Truncated(String),
    #[error("expected {expected} values, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("row index {row} out of range for {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },
}
