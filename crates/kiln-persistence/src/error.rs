//! Errors shared by the AOF and snapshot formats.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading or writing persistence files.
///
/// On the command hot path these are logged, never surfaced to the
/// client; the hot path treats durability as best-effort.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error("sha-256 mismatch between encode buffer and written file")]
    ChecksumMismatch,

    #[error("a rewrite already owns the log file")]
    RewriteInProgress,

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
