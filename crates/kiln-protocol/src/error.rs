//! Protocol error types for RESP parsing.

use thiserror::Error;

/// Errors that can occur when parsing the RESP wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The input buffer doesn't contain a complete frame yet.
    /// The caller should read more data and try again.
    #[error("incomplete frame: need more data")]
    Incomplete,

    /// The peer closed the stream in the middle of a frame.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The first byte of a frame didn't match any known RESP type prefix.
    #[error("invalid type prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Failed to parse an integer value from the frame content.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// A bulk string or array declared an invalid length.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A bulk string declared a length beyond the accepted maximum.
    #[error("bulk string too large: {0} bytes")]
    BulkTooLarge(usize),

    /// An array declared more elements than the accepted maximum.
    #[error("too many array elements: {0}")]
    TooManyElements(usize),

    /// Arrays nested beyond the accepted depth.
    #[error("nesting exceeds maximum depth of {0}")]
    NestingTooDeep(usize),

    /// A structurally valid frame that can't be interpreted as a command:
    /// wrong top-level shape, non-bulk arguments, or invalid UTF-8 where
    /// text is required.
    #[error("{0}")]
    InvalidFrame(String),

    /// A known command received the wrong number of arguments.
    #[error("invalid number of arguments for the '{0}' command")]
    WrongArity(String),
}
