//! RESP frame types.
//!
//! The [`Frame`] enum represents a single parsed RESP value. Bulk strings
//! use `Bytes` so payloads can move through the pipeline without copies.

use bytes::Bytes;

/// A single RESP protocol frame.
///
/// Frames are the unit of both requests and replies: clients send arrays
/// of bulk strings, the server answers with whichever variant the command
/// calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Simple string reply, e.g. `+OK\r\n`.
    Simple(String),

    /// Error reply, e.g. `-ERR Invalid command\r\n`.
    Error(String),

    /// 64-bit signed integer, e.g. `:42\r\n`.
    Integer(i64),

    /// Bulk (binary-safe) string, e.g. `$5\r\nhello\r\n`.
    Bulk(Bytes),

    /// The null bulk string, wire form `$-1\r\n`. GET on a missing key
    /// replies with this.
    Null,

    /// Ordered array of frames, e.g. `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`.
    Array(Vec<Frame>),
}

impl Frame {
    /// Returns `true` if this frame is the null bulk.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Builds the command array `[SET, key, value]` used both on the wire
    /// and as the AOF record format.
    pub fn set_command(key: &[u8], value: &[u8]) -> Frame {
        Frame::Array(vec![
            Frame::Bulk(Bytes::from_static(b"SET")),
            Frame::Bulk(Bytes::copy_from_slice(key)),
            Frame::Bulk(Bytes::copy_from_slice(value)),
        ])
    }
}
