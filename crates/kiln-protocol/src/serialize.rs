//! Direct-to-buffer RESP serialization.
//!
//! Writes frames directly into a `BytesMut` with no intermediate
//! allocations. Integer-to-string conversion uses `itoa` for fast
//! stack-based formatting.

use bytes::BufMut;
use bytes::BytesMut;

use crate::types::Frame;

impl Frame {
    /// Serializes this frame into the provided buffer.
    ///
    /// Writes the full wire representation, including type prefix and
    /// trailing `\r\n` delimiters. The caller decides when the buffer
    /// reaches the socket or the log file.
    pub fn serialize(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put_slice(s.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Error(msg) => {
                dst.put_u8(b'-');
                dst.put_slice(msg.as_bytes());
                dst.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                write_i64(*n, dst);
                dst.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                write_i64(data.len() as i64, dst);
                dst.put_slice(b"\r\n");
                dst.put_slice(data);
                dst.put_slice(b"\r\n");
            }
            Frame::Null => {
                dst.put_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                dst.put_u8(b'*');
                write_i64(items.len() as i64, dst);
                dst.put_slice(b"\r\n");
                for item in items {
                    item.serialize(dst);
                }
            }
        }
    }

}

/// Writes an i64 as its decimal ASCII representation directly into the buffer.
fn write_i64(val: i64, dst: &mut BytesMut) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(val).as_bytes());
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn serialize(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.serialize(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn simple_string() {
        assert_eq!(serialize(&Frame::Simple("OK".into())), b"+OK\r\n");
    }

    #[test]
    fn error() {
        assert_eq!(serialize(&Frame::Error("ERR bad".into())), b"-ERR bad\r\n");
    }

    #[test]
    fn integer() {
        assert_eq!(serialize(&Frame::Integer(42)), b":42\r\n");
        assert_eq!(serialize(&Frame::Integer(-2)), b":-2\r\n");
        assert_eq!(serialize(&Frame::Integer(0)), b":0\r\n");
    }

    #[test]
    fn bulk_string() {
        assert_eq!(
            serialize(&Frame::Bulk(Bytes::from_static(b"hello"))),
            b"$5\r\nhello\r\n"
        );
    }

    #[test]
    fn empty_bulk_string() {
        assert_eq!(serialize(&Frame::Bulk(Bytes::new())), b"$0\r\n\r\n");
    }

    #[test]
    fn null_bulk() {
        assert_eq!(serialize(&Frame::Null), b"$-1\r\n");
    }

    #[test]
    fn array() {
        let frame = Frame::Array(vec![Frame::Simple("hello".into()), Frame::Integer(42)]);
        assert_eq!(serialize(&frame), b"*2\r\n+hello\r\n:42\r\n");
    }

    #[test]
    fn empty_array() {
        assert_eq!(serialize(&Frame::Array(vec![])), b"*0\r\n");
    }

    #[test]
    fn set_command_wire_form() {
        let frame = Frame::set_command(b"foo", b"bar");
        assert_eq!(
            serialize(&frame),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }

    #[test]
    fn round_trip() {
        use crate::parse::parse_frame;

        let frames = vec![
            Frame::Simple("OK".into()),
            Frame::Error("ERR nope".into()),
            Frame::Integer(i64::MAX),
            Frame::Integer(i64::MIN),
            Frame::Bulk(Bytes::from_static(b"binary\x00data")),
            Frame::Bulk(Bytes::new()),
            Frame::Null,
            Frame::Array(vec![
                Frame::Integer(1),
                Frame::Bulk(Bytes::from_static(b"two")),
                Frame::Null,
            ]),
            Frame::Array(vec![
                Frame::Array(vec![Frame::Integer(1), Frame::Integer(2)]),
                Frame::Array(vec![Frame::Integer(3)]),
            ]),
        ];

        for original in &frames {
            let mut buf = BytesMut::new();
            original.serialize(&mut buf);

            let (parsed, consumed) = parse_frame(&buf)
                .expect("round-trip parse should not error")
                .expect("round-trip parse should return a frame");

            assert_eq!(&parsed, original, "round-trip failed for {original:?}");
            assert_eq!(consumed, buf.len(), "should consume entire buffer");
        }
    }
}
