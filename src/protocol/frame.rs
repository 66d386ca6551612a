//! Decoded protocol frames.
//!
//! A [`Frame`] is one complete unit of the reply stream. Only the subset the
//! pub/sub family needs is modeled: integers, bulk strings and multi-bulk
//! arrays of those two.
//!
//! # Example
//!
//! ```
//! use respwire_client::protocol::Frame;
//! use bytes::Bytes;
//!
//! let frame = Frame::MultiBulk(vec![
//!     Frame::BulkString(Bytes::from_static(b"message")),
//!     Frame::BulkString(Bytes::from_static(b"chat")),
//!     Frame::BulkString(Bytes::from_static(b"hi")),
//! ]);
//!
//! assert_eq!(frame.elements().map(|e| e.len()), Some(3));
//! assert_eq!(frame.elements().and_then(|e| e[1].as_str()), Some("chat"));
//! ```

use bytes::Bytes;

/// A fully decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `:<int>\r\n`
    Integer(i64),
    /// `$<len>\r\n<bytes>\r\n` (terminator stripped).
    BulkString(Bytes),
    /// `$-1\r\n`
    Null,
    /// `*<count>\r\n` followed by `count` integer or bulk string frames.
    MultiBulk(Vec<Frame>),
}

impl Frame {
    /// Get the integer value, if this is an integer frame.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Frame::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the raw bytes, if this is a bulk string frame.
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Frame::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Get the bulk string as UTF-8 text.
    ///
    /// Returns `None` for non-bulk frames and for invalid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get the elements, if this is a multi-bulk frame.
    #[inline]
    pub fn elements(&self) -> Option<&[Frame]> {
        match self {
            Frame::MultiBulk(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the frame type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Integer(_) => "integer",
            Frame::BulkString(_) => "bulk string",
            Frame::Null => "null",
            Frame::MultiBulk(_) => "multi-bulk",
        }
    }
}
