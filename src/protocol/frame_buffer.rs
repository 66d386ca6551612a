//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Bytes arrive in arbitrary
//! chunks; [`FrameBuffer::next_frame`] parses from the start of the buffer
//! with a throwaway cursor and only advances the buffer once a whole frame,
//! including every nested element and terminator, is available. An
//! incomplete multi-bulk therefore leaves the buffer exactly as it was and is
//! re-parsed from its first byte on the next attempt.
//!
//! # Example
//!
//! ```
//! use respwire_client::protocol::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//!
//! buffer.feed(b"*3\r\n$7\r\n");
//! assert!(buffer.next_frame().unwrap().is_none());
//!
//! buffer.feed(b"message\r\n$4\r\nchat\r\n$2\r\nhi\r\n");
//! let frame = buffer.next_frame().unwrap().unwrap();
//! assert_eq!(frame.elements().map(|e| e.len()), Some(3));
//! assert!(buffer.is_empty());
//! ```

use std::ops::Range;

use bytes::{Bytes, BytesMut};

use super::wire_format::{
    BULK_TAG, CRLF, DEFAULT_MAX_BULK_LEN, DEFAULT_MAX_MULTI_BULK_LEN, INTEGER_TAG, MAX_LINE_LEN,
    MULTI_BULK_TAG,
};
use super::Frame;
use crate::error::{RespwireError, Result};

/// Default initial buffer capacity.
const DEFAULT_CAPACITY: usize = 16 * 1024;

/// Upper bounds on declared lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted bulk string.
    pub max_bulk_len: usize,
    /// Largest accepted multi-bulk element count.
    pub max_multi_bulk_len: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            max_multi_bulk_len: DEFAULT_MAX_MULTI_BULK_LEN,
        }
    }
}

/// Why a parse attempt did not yield a frame.
#[derive(Debug)]
enum ParseError {
    /// Need more bytes; nothing was consumed.
    Incomplete,
    /// The stream is malformed.
    Invalid(String),
}

type ParseResult<T> = std::result::Result<T, ParseError>;

/// A frame located in the buffer but not yet detached from it.
#[derive(Debug)]
enum Parsed {
    Integer(i64),
    Bulk(Range<usize>),
    Null,
    MultiBulk(Vec<Parsed>),
}

impl Parsed {
    fn into_frame(self, bytes: &Bytes) -> Frame {
        match self {
            Parsed::Integer(n) => Frame::Integer(n),
            Parsed::Bulk(range) => Frame::BulkString(bytes.slice(range)),
            Parsed::Null => Frame::Null,
            Parsed::MultiBulk(items) => {
                Frame::MultiBulk(items.into_iter().map(|p| p.into_frame(bytes)).collect())
            }
        }
    }
}

/// Read position over buffered bytes for a single parse attempt.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn tag(&mut self) -> ParseResult<u8> {
        let tag = *self.buf.get(self.pos).ok_or(ParseError::Incomplete)?;
        self.pos += 1;
        Ok(tag)
    }

    /// Read up to and including the next CRLF, returning the line without it.
    fn line(&mut self) -> ParseResult<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let window = &rest[..rest.len().min(MAX_LINE_LEN + CRLF.len())];
        match window.windows(CRLF.len()).position(|w| w == CRLF) {
            Some(end) => {
                self.pos += end + CRLF.len();
                Ok(&rest[..end])
            }
            // A pending '\r' may still be completed by the next chunk.
            None if rest.len() > MAX_LINE_LEN + 1 => Err(ParseError::Invalid(format!(
                "no line terminator within {} bytes",
                MAX_LINE_LEN
            ))),
            None => Err(ParseError::Incomplete),
        }
    }

    fn integer(&mut self) -> ParseResult<i64> {
        let line = self.line()?;
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| {
                ParseError::Invalid(format!(
                    "invalid integer line {:?}",
                    String::from_utf8_lossy(line)
                ))
            })
    }

    fn skip(&mut self, n: usize) -> ParseResult<Range<usize>> {
        if self.buf.len() - self.pos < n {
            return Err(ParseError::Incomplete);
        }
        let start = self.pos;
        self.pos += n;
        Ok(start..self.pos)
    }
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Bytes received but not yet resolved into a frame.
    buffer: BytesMut,
    /// Declared-length bounds.
    limits: DecodeLimits,
}

impl FrameBuffer {
    /// Create a new frame buffer with default limits.
    pub fn new() -> Self {
        Self::with_limits(DecodeLimits::default())
    }

    /// Create a new frame buffer with custom limits.
    pub fn with_limits(limits: DecodeLimits) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            limits,
        }
    }

    /// Append bytes without extracting frames.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed (buffer untouched)
    /// - `Err(Protocol)` if the stream is malformed
    ///
    /// Safe to call repeatedly; after `Ok(None)` it keeps returning
    /// `Ok(None)` until more bytes are fed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match parse_frame(&mut cursor, &self.limits) {
            Ok(parsed) => {
                let consumed = cursor.pos;
                let bytes = self.buffer.split_to(consumed).freeze();
                Ok(Some(parsed.into_frame(&bytes)))
            }
            Err(ParseError::Incomplete) => Ok(None),
            Err(ParseError::Invalid(msg)) => Err(RespwireError::Protocol(msg)),
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial trailing data stays buffered for the next push.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.feed(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_frame(cursor: &mut Cursor<'_>, limits: &DecodeLimits) -> ParseResult<Parsed> {
    match cursor.tag()? {
        INTEGER_TAG => Ok(Parsed::Integer(cursor.integer()?)),
        BULK_TAG => parse_bulk(cursor, limits),
        MULTI_BULK_TAG => parse_multi_bulk(cursor, limits),
        other => Err(unsupported_tag(other)),
    }
}

fn parse_multi_bulk(cursor: &mut Cursor<'_>, limits: &DecodeLimits) -> ParseResult<Parsed> {
    let count = cursor.integer()?;
    if count < 0 {
        return Err(ParseError::Invalid(format!(
            "negative multi-bulk count {}",
            count
        )));
    }
    let count = usize::try_from(count).map_err(|_| too_long("multi-bulk count", count))?;
    if count > limits.max_multi_bulk_len {
        return Err(ParseError::Invalid(format!(
            "multi-bulk count {} exceeds maximum {}",
            count, limits.max_multi_bulk_len
        )));
    }

    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let item = match cursor.tag()? {
            INTEGER_TAG => Parsed::Integer(cursor.integer()?),
            BULK_TAG => parse_bulk(cursor, limits)?,
            MULTI_BULK_TAG => {
                return Err(ParseError::Invalid(
                    "nested multi-bulk is not supported".to_string(),
                ))
            }
            other => return Err(unsupported_tag(other)),
        };
        items.push(item);
    }
    Ok(Parsed::MultiBulk(items))
}

fn parse_bulk(cursor: &mut Cursor<'_>, limits: &DecodeLimits) -> ParseResult<Parsed> {
    let len = cursor.integer()?;
    if len == -1 {
        return Ok(Parsed::Null);
    }
    if len < 0 {
        return Err(ParseError::Invalid(format!(
            "negative bulk string length {}",
            len
        )));
    }
    let len = usize::try_from(len).map_err(|_| too_long("bulk string length", len))?;
    if len > limits.max_bulk_len {
        return Err(ParseError::Invalid(format!(
            "bulk string length {} exceeds maximum {}",
            len, limits.max_bulk_len
        )));
    }

    let body = cursor.skip(len)?;
    let terminator = cursor.skip(CRLF.len())?;
    if &cursor.buf[terminator] != CRLF {
        return Err(ParseError::Invalid(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }
    Ok(Parsed::Bulk(body))
}

fn too_long(what: &str, declared: i64) -> ParseError {
    ParseError::Invalid(format!("{} {} does not fit in memory", what, declared))
}

fn unsupported_tag(tag: u8) -> ParseError {
    ParseError::Invalid(format!(
        "unsupported frame type {:?}",
        char::from(tag).escape_default().to_string()
    ))
}
