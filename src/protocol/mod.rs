//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the reply/command subset used by pub/sub:
//! - Multi-bulk command encoding
//! - Frame buffer for accumulating partial reads
//! - Frame enum with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::{DecodeLimits, FrameBuffer};
pub use wire_format::{
    commands, encode_command, Command, BULK_TAG, CRLF, DEFAULT_MAX_BULK_LEN,
    DEFAULT_MAX_MULTI_BULK_LEN, INTEGER_TAG, MAX_LINE_LEN, MULTI_BULK_TAG,
};
