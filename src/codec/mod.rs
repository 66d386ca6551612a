//! Codec module - serialization/deserialization for message payloads.
//!
//! The store treats message payloads as opaque bytes. This module provides
//! the codec the chat layer uses to put structured values into them:
//!
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the codec is chosen at compile time.

mod json;

pub use json::JsonCodec;
