//! JSON codec using `serde_json`.
//!
//! Application payloads travel as opaque bulk strings; this codec is the
//! conventional way to put structured values into them.
//!
//! # Example
//!
//! ```
//! use respwire_client::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     user: String,
//!     message: String,
//! }
//!
//! let msg = Message { user: "ada".to_string(), message: "hello".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! let decoded: Message = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::Bytes;

use crate::error::Result;

/// JSON codec for structured payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RespwireError;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };

        let encoded = JsonCodec::encode(&original).unwrap();
        let decoded: TestStruct = JsonCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_encodes_as_object() {
        let encoded = JsonCodec::encode(&TestStruct {
            id: 1,
            name: "x".to_string(),
            active: false,
        })
        .unwrap();

        assert_eq!(&encoded[..], br#"{"id":1,"name":"x","active":false}"#);
    }

    #[test]
    fn test_non_ascii_round_trip() {
        let mut map = HashMap::new();
        map.insert("message".to_string(), "héllo wörld 👋".to_string());

        let encoded = JsonCodec::encode(&map).unwrap();
        let decoded: HashMap<String, String> = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_decode_invalid_json() {
        let result: Result<TestStruct> = JsonCodec::decode(b"{not json");
        assert!(matches!(result, Err(RespwireError::Json(_))));
    }

    #[test]
    fn test_decode_wrong_shape() {
        let result: Result<TestStruct> = JsonCodec::decode(br#"{"id":"nope"}"#);
        assert!(result.is_err());
    }
}
