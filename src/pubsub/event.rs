//! Pub/sub events decoded from push frames.
//!
//! The store pushes three-element multi-bulk frames on a subscribed
//! connection:
//!
//! ```text
//! ["message",     channel, payload]
//! ["subscribe",   channel, subscription-count]
//! ["unsubscribe", channel, subscription-count]
//! ```
//!
//! Anything else on a subscribed connection is a protocol error.

use std::fmt;

use bytes::Bytes;

use crate::error::{RespwireError, Result};
use crate::protocol::Frame;

/// Kind of pub/sub notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Confirmation of a `SUBSCRIBE` for one channel.
    Subscribe,
    /// Confirmation of an `UNSUBSCRIBE` for one channel.
    Unsubscribe,
    /// A message published to a subscribed channel.
    Message,
}

impl EventKind {
    /// Parse the first element of a push frame.
    pub fn from_bytes(kind: &[u8]) -> Option<Self> {
        match kind {
            b"subscribe" => Some(EventKind::Subscribe),
            b"unsubscribe" => Some(EventKind::Unsubscribe),
            b"message" => Some(EventKind::Message),
            _ => None,
        }
    }

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Subscribe => "subscribe",
            EventKind::Unsubscribe => "unsubscribe",
            EventKind::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Third element of a push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Message body, opaque bytes.
    Data(Bytes),
    /// Number of channels the connection is subscribed to after the change.
    Count(i64),
}

/// A decoded pub/sub notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubEvent {
    kind: EventKind,
    channel: String,
    payload: EventPayload,
}

impl PubSubEvent {
    /// Create an event.
    pub fn new(kind: EventKind, channel: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            kind,
            channel: channel.into(),
            payload,
        }
    }

    /// Interpret a decoded frame as a pub/sub event.
    ///
    /// Returns `Ok(None)` for the store's acknowledgement of an `UNSUBSCRIBE`
    /// issued while no channel was subscribed (null channel), which has no
    /// channel to route to.
    pub fn from_frame(frame: Frame) -> Result<Option<Self>> {
        let items = match frame {
            Frame::MultiBulk(items) => items,
            other => {
                return Err(RespwireError::protocol(format!(
                    "expected pub/sub multi-bulk, got {}",
                    other.type_name()
                )))
            }
        };

        let [kind, channel, payload]: [Frame; 3] = items.try_into().map_err(|items: Vec<Frame>| {
            RespwireError::protocol(format!(
                "pub/sub frame must have 3 elements, got {}",
                items.len()
            ))
        })?;

        let kind = kind
            .as_bytes()
            .and_then(|b| EventKind::from_bytes(b))
            .ok_or_else(|| RespwireError::protocol(format!("unknown pub/sub kind {:?}", kind)))?;

        let channel = match channel {
            Frame::BulkString(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|_| RespwireError::protocol("channel name is not valid UTF-8"))?,
            Frame::Null if kind == EventKind::Unsubscribe => return Ok(None),
            other => {
                return Err(RespwireError::protocol(format!(
                    "channel must be a bulk string, got {}",
                    other.type_name()
                )))
            }
        };

        let payload = match (kind, payload) {
            (EventKind::Message, Frame::BulkString(data)) => EventPayload::Data(data),
            (EventKind::Subscribe | EventKind::Unsubscribe, Frame::Integer(n)) => {
                EventPayload::Count(n)
            }
            (kind, other) => {
                return Err(RespwireError::protocol(format!(
                    "unexpected {} payload for {} event",
                    other.type_name(),
                    kind
                )))
            }
        };

        Ok(Some(Self {
            kind,
            channel,
            payload,
        }))
    }

    /// Kind of notification.
    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Channel the notification is about.
    #[inline]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Raw third element.
    #[inline]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Message body, for `message` events.
    pub fn data(&self) -> Option<&Bytes> {
        match &self.payload {
            EventPayload::Data(data) => Some(data),
            EventPayload::Count(_) => None,
        }
    }

    /// Subscription count, for `subscribe`/`unsubscribe` events.
    pub fn count(&self) -> Option<i64> {
        match self.payload {
            EventPayload::Count(n) => Some(n),
            EventPayload::Data(_) => None,
        }
    }
}

/// Value a channel handler returns to keep or drop the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep receiving.
    #[default]
    Continue,
    /// Close the connection.
    Stop,
}
