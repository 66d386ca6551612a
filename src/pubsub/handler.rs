//! Typed channel handlers.
//!
//! [`JsonHandler`] decodes `message` payloads with [`JsonCodec`] before
//! calling a typed closure. Subscribe/unsubscribe confirmations are not
//! passed through. A payload that fails to decode is logged and skipped
//! rather than closing the connection: the framing is intact, only the
//! application payload is bad.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::{ChannelHandler, EventKind, Flow, PubSubEvent};
use crate::codec::JsonCodec;

/// Wrapper that deserializes message payloads before calling the handler.
pub struct JsonHandler<F, T>
where
    F: Fn(&str, T) -> Flow + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T)>,
}

impl<F, T> JsonHandler<F, T>
where
    F: Fn(&str, T) -> Flow + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T> ChannelHandler for JsonHandler<F, T>
where
    F: Fn(&str, T) -> Flow + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    fn on_event(&self, event: &PubSubEvent) -> Flow {
        if event.kind() != EventKind::Message {
            return Flow::Continue;
        }
        let Some(data) = event.data() else {
            return Flow::Continue;
        };

        match JsonCodec::decode::<T>(data) {
            Ok(value) => (self.handler)(event.channel(), value),
            Err(e) => {
                tracing::warn!(
                    channel = event.channel(),
                    "Dropping undecodable message payload: {}",
                    e
                );
                Flow::Continue
            }
        }
    }
}

/// Build a [`JsonHandler`] from a closure.
pub fn json_handler<F, T>(handler: F) -> JsonHandler<F, T>
where
    F: Fn(&str, T) -> Flow + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
{
    JsonHandler::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::EventPayload;
    use bytes::Bytes;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    #[derive(Deserialize, Debug, PartialEq)]
    struct Note {
        text: String,
    }

    fn event(kind: EventKind, payload: EventPayload) -> PubSubEvent {
        PubSubEvent::new(kind, "notes", payload)
    }

    #[test]
    fn test_decodes_message_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = json_handler(move |channel: &str, note: Note| {
            sink.lock().unwrap().push((channel.to_string(), note));
            Flow::Stop
        });

        let flow = handler.on_event(&event(
            EventKind::Message,
            EventPayload::Data(Bytes::from_static(br#"{"text":"hi"}"#)),
        ));

        assert_eq!(flow, Flow::Stop);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "notes");
        assert_eq!(seen[0].1.text, "hi");
    }

    #[test]
    fn test_skips_confirmations() {
        let handler = json_handler(|_: &str, _: Note| Flow::Stop);
        let flow = handler.on_event(&event(EventKind::Subscribe, EventPayload::Count(1)));
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn test_bad_payload_continues() {
        let handler = json_handler(|_: &str, _: Note| Flow::Stop);
        let flow = handler.on_event(&event(
            EventKind::Message,
            EventPayload::Data(Bytes::from_static(b"not json")),
        ));
        assert_eq!(flow, Flow::Continue);
    }
}
