//! Pub/sub module - event decoding and channel routing.
//!
//! Provides:
//! - [`PubSubEvent`] - a push frame interpreted as subscribe/unsubscribe/message
//! - [`SubscriptionTable`] - maps channel names to handlers
//! - [`JsonHandler`] - handler that decodes JSON message payloads
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use respwire_client::pubsub::{json_handler, Flow, SubscriptionTable};
//!
//! let mut table = SubscriptionTable::new();
//! table.insert(
//!     "chat",
//!     Arc::new(json_handler(|_channel: &str, text: String| {
//!         if text == "bye" { Flow::Stop } else { Flow::Continue }
//!     })),
//! );
//! assert_eq!(table.len(), 1);
//! ```

mod event;
mod handler;
mod table;

pub use event::{EventKind, EventPayload, Flow, PubSubEvent};
pub use handler::{json_handler, JsonHandler};
pub use table::{ChannelHandler, SharedHandler, SubscriptionTable};
