//! Subscription table mapping channel names to handlers.
//!
//! One handler per channel. Registering a handler for a channel that already
//! has one replaces it; the replaced handler is returned so the caller can
//! log or inspect it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use respwire_client::pubsub::{Flow, PubSubEvent, SubscriptionTable};
//!
//! let mut table = SubscriptionTable::new();
//! table.insert("chat", Arc::new(|_event: &PubSubEvent| Flow::Continue));
//!
//! assert!(table.contains("chat"));
//! assert!(table.remove("lobby").is_none());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use super::{Flow, PubSubEvent};

/// Callback invoked for every event routed to a channel.
///
/// Handlers run on the connection's read task and must not block.
pub trait ChannelHandler: Send + Sync + 'static {
    /// Handle one event. Returning [`Flow::Stop`] closes the connection.
    fn on_event(&self, event: &PubSubEvent) -> Flow;
}

impl<F> ChannelHandler for F
where
    F: Fn(&PubSubEvent) -> Flow + Send + Sync + 'static,
{
    fn on_event(&self, event: &PubSubEvent) -> Flow {
        self(event)
    }
}

/// Shared, type-erased handler.
pub type SharedHandler = Arc<dyn ChannelHandler>;

/// One channel's registration.
struct Entry {
    handler: SharedHandler,
    /// `UNSUBSCRIBE`s sent while this handler was registered.
    unsubscribes_sent: usize,
    /// Confirmations still owed to handlers this one replaced.
    stale_confirmations: usize,
}

/// Mapping from channel name to its handler.
///
/// A handler stays registered until the store confirms its unsubscribe.
/// Confirmations for an `UNSUBSCRIBE` sent before the channel was
/// re-subscribed belong to the replaced handler and leave the new one alone.
#[derive(Default)]
pub struct SubscriptionTable {
    handlers: HashMap<String, Entry>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `channel`, returning the handler it replaced.
    pub fn insert(&mut self, channel: &str, handler: SharedHandler) -> Option<SharedHandler> {
        let stale_confirmations = self
            .handlers
            .get(channel)
            .map_or(0, |old| old.stale_confirmations + old.unsubscribes_sent);
        let entry = Entry {
            handler,
            unsubscribes_sent: 0,
            stale_confirmations,
        };
        self.handlers
            .insert(channel.to_string(), entry)
            .map(|old| old.handler)
    }

    /// Register the same handler for every channel.
    ///
    /// Returns how many existing registrations were replaced.
    pub fn insert_all<I, S>(&mut self, channels: I, handler: SharedHandler) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut replaced = 0;
        for channel in channels {
            if self.insert(channel.as_ref(), handler.clone()).is_some() {
                replaced += 1;
            }
        }
        replaced
    }

    /// Note that an `UNSUBSCRIBE` naming `channel` was sent.
    pub fn unsubscribe_sent(&mut self, channel: &str) {
        if let Some(entry) = self.handlers.get_mut(channel) {
            entry.unsubscribes_sent += 1;
        }
    }

    /// Note that a bare `UNSUBSCRIBE` was sent, covering every channel.
    pub fn unsubscribe_all_sent(&mut self) {
        for entry in self.handlers.values_mut() {
            entry.unsubscribes_sent += 1;
        }
    }

    /// Apply the store's unsubscribe confirmation for `channel`.
    ///
    /// Removes and returns the registered handler, unless the confirmation
    /// answers an `UNSUBSCRIBE` that predates the current registration, in
    /// which case nothing changes and `None` is returned.
    pub fn confirm_unsubscribe(&mut self, channel: &str) -> Option<SharedHandler> {
        let entry = self.handlers.get_mut(channel)?;
        if entry.stale_confirmations > 0 {
            entry.stale_confirmations -= 1;
            return None;
        }
        self.remove(channel)
    }

    /// Remove the handler for `channel`. A missing channel is a no-op.
    pub fn remove(&mut self, channel: &str) -> Option<SharedHandler> {
        self.handlers.remove(channel).map(|entry| entry.handler)
    }

    /// Look up the handler for `channel`.
    pub fn get(&self, channel: &str) -> Option<SharedHandler> {
        self.handlers.get(channel).map(|entry| entry.handler.clone())
    }

    /// Check whether `channel` has a handler.
    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    /// Registered channel names, in no particular order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
