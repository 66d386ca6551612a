//! Chat room controller built on two pub/sub sessions.
//!
//! A connection in subscribed mode can't publish, so a room keeps one
//! session for publishing and one for receiving. Messages travel as JSON
//! [`ChatMessage`] values tagged by `"action"`:
//!
//! ```text
//! {"action":"join","user":"ada"}                         client -> room
//! {"action":"message","message":"hi"}                    client -> room
//! {"action":"message","user":"ada","message":"hi"}       room -> channel
//! {"action":"control","user":"ada","message":"joined the chat room"}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use respwire_client::{ChatRoom, ConnectionConfig};
//!
//! let config = ConnectionConfig::from_env()?;
//! let mut room = ChatRoom::open(&config, "chat", |msg| println!("{}", msg)).await?;
//! room.join("ada")?;
//! room.say("hello")?;
//! room.leave().await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::JsonCodec;
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::pubsub::{json_handler, Flow};
use crate::session::Session;

/// Channel used when none is given.
pub const DEFAULT_CHANNEL: &str = "chat";

/// Announcement published on join.
pub const JOINED_TEXT: &str = "joined the chat room";

/// Announcement published on leave.
pub const LEFT_TEXT: &str = "left the chat room";

/// One chat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ChatMessage {
    /// A client asks to join under `user`.
    Join {
        /// Display name.
        user: String,
    },
    /// Chat text. Clients omit `user`; the room stamps it before publishing.
    Message {
        /// Author, once stamped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        /// Text.
        message: String,
    },
    /// Room announcement such as a join or leave.
    Control {
        /// Subject of the announcement.
        user: String,
        /// Announcement text.
        message: String,
    },
    /// Any other action. Ignored by the room.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl ChatMessage {
    /// Chat text stamped with its author.
    pub fn message(user: Option<&str>, text: impl Into<String>) -> Self {
        ChatMessage::Message {
            user: user.map(str::to_string),
            message: text.into(),
        }
    }

    /// Announcement about `user`.
    pub fn control(user: impl Into<String>, text: impl Into<String>) -> Self {
        ChatMessage::Control {
            user: user.into(),
            message: text.into(),
        }
    }

    /// The user this payload is about, if any.
    pub fn user(&self) -> Option<&str> {
        match self {
            ChatMessage::Join { user } | ChatMessage::Control { user, .. } => Some(user),
            ChatMessage::Message { user, .. } => user.as_deref(),
            ChatMessage::Unknown => None,
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMessage::Join { user } => write!(f, "{} is joining", user),
            ChatMessage::Message { user, message } => {
                let user = user.as_deref().unwrap_or("anonymous");
                match emote(message) {
                    Some(action) => write!(f, "* {} {}", user, action),
                    None => write!(f, "{}: {}", user, message),
                }
            }
            ChatMessage::Control { user, message } => write!(f, "-- {} {}", user, message),
            ChatMessage::Unknown => f.write_str("(unknown action)"),
        }
    }
}

/// Text after a leading `/me ` (or `\me `), if present.
fn emote(message: &str) -> Option<&str> {
    let rest = message.trim_start();
    let rest = rest.strip_prefix("/me").or_else(|| rest.strip_prefix("\\me"))?;
    let action = rest.strip_prefix(char::is_whitespace)?;
    Some(action)
}

/// Callback that shows a received message to the local user.
pub type Render = Arc<dyn Fn(ChatMessage) + Send + Sync>;

/// A chat room on one channel.
pub struct ChatRoom {
    channel: String,
    publisher: Session,
    subscriber: Session,
    render: Render,
    user: Option<String>,
}

impl ChatRoom {
    /// Open the publishing and subscribing sessions for `channel`.
    ///
    /// `render` runs on the subscriber's read task for every decoded message
    /// once [`join`](ChatRoom::join) has been called.
    pub async fn open<F>(
        config: &ConnectionConfig,
        channel: impl Into<String>,
        render: F,
    ) -> Result<Self>
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        let publisher = Session::connect_with(config.clone()).await?;
        let subscriber = Session::connect_with(config.clone()).await?;
        Ok(Self::from_sessions(publisher, subscriber, channel, render))
    }

    /// Build a room over sessions that are already connected.
    pub fn from_sessions<F>(
        publisher: Session,
        subscriber: Session,
        channel: impl Into<String>,
        render: F,
    ) -> Self
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        Self {
            channel: channel.into(),
            publisher,
            subscriber,
            render: Arc::new(render),
            user: None,
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Joined user, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Join as `user`: subscribe to the channel and announce the arrival.
    pub fn join(&mut self, user: impl Into<String>) -> Result<()> {
        let user = user.into();
        tracing::debug!(channel = %self.channel, user = %user, "Joining");

        let render = self.render.clone();
        self.subscriber.subscribe(
            [self.channel.as_str()],
            json_handler(move |_: &str, message: ChatMessage| {
                render(message);
                Flow::Continue
            }),
        )?;

        let announcement = ChatMessage::control(user.as_str(), JOINED_TEXT);
        self.user = Some(user);
        self.publish(&announcement)
    }

    /// Publish `text` as the joined user.
    pub fn say(&self, text: impl Into<String>) -> Result<()> {
        self.publish(&ChatMessage::message(self.user.as_deref(), text))
    }

    /// Handle one raw JSON payload from the local client.
    ///
    /// `join` and `message` are acted on; other actions are skipped.
    pub fn handle_client_data(&mut self, data: &[u8]) -> Result<()> {
        match JsonCodec::decode::<ChatMessage>(data)? {
            ChatMessage::Join { user } => self.join(user),
            ChatMessage::Message { message, .. } => self.say(message),
            other => {
                tracing::debug!(?other, "Skipping client payload");
                Ok(())
            }
        }
    }

    /// Announce the departure, then close both sessions after writing.
    ///
    /// Both sessions are closed even when the announcement can't be queued;
    /// the first error is returned.
    pub async fn leave(self) -> Result<()> {
        let announced = match &self.user {
            Some(user) => self.publish(&ChatMessage::control(user.as_str(), LEFT_TEXT)),
            None => Ok(()),
        };

        self.publisher.close();
        self.subscriber.close();

        let published = self.publisher.wait_for_shutdown().await;
        let received = self.subscriber.wait_for_shutdown().await;
        announced.and(published).and(received)
    }

    fn publish(&self, message: &ChatMessage) -> Result<()> {
        let payload = JsonCodec::encode(message)?;
        self.publisher.publish(&self.channel, payload)
    }
}
