//! # respwire-client
//!
//! Asynchronous pub/sub client for stores that speak the multi-bulk
//! request/reply protocol (`SUBSCRIBE`, `PUBLISH`, `UNSUBSCRIBE`).
//!
//! ## Architecture
//!
//! - **Protocol**: incremental frame decoder and command encoder
//! - **Session**: one TCP connection with a read loop that routes pub/sub
//!   events to per-channel handlers and a writer task for outbound commands
//! - **Chat**: a small chat room controller built on two sessions
//!
//! ## Example
//!
//! ```ignore
//! use respwire_client::{Flow, PubSubEvent, Session};
//!
//! #[tokio::main]
//! async fn main() -> respwire_client::Result<()> {
//!     let session = Session::builder().host("localhost").port(6379).connect().await?;
//!
//!     session.subscribe(["chat"], |event: &PubSubEvent| {
//!         match event.data() {
//!             Some(data) if data.as_ref() == b"quit" => Flow::Stop,
//!             _ => Flow::Continue,
//!         }
//!     })?;
//!
//!     session.wait_for_shutdown().await
//! }
//! ```

pub mod chat;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod pubsub;
pub mod transport;

mod session;
mod writer;

pub use chat::{ChatMessage, ChatRoom};
pub use config::ConnectionConfig;
pub use error::{RespwireError, Result};
pub use pubsub::{ChannelHandler, EventKind, Flow, PubSubEvent};
pub use session::{Session, SessionBuilder};
pub use writer::WriterConfig;
