//! Pub/sub session builder and runtime loop.
//!
//! The [`SessionBuilder`] collects connection settings and opens the session.
//! The [`Session`] manages the lifecycle:
//! 1. Connect to the store
//! 2. Spawn the writer task for outbound commands
//! 3. Read replies, decode frames and dispatch events to channel handlers
//! 4. Tear down on handler stop, local close, peer EOF or a protocol error
//!
//! # Example
//!
//! ```ignore
//! use respwire_client::{Flow, PubSubEvent, Session};
//!
//! #[tokio::main]
//! async fn main() -> respwire_client::Result<()> {
//!     let session = Session::connect("localhost", 6379).await?;
//!
//!     session.subscribe(["news"], |event: &PubSubEvent| {
//!         println!("{}: {:?}", event.channel(), event.data());
//!         Flow::Continue
//!     })?;
//!     session.publish("news", "hello")?;
//!
//!     session.wait_for_shutdown().await
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::error::{RespwireError, Result};
use crate::protocol::{commands, Command, DecodeLimits, Frame, FrameBuffer};
use crate::pubsub::{ChannelHandler, EventKind, Flow, PubSubEvent, SharedHandler, SubscriptionTable};
use crate::transport;
use crate::writer::{closed, spawn_writer_task, OutboundCommand, WriterHandle};

/// Builder for configuring and opening a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: ConnectionConfig,
}

impl SessionBuilder {
    /// Create a builder with default settings (`localhost:6379`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Set the store host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the store port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the number of bytes requested per socket read.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set decoder length bounds.
    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Set the maximum queued commands before sends are rejected.
    ///
    /// Default: 1024
    pub fn max_pending_commands(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_commands = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Settings collected so far.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connect and start the session.
    pub async fn connect(self) -> Result<Session> {
        Session::connect_with(self.config).await
    }
}

/// State shared between the session handle and its read loop.
#[derive(Default)]
struct Shared {
    /// Channel name to handler routing.
    subscriptions: Mutex<SubscriptionTable>,
    /// `PUBLISH` commands whose integer reply has not arrived yet.
    publish_replies: AtomicUsize,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Account for one `PUBLISH` reply, if any is owed.
    fn take_publish_reply(&self) -> bool {
        self.publish_replies
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A connected pub/sub session.
///
/// `subscribe`, `publish` and `unsubscribe` only enqueue a command and
/// return; replies arrive as events on the registered handlers. Use
/// [`wait_for_shutdown`](Session::wait_for_shutdown) to learn how the
/// connection ended. Dropping the session closes it.
pub struct Session {
    /// Routing table and reply accounting.
    shared: Arc<Shared>,
    /// Writer handle for queueing commands.
    writer: WriterHandle,
    /// Close flag shared with the read loop and writer task.
    close_tx: Arc<watch::Sender<bool>>,
    /// Resolves with the read loop's outcome.
    shutdown_rx: oneshot::Receiver<Result<()>>,
    /// Writer task handle.
    writer_task: JoinHandle<Result<()>>,
    /// `host:port`, or a label for in-memory streams.
    addr: String,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Connect to `host:port` with default tuning.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with(ConnectionConfig::new(host, port)).await
    }

    /// Connect using a full configuration.
    pub async fn connect_with(config: ConnectionConfig) -> Result<Self> {
        let stream = transport::connect(&config.host, config.port).await?;
        tracing::debug!(addr = %config.addr(), "Connected");

        let (reader, writer) = stream.into_split();
        Ok(Self::start(reader, writer, &config, config.addr()))
    }

    /// Run a session over an already established stream.
    ///
    /// Host and port in `config` are only used for log context. Must be
    /// called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::start(reader, writer, config, config.addr())
    }

    fn start<R, W>(reader: R, writer: W, config: &ConnectionConfig, addr: String) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (close_tx, close_rx) = watch::channel(false);
        let close_tx = Arc::new(close_tx);

        let (writer, writer_task) =
            spawn_writer_task(writer, config.writer.clone(), close_rx.clone());

        let shared = Arc::new(Shared::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task_shared = shared.clone();
        let close_on_exit = close_tx.clone();
        let read_buffer_size = config.read_buffer_size;
        let limits = config.limits;
        let task_addr = addr.clone();

        tokio::spawn(async move {
            let result = read_loop(reader, task_shared, close_rx, read_buffer_size, limits).await;
            match &result {
                Ok(()) => tracing::debug!(addr = %task_addr, "Session closed"),
                Err(e) => tracing::error!(addr = %task_addr, "Read loop error: {}", e),
            }
            // Lets the writer flush what is queued and shut the socket down.
            close_on_exit.send_replace(true);
            let _ = shutdown_tx.send(result);
        });

        Session {
            shared,
            writer,
            close_tx,
            shutdown_rx,
            writer_task,
            addr,
        }
    }

    /// Subscribe `handler` to every channel in `channels`.
    ///
    /// The handler replaces any handler already registered for one of the
    /// channels. Handlers are registered before the command is queued, so a
    /// confirmation can never race ahead of its registration.
    pub fn subscribe<I, S, H>(&self, channels: I, handler: H) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        H: ChannelHandler,
    {
        let channels: Vec<S> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(RespwireError::InvalidArgument(
                "SUBSCRIBE needs at least one channel".to_string(),
            ));
        }

        let command = channels
            .iter()
            .fold(Command::new(commands::SUBSCRIBE), |command, channel| {
                command.arg(channel.as_ref())
            });

        let handler: SharedHandler = Arc::new(handler);
        let replaced = self.shared.table().insert_all(&channels, handler);
        if replaced > 0 {
            tracing::debug!(replaced, "Replaced existing handlers");
        }

        self.send(&command)
    }

    /// Publish `message` on `channel`.
    ///
    /// Fire-and-forget: the store's reply (the receiver count) is not
    /// awaited or returned. The session only counts queued `PUBLISH`
    /// commands so the read loop can consume one integer reply per publish;
    /// an integer arriving with no publish outstanding is still a protocol
    /// error.
    pub fn publish(&self, channel: &str, message: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::new(commands::PUBLISH).arg(channel).arg(message);

        self.shared.publish_replies.fetch_add(1, Ordering::AcqRel);
        self.send(&command).map_err(|e| {
            self.shared.take_publish_reply();
            e
        })
    }

    /// Unsubscribe from every channel this connection is subscribed to.
    ///
    /// Handlers stay registered until the store confirms each channel.
    pub fn unsubscribe(&self) -> Result<()> {
        let mut table = self.shared.table();
        self.send(&Command::new(commands::UNSUBSCRIBE))?;
        table.unsubscribe_all_sent();
        Ok(())
    }

    /// Unsubscribe from the given channels only.
    ///
    /// Subscribing to one of them again before the store confirms keeps the
    /// new handler registered.
    pub fn unsubscribe_channels<I, S>(&self, channels: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channels: Vec<S> = channels.into_iter().collect();
        if channels.is_empty() {
            return Err(RespwireError::InvalidArgument(
                "no channels given; use unsubscribe() to leave all".to_string(),
            ));
        }
        let command = channels
            .iter()
            .fold(Command::new(commands::UNSUBSCRIBE), |command, channel| {
                command.arg(channel.as_ref())
            });

        // Held across the send so the confirmation cannot be dispatched
        // before the table knows it was asked for.
        let mut table = self.shared.table();
        self.send(&command)?;
        for channel in &channels {
            table.unsubscribe_sent(channel.as_ref());
        }
        Ok(())
    }

    /// Channels that currently have a handler, sorted.
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .shared
            .table()
            .channels()
            .map(str::to_string)
            .collect();
        channels.sort();
        channels
    }

    /// Close the connection after writing everything already queued.
    ///
    /// Undecoded inbound bytes are discarded. Idempotent.
    pub fn close(&self) {
        if !self.close_tx.send_replace(true) {
            tracing::debug!(addr = %self.addr, "Closing session");
        }
    }

    /// Whether the session has been closed for any reason.
    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow() || self.writer.is_closed()
    }

    /// Get the current queued command count.
    pub fn pending_commands(&self) -> usize {
        self.writer.pending_count()
    }

    /// Address this session talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Wait until the connection is gone.
    ///
    /// Returns `Ok(())` after [`close`](Session::close), a dropped session
    /// or a handler returning [`Flow::Stop`]. Otherwise returns the error
    /// that ended it: [`RespwireError::ConnectionClosed`] when the peer hung
    /// up, [`RespwireError::Protocol`] for malformed input, or
    /// [`RespwireError::Io`].
    ///
    /// Also waits for the writer task, so once this returns every command
    /// queued before the close has been written.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        let read = match (&mut self.shutdown_rx).await {
            Ok(result) => result,
            Err(_) => Err(RespwireError::ConnectionClosed),
        };
        let write = match (&mut self.writer_task).await {
            Ok(result) => result,
            Err(e) => Err(RespwireError::Io(std::io::Error::other(e))),
        };
        read.and(write)
    }

    fn send(&self, command: &Command) -> Result<()> {
        if *self.close_tx.borrow() {
            return Err(RespwireError::ConnectionClosed);
        }
        self.writer.try_send(OutboundCommand::new(command))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_tx.send_replace(true);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .field("pending_commands", &self.pending_commands())
            .finish()
    }
}

/// Main read loop - reads replies and dispatches events to handlers.
///
/// Every frame that is complete after a read is dispatched before the next
/// read, so events reach handlers in wire order.
async fn read_loop<R>(
    mut reader: R,
    shared: Arc<Shared>,
    mut close: watch::Receiver<bool>,
    read_buffer_size: usize,
    limits: DecodeLimits,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::with_limits(limits);
    let mut buf = vec![0u8; read_buffer_size.max(1)];

    loop {
        let n = tokio::select! {
            biased;
            _ = closed(&mut close) => return Ok(()),
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Err(RespwireError::ConnectionClosed),
                Ok(n) => n,
                Err(e) => return Err(RespwireError::Io(e)),
            },
        };

        frames.feed(&buf[..n]);

        while let Some(frame) = frames.next_frame()? {
            if dispatch_frame(frame, &shared)? == Flow::Stop {
                tracing::debug!("Handler requested stop");
                return Ok(());
            }
        }
    }
}

/// Route one decoded frame to the handler registered for its channel.
///
/// The handler is called with the table unlocked so it may use the session.
fn dispatch_frame(frame: Frame, shared: &Shared) -> Result<Flow> {
    if let Frame::Integer(receivers) = frame {
        if shared.take_publish_reply() {
            tracing::trace!(receivers, "Publish delivered");
            return Ok(Flow::Continue);
        }
        return Err(RespwireError::protocol(
            "unexpected integer reply with no publish outstanding",
        ));
    }

    let Some(event) = PubSubEvent::from_frame(frame)? else {
        tracing::debug!("Unsubscribe acknowledged with no active subscriptions");
        return Ok(Flow::Continue);
    };

    let handler = if event.kind() == EventKind::Unsubscribe {
        let mut table = shared.table();
        let registered = table.contains(event.channel());
        let removed = table.confirm_unsubscribe(event.channel());
        if registered && removed.is_none() {
            tracing::debug!(
                channel = event.channel(),
                "Unsubscribe confirmation predates re-subscribe, keeping handler"
            );
            return Ok(Flow::Continue);
        }
        removed
    } else {
        shared.table().get(event.channel())
    };

    let flow = match handler {
        Some(handler) => handler.on_event(&event),
        None if event.kind() == EventKind::Message => {
            tracing::warn!(channel = event.channel(), "No handler for channel, dropping message");
            Flow::Continue
        }
        None => {
            tracing::debug!(
                channel = event.channel(),
                kind = %event.kind(),
                "No handler for channel, ignoring confirmation"
            );
            Flow::Continue
        }
    };

    Ok(flow)
}
