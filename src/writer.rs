//! Dedicated writer task for outbound commands.
//!
//! Commands are serialized by the caller and handed to a writer task over an
//! mpsc channel. Enqueueing never waits: a full queue is reported as
//! [`RespwireError::QueueFull`] so session methods stay non-blocking.
//!
//! # Architecture
//!
//! ```text
//! subscribe ─┐
//! publish   ─┼─► mpsc::Sender<OutboundCommand> ─► Writer Task ─► TCP write half
//! unsubscribe┘
//! ```
//!
//! The task writes batches with vectored I/O. When the close signal fires it
//! writes whatever is still queued, then shuts down the write half.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{RespwireError, Result};
use crate::protocol::Command;

/// Default maximum queued commands.
pub const DEFAULT_MAX_PENDING_COMMANDS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum commands to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A serialized command ready to be written.
#[derive(Debug, Clone)]
pub struct OutboundCommand {
    /// Wire bytes.
    pub bytes: Bytes,
}

impl OutboundCommand {
    /// Serialize a command.
    #[inline]
    pub fn new(command: &Command) -> Self {
        Self {
            bytes: command.encode(),
        }
    }

    /// Size on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Maximum queued commands before sends are rejected.
    pub max_pending_commands: usize,
    /// Channel capacity for the command queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_commands: DEFAULT_MAX_PENDING_COMMANDS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing commands on the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for commands.
    tx: mpsc::Sender<OutboundCommand>,
    /// Queued command count.
    pending: Arc<AtomicUsize>,
    /// Maximum queued commands.
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundCommand>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue a command without waiting.
    ///
    /// Returns `Err(QueueFull)` at capacity and `Err(ConnectionClosed)` once
    /// the writer task has stopped.
    pub fn try_send(&self, command: OutboundCommand) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(RespwireError::QueueFull);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(command).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => RespwireError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => RespwireError::ConnectionClosed,
            }
        })
    }

    /// Get current queued command count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Check whether the writer task is gone.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing commands.
///
/// The task ends when every handle is dropped or when `close` turns `true`
/// (or its sender is dropped); in the latter case already queued commands
/// are written first.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    close: watch::Receiver<bool>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_commands);
    let task = tokio::spawn(writer_loop(rx, writer, pending, close));

    (handle, task)
}

/// Resolves once the close flag is set or its sender is gone.
pub(crate) async fn closed(close: &mut watch::Receiver<bool>) {
    let _ = close.wait_for(|closed| *closed).await;
}

/// Main writer loop - receives commands and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundCommand>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    mut close: watch::Receiver<bool>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            received = rx.recv() => match received {
                Some(command) => command,
                None => break,
            },
            _ = closed(&mut close) => {
                rx.close();
                let mut rest = Vec::new();
                while let Ok(command) = rx.try_recv() {
                    rest.push(command);
                }
                write_batch(&mut writer, &rest).await?;
                pending.fetch_sub(rest.len(), Ordering::Release);
                break;
            }
        };

        // Collect additional ready commands (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(command) => batch.push(command),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;

        pending.fetch_sub(batch_size, Ordering::Release);
    }

    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of commands using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundCommand]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundCommand::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RespwireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundCommand], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for command in batch {
        let end = offset + command.size();
        if skip_bytes < end && !command.bytes.is_empty() {
            let start_in_command = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&command.bytes[start_in_command..]));
        }
        offset = end;
    }

    slices
}
