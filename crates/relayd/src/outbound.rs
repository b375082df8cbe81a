//! Per-session outbound queues.
//!
//! Every session owns one bounded queue of [`ServerLine`]s. Any task may
//! enqueue into it through a cloned [`Outbound`]; only the session's writer
//! task (spawned by its connection handler) drains it onto the socket.
//!
//! Enqueueing waits a bounded time for room: a burst to a healthy peer
//! is absorbed while its writer catches up, but a peer whose queue stays
//! full past the enqueue timeout is reported as a [`DeliveryError`] so it
//! cannot hold up a broadcast indefinitely.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Write failures stop the writer and are logged, never propagated

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TrySendError},
};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use relay_protocol::ServerLine;

/// How long [`Outbound::deliver`] waits for room unless configured otherwise.
pub const DEFAULT_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiving half of a session's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<ServerLine>;

/// Errors from enqueueing a line for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The peer's queue stayed full for the whole enqueue timeout.
    #[error("outbound queue full")]
    QueueFull,

    /// The peer's writer has stopped.
    #[error("peer connection closed")]
    Closed,
}

/// Cheap-to-clone sending half of a session's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<ServerLine>,
    enqueue_timeout: Duration,
}

impl Outbound {
    /// Creates a queue holding at most `capacity` undelivered lines.
    pub fn channel(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let outbound = Self {
            tx,
            enqueue_timeout: DEFAULT_ENQUEUE_TIMEOUT,
        };
        (outbound, rx)
    }

    /// Sets how long [`Outbound::deliver`] waits for room in the queue.
    pub fn with_enqueue_timeout(mut self, enqueue_timeout: Duration) -> Self {
        self.enqueue_timeout = enqueue_timeout;
        self
    }

    /// Enqueues a line, waiting up to the enqueue timeout for room.
    ///
    /// Lines from one caller are enqueued in call order.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::QueueFull` if the queue stayed full for the timeout
    /// - `DeliveryError::Closed` if the writer has stopped
    pub async fn deliver(&self, line: ServerLine) -> Result<(), DeliveryError> {
        self.tx
            .send_timeout(line, self.enqueue_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => DeliveryError::QueueFull,
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Enqueues a line only if there is room right now.
    ///
    /// Used where the caller must not await, such as inside the registry
    /// actor.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::QueueFull` if the queue is at capacity
    /// - `DeliveryError::Closed` if the writer has stopped
    pub fn try_deliver(&self, line: ServerLine) -> Result<(), DeliveryError> {
        self.tx.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Completes when the writer stops.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Spawns the task draining `rx` onto `writer`.
///
/// Each line is written and flushed within `write_timeout`. The first
/// failed or timed-out write stops the task; later deliveries then fail
/// with `DeliveryError::Closed`. The task ends after every [`Outbound`]
/// clone is dropped and the queue is drained, shutting the writer down.
pub fn spawn_writer<W>(
    writer: W,
    mut rx: OutboundReceiver,
    write_timeout: Duration,
    peer: String,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(line) = rx.recv().await {
            let wire = line.to_wire();
            let result = timeout(write_timeout, async {
                writer.write_all(wire.as_bytes()).await?;
                writer.flush().await
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(peer = %peer, error = %e, "Write to peer failed, stopping writer");
                    rx.close();
                    return;
                }
                Err(_) => {
                    warn!(
                        peer = %peer,
                        timeout_ms = write_timeout.as_millis() as u64,
                        "Write to peer timed out, stopping writer"
                    );
                    rx.close();
                    return;
                }
            }
        }

        if let Ok(Err(e)) = timeout(write_timeout, writer.shutdown()).await {
            debug!(peer = %peer, error = %e, "Failed to shut down peer writer");
        }
    })
}
