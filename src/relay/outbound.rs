/// Per-connection outbound queue.
///
/// Every line destined for a connection goes through its [`Outbound`]: the
/// owning session, the router, and other sessions' join/leave notices all
/// enqueue here, and only the owning session task drains the receiver into
/// the socket. One consumer per socket means lines never interleave, and the
/// FIFO channel keeps enqueue order.
///
/// The queue is bounded. Enqueueing never waits: a full queue means the peer
/// has stopped reading, so the line is refused and the connection is flagged
/// as lagging. The owning session watches that flag and disconnects.
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Lines a connection may have queued but not yet written.
pub const DEFAULT_CAPACITY: usize = 1024;

/// The receiving half, drained by the owning session.
pub type OutboundRx = mpsc::Receiver<String>;

/// Why a line could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboundError {
    /// The connection's drain side has gone away (session torn down).
    #[error("outbound channel closed")]
    Closed,
    /// The peer is not keeping up; the connection is being dropped.
    #[error("outbound queue full, peer is not reading")]
    Full,
}

/// Enqueue-only handle to a connection's writer.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    lagged: CancellationToken,
}

impl Outbound {
    /// Create a fresh queue for one connection.
    pub fn channel() -> (Self, OutboundRx) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, OutboundRx) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let lagged = CancellationToken::new();
        (Self { tx, lagged }, rx)
    }

    /// Queue one line (without terminator). Never blocks.
    ///
    /// Once the queue has overflowed every later line is refused too, even
    /// if the session has since drained some of it.
    pub fn send(&self, line: impl Into<String>) -> Result<(), OutboundError> {
        if self.lagged.is_cancelled() {
            return Err(OutboundError::Full);
        }
        match self.tx.try_send(line.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.lagged.cancel();
                Err(OutboundError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(OutboundError::Closed),
        }
    }

    /// Resolves once the queue has overflowed.
    pub async fn lagged(&self) {
        self.lagged.cancelled().await
    }
}
