use std::time::Duration;

use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::chunk::Chunk;

/// Shared pool of chunks still to be fetched.
///
/// Fresh dispatch and retry re-insertion go through the same unbounded
/// channel, so a requeue never blocks. Closing is a separate signal: once
/// the [`QueueCloser`] is dropped every pending and future `pop` returns
/// `None`, even if chunks are still buffered.
#[derive(Clone)]
pub struct TransferQueue {
    tx: Sender<Chunk>,
    rx: Receiver<Chunk>,
    closed: Receiver<()>,
}

pub struct QueueCloser {
    _tx: Sender<()>,
}

impl QueueCloser {
    pub fn close(self) {}
}

impl TransferQueue {
    pub fn new() -> (Self, QueueCloser) {
        let (tx, rx) = unbounded();
        let (close_tx, closed) = crossbeam_channel::bounded(0);
        (Self { tx, rx, closed }, QueueCloser { _tx: close_tx })
    }

    pub fn push(&self, chunk: Chunk) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(chunk);
    }

    /// Blocks until a chunk is available or the queue is closed.
    pub fn pop(&self) -> Option<Chunk> {
        if self.is_closed() {
            return None;
        }
        select! {
            recv(self.rx) -> chunk => chunk.ok(),
            recv(self.closed) -> _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.closed.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }

    /// Sleeps for `duration` unless the queue is closed first. Returns `false`
    /// when woken by the close.
    pub fn wait(&self, duration: Duration) -> bool {
        matches!(
            self.closed.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
