//! Demultiplexing envelope buffers.
//!
//! The pump posts each inbound envelope to the buffer matching its kind;
//! consumers await their own kind independently. Posting never blocks:
//! a full buffer is a [`ChannelError::BufferFull`], which the pump treats
//! as fatal rather than stalling or dropping traffic.

use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use lime_transport::CancellationToken;

use crate::error::ChannelError;

/// A bounded FIFO buffer for one envelope kind.
///
/// One logical consumer at a time: `receive` holds the receiver lock for
/// the duration of the wait.
pub struct EnvelopeBuffer<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
}

impl<T: Send> EnvelopeBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Post an item without blocking.
    pub fn post(&self, item: T) -> Result<(), ChannelError> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(_) => ChannelError::BufferFull,
            TrySendError::Closed(_) => ChannelError::Closed,
        })
    }

    /// Await the next item.
    ///
    /// Queued items drain before either cancellation source is observed;
    /// the caller's `token` surfaces as [`ChannelError::Cancelled`] and the
    /// channel `scope` as [`ChannelError::Closed`] (the channel maps that
    /// to its stored fault when one exists).
    pub async fn receive(
        &self,
        token: CancellationToken,
        scope: CancellationToken,
    ) -> Result<T, ChannelError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            item = rx.recv() => item.ok_or(ChannelError::Closed),
            () = token.cancelled() => Err(ChannelError::Cancelled),
            () = scope.cancelled() => Err(ChannelError::Closed),
        }
    }
}
