//! In-memory paired transport.
//!
//! [`MemoryTransport::pair`] returns two cross-linked endpoints over
//! bounded queues. Envelopes pass through the JSON serializer on the way
//! across, so tests exercise the real wire shape. Compression and
//! encryption settings are tracked (and validated against the configured
//! supported lists) without transforming the payload.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, trace};

use lime_core::{Envelope, JsonEnvelopeSerializer, SessionCompression, SessionEncryption};

use crate::cancellation::CancellationToken;
use crate::closing::ClosingHooks;
use crate::error::TransportError;
use crate::traits::Transport;

const QUEUE_CAPACITY: usize = 64;

/// One endpoint of an in-memory transport pair.
pub struct MemoryTransport {
    /// Endpoint label for logging ("initiator" / "acceptor").
    name: &'static str,
    serializer: JsonEnvelopeSerializer,
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
    connected: AtomicBool,
    supported_compression: Vec<SessionCompression>,
    supported_encryption: Vec<SessionEncryption>,
    compression: StdMutex<SessionCompression>,
    encryption: StdMutex<SessionEncryption>,
    closing: ClosingHooks,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    peer_closed_rx: watch::Receiver<bool>,
}

impl MemoryTransport {
    /// A connected pair with default options (no compression; encryption
    /// switchable between none and TLS).
    pub fn pair() -> (Self, Self) {
        Self::pair_with_options(
            vec![SessionCompression::None],
            vec![SessionEncryption::None, SessionEncryption::Tls],
        )
    }

    /// A pair whose endpoints support the given option lists.
    pub fn pair_with_options(
        compression: Vec<SessionCompression>,
        encryption: Vec<SessionEncryption>,
    ) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (b_tx, a_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (a_closed_tx, a_closed_rx) = watch::channel(false);
        let (b_closed_tx, b_closed_rx) = watch::channel(false);

        let a = Self::endpoint(
            "initiator",
            a_tx,
            a_rx,
            compression.clone(),
            encryption.clone(),
            a_closed_tx,
            a_closed_rx.clone(),
            b_closed_rx.clone(),
        );
        let b = Self::endpoint(
            "acceptor",
            b_tx,
            b_rx,
            compression,
            encryption,
            b_closed_tx,
            b_closed_rx,
            a_closed_rx,
        );
        (a, b)
    }

    #[allow(clippy::too_many_arguments)]
    fn endpoint(
        name: &'static str,
        tx: mpsc::Sender<String>,
        rx: mpsc::Receiver<String>,
        supported_compression: Vec<SessionCompression>,
        supported_encryption: Vec<SessionEncryption>,
        closed_tx: watch::Sender<bool>,
        closed_rx: watch::Receiver<bool>,
        peer_closed_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name,
            serializer: JsonEnvelopeSerializer::default(),
            tx,
            rx: Mutex::new(rx),
            connected: AtomicBool::new(false),
            supported_compression,
            supported_encryption,
            compression: StdMutex::new(SessionCompression::None),
            encryption: StdMutex::new(SessionEncryption::None),
            closing: ClosingHooks::new(),
            closed_tx,
            closed_rx,
            peer_closed_rx,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow() || *self.peer_closed_rx.borrow()
    }
}

impl Transport for MemoryTransport {
    async fn open(&self, address: &str, _token: CancellationToken) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        debug!(endpoint = self.name, address, "memory transport open");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _token: CancellationToken) -> Result<(), TransportError> {
        if self.is_closed() {
            return Ok(());
        }
        // Let registered listeners finish their cleanup before the close
        // takes effect.
        self.closing.run().await;
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.closed_tx.send(true);
        debug!(endpoint = self.name, "memory transport closed");
        Ok(())
    }

    async fn send(
        &self,
        envelope: Envelope,
        token: CancellationToken,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = self.serializer.serialize(&envelope)?;
        trace!(endpoint = self.name, kind = envelope.kind(), "memory send");
        tokio::select! {
            result = self.tx.send(text) => {
                result.map_err(|_| TransportError::Closed)
            }
            () = token.cancelled() => Err(TransportError::Cancelled),
        }
    }

    async fn receive(&self, token: CancellationToken) -> Result<Envelope, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let mut rx = self.rx.lock().await;
        let mut closed_rx = self.closed_rx.clone();
        let mut peer_closed_rx = self.peer_closed_rx.clone();
        loop {
            // Queued envelopes drain before a close is observed.
            tokio::select! {
                biased;
                text = rx.recv() => {
                    let text = text.ok_or(TransportError::Closed)?;
                    let envelope = self.serializer.deserialize(&text)?;
                    trace!(endpoint = self.name, kind = envelope.kind(), "memory receive");
                    return Ok(envelope);
                }
                () = token.cancelled() => return Err(TransportError::Cancelled),
                changed = closed_rx.changed() => {
                    if changed.is_err() || *closed_rx.borrow() {
                        return Err(TransportError::Closed);
                    }
                }
                changed = peer_closed_rx.changed() => {
                    if changed.is_err() || *peer_closed_rx.borrow() {
                        return Err(TransportError::Closed);
                    }
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn supported_compression(&self) -> Vec<SessionCompression> {
        self.supported_compression.clone()
    }

    fn supported_encryption(&self) -> Vec<SessionEncryption> {
        self.supported_encryption.clone()
    }

    fn compression(&self) -> SessionCompression {
        *self
            .compression
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn encryption(&self) -> SessionEncryption {
        *self
            .encryption
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn set_compression(
        &self,
        compression: SessionCompression,
        _token: CancellationToken,
    ) -> Result<(), TransportError> {
        if !self.supported_compression.contains(&compression) {
            return Err(TransportError::NotSupported(format!(
                "compression {compression}"
            )));
        }
        debug!(endpoint = self.name, %compression, "compression switched");
        *self
            .compression
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = compression;
        Ok(())
    }

    async fn set_encryption(
        &self,
        encryption: SessionEncryption,
        _token: CancellationToken,
    ) -> Result<(), TransportError> {
        if !self.supported_encryption.contains(&encryption) {
            return Err(TransportError::NotSupported(format!(
                "encryption {encryption}"
            )));
        }
        debug!(endpoint = self.name, %encryption, "encryption switched");
        *self
            .encryption
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = encryption;
        Ok(())
    }

    fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    fn register_closing_hook<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.closing.register(hook);
    }
}
