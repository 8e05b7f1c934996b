//! The transport contract consumed by channels.

use std::future::Future;

use tokio::sync::watch;

use lime_core::{Envelope, SessionCompression, SessionEncryption};

use crate::cancellation::CancellationToken;
use crate::error::TransportError;

/// An ordered, reliable, bidirectional envelope carrier.
///
/// Implementations handle the wire concerns (framing, serialization, TLS);
/// a channel drives the trait with exactly one concurrent reader and
/// serialized writers. Every blocking operation takes a cancellation token.
pub trait Transport: Send + Sync + 'static {
    /// Open the connection to the given address.
    fn open(
        &self,
        address: &str,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the connection, running the closing hooks first.
    fn close(
        &self,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send one envelope.
    fn send(
        &self,
        envelope: Envelope,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next envelope.
    fn receive(
        &self,
        token: CancellationToken,
    ) -> impl Future<Output = Result<Envelope, TransportError>> + Send;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    // -- Negotiation surface --

    /// The compression options this transport can apply.
    fn supported_compression(&self) -> Vec<SessionCompression>;

    /// The encryption options this transport can apply.
    fn supported_encryption(&self) -> Vec<SessionEncryption>;

    /// The compression currently active.
    fn compression(&self) -> SessionCompression;

    /// The encryption currently active.
    fn encryption(&self) -> SessionEncryption;

    /// Switch to the given compression; fails with
    /// [`TransportError::NotSupported`] if unsupported.
    fn set_compression(
        &self,
        compression: SessionCompression,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Switch to the given encryption; fails with
    /// [`TransportError::NotSupported`] if unsupported.
    fn set_encryption(
        &self,
        encryption: SessionEncryption,
        token: CancellationToken,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    // -- Lifecycle notification --

    /// A signal that flips to `true` once the transport has closed.
    ///
    /// Channels watch this to cancel their internal scope when the peer
    /// or the transport itself initiates the close.
    fn closed_signal(&self) -> watch::Receiver<bool>;

    /// Register an async hook awaited before a locally-initiated close
    /// proceeds.
    fn register_closing_hook<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static;
}
