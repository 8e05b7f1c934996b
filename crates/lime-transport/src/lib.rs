//! Transport contract for the LIME protocol.
//!
//! A transport is an ordered, reliable, bidirectional envelope carrier with
//! negotiable compression/encryption. Channels consume transports through
//! the [`Transport`] trait; the concrete network plumbing (TCP, WebSocket,
//! TLS, framing) lives outside this workspace. The crate also provides the
//! cancellation primitives shared by channels and an in-memory paired
//! transport for tests.

pub mod cancellation;
pub mod closing;
pub mod error;
pub mod memory;
pub mod traits;

pub use cancellation::{CancellationScope, CancellationToken};
pub use closing::ClosingHooks;
pub use error::TransportError;
pub use memory::MemoryTransport;
pub use traits::Transport;
