//! Session channels for the LIME protocol.
//!
//! A channel multiplexes the four envelope kinds over one transport:
//! the handshake layers ([`ClientChannel`], [`ServerChannel`]) drive the
//! session from `new` to `established`, after which the channel's pump
//! routes inbound envelopes to per-kind buffers while module pipelines
//! observe and transform the traffic.

pub mod buffer;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod module;
pub mod modules;
pub mod server;
pub mod state;

pub use buffer::EnvelopeBuffer;
pub use channel::{Channel, PumpToken};
pub use client::ClientChannel;
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use listener::{ChannelListener, ListenOutcome, produce_consume};
pub use module::{ChannelModule, ModulePipeline};
pub use modules::{RemotePingModule, ResendMessagesModule, ThroughputControlModule};
pub use server::ServerChannel;
pub use state::validate_transition;
