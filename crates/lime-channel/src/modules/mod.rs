//! Built-in channel modules.

pub mod remote_ping;
pub mod resend;
pub mod throughput;

pub use remote_ping::{RemotePingModule, should_ping_at};
pub use resend::ResendMessagesModule;
pub use throughput::ThroughputControlModule;
