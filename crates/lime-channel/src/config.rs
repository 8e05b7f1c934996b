//! Channel configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tunable parameters of a channel.
///
/// Deserializable from TOML so applications can load it alongside their
/// own configuration; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Deadline for a single transport write.
    pub send_timeout_ms: u64,
    /// Deadline for closing the transport after a fault.
    pub close_timeout_ms: u64,
    /// Deadline for each session handshake step. Kept shorter than the
    /// send timeout so a stalled handshake fails before writes do.
    pub handshake_timeout_ms: u64,
    /// Capacity of the message, notification and command buffers.
    /// The session buffer always holds exactly one envelope.
    pub buffer_capacity: usize,
    /// Capacity of the module outbox drained by the writer task.
    pub outbox_capacity: usize,
    /// Interval between resend attempts for unacknowledged messages.
    pub resend_interval_ms: u64,
    /// Resend attempts before a message is dropped.
    pub max_resends: u32,
    /// Idle time after which the remote ping module probes the link.
    pub ping_interval_ms: u64,
    /// Reply to ping-shaped commands inside the pump without exposing
    /// them to consumers.
    pub auto_reply_pings: bool,
    /// Fill missing `from`/`pp` on send and `from`/`to` on receive from
    /// the session nodes.
    pub fill_envelope_recipients: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 5_000,
            close_timeout_ms: 5_000,
            handshake_timeout_ms: 3_000,
            buffer_capacity: 32,
            outbox_capacity: 32,
            resend_interval_ms: 2_000,
            max_resends: 3,
            ping_interval_ms: 30_000,
            auto_reply_pings: true,
            fill_envelope_recipients: true,
        }
    }
}

impl ChannelConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}
