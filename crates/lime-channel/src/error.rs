//! Channel error types.

use lime_core::{Reason, SessionState};
use lime_transport::TransportError;

/// Errors surfaced by channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// An operation was attempted in a session state that does not allow it.
    #[error("channel is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: SessionState,
    },

    /// A session state transition that the state machine forbids.
    #[error("invalid session state transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    /// An envelope buffer reached capacity; the pump treats this as fatal.
    #[error("envelope buffer is full")]
    BufferFull,

    /// The channel faulted; every pending and future receive observes the
    /// same reason.
    #[error("channel faulted: {0}")]
    Faulted(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The channel closed without a stored fault.
    #[error("channel is closed")]
    Closed,

    /// A send or handshake step exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The peer violated the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The peer failed the session during the handshake.
    #[error("session failed: {0}")]
    SessionFailed(Reason),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ChannelError {
    fn required_state(state: SessionState) -> &'static str {
        match state {
            SessionState::New => "new",
            SessionState::Negotiating => "negotiating",
            SessionState::Authenticating => "authenticating",
            SessionState::Established => "established",
            SessionState::Finishing => "finishing",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
        }
    }

    /// An [`ChannelError::InvalidState`] for an operation requiring `expected`.
    pub fn invalid_state(expected: SessionState, actual: SessionState) -> Self {
        ChannelError::InvalidState {
            expected: Self::required_state(expected),
            actual,
        }
    }
}
