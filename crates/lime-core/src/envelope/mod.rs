//! The four envelope kinds of the protocol.
//!
//! Every envelope carries the common addressing fields (`id`, `from`, `to`,
//! `pp`, `metadata`); each kind adds its own payload. On the wire the kind
//! is discriminated by field presence: `content` marks a Message, `event` a
//! Notification, `method` a Command and `state` a Session.

mod command;
mod message;
mod notification;
mod session;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use command::{Command, CommandMethod, CommandStatus, LimeUri};
pub use message::Message;
pub use notification::{Notification, NotificationEvent};
pub use session::{
    Authentication, AuthenticationResult, AuthenticationScheme, DomainRole, Session,
    SessionCompression, SessionEncryption, SessionState,
};

use crate::node::Node;

/// Metadata map attached to any envelope.
pub type Metadata = BTreeMap<String, String>;

/// Generate a fresh envelope identifier.
pub fn new_envelope_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One wire-level unit of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Message(Message),
    Notification(Notification),
    Command(Command),
    Session(Session),
}

impl Envelope {
    /// The envelope identifier, if any.
    pub fn id(&self) -> Option<&str> {
        match self {
            Envelope::Message(e) => e.id.as_deref(),
            Envelope::Notification(e) => e.id.as_deref(),
            Envelope::Command(e) => e.id.as_deref(),
            Envelope::Session(e) => e.id.as_deref(),
        }
    }

    /// The sender node, if present.
    pub fn from(&self) -> Option<&Node> {
        match self {
            Envelope::Message(e) => e.from.as_ref(),
            Envelope::Notification(e) => e.from.as_ref(),
            Envelope::Command(e) => e.from.as_ref(),
            Envelope::Session(e) => e.from.as_ref(),
        }
    }

    /// A short name for the envelope kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Message(_) => "message",
            Envelope::Notification(_) => "notification",
            Envelope::Command(_) => "command",
            Envelope::Session(_) => "session",
        }
    }
}

impl From<Message> for Envelope {
    fn from(value: Message) -> Self {
        Envelope::Message(value)
    }
}

impl From<Notification> for Envelope {
    fn from(value: Notification) -> Self {
        Envelope::Notification(value)
    }
}

impl From<Command> for Envelope {
    fn from(value: Command) -> Self {
        Envelope::Command(value)
    }
}

impl From<Session> for Envelope {
    fn from(value: Session) -> Self {
        Envelope::Session(value)
    }
}

/// Display/FromStr for the string-form wire enums, routed through their
/// serde representation so the wire spelling is defined in one place.
macro_rules! string_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match serde_json::to_value(self) {
                    Ok(serde_json::Value::String(s)) => f.write_str(&s),
                    _ => Err(fmt::Error),
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                serde_json::from_value(serde_json::Value::String(s.to_string()))
                    .map_err(|e| e.to_string())
            }
        }
    )+};
}

string_enum!(
    NotificationEvent,
    CommandMethod,
    CommandStatus,
    SessionState,
    SessionCompression,
    SessionEncryption,
    AuthenticationScheme,
);
