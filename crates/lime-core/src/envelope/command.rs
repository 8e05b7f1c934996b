//! Command envelope: request/response resource operations.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::Document;
use crate::node::Node;
use crate::reason::Reason;

use super::{Metadata, new_envelope_id};

/// A resource URI in the `lime://` scheme, or a relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimeUri(String);

impl LimeUri {
    /// The URI scheme prefix for absolute URIs.
    pub const SCHEME_PREFIX: &'static str = "lime://";

    /// Whether this URI is relative (a bare path).
    pub fn is_relative(&self) -> bool {
        !self.0.starts_with(Self::SCHEME_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LimeUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LimeUri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty uri".to_string());
        }
        Ok(Self(s.to_string()))
    }
}

impl Serialize for LimeUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LimeUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// The operation a command requests on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMethod {
    Get,
    Set,
    Delete,
    Subscribe,
    Unsubscribe,
    Observe,
}

/// The processing status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// A request not yet processed (omitted on the wire).
    #[default]
    Pending,
    Success,
    Failure,
}

/// A request or response for an operation on a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: Option<String>,
    pub from: Option<Node>,
    pub to: Option<Node>,
    pub pp: Option<Node>,
    pub metadata: Option<Metadata>,
    pub uri: Option<LimeUri>,
    pub resource: Option<Document>,
    pub method: CommandMethod,
    pub status: CommandStatus,
    pub reason: Option<Reason>,
}

impl Command {
    /// A pending request command with a fresh id.
    pub fn request(method: CommandMethod, uri: LimeUri) -> Self {
        Self {
            id: Some(new_envelope_id()),
            from: None,
            to: None,
            pp: None,
            metadata: None,
            uri: Some(uri),
            resource: None,
            method,
            status: CommandStatus::Pending,
            reason: None,
        }
    }

    /// A ping request: `get /ping` with a ping resource, used for
    /// keepalive probing.
    pub fn ping() -> Self {
        Self {
            resource: Some(Document::ping()),
            ..Self::request(CommandMethod::Get, LimeUri("/ping".to_string()))
        }
    }

    /// Whether this command is a ping-shaped request.
    pub fn is_ping_request(&self) -> bool {
        self.status == CommandStatus::Pending
            && (self.uri.as_ref().is_some_and(|u| u.as_str() == "/ping")
                || self.resource.as_ref().is_some_and(Document::is_ping))
    }

    /// A success response to this command, with the addressing swapped.
    pub fn success_response(&self) -> Self {
        Self {
            id: self.id.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            pp: None,
            metadata: None,
            uri: None,
            resource: None,
            method: self.method,
            status: CommandStatus::Success,
            reason: None,
        }
    }

    /// A failure response to this command.
    pub fn failure_response(&self, reason: Reason) -> Self {
        Self {
            status: CommandStatus::Failure,
            reason: Some(reason),
            ..self.success_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_command_shape() {
        let ping = Command::ping();
        assert!(ping.is_ping_request());
        assert_eq!(ping.method, CommandMethod::Get);
        assert!(ping.id.is_some());
    }

    #[test]
    fn success_response_swaps_addressing() {
        let mut ping = Command::ping();
        ping.from = Some("alice@example.com/home".parse().unwrap());
        ping.to = Some("server@example.com".parse().unwrap());

        let response = ping.success_response();
        assert_eq!(response.id, ping.id);
        assert_eq!(response.status, CommandStatus::Success);
        assert_eq!(response.from, ping.to);
        assert_eq!(response.to, ping.from);
        assert!(!response.is_ping_request());
    }

    #[test]
    fn relative_uri() {
        let uri: LimeUri = "/ping".parse().unwrap();
        assert!(uri.is_relative());
        let abs: LimeUri = "lime://alice@example.com/presence".parse().unwrap();
        assert!(!abs.is_relative());
    }
}
