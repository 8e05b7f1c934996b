//! Session envelope: handshake negotiation, authentication and lifecycle.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::reason::Reason;

use super::Metadata;

/// The lifecycle states of a session.
///
/// States are totally ordered for comparison: the terminal states
/// (`Finished`, `Failed`) compare greater than `Established`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Negotiating,
    Authenticating,
    Established,
    Finishing,
    Finished,
    Failed,
}

impl SessionState {
    /// Whether this state ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Failed)
    }
}

/// Negotiable payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCompression {
    None,
    Gzip,
}

/// Negotiable transport encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEncryption {
    None,
    Tls,
}

/// Authentication schemes offered during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationScheme {
    Guest,
    Plain,
    Key,
    Transport,
    External,
}

/// Scheme-specific authentication credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    /// Anonymous access.
    Guest,
    /// A base64-encoded password.
    Plain { password: String },
    /// A base64-encoded access key.
    Key { key: String },
    /// Authentication delegated to the transport layer (e.g. client TLS
    /// certificates).
    Transport,
    /// A token issued by a third party.
    External {
        token: String,
        issuer: Option<String>,
    },
}

impl Authentication {
    /// Plain authentication from a cleartext password; the password is
    /// carried base64-encoded on the wire.
    pub fn plain_from_password(password: &str) -> Self {
        Authentication::Plain {
            password: BASE64.encode(password),
        }
    }

    /// Decode the cleartext password of a plain authentication, if this is
    /// one and the encoding is valid.
    pub fn plain_password(&self) -> Option<String> {
        match self {
            Authentication::Plain { password } => BASE64
                .decode(password)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            _ => None,
        }
    }

    /// The scheme of this payload.
    pub fn scheme(&self) -> AuthenticationScheme {
        match self {
            Authentication::Guest => AuthenticationScheme::Guest,
            Authentication::Plain { .. } => AuthenticationScheme::Plain,
            Authentication::Key { .. } => AuthenticationScheme::Key,
            Authentication::Transport => AuthenticationScheme::Transport,
            Authentication::External { .. } => AuthenticationScheme::External,
        }
    }
}

/// The role a successfully authenticated identity holds in its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainRole {
    #[default]
    Unknown,
    Member,
    Authority,
}

/// The outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub role: DomainRole,
    pub is_successful: bool,
}

impl AuthenticationResult {
    pub fn success(role: DomainRole) -> Self {
        Self {
            role,
            is_successful: true,
        }
    }

    pub fn failure() -> Self {
        Self {
            role: DomainRole::Unknown,
            is_successful: false,
        }
    }
}

/// A session handshake or lifecycle envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Option<String>,
    pub from: Option<Node>,
    pub to: Option<Node>,
    pub pp: Option<Node>,
    pub metadata: Option<Metadata>,
    pub state: SessionState,
    pub encryption_options: Option<Vec<SessionEncryption>>,
    pub encryption: Option<SessionEncryption>,
    pub compression_options: Option<Vec<SessionCompression>>,
    pub compression: Option<SessionCompression>,
    pub scheme_options: Option<Vec<AuthenticationScheme>>,
    pub authentication: Option<Authentication>,
    pub reason: Option<Reason>,
}

impl Session {
    /// A bare session envelope in the given state.
    pub fn new(state: SessionState) -> Self {
        Self {
            id: None,
            from: None,
            to: None,
            pp: None,
            metadata: None,
            state,
            encryption_options: None,
            encryption: None,
            compression_options: None,
            compression: None,
            scheme_options: None,
            authentication: None,
            reason: None,
        }
    }

    /// A failed session with a reason, for the given session id.
    pub fn failed(id: impl Into<String>, reason: Reason) -> Self {
        Self {
            id: Some(id.into()),
            reason: Some(reason),
            ..Self::new(SessionState::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_outrank_established() {
        assert!(SessionState::Finished > SessionState::Established);
        assert!(SessionState::Failed > SessionState::Established);
        assert!(SessionState::New < SessionState::Negotiating);
        assert!(SessionState::Negotiating < SessionState::Authenticating);
        assert!(SessionState::Authenticating < SessionState::Established);
    }

    #[test]
    fn plain_password_round_trip() {
        let auth = Authentication::plain_from_password("secret");
        match &auth {
            Authentication::Plain { password } => assert_eq!(password, "c2VjcmV0"),
            _ => panic!("expected plain"),
        }
        assert_eq!(auth.plain_password().as_deref(), Some("secret"));
        assert_eq!(auth.scheme(), AuthenticationScheme::Plain);
    }

    #[test]
    fn state_wire_spelling() {
        assert_eq!(SessionState::Authenticating.to_string(), "authenticating");
        assert_eq!(
            "established".parse::<SessionState>().unwrap(),
            SessionState::Established
        );
    }
}
