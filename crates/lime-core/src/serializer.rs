//! JSON envelope serialization.
//!
//! Envelopes share one flat wire object; the kind is discriminated by field
//! presence (`content` → Message, `event` → Notification, `method` →
//! Command, `state` → Session). [`WireEnvelope`] is that flat shape;
//! [`JsonEnvelopeSerializer`] converts between it and the typed
//! [`Envelope`], resolving documents and authentication payloads through a
//! [`TypeRegistry`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::envelope::{
    Authentication, AuthenticationScheme, Command, CommandMethod, CommandStatus, Envelope, LimeUri,
    Message, Metadata, Notification, NotificationEvent, Session, SessionCompression,
    SessionEncryption, SessionState,
};
use crate::error::SerializationError;
use crate::media_type::MediaType;
use crate::node::Node;
use crate::reason::Reason;

/// The flat wire form shared by all envelope kinds.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pp: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,

    // Message and Command document tag.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    type_: Option<MediaType>,

    // Message.
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,

    // Notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<NotificationEvent>,

    // Command.
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<LimeUri>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<CommandMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<CommandStatus>,

    // Session.
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption_options: Option<Vec<SessionEncryption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<SessionEncryption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compression_options: Option<Vec<SessionCompression>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compression: Option<SessionCompression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme_options: Option<Vec<AuthenticationScheme>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheme: Option<AuthenticationScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<Value>,

    // Shared by Notification, Command and Session.
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<Reason>,
}

/// Serializes envelopes to JSON text and back.
#[derive(Clone)]
pub struct JsonEnvelopeSerializer {
    registry: Arc<crate::registry::TypeRegistry>,
}

impl Default for JsonEnvelopeSerializer {
    fn default() -> Self {
        Self::new(Arc::new(crate::registry::TypeRegistry::with_defaults()))
    }
}

impl JsonEnvelopeSerializer {
    /// A serializer resolving types through the given registry.
    pub fn new(registry: Arc<crate::registry::TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize an envelope to JSON text.
    pub fn serialize(&self, envelope: &Envelope) -> Result<String, SerializationError> {
        let wire = to_wire(envelope);
        Ok(serde_json::to_string(&wire)?)
    }

    /// Deserialize JSON text into a typed envelope.
    pub fn deserialize(&self, text: &str) -> Result<Envelope, SerializationError> {
        let wire: WireEnvelope = serde_json::from_str(text)?;
        self.from_wire(wire)
    }

    fn from_wire(&self, wire: WireEnvelope) -> Result<Envelope, SerializationError> {
        if wire.content.is_some() {
            return self.message_from_wire(wire).map(Envelope::Message);
        }
        if wire.event.is_some() {
            return Ok(Envelope::Notification(notification_from_wire(wire)));
        }
        if wire.method.is_some() {
            return self.command_from_wire(wire).map(Envelope::Command);
        }
        if wire.state.is_some() {
            return self.session_from_wire(wire).map(Envelope::Session);
        }
        Err(SerializationError::UnknownEnvelopeKind)
    }

    fn message_from_wire(&self, wire: WireEnvelope) -> Result<Message, SerializationError> {
        let media_type = wire.type_.ok_or(SerializationError::MissingType)?;
        let content = wire.content.ok_or(SerializationError::MissingContent)?;
        Ok(Message {
            id: wire.id,
            from: wire.from,
            to: wire.to,
            pp: wire.pp,
            metadata: wire.metadata,
            content: self.registry.document_from_value(&media_type, &content)?,
        })
    }

    fn command_from_wire(&self, wire: WireEnvelope) -> Result<Command, SerializationError> {
        let resource = match (wire.resource, wire.type_) {
            (Some(value), Some(media_type)) => {
                Some(self.registry.document_from_value(&media_type, &value)?)
            }
            (Some(_), None) => return Err(SerializationError::MissingType),
            (None, _) => None,
        };
        Ok(Command {
            id: wire.id,
            from: wire.from,
            to: wire.to,
            pp: wire.pp,
            metadata: wire.metadata,
            uri: wire.uri,
            resource,
            // Presence of `method` is checked by the caller.
            method: wire.method.unwrap_or(CommandMethod::Get),
            status: wire.status.unwrap_or_default(),
            reason: wire.reason,
        })
    }

    fn session_from_wire(&self, wire: WireEnvelope) -> Result<Session, SerializationError> {
        let authentication = match (wire.scheme, wire.authentication) {
            (Some(scheme), Some(value)) => {
                Some(self.registry.authentication_from_value(scheme, &value)?)
            }
            (Some(scheme), None) => {
                // Schemes without a payload body (guest, transport).
                Some(self.registry.authentication_from_value(scheme, &Value::Null)?)
            }
            (None, _) => None,
        };
        Ok(Session {
            id: wire.id,
            from: wire.from,
            to: wire.to,
            pp: wire.pp,
            metadata: wire.metadata,
            // Presence of `state` is checked by the caller.
            state: wire.state.unwrap_or(SessionState::New),
            encryption_options: wire.encryption_options,
            encryption: wire.encryption,
            compression_options: wire.compression_options,
            compression: wire.compression,
            scheme_options: wire.scheme_options,
            authentication,
            reason: wire.reason,
        })
    }
}

fn notification_from_wire(wire: WireEnvelope) -> Notification {
    Notification {
        id: wire.id,
        from: wire.from,
        to: wire.to,
        pp: wire.pp,
        metadata: wire.metadata,
        event: wire.event.unwrap_or(NotificationEvent::Failed),
        reason: wire.reason,
    }
}

fn to_wire(envelope: &Envelope) -> WireEnvelope {
    match envelope {
        Envelope::Message(m) => WireEnvelope {
            id: m.id.clone(),
            from: m.from.clone(),
            to: m.to.clone(),
            pp: m.pp.clone(),
            metadata: m.metadata.clone(),
            type_: Some(m.content.media_type.clone()),
            content: Some(m.content.to_value()),
            ..WireEnvelope::default()
        },
        Envelope::Notification(n) => WireEnvelope {
            id: n.id.clone(),
            from: n.from.clone(),
            to: n.to.clone(),
            pp: n.pp.clone(),
            metadata: n.metadata.clone(),
            event: Some(n.event),
            reason: n.reason.clone(),
            ..WireEnvelope::default()
        },
        Envelope::Command(c) => WireEnvelope {
            id: c.id.clone(),
            from: c.from.clone(),
            to: c.to.clone(),
            pp: c.pp.clone(),
            metadata: c.metadata.clone(),
            uri: c.uri.clone(),
            type_: c.resource.as_ref().map(|r| r.media_type.clone()),
            resource: c.resource.as_ref().map(Document::to_value),
            method: Some(c.method),
            // Pending is the implied default and stays off the wire.
            status: (c.status != CommandStatus::Pending).then_some(c.status),
            reason: c.reason.clone(),
            ..WireEnvelope::default()
        },
        Envelope::Session(s) => WireEnvelope {
            id: s.id.clone(),
            from: s.from.clone(),
            to: s.to.clone(),
            pp: s.pp.clone(),
            metadata: s.metadata.clone(),
            state: Some(s.state),
            encryption_options: s.encryption_options.clone(),
            encryption: s.encryption,
            compression_options: s.compression_options.clone(),
            compression: s.compression,
            scheme_options: s.scheme_options.clone(),
            scheme: s.authentication.as_ref().map(Authentication::scheme),
            authentication: s.authentication.as_ref().map(authentication_to_value),
            reason: s.reason.clone(),
            ..WireEnvelope::default()
        },
    }
}

fn authentication_to_value(authentication: &Authentication) -> Value {
    match authentication {
        Authentication::Guest | Authentication::Transport => {
            Value::Object(serde_json::Map::new())
        }
        Authentication::Plain { password } => serde_json::json!({ "password": password }),
        Authentication::Key { key } => serde_json::json!({ "key": key }),
        Authentication::External { token, issuer } => match issuer {
            Some(issuer) => serde_json::json!({ "token": token, "issuer": issuer }),
            None => serde_json::json!({ "token": token }),
        },
    }
}
