//! Envelope data model for the LIME protocol.
//!
//! This crate defines the four envelope kinds (Message, Notification,
//! Command, Session), node addressing, media-typed documents, the stable
//! reason-code taxonomy, and the JSON envelope serializer used by
//! transports.

pub mod document;
pub mod envelope;
pub mod error;
pub mod media_type;
pub mod node;
pub mod reason;
pub mod registry;
pub mod serializer;

pub use document::{Document, DocumentContent};
pub use envelope::{
    Authentication, AuthenticationResult, AuthenticationScheme, Command, CommandMethod,
    CommandStatus, DomainRole, Envelope, LimeUri, Message, Notification, NotificationEvent,
    Session, SessionCompression, SessionEncryption, SessionState, new_envelope_id,
};
pub use error::{MediaTypeError, NodeParseError, SerializationError};
pub use media_type::MediaType;
pub use node::{Identity, Node};
pub use reason::Reason;
pub use registry::TypeRegistry;
pub use serializer::JsonEnvelopeSerializer;
