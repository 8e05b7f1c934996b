//! Error types for the envelope data model.

/// Errors from parsing node and identity addresses.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NodeParseError {
    #[error("empty address")]
    Empty,
    #[error("missing domain in address: {0}")]
    MissingDomain(String),
    #[error("empty name in address: {0}")]
    EmptyName(String),
}

/// Errors from parsing media types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("empty media type")]
    Empty,
    #[error("missing subtype in media type: {0}")]
    MissingSubtype(String),
}

/// Errors from envelope serialization and deserialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope has no discriminating field (content/event/method/state)")]
    UnknownEnvelopeKind,

    #[error("message envelope is missing the content field")]
    MissingContent,

    #[error("message envelope is missing the type field")]
    MissingType,

    #[error("invalid media type: {0}")]
    MediaType(#[from] MediaTypeError),

    #[error("invalid document for media type {media_type}: {reason}")]
    InvalidDocument {
        media_type: String,
        reason: String,
    },

    #[error("unknown authentication scheme: {0}")]
    UnknownScheme(String),

    #[error("invalid authentication payload for scheme {scheme}: {reason}")]
    InvalidAuthentication {
        scheme: String,
        reason: String,
    },
}
