//! Media-typed documents carried inside Message content and Command
//! resources.

use serde_json::Value;

use crate::media_type::MediaType;

/// The body of a document: JSON-shaped or plain text.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    Json(Value),
    Text(String),
}

/// A polymorphic value tagged by a media type.
///
/// Known media types are resolved through the
/// [`TypeRegistry`](crate::registry::TypeRegistry); unknown JSON media types
/// fall back to a generic JSON body, unknown non-JSON media types to a
/// plain-text body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub media_type: MediaType,
    pub content: DocumentContent,
}

impl Document {
    /// A JSON document with the given media type.
    pub fn json(media_type: MediaType, value: Value) -> Self {
        Self {
            media_type,
            content: DocumentContent::Json(value),
        }
    }

    /// A plain-text document (`text/plain`).
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::text_plain(),
            content: DocumentContent::Text(text.into()),
        }
    }

    /// The ping document: an empty JSON object tagged
    /// `application/vnd.lime.ping+json`.
    pub fn ping() -> Self {
        Self::json(MediaType::ping(), Value::Object(serde_json::Map::new()))
    }

    /// Whether this is a ping document.
    pub fn is_ping(&self) -> bool {
        self.media_type == MediaType::ping()
    }

    /// The body as a JSON value (text bodies become JSON strings).
    pub fn to_value(&self) -> Value {
        match &self.content {
            DocumentContent::Json(value) => value.clone(),
            DocumentContent::Text(text) => Value::String(text.clone()),
        }
    }
}
