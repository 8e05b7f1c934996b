//! Statically-built type registry for documents and authentication schemes.
//!
//! The registry maps `MediaType -> DocumentFactory` and
//! `AuthenticationScheme -> AuthFactory`. It is populated by an explicit
//! call ([`TypeRegistry::with_defaults`]) at startup; there is no runtime
//! discovery. Unregistered JSON media types fall back to a generic JSON
//! document and unregistered non-JSON media types to a plain-text document.

use std::collections::HashMap;

use serde_json::Value;

use crate::document::{Document, DocumentContent};
use crate::envelope::{Authentication, AuthenticationScheme};
use crate::error::SerializationError;
use crate::media_type::MediaType;

/// Builds a typed document from its media type and wire value.
pub type DocumentFactory =
    Box<dyn Fn(&MediaType, &Value) -> Result<Document, SerializationError> + Send + Sync>;

/// Builds a typed authentication payload from its wire value.
pub type AuthFactory = Box<dyn Fn(&Value) -> Result<Authentication, SerializationError> + Send + Sync>;

/// Registration table resolving wire values into typed documents and
/// authentication payloads.
pub struct TypeRegistry {
    documents: HashMap<MediaType, DocumentFactory>,
    authentications: HashMap<AuthenticationScheme, AuthFactory>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TypeRegistry {
    /// An empty registry; everything resolves through the fallbacks.
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            authentications: HashMap::new(),
        }
    }

    /// A registry with the protocol's built-in document and authentication
    /// types registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_document(MediaType::ping(), |media_type, value| {
            if !value.is_object() {
                return Err(SerializationError::InvalidDocument {
                    media_type: media_type.to_string(),
                    reason: "ping document must be a JSON object".to_string(),
                });
            }
            Ok(Document::json(media_type.clone(), value.clone()))
        });

        registry.register_document(MediaType::text_plain(), |media_type, value| {
            match value.as_str() {
                Some(text) => Ok(Document {
                    media_type: media_type.clone(),
                    content: DocumentContent::Text(text.to_string()),
                }),
                None => Err(SerializationError::InvalidDocument {
                    media_type: media_type.to_string(),
                    reason: "text document must be a JSON string".to_string(),
                }),
            }
        });

        registry.register_authentication(AuthenticationScheme::Guest, |_| {
            Ok(Authentication::Guest)
        });
        registry.register_authentication(AuthenticationScheme::Transport, |_| {
            Ok(Authentication::Transport)
        });
        registry.register_authentication(AuthenticationScheme::Plain, |value| {
            let password = value
                .get("password")
                .and_then(Value::as_str)
                .ok_or_else(|| SerializationError::InvalidAuthentication {
                    scheme: "plain".to_string(),
                    reason: "missing password".to_string(),
                })?;
            Ok(Authentication::Plain {
                password: password.to_string(),
            })
        });
        registry.register_authentication(AuthenticationScheme::Key, |value| {
            let key = value.get("key").and_then(Value::as_str).ok_or_else(|| {
                SerializationError::InvalidAuthentication {
                    scheme: "key".to_string(),
                    reason: "missing key".to_string(),
                }
            })?;
            Ok(Authentication::Key {
                key: key.to_string(),
            })
        });
        registry.register_authentication(AuthenticationScheme::External, |value| {
            let token = value
                .get("token")
                .and_then(Value::as_str)
                .ok_or_else(|| SerializationError::InvalidAuthentication {
                    scheme: "external".to_string(),
                    reason: "missing token".to_string(),
                })?;
            Ok(Authentication::External {
                token: token.to_string(),
                issuer: value
                    .get("issuer")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        });

        registry
    }

    /// Register a document factory for a media type.
    pub fn register_document<F>(&mut self, media_type: MediaType, factory: F)
    where
        F: Fn(&MediaType, &Value) -> Result<Document, SerializationError> + Send + Sync + 'static,
    {
        self.documents.insert(media_type, Box::new(factory));
    }

    /// Register an authentication factory for a scheme.
    pub fn register_authentication<F>(&mut self, scheme: AuthenticationScheme, factory: F)
    where
        F: Fn(&Value) -> Result<Authentication, SerializationError> + Send + Sync + 'static,
    {
        self.authentications.insert(scheme, Box::new(factory));
    }

    /// Resolve a wire value into a document.
    ///
    /// Registered media types go through their factory; unknown JSON media
    /// types become generic JSON documents; unknown non-JSON media types
    /// must carry a string and become plain-text documents.
    pub fn document_from_value(
        &self,
        media_type: &MediaType,
        value: &Value,
    ) -> Result<Document, SerializationError> {
        if let Some(factory) = self.documents.get(media_type) {
            return factory(media_type, value);
        }
        if media_type.is_json() {
            return Ok(Document::json(media_type.clone(), value.clone()));
        }
        match value.as_str() {
            Some(text) => Ok(Document {
                media_type: media_type.clone(),
                content: DocumentContent::Text(text.to_string()),
            }),
            None => Err(SerializationError::InvalidDocument {
                media_type: media_type.to_string(),
                reason: "non-JSON media type requires a string body".to_string(),
            }),
        }
    }

    /// Resolve a wire value into an authentication payload.
    pub fn authentication_from_value(
        &self,
        scheme: AuthenticationScheme,
        value: &Value,
    ) -> Result<Authentication, SerializationError> {
        let factory = self.authentications.get(&scheme).ok_or_else(|| {
            SerializationError::UnknownScheme(scheme.to_string())
        })?;
        factory(value)
    }
}
