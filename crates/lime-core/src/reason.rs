//! Failure reasons and the stable reason-code taxonomy.
//!
//! The numeric values are wire-stable: existing peers match on them, so
//! they must never be renumbered. Codes are grouped in ranges by concern
//! (general, session, validation, authorization, routing, dispatch,
//! command processing, message processing, gateway, application).

use serde::{Deserialize, Serialize};

/// A failure reason: a stable numeric code plus an optional description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Reason {
    /// Create a reason with a description.
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
        }
    }

    /// Create a reason with only a code.
    pub fn from_code(code: i32) -> Self {
        Self {
            code,
            description: None,
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} (code {})", description, self.code),
            None => write!(f, "code {}", self.code),
        }
    }
}

/// Wire-stable reason codes.
pub mod codes {
    // -- General (1..) --
    pub const GENERAL_ERROR: i32 = 1;

    // -- Session (11..) --
    pub const SESSION_ERROR: i32 = 11;
    pub const SESSION_REGISTRATION_ERROR: i32 = 12;
    pub const SESSION_AUTHENTICATION_FAILED: i32 = 13;
    pub const SESSION_UNSUPPORTED_ENVELOPE: i32 = 14;
    pub const SESSION_NEGOTIATION_INVALID_OPTIONS: i32 = 15;
    pub const SESSION_NEGOTIATION_TIMEOUT: i32 = 16;
    pub const SESSION_AUTHENTICATION_TIMEOUT: i32 = 17;

    // -- Validation (21..) --
    pub const VALIDATION_ERROR: i32 = 21;
    pub const VALIDATION_EMPTY_DOCUMENT: i32 = 22;
    pub const VALIDATION_INVALID_RESOURCE: i32 = 23;
    pub const VALIDATION_INVALID_STATUS: i32 = 24;
    pub const VALIDATION_INVALID_IDENTITY: i32 = 25;
    pub const VALIDATION_INVALID_RECIPIENTS: i32 = 26;
    pub const VALIDATION_INVALID_METHOD: i32 = 27;
    pub const VALIDATION_INVALID_URI: i32 = 28;

    // -- Authorization (31..) --
    pub const AUTHORIZATION_ERROR: i32 = 31;
    pub const AUTHORIZATION_UNAUTHORIZED_SENDER: i32 = 32;
    pub const AUTHORIZATION_QUOTA_THRESHOLD_EXCEEDED: i32 = 33;

    // -- Routing (41..) --
    pub const ROUTING_ERROR: i32 = 41;
    pub const ROUTING_DESTINATION_NOT_FOUND: i32 = 42;
    pub const ROUTING_COULD_NOT_PERFORM_OPERATION: i32 = 43;

    // -- Dispatch (51..) --
    pub const DISPATCH_ERROR: i32 = 51;
    pub const DISPATCH_TIMEOUT: i32 = 52;

    // -- Command processing (61..) --
    pub const COMMAND_PROCESSING_ERROR: i32 = 61;
    pub const COMMAND_RESOURCE_NOT_SUPPORTED: i32 = 62;
    pub const COMMAND_RESOURCE_NOT_FOUND: i32 = 63;

    // -- Message processing (71..) --
    pub const MESSAGE_PROCESSING_ERROR: i32 = 71;
    pub const MESSAGE_UNSUPPORTED_CONTENT_TYPE: i32 = 72;

    // -- Gateway (81..) --
    pub const GATEWAY_ERROR: i32 = 81;
    pub const GATEWAY_CONTENT_TYPE_NOT_SUPPORTED: i32 = 82;

    // -- Application (101..) --
    pub const APPLICATION_ERROR: i32 = 101;
}
