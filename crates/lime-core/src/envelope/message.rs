//! Message envelope: application content delivery.

use crate::document::Document;
use crate::node::Node;

use super::{Metadata, new_envelope_id};

/// A message carrying a media-typed document to a destination node.
///
/// The wire `type` field is derived from the content's media type.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub from: Option<Node>,
    pub to: Option<Node>,
    pub pp: Option<Node>,
    pub metadata: Option<Metadata>,
    pub content: Document,
}

impl Message {
    /// A message with a fresh id (eligible for delivery notifications).
    pub fn new(content: Document) -> Self {
        Self {
            id: Some(new_envelope_id()),
            from: None,
            to: None,
            pp: None,
            metadata: None,
            content,
        }
    }

    /// A one-way message without an id (no notifications expected).
    pub fn fire_and_forget(content: Document) -> Self {
        Self {
            id: None,
            from: None,
            to: None,
            pp: None,
            metadata: None,
            content,
        }
    }

    /// Set the destination node.
    pub fn to(mut self, to: Node) -> Self {
        self.to = Some(to);
        self
    }
}
