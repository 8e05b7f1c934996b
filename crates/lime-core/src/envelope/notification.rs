//! Notification envelope: delivery progress events for messages.

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::reason::Reason;

use super::Metadata;

/// Events about a message, ordered by delivery progress.
///
/// The ordering is meaningful: a notification with a greater event
/// supersedes one with a lesser event for the same message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    /// The message was accepted by the first hop.
    Accepted,
    /// The message content was validated.
    Validated,
    /// The sender is authorized to deliver to the destination.
    Authorized,
    /// The message was dispatched toward the destination.
    Dispatched,
    /// The destination node received the message.
    Received,
    /// The destination application consumed the message.
    Consumed,
    /// Delivery failed; `reason` carries the cause.
    Failed,
}

/// A delivery event for a previously sent message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Option<String>,
    pub from: Option<Node>,
    pub to: Option<Node>,
    pub pp: Option<Node>,
    pub metadata: Option<Metadata>,
    pub event: NotificationEvent,
    /// Present when `event` is [`NotificationEvent::Failed`].
    pub reason: Option<Reason>,
}

impl Notification {
    /// A notification for the message with the given id.
    pub fn new(message_id: impl Into<String>, event: NotificationEvent) -> Self {
        Self {
            id: Some(message_id.into()),
            from: None,
            to: None,
            pp: None,
            metadata: None,
            event,
            reason: None,
        }
    }

    /// A failure notification with a reason.
    pub fn failed(message_id: impl Into<String>, reason: Reason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(message_id, NotificationEvent::Failed)
        }
    }
}
