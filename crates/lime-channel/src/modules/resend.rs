//! Automatic resend of unacknowledged messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use lime_core::{Envelope, Message, Notification, NotificationEvent, SessionState};
use lime_transport::{CancellationScope, Transport};

use crate::channel::Channel;
use crate::module::ChannelModule;

/// Retries messages until the peer acknowledges them.
///
/// Sent messages with an id are recorded in memory; a notification with
/// an event at or past [`NotificationEvent::Received`] for that id
/// discards the record. A background task resends whatever is still
/// pending every interval, through the channel outbox (bypassing the
/// pipeline, so resends are not re-recorded), and gives up on a message
/// after `max_resends` attempts.
///
/// Register in both the message and notification pipelines; `register`
/// does so.
pub struct ResendMessagesModule {
    inner: Arc<ResendInner>,
}

struct ResendInner {
    outbox: mpsc::Sender<Envelope>,
    interval: Duration,
    max_resends: u32,
    pending: StdMutex<HashMap<String, PendingMessage>>,
    scope: CancellationScope,
    started: AtomicBool,
}

struct PendingMessage {
    message: Message,
    attempts: u32,
}

impl ResendMessagesModule {
    pub fn new(outbox: mpsc::Sender<Envelope>, interval: Duration, max_resends: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(ResendInner {
                outbox,
                interval,
                max_resends,
                pending: StdMutex::new(HashMap::new()),
                scope: CancellationScope::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Create the module wired to `channel`'s outbox and register it in
    /// the message and notification pipelines.
    pub fn register<T: Transport>(
        channel: &Channel<T>,
        interval: Duration,
        max_resends: u32,
    ) -> Arc<Self> {
        let module = Self::new(channel.outbox(), interval, max_resends);
        let messages: Arc<dyn ChannelModule<Message>> = module.clone();
        let notifications: Arc<dyn ChannelModule<Notification>> = module.clone();
        channel.register_message_module(messages);
        channel.register_notification_module(notifications);
        module
    }

    /// The number of messages currently awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ResendInner {
    async fn resend_loop(self: Arc<Self>) {
        let token = self.scope.token();
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = token.cancelled() => break,
            }
            let due: Vec<Message> = {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                let mut expired = Vec::new();
                let mut due = Vec::new();
                for (id, entry) in pending.iter_mut() {
                    if entry.attempts >= self.max_resends {
                        expired.push(id.clone());
                    } else {
                        entry.attempts += 1;
                        due.push(entry.message.clone());
                    }
                }
                for id in expired {
                    warn!(message_id = %id, "giving up on unacknowledged message");
                    pending.remove(&id);
                }
                due
            };
            for message in due {
                trace!(message_id = message.id.as_deref(), "resending message");
                if self.outbox.try_send(Envelope::Message(message)).is_err() {
                    // Outbox gone: unbind instead of crashing the pump.
                    debug!("resend outbox unavailable, stopping");
                    self.pending
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear();
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl ChannelModule<Message> for ResendMessagesModule {
    fn on_state_changed(&self, state: SessionState) {
        if state == SessionState::Established
            && self
                .inner
                .started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.resend_loop().await });
        } else if state.is_terminal() {
            self.inner.scope.cancel();
        }
    }

    async fn on_sending(&self, envelope: Message) -> Option<Message> {
        if let Some(id) = &envelope.id {
            self.inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    id.clone(),
                    PendingMessage {
                        message: envelope.clone(),
                        attempts: 0,
                    },
                );
        }
        Some(envelope)
    }
}

#[async_trait]
impl ChannelModule<Notification> for ResendMessagesModule {
    async fn on_receiving(&self, envelope: Notification) -> Option<Notification> {
        if envelope.event >= NotificationEvent::Received {
            if let Some(id) = &envelope.id {
                let removed = self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(id);
                if removed.is_some() {
                    trace!(message_id = %id, event = %envelope.event, "message acknowledged");
                }
            }
        }
        Some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use lime_core::Document;

    use super::*;

    fn message() -> Message {
        Message::new(Document::text("payload"))
    }

    #[tokio::test]
    async fn records_sent_messages_with_an_id() {
        let (tx, _rx) = mpsc::channel(4);
        let module = ResendMessagesModule::new(tx, Duration::from_secs(1), 3);

        let sent = message();
        ChannelModule::<Message>::on_sending(&*module, sent).await;
        assert_eq!(module.pending_count(), 1);

        let anonymous = Message::fire_and_forget(Document::text("x"));
        ChannelModule::<Message>::on_sending(&*module, anonymous).await;
        assert_eq!(module.pending_count(), 1);
    }

    #[tokio::test]
    async fn received_notification_discards_the_record() {
        let (tx, _rx) = mpsc::channel(4);
        let module = ResendMessagesModule::new(tx, Duration::from_secs(1), 3);

        let sent = message();
        let id = sent.id.clone().unwrap();
        ChannelModule::<Message>::on_sending(&*module, sent).await;

        // An early event does not acknowledge.
        let accepted = Notification::new(id.clone(), NotificationEvent::Accepted);
        ChannelModule::<Notification>::on_receiving(&*module, accepted).await;
        assert_eq!(module.pending_count(), 1);

        let consumed = Notification::new(id, NotificationEvent::Consumed);
        ChannelModule::<Notification>::on_receiving(&*module, consumed).await;
        assert_eq!(module.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_messages_are_resent() {
        let (tx, mut rx) = mpsc::channel(8);
        let module = ResendMessagesModule::new(tx, Duration::from_secs(2), 3);

        let sent = message();
        let id = sent.id.clone().unwrap();
        ChannelModule::<Message>::on_sending(&*module, sent).await;
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Established);

        tokio::time::advance(Duration::from_secs(3)).await;
        let envelope = rx.recv().await.unwrap();
        match envelope {
            Envelope::Message(resent) => assert_eq!(resent.id.as_deref(), Some(id.as_str())),
            other => panic!("expected a message, got a {}", other.kind()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_resends() {
        let (tx, mut rx) = mpsc::channel(16);
        let module = ResendMessagesModule::new(tx, Duration::from_secs(1), 2);

        ChannelModule::<Message>::on_sending(&*module, message()).await;
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Established);

        // Two resend attempts, then the record expires on the next tick.
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(1)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(module.pending_count(), 0);

        let mut resends = 0;
        while rx.try_recv().is_ok() {
            resends += 1;
        }
        assert_eq!(resends, 2);
    }
}
