//! Keepalive probing for idle sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use lime_core::{Command, Envelope, Message, Notification, SessionState};
use lime_transport::{CancellationScope, Transport};

use crate::channel::Channel;
use crate::module::ChannelModule;

/// Whether a link idle for `idle` should be probed given the configured
/// `interval`. A zero interval disables probing.
pub fn should_ping_at(idle: Duration, interval: Duration) -> bool {
    !interval.is_zero() && idle >= interval
}

/// Probes the peer with a ping command when no inbound traffic has
/// arrived for the configured interval.
///
/// Registered in the message, notification and command pipelines so any
/// inbound envelope counts as traffic. Pings go through the channel
/// outbox; the peer's auto-reply is absorbed by its own pump and this
/// module only cares that bytes flowed.
pub struct RemotePingModule {
    inner: Arc<PingInner>,
}

struct PingInner {
    outbox: mpsc::Sender<Envelope>,
    interval: Duration,
    last_inbound: StdMutex<Instant>,
    scope: CancellationScope,
    started: AtomicBool,
}

impl RemotePingModule {
    pub fn new(outbox: mpsc::Sender<Envelope>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(PingInner {
                outbox,
                interval,
                last_inbound: StdMutex::new(Instant::now()),
                scope: CancellationScope::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    /// Create the module wired to `channel`'s outbox and register it in
    /// every inbound pipeline.
    pub fn register<T: Transport>(channel: &Channel<T>, interval: Duration) -> Arc<Self> {
        let module = Self::new(channel.outbox(), interval);
        let messages: Arc<dyn ChannelModule<Message>> = module.clone();
        let notifications: Arc<dyn ChannelModule<Notification>> = module.clone();
        let commands: Arc<dyn ChannelModule<Command>> = module.clone();
        channel.register_message_module(messages);
        channel.register_notification_module(notifications);
        channel.register_command_module(commands);
        module
    }

    fn touch(&self) {
        *self
            .inner
            .last_inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn handle_state(&self, state: SessionState) {
        if state == SessionState::Established
            && self
                .inner
                .started
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.probe_loop().await });
        } else if state.is_terminal() {
            self.inner.scope.cancel();
        }
    }
}

impl PingInner {
    fn idle(&self) -> Duration {
        self.last_inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    async fn probe_loop(self: Arc<Self>) {
        let token = self.scope.token();
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = token.cancelled() => break,
            }
            if !should_ping_at(self.idle(), self.interval) {
                continue;
            }
            trace!("link idle, sending ping");
            if self
                .outbox
                .try_send(Envelope::Command(Command::ping()))
                .is_err()
            {
                // Outbox gone or full: unbind rather than fight it.
                debug!("ping outbox unavailable, stopping keepalive");
                break;
            }
        }
    }
}

#[async_trait]
impl ChannelModule<Message> for RemotePingModule {
    fn on_state_changed(&self, state: SessionState) {
        self.handle_state(state);
    }

    async fn on_receiving(&self, envelope: Message) -> Option<Message> {
        self.touch();
        Some(envelope)
    }
}

#[async_trait]
impl ChannelModule<Notification> for RemotePingModule {
    async fn on_receiving(&self, envelope: Notification) -> Option<Notification> {
        self.touch();
        Some(envelope)
    }
}

#[async_trait]
impl ChannelModule<Command> for RemotePingModule {
    async fn on_receiving(&self, envelope: Command) -> Option<Command> {
        self.touch();
        Some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_decision() {
        let interval = Duration::from_secs(30);
        assert!(!should_ping_at(Duration::from_secs(1), interval));
        assert!(!should_ping_at(Duration::from_secs(29), interval));
        assert!(should_ping_at(Duration::from_secs(30), interval));
        assert!(should_ping_at(Duration::from_secs(300), interval));
    }

    #[test]
    fn zero_interval_disables_probing() {
        assert!(!should_ping_at(Duration::from_secs(1000), Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_link_is_probed() {
        let (tx, mut rx) = mpsc::channel(4);
        let module = RemotePingModule::new(tx, Duration::from_secs(30));
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Established);

        tokio::time::advance(Duration::from_secs(31)).await;
        let envelope = rx.recv().await.unwrap();
        match envelope {
            Envelope::Command(command) => assert!(command.is_ping_request()),
            other => panic!("expected a ping command, got a {}", other.kind()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_traffic_defers_the_probe() {
        let (tx, mut rx) = mpsc::channel(4);
        let module = RemotePingModule::new(tx, Duration::from_secs(30));
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Established);

        // Traffic arrives just before the interval tick.
        tokio::time::advance(Duration::from_secs(29)).await;
        let message = Message::new(lime_core::Document::text("hi"));
        ChannelModule::<Message>::on_receiving(&*module, message).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_stops_the_probe_task() {
        let (tx, mut rx) = mpsc::channel(4);
        let module = RemotePingModule::new(tx, Duration::from_secs(30));
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Established);
        ChannelModule::<Message>::on_state_changed(&*module, SessionState::Finished);

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }
}
