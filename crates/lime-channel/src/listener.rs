//! Listener utilities: produce/consume loops over a channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use lime_core::{Command, Message, Notification};
use lime_transport::{CancellationScope, CancellationToken, Transport};

use crate::channel::Channel;
use crate::error::ChannelError;

/// How a produce/consume loop ended.
#[derive(Debug)]
pub enum ListenOutcome<T> {
    /// The consumer declined an item; it is carried out unconsumed.
    Stopped(T),
    /// The cancellation token fired.
    Cancelled,
    /// The producer failed.
    Failed(ChannelError),
}

/// Repeatedly produce an item and hand it to the consumer, until the
/// consumer returns `false`, the token fires, or the producer errors.
pub async fn produce_consume<T, P, PFut, C, CFut>(
    produce: P,
    consume: C,
    token: CancellationToken,
) -> ListenOutcome<T>
where
    T: Clone,
    P: Fn(CancellationToken) -> PFut,
    PFut: Future<Output = Result<T, ChannelError>>,
    C: Fn(T) -> CFut,
    CFut: Future<Output = bool>,
{
    loop {
        let item = match produce(token.clone()).await {
            Ok(item) => item,
            Err(ChannelError::Cancelled) => return ListenOutcome::Cancelled,
            Err(err) => return ListenOutcome::Failed(err),
        };
        if !consume(item.clone()).await {
            return ListenOutcome::Stopped(item);
        }
    }
}

/// Wires the three receive operations of a channel to three consumer
/// callbacks, each in its own task.
pub struct ChannelListener<T: Transport> {
    channel: Channel<T>,
    scope: CancellationScope,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<T: Transport> ChannelListener<T> {
    pub fn new(channel: Channel<T>) -> Self {
        Self {
            channel,
            scope: CancellationScope::new(),
            tasks: StdMutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start the three listener tasks. A listener starts once; later
    /// calls do nothing.
    pub fn start<MC, MFut, NC, NFut, CC, CFut>(
        &self,
        on_message: MC,
        on_notification: NC,
        on_command: CC,
    ) where
        MC: Fn(Message) -> MFut + Send + Sync + 'static,
        MFut: Future<Output = bool> + Send + 'static,
        NC: Fn(Notification) -> NFut + Send + Sync + 'static,
        NFut: Future<Output = bool> + Send + 'static,
        CC: Fn(Command) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = bool> + Send + 'static,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.push(self.spawn_loop("message", on_message, |channel, token| async move {
            channel.receive_message(token).await
        }));
        tasks.push(self.spawn_loop(
            "notification",
            on_notification,
            |channel, token| async move { channel.receive_notification(token).await },
        ));
        tasks.push(self.spawn_loop("command", on_command, |channel, token| async move {
            channel.receive_command(token).await
        }));
        debug!("channel listener started");
    }

    /// Stop the listener tasks and wait for them to exit.
    pub async fn stop(&self) {
        self.scope.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        debug!("channel listener stopped");
    }

    fn spawn_loop<E, C, CFut, P, PFut>(&self, kind: &'static str, consume: C, produce: P) -> JoinHandle<()>
    where
        E: Clone + Send + 'static,
        C: Fn(E) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = bool> + Send + 'static,
        P: Fn(Channel<T>, CancellationToken) -> PFut + Send + Sync + 'static,
        PFut: Future<Output = Result<E, ChannelError>> + Send + 'static,
    {
        let channel = self.channel.clone();
        let token = self.scope.token();
        tokio::spawn(async move {
            let outcome = produce_consume(
                |token| produce(channel.clone(), token),
                consume,
                token,
            )
            .await;
            match outcome {
                ListenOutcome::Stopped(_) => debug!(kind, "listener stopped by consumer"),
                ListenOutcome::Cancelled => trace!(kind, "listener cancelled"),
                ListenOutcome::Failed(err) => warn!(kind, error = %err, "listener failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn consumer_false_stops_with_the_item() {
        let produced = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&produced);
        let outcome = produce_consume(
            move |_token| {
                let p = Arc::clone(&p);
                async move { Ok(p.fetch_add(1, Ordering::SeqCst)) }
            },
            |item: usize| async move { item < 2 },
            CancellationToken::none(),
        )
        .await;
        match outcome {
            ListenOutcome::Stopped(item) => assert_eq!(item, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(produced.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn producer_cancellation_is_silent() {
        let outcome: ListenOutcome<usize> = produce_consume(
            |_token| async move { Err(ChannelError::Cancelled) },
            |_item| async move { true },
            CancellationToken::none(),
        )
        .await;
        assert!(matches!(outcome, ListenOutcome::Cancelled));
    }

    #[tokio::test]
    async fn producer_error_surfaces() {
        let outcome: ListenOutcome<usize> = produce_consume(
            |_token| async move { Err(ChannelError::Faulted("broken".into())) },
            |_item| async move { true },
            CancellationToken::none(),
        )
        .await;
        match outcome {
            ListenOutcome::Failed(ChannelError::Faulted(reason)) => assert_eq!(reason, "broken"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
