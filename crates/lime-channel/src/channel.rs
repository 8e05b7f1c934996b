//! The channel core: session state, demultiplexing buffers, module
//! pipelines and the receive pump.
//!
//! A [`Channel`] owns one transport and multiplexes the four envelope
//! kinds over it. Before establishment the handshake layer drives the
//! transport directly through [`Channel::send_session`] and
//! [`Channel::receive_session`]; once [`SessionState::Established`] is
//! reached the owner spawns the pump, the sole transport reader, which
//! routes every inbound envelope to its kind's buffer.
//!
//! The channel is cloneable; clones share the same session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, trace, warn};

use lime_core::{Command, Envelope, Message, Node, Notification, Session, SessionState};
use lime_transport::{CancellationScope, CancellationToken, Transport, TransportError};

use crate::buffer::EnvelopeBuffer;
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::module::{ChannelModule, ModulePipeline};
use crate::state::validate_transition;

/// Proof that the channel just became established, consumed by
/// [`Channel::spawn_pump`]. Issued exactly once per channel.
#[must_use = "the pump must be spawned for the established channel to receive"]
pub struct PumpToken {
    _private: (),
}

/// A session channel over a transport.
pub struct Channel<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    transport: T,
    config: ChannelConfig,
    state: RwLock<SessionState>,
    session_id: RwLock<Option<String>>,
    local_node: RwLock<Option<Node>>,
    remote_node: RwLock<Option<Node>>,
    messages: EnvelopeBuffer<Message>,
    notifications: EnvelopeBuffer<Notification>,
    commands: EnvelopeBuffer<Command>,
    // Capacity 1: session frames arrive one at a time during teardown.
    sessions: EnvelopeBuffer<Session>,
    message_modules: ModulePipeline<Message>,
    notification_modules: ModulePipeline<Notification>,
    command_modules: ModulePipeline<Command>,
    session_modules: ModulePipeline<Session>,
    scope: CancellationScope,
    send_lock: Mutex<()>,
    fault: StdMutex<Option<String>>,
    pump_token_issued: AtomicBool,
    outbox_tx: mpsc::Sender<Envelope>,
    outbox_rx: StdMutex<Option<mpsc::Receiver<Envelope>>>,
}

impl<T: Transport> Channel<T> {
    /// A channel over the given transport, in state [`SessionState::New`].
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::channel(config.outbox_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                transport,
                messages: EnvelopeBuffer::new(config.buffer_capacity),
                notifications: EnvelopeBuffer::new(config.buffer_capacity),
                commands: EnvelopeBuffer::new(config.buffer_capacity),
                sessions: EnvelopeBuffer::new(1),
                config,
                state: RwLock::new(SessionState::New),
                session_id: RwLock::new(None),
                local_node: RwLock::new(None),
                remote_node: RwLock::new(None),
                message_modules: ModulePipeline::new(),
                notification_modules: ModulePipeline::new(),
                command_modules: ModulePipeline::new(),
                session_modules: ModulePipeline::new(),
                scope: CancellationScope::new(),
                send_lock: Mutex::new(()),
                fault: StdMutex::new(None),
                pump_token_issued: AtomicBool::new(false),
                outbox_tx,
                outbox_rx: StdMutex::new(Some(outbox_rx)),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner
            .session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn local_node(&self) -> Option<Node> {
        self.inner
            .local_node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remote_node(&self) -> Option<Node> {
        self.inner
            .remote_node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The fault stored by the pump, if the channel has faulted.
    pub fn fault_reason(&self) -> Option<String> {
        self.inner
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the session identifier. The handshake layer calls this once.
    pub fn set_session_id(&self, id: impl Into<String>) {
        *self
            .inner
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.into());
    }

    /// Set the local node, as assigned during the handshake.
    pub fn set_local_node(&self, node: Node) {
        *self
            .inner
            .local_node
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(node);
    }

    /// Set the remote node, as learned during the handshake.
    pub fn set_remote_node(&self, node: Node) {
        *self
            .inner
            .remote_node
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(node);
    }

    // -- Modules --

    pub fn register_message_module(&self, module: Arc<dyn ChannelModule<Message>>) {
        self.inner.message_modules.register(module);
    }

    pub fn register_notification_module(&self, module: Arc<dyn ChannelModule<Notification>>) {
        self.inner.notification_modules.register(module);
    }

    pub fn register_command_module(&self, module: Arc<dyn ChannelModule<Command>>) {
        self.inner.command_modules.register(module);
    }

    /// Session modules observe state changes; session frames themselves
    /// bypass the send/receive hooks.
    pub fn register_session_module(&self, module: Arc<dyn ChannelModule<Session>>) {
        self.inner.session_modules.register(module);
    }

    /// A sender into the channel outbox. Outbox envelopes are written by
    /// the writer task and bypass the module pipelines; this is how
    /// modules send without re-entering themselves.
    pub fn outbox(&self) -> mpsc::Sender<Envelope> {
        self.inner.outbox_tx.clone()
    }

    // -- State machine --

    /// Move the session to `state`, notifying every module first.
    ///
    /// The transition to [`SessionState::Established`] yields a
    /// [`PumpToken`], exactly once, which the owner passes to
    /// [`Channel::spawn_pump`].
    pub fn set_state(&self, state: SessionState) -> Result<Option<PumpToken>, ChannelError> {
        let mut current = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !validate_transition(*current, state) {
            return Err(ChannelError::InvalidTransition {
                from: *current,
                to: state,
            });
        }
        // Modules observe the new state before the change completes.
        self.inner.message_modules.notify_state_changed(state);
        self.inner.notification_modules.notify_state_changed(state);
        self.inner.command_modules.notify_state_changed(state);
        self.inner.session_modules.notify_state_changed(state);
        debug!(from = %*current, to = %state, "session state transition");
        *current = state;

        if state == SessionState::Established
            && self
                .inner
                .pump_token_issued
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Ok(Some(PumpToken { _private: () }));
        }
        Ok(None)
    }

    /// Spawn the receive pump and the outbox writer.
    pub fn spawn_pump(&self, token: PumpToken) {
        let PumpToken { _private: () } = token;
        let outbox_rx = self
            .inner
            .outbox_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(outbox_rx) = outbox_rx {
            let writer = self.clone();
            tokio::spawn(async move { writer.writer_loop(outbox_rx).await });
        }
        let pump = self.clone();
        tokio::spawn(async move { pump.pump_loop().await });
        debug!(session_id = self.session_id().as_deref(), "pump started");
    }

    // -- Send operations --

    /// Send a message. Requires [`SessionState::Established`].
    pub async fn send_message(
        &self,
        message: Message,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let Some(mut message) = self.inner.message_modules.on_sending(message).await else {
            trace!("message suppressed by module");
            return Ok(());
        };
        self.fill_outbound(&mut message.from, &mut message.pp);
        self.raw_send(Envelope::Message(message), &token).await
    }

    /// Send a notification. Requires [`SessionState::Established`].
    pub async fn send_notification(
        &self,
        notification: Notification,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let Some(mut notification) = self
            .inner
            .notification_modules
            .on_sending(notification)
            .await
        else {
            trace!("notification suppressed by module");
            return Ok(());
        };
        self.fill_outbound(&mut notification.from, &mut notification.pp);
        self.raw_send(Envelope::Notification(notification), &token)
            .await
    }

    /// Send a command. Requires [`SessionState::Established`].
    pub async fn send_command(
        &self,
        command: Command,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let Some(mut command) = self.inner.command_modules.on_sending(command).await else {
            trace!("command suppressed by module");
            return Ok(());
        };
        self.fill_outbound(&mut command.from, &mut command.pp);
        self.raw_send(Envelope::Command(command), &token).await
    }

    /// Send a session envelope. Illegal once the session is terminal.
    pub async fn send_session(
        &self,
        session: Session,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        let state = self.state();
        if state.is_terminal() {
            return Err(ChannelError::InvalidState {
                expected: "a non-terminal state",
                actual: state,
            });
        }
        self.raw_send(Envelope::Session(session), &token).await
    }

    // -- Receive operations --

    /// Await the next message. Requires [`SessionState::Established`].
    pub async fn receive_message(
        &self,
        token: CancellationToken,
    ) -> Result<Message, ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let result = self
            .inner
            .messages
            .receive(token, self.inner.scope.token())
            .await;
        self.map_closed(result)
    }

    /// Await the next notification. Requires [`SessionState::Established`].
    pub async fn receive_notification(
        &self,
        token: CancellationToken,
    ) -> Result<Notification, ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let result = self
            .inner
            .notifications
            .receive(token, self.inner.scope.token())
            .await;
        self.map_closed(result)
    }

    /// Await the next command. Requires [`SessionState::Established`].
    pub async fn receive_command(
        &self,
        token: CancellationToken,
    ) -> Result<Command, ChannelError> {
        self.surface_fault()?;
        self.require_established()?;
        let result = self
            .inner
            .commands
            .receive(token, self.inner.scope.token())
            .await;
        self.map_closed(result)
    }

    /// Await the next session envelope.
    ///
    /// Before establishment this reads the transport directly (the
    /// handshake layer is the sole reader then); any non-session envelope
    /// is a protocol violation. After establishment it reads the one-slot
    /// session buffer fed by the pump.
    pub async fn receive_session(
        &self,
        token: CancellationToken,
    ) -> Result<Session, ChannelError> {
        if self.state() < SessionState::Established {
            let scope_token = self.inner.scope.token();
            let envelope = tokio::select! {
                result = self.inner.transport.receive(scope_token) => result?,
                () = token.cancelled() => return Err(ChannelError::Cancelled),
            };
            return match envelope {
                Envelope::Session(session) => Ok(session),
                other => Err(ChannelError::ProtocolViolation(format!(
                    "expected a session envelope during the handshake, got a {}",
                    other.kind()
                ))),
            };
        }
        self.surface_fault()?;
        let result = self
            .inner
            .sessions
            .receive(token, self.inner.scope.token())
            .await;
        self.map_closed(result)
    }

    /// Close the channel: cancel the internal scope and close the
    /// transport.
    pub async fn close(&self, token: CancellationToken) -> Result<(), ChannelError> {
        self.inner.scope.cancel();
        self.inner.transport.close(token).await?;
        Ok(())
    }

    // -- Internals --

    fn require_established(&self) -> Result<(), ChannelError> {
        let state = self.state();
        if state != SessionState::Established {
            return Err(ChannelError::invalid_state(
                SessionState::Established,
                state,
            ));
        }
        Ok(())
    }

    fn surface_fault(&self) -> Result<(), ChannelError> {
        match self.fault_reason() {
            Some(reason) => Err(ChannelError::Faulted(reason)),
            None => Ok(()),
        }
    }

    /// Upgrade a scope-wake `Closed` to the stored fault, when one exists.
    fn map_closed<V>(&self, result: Result<V, ChannelError>) -> Result<V, ChannelError> {
        match result {
            Err(ChannelError::Closed) => match self.fault_reason() {
                Some(reason) => Err(ChannelError::Faulted(reason)),
                None => Err(ChannelError::Closed),
            },
            other => other,
        }
    }

    fn fill_outbound(&self, from: &mut Option<Node>, pp: &mut Option<Node>) {
        if !self.inner.config.fill_envelope_recipients {
            return;
        }
        let Some(local) = self.local_node() else {
            return;
        };
        if from.is_none() {
            *from = Some(local);
        } else if pp.is_none() && from.as_ref() != Some(&local) {
            // Sending on behalf of another node: record the actual sender.
            *pp = Some(local);
        }
    }

    fn fill_inbound(&self, from: &mut Option<Node>, to: &mut Option<Node>) {
        if !self.inner.config.fill_envelope_recipients {
            return;
        }
        if from.is_none() {
            *from = self.remote_node();
        }
        if to.is_none() {
            *to = self.local_node();
        }
    }

    /// Write one envelope under the send lock and the send timeout.
    async fn raw_send(
        &self,
        envelope: Envelope,
        token: &CancellationToken,
    ) -> Result<(), ChannelError> {
        let _guard = tokio::select! {
            guard = self.inner.send_lock.lock() => guard,
            () = token.cancelled() => return Err(ChannelError::Cancelled),
        };
        trace!(kind = envelope.kind(), "channel send");
        let send = self.inner.transport.send(envelope, self.inner.scope.token());
        tokio::select! {
            result = tokio::time::timeout(self.inner.config.send_timeout(), send) => {
                match result {
                    Ok(sent) => Ok(sent?),
                    Err(_) => Err(ChannelError::Timeout),
                }
            }
            () = token.cancelled() => Err(ChannelError::Cancelled),
        }
    }

    /// The receive pump: sole transport reader once established.
    async fn pump_loop(self) {
        let scope_token = self.inner.scope.token();
        loop {
            let envelope = match self.inner.transport.receive(scope_token.clone()).await {
                Ok(envelope) => envelope,
                Err(TransportError::Cancelled) => break,
                Err(err) => {
                    // Finishing counts as teardown: the peer may close the
                    // transport before our own finish step completes.
                    if scope_token.is_cancelled() || self.state() >= SessionState::Finishing {
                        break;
                    }
                    self.fault(format!("transport receive failed: {err}")).await;
                    break;
                }
            };
            if let Err(err) = self.dispatch(envelope).await {
                self.fault(format!("inbound dispatch failed: {err}")).await;
                break;
            }
        }
        // Unblock any receive still waiting on a buffer.
        self.inner.scope.cancel();
        trace!("pump stopped");
    }

    /// Route one inbound envelope: ping auto-reply, receiving pipeline,
    /// recipient fill, then the kind's buffer.
    async fn dispatch(&self, envelope: Envelope) -> Result<(), ChannelError> {
        match envelope {
            Envelope::Command(command)
                if self.inner.config.auto_reply_pings && command.is_ping_request() =>
            {
                trace!(id = command.id.as_deref(), "ping request, auto-replying");
                let reply = Envelope::Command(command.success_response());
                // A full outbox backpressures the pump; every ping gets
                // exactly one reply.
                self.inner
                    .outbox_tx
                    .send(reply)
                    .await
                    .map_err(|_| ChannelError::Closed)?;
                Ok(())
            }
            Envelope::Message(message) => {
                let Some(mut message) =
                    self.inner.message_modules.on_receiving(message).await
                else {
                    return Ok(());
                };
                self.fill_inbound(&mut message.from, &mut message.to);
                self.inner.messages.post(message)
            }
            Envelope::Notification(notification) => {
                let Some(mut notification) = self
                    .inner
                    .notification_modules
                    .on_receiving(notification)
                    .await
                else {
                    return Ok(());
                };
                self.fill_inbound(&mut notification.from, &mut notification.to);
                self.inner.notifications.post(notification)
            }
            Envelope::Command(command) => {
                let Some(mut command) = self.inner.command_modules.on_receiving(command).await
                else {
                    return Ok(());
                };
                self.fill_inbound(&mut command.from, &mut command.to);
                self.inner.commands.post(command)
            }
            Envelope::Session(session) => {
                // Terminal-state frames drive teardown; anything else has
                // no business arriving on an established session.
                if matches!(
                    session.state,
                    SessionState::Finishing | SessionState::Finished | SessionState::Failed
                ) {
                    self.inner.sessions.post(session)
                } else {
                    Err(ChannelError::ProtocolViolation(format!(
                        "unexpected {} session envelope on an established session",
                        session.state
                    )))
                }
            }
        }
    }

    /// Record the fault, fail the session, cancel the scope and close the
    /// transport. The first fault wins; every pending and future receive
    /// observes it.
    async fn fault(&self, reason: String) {
        {
            let mut slot = self
                .inner
                .fault
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(reason.clone());
            }
        }
        error!(%reason, "channel fault");
        let _ = self.set_state(SessionState::Failed);
        self.inner.scope.cancel();
        let close = self.inner.transport.close(CancellationToken::none());
        if tokio::time::timeout(self.inner.config.close_timeout(), close)
            .await
            .is_err()
        {
            warn!("transport close timed out after fault");
        }
    }

    /// Drain the outbox onto the transport.
    async fn writer_loop(self, mut outbox: mpsc::Receiver<Envelope>) {
        let scope_token = self.inner.scope.token();
        loop {
            let envelope = tokio::select! {
                maybe = outbox.recv() => match maybe {
                    Some(envelope) => envelope,
                    None => break,
                },
                () = scope_token.cancelled() => break,
            };
            if let Err(err) = self.raw_send(envelope, &CancellationToken::none()).await {
                self.fault(format!("outbox send failed: {err}")).await;
                break;
            }
        }
        trace!("outbox writer stopped");
    }
}
