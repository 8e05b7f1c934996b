//! Client side of the session handshake.

use tracing::{debug, info};

use lime_core::reason::codes;
use lime_core::{
    Authentication, Identity, Node, Reason, Session, SessionCompression, SessionEncryption,
    SessionState,
};
use lime_transport::{CancellationToken, Transport};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Drives the initiating side of the handshake over a channel.
///
/// The composite [`ClientChannel::establish_session`] runs the whole
/// flow; the step operations are public for callers that need finer
/// control over negotiation rounds.
pub struct ClientChannel<T: Transport> {
    channel: Channel<T>,
}

impl<T: Transport> ClientChannel<T> {
    pub fn new(transport: T, config: ChannelConfig) -> Self {
        Self {
            channel: Channel::new(transport, config),
        }
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn into_channel(self) -> Channel<T> {
        self.channel
    }

    /// Open the handshake: send a `new` session and await the server's
    /// first move (a negotiation offer, an authentication challenge, or a
    /// failure).
    pub async fn start_new_session(
        &self,
        token: CancellationToken,
    ) -> Result<Session, ChannelError> {
        self.require(SessionState::New)?;
        self.channel
            .send_session(Session::new(SessionState::New), token.clone())
            .await?;
        let session = self.receive_step(token).await?;
        if let Some(id) = &session.id {
            self.channel.set_session_id(id.clone());
        }
        match session.state {
            SessionState::Negotiating => {
                self.channel.set_state(SessionState::Negotiating)?;
            }
            SessionState::Authenticating => {
                self.channel.set_state(SessionState::Authenticating)?;
            }
            SessionState::Failed => return Err(session_failed(session)),
            other => {
                return Err(ChannelError::ProtocolViolation(format!(
                    "expected a negotiating or authenticating session, got {other}"
                )));
            }
        }
        Ok(session)
    }

    /// Send the chosen negotiation options and await the server's
    /// confirmation.
    pub async fn negotiate_session(
        &self,
        compression: SessionCompression,
        encryption: SessionEncryption,
        token: CancellationToken,
    ) -> Result<Session, ChannelError> {
        self.require(SessionState::Negotiating)?;
        let mut frame = self.session_frame(SessionState::Negotiating);
        frame.compression = Some(compression);
        frame.encryption = Some(encryption);
        self.channel.send_session(frame, token.clone()).await?;

        let session = self.receive_step(token).await?;
        match session.state {
            SessionState::Negotiating => Ok(session),
            SessionState::Failed => Err(session_failed(session)),
            other => Err(ChannelError::ProtocolViolation(format!(
                "expected a negotiation confirmation, got {other}"
            ))),
        }
    }

    /// Answer the authentication challenge and await the verdict. On
    /// success the channel becomes established and its pump starts.
    pub async fn authenticate_session(
        &self,
        local_node: Node,
        authentication: Authentication,
        token: CancellationToken,
    ) -> Result<Session, ChannelError> {
        self.require(SessionState::Authenticating)?;
        let mut frame = self.session_frame(SessionState::Authenticating);
        frame.from = Some(local_node.clone());
        frame.authentication = Some(authentication);
        self.channel.send_session(frame, token.clone()).await?;

        let session = self.receive_step(token).await?;
        match session.state {
            SessionState::Established => {
                // The server may assign the full node (with instance).
                let assigned = session.to.clone().unwrap_or(local_node);
                self.channel.set_local_node(assigned);
                if let Some(remote) = session.from.clone() {
                    self.channel.set_remote_node(remote);
                }
                if let Some(pump) = self.channel.set_state(SessionState::Established)? {
                    self.channel.spawn_pump(pump);
                }
                info!(
                    session_id = session.id.as_deref(),
                    "session established"
                );
                Ok(session)
            }
            SessionState::Failed => {
                let _ = self.channel.set_state(SessionState::Failed);
                Err(session_failed(session))
            }
            other => Err(ChannelError::ProtocolViolation(format!(
                "expected an established session, got {other}"
            ))),
        }
    }

    /// Run the whole handshake: open, negotiate when offered, then
    /// authenticate as `identity` (optionally with a preferred instance).
    pub async fn establish_session<FC, FE>(
        &self,
        select_compression: FC,
        select_encryption: FE,
        identity: Identity,
        instance: Option<String>,
        authentication: Authentication,
        token: CancellationToken,
    ) -> Result<Session, ChannelError>
    where
        FC: Fn(&[SessionCompression]) -> Option<SessionCompression>,
        FE: Fn(&[SessionEncryption]) -> Option<SessionEncryption>,
    {
        let mut session = self.start_new_session(token.clone()).await?;

        if session.state == SessionState::Negotiating {
            let compression = select_compression(
                session.compression_options.as_deref().unwrap_or_default(),
            )
            .ok_or_else(|| {
                ChannelError::ProtocolViolation("no acceptable compression option".into())
            })?;
            let encryption =
                select_encryption(session.encryption_options.as_deref().unwrap_or_default())
                    .ok_or_else(|| {
                        ChannelError::ProtocolViolation("no acceptable encryption option".into())
                    })?;
            let confirmation = self
                .negotiate_session(compression, encryption, token.clone())
                .await?;

            let compression = confirmation.compression.unwrap_or(compression);
            let encryption = confirmation.encryption.unwrap_or(encryption);
            self.apply_negotiated(compression, encryption, token.clone())
                .await?;

            session = self.receive_step(token.clone()).await?;
            match session.state {
                SessionState::Authenticating => {
                    self.channel.set_state(SessionState::Authenticating)?;
                }
                SessionState::Failed => return Err(session_failed(session)),
                other => {
                    return Err(ChannelError::ProtocolViolation(format!(
                        "expected an authentication challenge, got {other}"
                    )));
                }
            }
        }

        if let Some(schemes) = &session.scheme_options {
            if !schemes.contains(&authentication.scheme()) {
                return Err(ChannelError::ProtocolViolation(format!(
                    "server does not accept the {} scheme",
                    authentication.scheme()
                )));
            }
        }

        let local_node = Node {
            identity,
            instance,
        };
        self.authenticate_session(local_node, authentication, token)
            .await
    }

    /// Finish the established session gracefully: send `finishing`, await
    /// the server's `finished`, then close the transport.
    pub async fn finish_session(&self, token: CancellationToken) -> Result<(), ChannelError> {
        self.require(SessionState::Established)?;
        let frame = self.session_frame(SessionState::Finishing);
        self.channel.send_session(frame, token.clone()).await?;
        self.channel.set_state(SessionState::Finishing)?;

        let session = self.receive_step(token.clone()).await?;
        match session.state {
            SessionState::Finished => {
                self.channel.set_state(SessionState::Finished)?;
                info!(session_id = session.id.as_deref(), "session finished");
                self.channel.close(token).await
            }
            SessionState::Failed => {
                let _ = self.channel.set_state(SessionState::Failed);
                Err(session_failed(session))
            }
            other => Err(ChannelError::ProtocolViolation(format!(
                "expected a finished session, got {other}"
            ))),
        }
    }

    /// Reconfigure the transport when the negotiated settings differ
    /// from the active ones.
    async fn apply_negotiated(
        &self,
        compression: SessionCompression,
        encryption: SessionEncryption,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        let transport = self.channel.transport();
        if transport.compression() != compression {
            debug!(%compression, "applying negotiated compression");
            transport.set_compression(compression, token.clone()).await?;
        }
        if transport.encryption() != encryption {
            debug!(%encryption, "applying negotiated encryption");
            transport.set_encryption(encryption, token).await?;
        }
        Ok(())
    }

    async fn receive_step(&self, token: CancellationToken) -> Result<Session, ChannelError> {
        let timeout = self.channel.config().handshake_timeout();
        match tokio::time::timeout(timeout, self.channel.receive_session(token)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout),
        }
    }

    fn session_frame(&self, state: SessionState) -> Session {
        Session {
            id: self.channel.session_id(),
            ..Session::new(state)
        }
    }

    fn require(&self, expected: SessionState) -> Result<(), ChannelError> {
        let actual = self.channel.state();
        if actual != expected {
            return Err(ChannelError::invalid_state(expected, actual));
        }
        Ok(())
    }
}

fn session_failed(session: Session) -> ChannelError {
    ChannelError::SessionFailed(
        session
            .reason
            .unwrap_or_else(|| Reason::from_code(codes::SESSION_ERROR)),
    )
}
