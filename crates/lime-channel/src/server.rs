//! Server side of the session handshake.

use std::future::Future;

use tracing::{debug, info, warn};

use lime_core::reason::codes;
use lime_core::{
    Authentication, AuthenticationResult, AuthenticationScheme, Identity, Node, Reason, Session,
    SessionCompression, SessionEncryption, SessionState, new_envelope_id,
};
use lime_transport::{CancellationToken, Transport};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Drives the accepting side of the handshake over a channel.
pub struct ServerChannel<T: Transport> {
    channel: Channel<T>,
    local_node: Node,
}

impl<T: Transport> ServerChannel<T> {
    /// A server channel announcing itself as `local_node`.
    pub fn new(transport: T, config: ChannelConfig, local_node: Node) -> Self {
        let channel = Channel::new(transport, config);
        channel.set_local_node(local_node.clone());
        Self {
            channel,
            local_node,
        }
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn into_channel(self) -> Channel<T> {
        self.channel
    }

    /// Accept one session: await the client's `new`, negotiate options,
    /// challenge for authentication and establish (or fail) the session.
    ///
    /// `authenticate` judges the presented credentials; `register` maps
    /// the client's candidate node to the node the session is bound to
    /// (`None` refuses the registration). The negotiable options are the
    /// intersection of the given lists with what the transport supports;
    /// negotiation is skipped when nothing is actually negotiable.
    pub async fn establish_session<A, AFut, R, RFut>(
        &self,
        compression_options: &[SessionCompression],
        encryption_options: &[SessionEncryption],
        scheme_options: &[AuthenticationScheme],
        authenticate: A,
        register: R,
        token: CancellationToken,
    ) -> Result<Session, ChannelError>
    where
        A: Fn(Identity, Authentication) -> AFut,
        AFut: Future<Output = AuthenticationResult>,
        R: Fn(Node) -> RFut,
        RFut: Future<Output = Option<Node>>,
    {
        self.require(SessionState::New)?;

        // Client opens with a bare `new` session.
        let opening = self.receive_step(token.clone()).await?;
        if opening.state != SessionState::New {
            let reason = Reason::new(
                codes::SESSION_UNSUPPORTED_ENVELOPE,
                format!("expected a new session, got {}", opening.state),
            );
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        }
        let session_id = new_envelope_id();
        self.channel.set_session_id(session_id.clone());
        debug!(%session_id, "session opened");

        let compression = intersect(compression_options, &self.transport_compression());
        let encryption = intersect(encryption_options, &self.transport_encryption());
        if compression.is_empty() || encryption.is_empty() {
            let reason = Reason::new(
                codes::SESSION_NEGOTIATION_INVALID_OPTIONS,
                "no negotiable transport options",
            );
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        }

        let nothing_to_negotiate = compression == [self.channel.transport().compression()]
            && encryption == [self.channel.transport().encryption()];
        if !nothing_to_negotiate {
            self.negotiate(&compression, &encryption, token.clone())
                .await?;
        }

        self.challenge_and_authenticate(scheme_options, authenticate, register, token)
            .await
    }

    /// Offer the options, validate the client's choice, confirm it and
    /// reconfigure the transport.
    async fn negotiate(
        &self,
        compression_options: &[SessionCompression],
        encryption_options: &[SessionEncryption],
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        self.channel.set_state(SessionState::Negotiating)?;
        let mut offer = self.session_frame(SessionState::Negotiating);
        offer.compression_options = Some(compression_options.to_vec());
        offer.encryption_options = Some(encryption_options.to_vec());
        self.channel.send_session(offer, token.clone()).await?;

        let choice = match self.receive_step(token.clone()).await {
            Ok(choice) => choice,
            Err(ChannelError::Timeout) => {
                let reason = Reason::from_code(codes::SESSION_NEGOTIATION_TIMEOUT);
                self.fail_session(reason, token).await?;
                return Err(ChannelError::Timeout);
            }
            Err(err) => return Err(err),
        };
        let valid = choice.state == SessionState::Negotiating
            && choice
                .compression
                .is_some_and(|c| compression_options.contains(&c))
            && choice
                .encryption
                .is_some_and(|e| encryption_options.contains(&e));
        if !valid {
            let reason = Reason::new(
                codes::SESSION_NEGOTIATION_INVALID_OPTIONS,
                "invalid negotiation choice",
            );
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        }
        let compression = choice.compression.unwrap_or(SessionCompression::None);
        let encryption = choice.encryption.unwrap_or(SessionEncryption::None);

        let mut confirmation = self.session_frame(SessionState::Negotiating);
        confirmation.compression = Some(compression);
        confirmation.encryption = Some(encryption);
        self.channel.send_session(confirmation, token.clone()).await?;

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

    async fn challenge_and_authenticate<A, AFut, R, RFut>(
        &self,
        scheme_options: &[AuthenticationScheme],
        authenticate: A,
        register: R,
        token: CancellationToken,
    ) -> Result<Session, ChannelError>
    where
        A: Fn(Identity, Authentication) -> AFut,
        AFut: Future<Output = AuthenticationResult>,
        R: Fn(Node) -> RFut,
        RFut: Future<Output = Option<Node>>,
    {
        self.channel.set_state(SessionState::Authenticating)?;
        let mut challenge = self.session_frame(SessionState::Authenticating);
        challenge.scheme_options = Some(scheme_options.to_vec());
        self.channel.send_session(challenge, token.clone()).await?;

        let answer = match self.receive_step(token.clone()).await {
            Ok(answer) => answer,
            Err(ChannelError::Timeout) => {
                let reason = Reason::from_code(codes::SESSION_AUTHENTICATION_TIMEOUT);
                self.fail_session(reason, token).await?;
                return Err(ChannelError::Timeout);
            }
            Err(err) => return Err(err),
        };

        let credentials = match (answer.state, answer.from, answer.authentication) {
            (SessionState::Authenticating, Some(node), Some(authentication))
                if scheme_options.contains(&authentication.scheme()) =>
            {
                Some((node, authentication))
            }
            _ => None,
        };
        let Some((candidate, authentication)) = credentials else {
            let reason = Reason::new(
                codes::SESSION_AUTHENTICATION_FAILED,
                "missing or unacceptable credentials",
            );
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        };

        let identity = candidate.to_identity();
        let result = authenticate(identity.clone(), authentication).await;
        if !result.is_successful {
            warn!(%identity, "authentication failed");
            let reason = Reason::from_code(codes::SESSION_AUTHENTICATION_FAILED);
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        }

        let Some(remote_node) = register(candidate).await else {
            let reason = Reason::from_code(codes::SESSION_REGISTRATION_ERROR);
            self.fail_session(reason.clone(), token).await?;
            return Err(ChannelError::SessionFailed(reason));
        };
        self.channel.set_remote_node(remote_node.clone());

        let mut established = self.session_frame(SessionState::Established);
        established.from = Some(self.local_node.clone());
        established.to = Some(remote_node.clone());
        self.channel
            .send_session(established.clone(), token)
            .await?;
        if let Some(pump) = self.channel.set_state(SessionState::Established)? {
            self.channel.spawn_pump(pump);
        }
        info!(
            session_id = self.channel.session_id().as_deref(),
            remote = %remote_node,
            "session established"
        );
        Ok(established)
    }

    /// Reply `finished` to a client's `finishing` and close the channel.
    pub async fn finish_session(&self, token: CancellationToken) -> Result<(), ChannelError> {
        self.require(SessionState::Established)?;
        // Enter Finishing before the reply goes out: the client closes its
        // transport as soon as it sees `finished`, and the pump must read
        // that close as teardown rather than a fault.
        self.channel.set_state(SessionState::Finishing)?;
        let mut frame = self.session_frame(SessionState::Finished);
        frame.to = self.channel.remote_node();
        self.channel.send_session(frame, token.clone()).await?;
        self.channel.set_state(SessionState::Finished)?;
        info!(
            session_id = self.channel.session_id().as_deref(),
            "session finished"
        );
        self.channel.close(token).await
    }

    /// Fail the session with a reason and close the channel.
    pub async fn fail_session(
        &self,
        reason: Reason,
        token: CancellationToken,
    ) -> Result<(), ChannelError> {
        let mut frame = self.session_frame(SessionState::Failed);
        frame.reason = Some(reason);
        self.channel.send_session(frame, token.clone()).await?;
        let _ = self.channel.set_state(SessionState::Failed);
        self.channel.close(token).await
    }

    fn transport_compression(&self) -> Vec<SessionCompression> {
        self.channel.transport().supported_compression()
    }

    fn transport_encryption(&self) -> Vec<SessionEncryption> {
        self.channel.transport().supported_encryption()
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

/// The `enabled` options that the transport also supports, in the
/// transport's preference order.
fn intersect<O: Copy + PartialEq>(enabled: &[O], supported: &[O]) -> Vec<O> {
    supported
        .iter()
        .copied()
        .filter(|option| enabled.contains(option))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_keeps_supported_order() {
        let enabled = [SessionEncryption::Tls, SessionEncryption::None];
        let supported = [SessionEncryption::None, SessionEncryption::Tls];
        assert_eq!(
            intersect(&enabled, &supported),
            vec![SessionEncryption::None, SessionEncryption::Tls]
        );
    }

    #[test]
    fn empty_intersection_when_nothing_shared() {
        let enabled = [SessionCompression::Gzip];
        let supported = [SessionCompression::None];
        assert!(intersect(&enabled, &supported).is_empty());
    }
}
