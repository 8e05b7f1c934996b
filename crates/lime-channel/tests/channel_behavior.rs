//! Channel semantics after establishment: preconditions, module
//! pipelines, demultiplexing, fault fan-out and backpressure.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lime_channel::{
    Channel, ChannelConfig, ChannelError, ChannelListener, ChannelModule, ClientChannel,
    RemotePingModule, ResendMessagesModule, ServerChannel,
};
use lime_core::{
    Authentication, AuthenticationResult, AuthenticationScheme, Command, CommandMethod, Document,
    DocumentContent, DomainRole, Identity, LimeUri, Message, Node, Notification,
    NotificationEvent, SessionCompression, SessionEncryption, SessionState,
};
use lime_transport::{CancellationToken, MemoryTransport, Transport};

fn token() -> CancellationToken {
    CancellationToken::none()
}

fn text_of(message: &Message) -> &str {
    match &message.content.content {
        DocumentContent::Text(text) => text,
        DocumentContent::Json(_) => panic!("expected a text document"),
    }
}

/// Establish a guest session over a non-negotiable transport pair,
/// letting the caller configure the client channel (e.g. register
/// modules) before the handshake runs.
async fn establish_with(
    config: ChannelConfig,
    configure_client: impl FnOnce(&Channel<MemoryTransport>),
) -> (ClientChannel<MemoryTransport>, ServerChannel<MemoryTransport>) {
    lime_channel::logging::init_for_tests();
    let (client_side, server_side) = MemoryTransport::pair_with_options(
        vec![SessionCompression::None],
        vec![SessionEncryption::None],
    );
    client_side.open("mem://pair", token()).await.unwrap();
    server_side.open("mem://pair", token()).await.unwrap();

    let server = ServerChannel::new(
        server_side,
        config.clone(),
        Node::new("postmaster", "example.com", None),
    );
    let server_task = tokio::spawn(async move {
        let result = server
            .establish_session(
                &[SessionCompression::None],
                &[SessionEncryption::None],
                &[AuthenticationScheme::Guest],
                |_identity, _authentication| async move {
                    AuthenticationResult::success(DomainRole::Member)
                },
                |candidate| async move { Some(candidate) },
                token(),
            )
            .await;
        (server, result)
    });

    let client = ClientChannel::new(client_side, config);
    configure_client(client.channel());
    client
        .establish_session(
            |options| options.first().copied(),
            |options| options.first().copied(),
            Identity::new("alice", "example.com"),
            Some("work".to_string()),
            Authentication::Guest,
            token(),
        )
        .await
        .unwrap();

    let (server, result) = server_task.await.unwrap();
    result.unwrap();
    (client, server)
}

async fn establish(
    config: ChannelConfig,
) -> (ClientChannel<MemoryTransport>, ServerChannel<MemoryTransport>) {
    establish_with(config, |_| {}).await
}

#[tokio::test]
async fn operations_require_establishment() {
    let (transport, _peer) = MemoryTransport::pair();
    transport.open("mem://pair", token()).await.unwrap();
    let channel = Channel::new(transport, ChannelConfig::default());

    let send = channel
        .send_message(Message::new(Document::text("early")), token())
        .await;
    assert!(matches!(
        send,
        Err(ChannelError::InvalidState {
            actual: SessionState::New,
            ..
        })
    ));

    let receive = channel.receive_message(token()).await;
    assert!(matches!(receive, Err(ChannelError::InvalidState { .. })));
    // No envelope reached the transport.
    assert!(channel.transport().is_connected());
}

struct Recorder {
    tag: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ChannelModule<Message> for Recorder {
    async fn on_sending(&self, envelope: Message) -> Option<Message> {
        self.log.lock().unwrap().push(self.tag);
        Some(envelope)
    }
}

struct DropMarked;

#[async_trait]
impl ChannelModule<Message> for DropMarked {
    async fn on_sending(&self, envelope: Message) -> Option<Message> {
        if text_of(&envelope) == "drop" {
            None
        } else {
            Some(envelope)
        }
    }
}

#[tokio::test]
async fn modules_apply_in_order_and_may_suppress() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_a = Arc::clone(&log);
    let log_b = Arc::clone(&log);
    let (client, server) = establish_with(ChannelConfig::default(), move |channel| {
        channel.register_message_module(Arc::new(Recorder {
            tag: "first",
            log: log_a,
        }));
        channel.register_message_module(Arc::new(DropMarked));
        channel.register_message_module(Arc::new(Recorder {
            tag: "second",
            log: log_b,
        }));
    })
    .await;
    let client = client.channel();
    let server = server.channel();

    // The suppressed message never reaches the transport; the later
    // module never runs for it.
    client
        .send_message(Message::new(Document::text("drop")), token())
        .await
        .unwrap();
    client
        .send_message(Message::new(Document::text("keep")), token())
        .await
        .unwrap();

    let received = server.receive_message(token()).await.unwrap();
    assert_eq!(text_of(&received), "keep");
    assert_eq!(*log.lock().unwrap(), vec!["first", "first", "second"]);
}

#[tokio::test]
async fn registered_built_in_modules_observe_live_traffic() {
    let mut resend = None;
    let (client, server) = establish_with(ChannelConfig::default(), |channel| {
        RemotePingModule::register(channel, Duration::from_secs(60));
        resend = Some(ResendMessagesModule::register(
            channel,
            Duration::from_secs(60),
            3,
        ));
    })
    .await;
    let resend = resend.unwrap();
    let client = client.channel();
    let server = server.channel();

    let message = Message::new(Document::text("needs ack"));
    let message_id = message.id.clone().unwrap();
    client.send_message(message, token()).await.unwrap();
    assert_eq!(resend.pending_count(), 1);

    server.receive_message(token()).await.unwrap();
    server
        .send_notification(
            Notification::new(message_id, NotificationEvent::Received),
            token(),
        )
        .await
        .unwrap();

    client.receive_notification(token()).await.unwrap();
    assert_eq!(resend.pending_count(), 0);
}

#[tokio::test]
async fn inbound_traffic_demultiplexes_by_kind() {
    let (client, server) = establish(ChannelConfig::default()).await;
    let client = client.channel();
    let server = server.channel();

    let presence: LimeUri = "/presence".parse().unwrap();
    client
        .send_command(Command::request(CommandMethod::Get, presence), token())
        .await
        .unwrap();
    client
        .send_notification(
            Notification::new("m-1", NotificationEvent::Consumed),
            token(),
        )
        .await
        .unwrap();
    client
        .send_message(Message::new(Document::text("hello")), token())
        .await
        .unwrap();

    // Each kind lands in its own buffer, whatever the consumption order.
    let message = server.receive_message(token()).await.unwrap();
    assert_eq!(text_of(&message), "hello");
    let notification = server.receive_notification(token()).await.unwrap();
    assert_eq!(notification.event, NotificationEvent::Consumed);
    let command = server.receive_command(token()).await.unwrap();
    assert_eq!(command.method, CommandMethod::Get);
}

#[tokio::test]
async fn fault_fans_out_to_every_receiver() {
    let (client, server) = establish(ChannelConfig::default()).await;
    let server = server.channel();

    let waiting_messages = {
        let server = server.clone();
        tokio::spawn(async move { server.receive_message(token()).await })
    };
    let waiting_commands = {
        let server = server.clone();
        tokio::spawn(async move { server.receive_command(token()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Abrupt transport loss, not a graceful finish.
    client.channel().transport().close(token()).await.unwrap();

    let first = waiting_messages.await.unwrap().unwrap_err();
    let second = waiting_commands.await.unwrap().unwrap_err();
    let ChannelError::Faulted(first_reason) = first else {
        panic!("expected a fault, got {first}");
    };
    let ChannelError::Faulted(second_reason) = second else {
        panic!("expected a fault, got {second}");
    };
    assert_eq!(first_reason, second_reason);

    // Later operations observe the same fault.
    let late = server.receive_notification(token()).await.unwrap_err();
    assert!(matches!(late, ChannelError::Faulted(reason) if reason == first_reason));
    let send = server
        .send_message(Message::new(Document::text("too late")), token())
        .await
        .unwrap_err();
    assert!(matches!(send, ChannelError::Faulted(_)));
}

#[tokio::test]
async fn buffer_overflow_is_fatal() {
    let config = ChannelConfig {
        buffer_capacity: 1,
        ..ChannelConfig::default()
    };
    let (client, server) = establish(config).await;
    let client = client.channel();
    let server = server.channel();

    // Nobody consumes on the server: the second message overflows the
    // one-slot buffer and faults the channel.
    for i in 0..3 {
        let _ = client
            .send_message(Message::new(Document::text(format!("m{i}"))), token())
            .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = server.receive_message(token()).await.unwrap_err();
    let ChannelError::Faulted(reason) = err else {
        panic!("expected a fault, got {err}");
    };
    assert!(reason.contains("buffer is full"), "reason: {reason}");
    assert!(server.fault_reason().is_some());
}

#[tokio::test]
async fn listener_feeds_consumers_until_stopped() {
    let (client, server) = establish(ChannelConfig::default()).await;
    let client = client.channel();

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    let listener = ChannelListener::new(server.channel().clone());
    listener.start(
        move |message: Message| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(text_of(&message).to_string());
                true
            }
        },
        |_notification: Notification| async move { true },
        |_command: Command| async move { true },
    );
    assert!(listener.is_started());

    client
        .send_message(Message::new(Document::text("one")), token())
        .await
        .unwrap();
    client
        .send_message(Message::new(Document::text("two")), token())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    listener.stop().await;
    assert_eq!(*collected.lock().unwrap(), vec!["one", "two"]);
}
