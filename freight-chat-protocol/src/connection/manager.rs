//! Connection Manager
//!
//! Owns the single live STOMP session to the chat server, supervises it,
//! and reconnects after unexpected drops.
//!
//! ## Task model
//!
//! [`ChatClient`] is a cheap, cloneable handle. Every clone talks to one
//! background task through a command channel; that task is the only owner
//! of the transport and of the subscription bookkeeping. State is published
//! through a `watch` channel and events through the [`EventBus`].
//!
//! ```text
//! Idle ──connect──▶ Connecting ──CONNECTED──▶ Connected
//!  ▲                    │                        │
//!  │                 failure              unexpected close
//!  │                    ▼                        ▼
//!  └──── attempts ── Reconnecting(k) ◀───────────┘
//!        exhausted      │ k * base delay
//!                       └──────▶ Connecting
//! ```
//!
//! A deliberate [`ChatClient::disconnect`] passes through `Closing` and
//! lands in `Idle` without scheduling a retry.
//!
//! The task stops once every handle has been dropped.

use super::events::{ChatEvent, EventBus, EventListener};
use super::state::{ConnectionPhase, ConnectionState};
use crate::config::ChatConfig;
use crate::message::{parse_live_payload, ConversationId, OutboundPayload};
use crate::recovery::ReconnectionStrategy;
use crate::stomp::{self, Command as StompCommand, Frame, FrameParser, HeartBeat, Inbound};
use crate::subscription::{Subscription, SubscriptionManager};
use crate::transport::{Transport, TransportFactory};
use crate::{ChatError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, sleep_until, Instant, Sleep};
use tracing::{debug, error, info, trace, warn};

/// Commands sent from client handles to the connection task
enum ClientCommand {
    /// Open a session
    Connect {
        credential: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Bind the session to a conversation
    Subscribe(ConversationId),
    /// Release the current conversation
    Unsubscribe,
    /// Publish an outbound message
    Publish {
        conversation: ConversationId,
        payload: OutboundPayload,
    },
    /// Deliberate teardown
    Disconnect,
}

/// Handle to the chat connection
///
/// Must be created inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: Arc<ChatConfig>,
    commands: mpsc::UnboundedSender<ClientCommand>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: EventBus,
}

impl std::fmt::Debug for ClientCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientCommand::Connect { .. } => write!(f, "Connect"),
            ClientCommand::Subscribe(id) => write!(f, "Subscribe({})", id),
            ClientCommand::Unsubscribe => write!(f, "Unsubscribe"),
            ClientCommand::Publish { conversation, .. } => write!(f, "Publish({})", conversation),
            ClientCommand::Disconnect => write!(f, "Disconnect"),
        }
    }
}

impl ChatClient {
    /// Create a client and start its connection task
    pub fn new(config: ChatConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let config = Arc::new(config);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::default());
        let state = Arc::new(state);
        let events = EventBus::new();

        let task = ConnectionTask {
            strategy: ReconnectionStrategy::new(
                config.max_reconnect_attempts,
                config.reconnect_base_delay,
            ),
            config: config.clone(),
            factory,
            state: state.clone(),
            events: events.clone(),
            commands: command_rx,
            subscriptions: SubscriptionManager::new(),
            credential: None,
            resume: None,
            phase: Phase::Idle,
        };
        tokio::spawn(task.run());

        Self {
            config,
            commands,
            state,
            events,
        }
    }

    /// Open the session with a bearer credential
    ///
    /// Resolves once the STOMP handshake finished, failed, or timed out.
    /// Returns immediately when a session is already established or being
    /// established. A failure here never starts automatic retry.
    pub async fn connect(&self, credential: &str) -> Result<()> {
        let credential = credential.trim();
        if credential.is_empty() {
            let error = ChatError::MissingCredential;
            self.state
                .send_modify(|state| state.last_error = Some(error.to_string()));
            self.events.emit(ChatEvent::Error(error.to_string()));
            return Err(error);
        }

        {
            let state = self.state.borrow();
            if state.connected() || state.connecting() {
                debug!("Connect ignored, chat client already {}", state.phase);
                return Ok(());
            }
        }

        let (reply, response) = oneshot::channel();
        self.dispatch(ClientCommand::Connect {
            credential: credential.to_string(),
            reply,
        })?;
        response.await.map_err(|_| ChatError::TaskStopped)?
    }

    /// Tear the session down without triggering automatic retry
    ///
    /// The state flips to `Closing` before this returns, so a send issued
    /// right afterwards already fails with "not connected".
    pub fn disconnect(&self) {
        self.state
            .send_modify(|state| state.phase = ConnectionPhase::Closing);
        if self.dispatch(ClientCommand::Disconnect).is_err() {
            debug!("Disconnect after connection task stopped");
        }
    }

    /// Bind the session to a conversation's topic
    ///
    /// The previous subscription, if any, is released first.
    pub fn subscribe_to_conversation(&self, conversation: ConversationId) -> Result<()> {
        if !self.is_connected() {
            return Err(self.reject(ChatError::NotConnected));
        }
        self.dispatch(ClientCommand::Subscribe(conversation))
    }

    /// Release the current subscription; a no-op when there is none
    pub fn unsubscribe_from_current(&self) -> Result<()> {
        self.dispatch(ClientCommand::Unsubscribe)
    }

    /// Publish a message to a conversation
    ///
    /// Whitespace-only content is ignored. Delivery is fire-and-forget; a
    /// transport failure is reported as an error event.
    pub fn send_message(&self, conversation: Option<ConversationId>, content: &str) -> Result<()> {
        let conversation = conversation.ok_or(ChatError::NoActiveConversation)?;
        let Some(payload) = OutboundPayload::compose(content) else {
            trace!("Ignoring empty outbound message");
            return Ok(());
        };
        if !self.is_connected() {
            return Err(self.reject(ChatError::NotConnected));
        }
        self.dispatch(ClientCommand::Publish {
            conversation,
            payload,
        })
    }

    /// Register an event listener
    pub fn listen(&self) -> EventListener {
        self.events.listen()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether a session is established
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected()
    }

    /// Conversation the session is bound to
    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.state.borrow().conversation
    }

    /// Client configuration
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn reject(&self, error: ChatError) -> ChatError {
        self.events.emit(ChatEvent::Error(error.to_string()));
        error
    }

    fn dispatch(&self, command: ClientCommand) -> Result<()> {
        trace!("Dispatching {:?}", command);
        self.commands
            .send(command)
            .map_err(|_| ChatError::TaskStopped)
    }
}

/// An established STOMP session
struct Session {
    transport: Box<dyn Transport>,
    parser: FrameParser,
    send_every: Option<Duration>,
    expect_every: Option<Duration>,
    next_heartbeat: Instant,
    last_inbound: Instant,
}

type Handshake = Pin<Box<dyn Future<Output = Result<Session>> + Send>>;

enum Phase {
    Idle,
    Connecting {
        handshake: Handshake,
        reply: Option<oneshot::Sender<Result<()>>>,
        // 0 for a caller-initiated connect
        attempt: u32,
    },
    Connected(Session),
    Reconnecting {
        attempt: u32,
        resume_at: Pin<Box<Sleep>>,
    },
}

enum PhaseEvent {
    Handshake(Result<Session>),
    Received(Result<Option<String>>),
    HeartbeatDue,
    HeartbeatMissed,
    RetryDue,
}

/// Wait for whatever the current phase is waiting on
///
/// Cancel safe: pending handshakes and retry timers live in the phase
/// itself, and transports buffer partially consumed input.
async fn next_event(phase: &mut Phase) -> PhaseEvent {
    match phase {
        Phase::Idle => std::future::pending().await,
        Phase::Connecting { handshake, .. } => PhaseEvent::Handshake(handshake.as_mut().await),
        Phase::Reconnecting { resume_at, .. } => {
            resume_at.as_mut().await;
            PhaseEvent::RetryDue
        }
        Phase::Connected(session) => {
            let heartbeat = deadline(session.send_every.map(|_| session.next_heartbeat));
            let watchdog = deadline(
                session
                    .expect_every
                    .map(|every| session.last_inbound + every * 2),
            );
            tokio::select! {
                received = session.transport.receive_text() => PhaseEvent::Received(received),
                _ = heartbeat => PhaseEvent::HeartbeatDue,
                _ = watchdog => PhaseEvent::HeartbeatMissed,
            }
        }
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Open a transport and run the STOMP handshake under the connect timeout
async fn open_session(
    factory: Arc<dyn TransportFactory>,
    config: Arc<ChatConfig>,
    credential: String,
) -> Result<Session> {
    let timeout = config.connect_timeout;
    match tokio::time::timeout(timeout, handshake(factory.as_ref(), &config, &credential)).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout(timeout.as_millis() as u64)),
    }
}

async fn handshake(
    factory: &dyn TransportFactory,
    config: &ChatConfig,
    credential: &str,
) -> Result<Session> {
    let mut transport = factory.connect(&config.endpoint).await?;
    let host = config.endpoint.host_str().unwrap_or("localhost");
    let offered = config.heart_beat();
    transport
        .send_text(&stomp::connect_frame(host, credential, offered).encode())
        .await?;

    let mut parser = FrameParser::new();
    loop {
        let chunk = transport.receive_text().await?.ok_or_else(|| {
            ChatError::ConnectionClosed("closed during STOMP handshake".to_string())
        })?;
        parser.push(&chunk);

        while let Some(inbound) = parser.next_inbound()? {
            let Inbound::Frame(frame) = inbound else {
                continue;
            };
            match frame.command {
                StompCommand::Connected => {
                    let server = frame
                        .get_header("heart-beat")
                        .map(HeartBeat::parse)
                        .transpose()?
                        .unwrap_or_default();
                    let (send_every, expect_every) = offered.negotiate(server);
                    debug!(
                        "STOMP session established (version {}), heart-beat out {:?} in {:?}",
                        frame.get_header("version").unwrap_or("1.0"),
                        send_every,
                        expect_every
                    );
                    let now = Instant::now();
                    return Ok(Session {
                        transport,
                        parser,
                        send_every,
                        expect_every,
                        next_heartbeat: now + send_every.unwrap_or_default(),
                        last_inbound: now,
                    });
                }
                StompCommand::Error => {
                    return Err(ChatError::Handshake(stomp::error_reason(&frame)));
                }
                other => debug!("Ignoring {} frame during handshake", other),
            }
        }
    }
}

async fn send_frame(session: &mut Session, frame: &Frame) -> Result<()> {
    session.transport.send_text(&frame.encode()).await
}

/// Graceful close: release the topic, say goodbye, close the socket
async fn close_session(mut session: Session, released: Option<Subscription>) {
    if let Some(subscription) = released {
        if let Err(e) = send_frame(&mut session, &stomp::unsubscribe_frame(&subscription.id)).await {
            debug!("Failed to unsubscribe {} on close: {}", subscription.id, e);
        }
    }
    if let Err(e) = send_frame(&mut session, &stomp::disconnect_frame()).await {
        debug!("Failed to send DISCONNECT: {}", e);
    }
    if let Err(e) = session.transport.close().await {
        debug!("Transport close failed: {}", e);
    }
}

/// Background task owning the transport
struct ConnectionTask {
    config: Arc<ChatConfig>,
    factory: Arc<dyn TransportFactory>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: EventBus,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    subscriptions: SubscriptionManager,
    strategy: ReconnectionStrategy,
    credential: Option<String>,
    // Conversation to restore after a reconnect
    resume: Option<ConversationId>,
    phase: Phase,
}

impl ConnectionTask {
    async fn run(mut self) {
        debug!("Chat connection task started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_event(&mut self.phase) => self.handle_event(event).await,
            }
        }

        if let Phase::Connected(session) = std::mem::replace(&mut self.phase, Phase::Idle) {
            close_session(session, self.subscriptions.unsubscribe()).await;
        }
        debug!("Chat connection task stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect { credential, reply } => self.connect(credential, reply),
            ClientCommand::Subscribe(conversation) => self.subscribe(conversation).await,
            ClientCommand::Unsubscribe => self.unsubscribe().await,
            ClientCommand::Publish {
                conversation,
                payload,
            } => self.publish(conversation, payload).await,
            ClientCommand::Disconnect => self.disconnect().await,
        }
    }

    async fn handle_event(&mut self, event: PhaseEvent) {
        match event {
            PhaseEvent::Handshake(result) => self.finish_handshake(result).await,
            PhaseEvent::Received(Ok(Some(text))) => self.on_text(&text),
            PhaseEvent::Received(Ok(None)) => {
                self.connection_lost(ChatError::ConnectionClosed("closed by server".to_string()))
            }
            PhaseEvent::Received(Err(e)) => self.connection_lost(e),
            PhaseEvent::HeartbeatDue => self.send_heartbeat().await,
            PhaseEvent::HeartbeatMissed => self.connection_lost(ChatError::ConnectionClosed(
                "no heart-beat from server".to_string(),
            )),
            PhaseEvent::RetryDue => self.retry_due(),
        }
    }

    fn emit_error(&self, error: &ChatError) {
        self.events.emit(ChatEvent::Error(error.to_string()));
    }

    fn connect(&mut self, credential: String, reply: oneshot::Sender<Result<()>>) {
        match &self.phase {
            Phase::Connected(_) | Phase::Connecting { .. } => {
                debug!("Connect coalesced with existing session");
                let _ = reply.send(Ok(()));
                return;
            }
            Phase::Reconnecting { attempt, .. } => {
                info!("Manual connect cancels pending retry attempt {}", attempt);
            }
            Phase::Idle => {}
        }

        self.strategy.reset();
        self.credential = Some(credential);
        self.begin_handshake(Some(reply), 0);
    }

    fn begin_handshake(&mut self, reply: Option<oneshot::Sender<Result<()>>>, attempt: u32) {
        let Some(credential) = self.credential.clone() else {
            let error = ChatError::MissingCredential;
            self.emit_error(&error);
            if let Some(reply) = reply {
                let _ = reply.send(Err(error));
            }
            self.phase = Phase::Idle;
            self.state.send_modify(|state| state.phase = ConnectionPhase::Idle);
            return;
        };

        info!(
            "Connecting to chat server at {} via {}",
            self.config.endpoint,
            self.factory.transport_type()
        );
        let handshake = Box::pin(open_session(
            self.factory.clone(),
            self.config.clone(),
            credential,
        ));
        self.phase = Phase::Connecting {
            handshake,
            reply,
            attempt,
        };
        self.state.send_modify(|state| {
            state.phase = ConnectionPhase::Connecting;
            state.reconnect_attempts = attempt;
            if attempt == 0 {
                state.last_error = None;
            }
        });
    }

    async fn finish_handshake(&mut self, result: Result<Session>) {
        let Phase::Connecting { reply, attempt, .. } =
            std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };

        match result {
            Ok(session) => {
                info!(
                    "Connected to chat server at {}",
                    session.transport.remote_address()
                );
                self.phase = Phase::Connected(session);
                self.strategy.reset();

                // Restore the previous conversation before announcing
                if let Some(conversation) = self.resume {
                    self.subscribe(conversation).await;
                }

                self.state.send_modify(|state| {
                    state.phase = ConnectionPhase::Connected;
                    state.last_error = None;
                    state.reconnect_attempts = 0;
                });
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
                self.events.emit(ChatEvent::ConnectionChanged(true));
            }
            Err(e) if attempt > 0 => {
                warn!("Reconnect attempt {} failed: {}", attempt, e);
                self.emit_error(&e);
                self.schedule_retry(e.to_string());
            }
            Err(e) => {
                error!("Failed to connect to chat server: {}", e);
                self.state.send_modify(|state| {
                    state.phase = ConnectionPhase::Idle;
                    state.last_error = Some(e.to_string());
                });
                self.emit_error(&e);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
            }
        }
    }

    fn schedule_retry(&mut self, reason: String) {
        match self.strategy.next_delay() {
            Some((attempt, delay)) => {
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay, attempt, self.strategy.max_attempts
                );
                self.phase = Phase::Reconnecting {
                    attempt,
                    resume_at: Box::pin(sleep(delay)),
                };
                self.state.send_modify(|state| {
                    state.phase = ConnectionPhase::Reconnecting { attempt };
                    state.reconnect_attempts = attempt;
                    state.last_error = Some(reason);
                });
            }
            None => {
                let error = ChatError::MaxAttemptsExceeded(self.strategy.max_attempts);
                error!("{}", error);
                self.phase = Phase::Idle;
                let attempts = self.strategy.attempt;
                self.state.send_modify(|state| {
                    state.phase = ConnectionPhase::Idle;
                    state.reconnect_attempts = attempts;
                    state.last_error = Some(error.to_string());
                });
                self.emit_error(&error);
            }
        }
    }

    fn retry_due(&mut self) {
        let Phase::Reconnecting { attempt, .. } = self.phase else {
            return;
        };
        debug!("Retry timer fired for attempt {}", attempt);
        self.begin_handshake(None, attempt);
    }

    fn connection_lost(&mut self, error: ChatError) {
        if !matches!(self.phase, Phase::Connected(_)) {
            return;
        }
        // Drops the broken transport
        self.phase = Phase::Idle;

        warn!("Chat connection lost: {}", error);
        if let Some(subscription) = self.subscriptions.unsubscribe() {
            self.resume = Some(subscription.conversation);
        }

        self.events.emit(ChatEvent::ConnectionChanged(false));
        self.emit_error(&error);
        self.strategy.reset();
        self.schedule_retry(error.to_string());
    }

    fn on_text(&mut self, text: &str) {
        let Phase::Connected(session) = &mut self.phase else {
            return;
        };
        session.last_inbound = Instant::now();
        session.parser.push(text);

        let mut frames = Vec::new();
        let failure = loop {
            match session.parser.next_inbound() {
                Ok(Some(Inbound::Heartbeat)) => trace!("STOMP heart-beat received"),
                Ok(Some(Inbound::Frame(frame))) => frames.push(frame),
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        for frame in frames {
            match frame.command {
                StompCommand::Message => self.on_message(&frame),
                StompCommand::Error => {
                    let reason = stomp::error_reason(&frame);
                    self.connection_lost(ChatError::ConnectionClosed(format!(
                        "server error: {}",
                        reason
                    )));
                    return;
                }
                StompCommand::Receipt => {
                    debug!("Receipt {}", frame.get_header("receipt-id").unwrap_or("?"))
                }
                other => debug!("Ignoring unexpected {} frame", other),
            }
        }

        if let Some(e) = failure {
            warn!("Corrupt STOMP stream: {}", e);
            self.connection_lost(e);
        }
    }

    fn on_message(&self, frame: &Frame) {
        let subscription = frame.get_header("subscription").unwrap_or_default();
        let Some(active) = self
            .subscriptions
            .active()
            .filter(|active| active.id == subscription)
        else {
            debug!("Dropping message for inactive subscription '{}'", subscription);
            return;
        };

        match parse_live_payload(&frame.body, active.conversation) {
            Ok(message) => {
                trace!("Live message on {}", active.destination);
                self.events.emit(ChatEvent::Message(message));
            }
            Err(e) => {
                warn!("Invalid message format on {}: {}", active.destination, e);
                self.emit_error(&ChatError::InvalidMessageFormat);
            }
        }
    }

    async fn subscribe(&mut self, conversation: ConversationId) {
        let Phase::Connected(session) = &mut self.phase else {
            self.emit_error(&ChatError::NotConnected);
            return;
        };

        let change = self
            .subscriptions
            .subscribe(conversation, self.config.topic(conversation));
        if let Some(released) = &change.released {
            debug!("Unsubscribing {} from {}", released.id, released.destination);
            if let Err(e) = send_frame(session, &stomp::unsubscribe_frame(&released.id)).await {
                warn!("Failed to unsubscribe {}: {}", released.id, e);
            }
        }

        info!(
            "Subscribing to {} as {}",
            change.active.destination, change.active.id
        );
        let frame = stomp::subscribe_frame(&change.active.id, &change.active.destination);
        if let Err(e) = send_frame(session, &frame).await {
            error!("Failed to subscribe to {}: {}", change.active.destination, e);
            self.emit_error(&ChatError::SubscribeFailed(e.to_string()));
        }

        self.resume = Some(conversation);
        self.state
            .send_modify(|state| state.conversation = Some(conversation));
    }

    async fn unsubscribe(&mut self) {
        self.resume = None;
        self.state.send_modify(|state| state.conversation = None);

        let Some(released) = self.subscriptions.unsubscribe() else {
            return;
        };
        if let Phase::Connected(session) = &mut self.phase {
            debug!("Unsubscribing {} from {}", released.id, released.destination);
            if let Err(e) = send_frame(session, &stomp::unsubscribe_frame(&released.id)).await {
                warn!("Failed to unsubscribe {}: {}", released.id, e);
            }
        }
    }

    async fn publish(&mut self, conversation: ConversationId, payload: OutboundPayload) {
        let Phase::Connected(session) = &mut self.phase else {
            self.emit_error(&ChatError::NotConnected);
            return;
        };

        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                self.emit_error(&ChatError::SendFailed(e.to_string()));
                return;
            }
        };
        let destination = self.config.destination(conversation);
        debug!("Publishing message to {}", destination);

        if let Err(e) = send_frame(session, &stomp::send_frame(&destination, body)).await {
            error!("Failed to send message to {}: {}", destination, e);
            self.emit_error(&ChatError::SendFailed(e.to_string()));
        }
    }

    async fn send_heartbeat(&mut self) {
        let Phase::Connected(session) = &mut self.phase else {
            return;
        };
        let result = session.transport.send_text("\n").await;
        if let Some(every) = session.send_every {
            session.next_heartbeat = Instant::now() + every;
        }
        if let Err(e) = result {
            self.connection_lost(e);
        }
    }

    async fn disconnect(&mut self) {
        let released = self.subscriptions.unsubscribe();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Connecting { reply, .. } => {
                info!("Disconnect cancels pending connection attempt");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(ChatError::Cancelled(
                        "disconnect requested".to_string(),
                    )));
                }
            }
            Phase::Connected(session) => close_session(session, released).await,
            Phase::Reconnecting { attempt, .. } => {
                info!("Disconnect cancels pending retry attempt {}", attempt);
            }
            Phase::Idle => {}
        }

        self.resume = None;
        self.credential = None;
        self.strategy.reset();
        self.state
            .send_modify(|state| *state = ConnectionState::default());
        self.events.emit(ChatEvent::ConnectionChanged(false));
        info!("Disconnected from chat server");
    }
}
