use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::{
    mpsc::UnboundedSender,
    oneshot,
};

use crate::{
    core::{
        close::CloseReason,
        error::{
            BasicError,
            InteractionError,
            NotEstablishedError,
            SessionClosedError,
            TransportError,
            error_from_message,
            error_from_uri_reason_and_message,
            invocation_error,
        },
        hash::HashMap,
        id::Id,
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message_for_error,
            error_for_invocation,
            goodbye_and_out,
            goodbye_with_close_reason,
        },
        message::{
            CallMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            RegisterMessage,
            UnregisterMessage,
            YieldMessage,
        },
    },
    peer::{
        peer::{
            CloseDetails,
            Registration,
            RpcCall,
            RpcResult,
            SessionInfo,
        },
        procedure::{
            Invocation,
            ProcedureHandler,
        },
        requests::{
            RequestSlot,
            RequestTracker,
        },
    },
};

#[derive(Debug, Clone)]
pub struct JoiningState {
    pub realm: Uri,
}

#[derive(Debug, Clone)]
pub struct EstablishedState {
    pub realm: Uri,
    pub session_id: Id,
}

/// The state of a session.
///
/// A session moves forward through these states over its lifetime and never
/// backward. [`SessionState::Closed`] is terminal: a new session requires a new
/// connection.
#[derive(Debug, Default, Clone)]
pub enum SessionState {
    /// The session is not attached to a connection.
    #[default]
    Disconnected,
    /// The connection is up, but no realm has been joined.
    Connecting,
    /// A HELLO message has been sent, and the session is waiting for the
    /// router's verdict.
    Joining(JoiningState),
    /// The session is established in a realm and can interact with it.
    Established(EstablishedState),
    /// A GOODBYE message has been sent, and the session is waiting for the
    /// router's acknowledgment.
    Leaving(EstablishedState),
    /// The session is over.
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Joining(_) => "joining",
            Self::Established(_) => "established",
            Self::Leaving(_) => "leaving",
            Self::Closed => "closed",
        }
    }
}

/// An event emitted by a session for observers.
pub enum SessionEvent {
    /// The session was established in a realm.
    Joined(SessionInfo),
    /// The session was closed by a GOODBYE handshake, from either side.
    Left(CloseDetails),
    /// The session is over and the connection is gone.
    ///
    /// Always the last event of a session, emitted exactly once.
    Disconnected,
}

/// A command submitted to a session by its owning peer.
pub enum Command {
    Join {
        realm: Uri,
        reply: oneshot::Sender<Result<SessionInfo>>,
    },
    Register {
        procedure: Uri,
        handler: Arc<dyn ProcedureHandler>,
        reply: oneshot::Sender<Result<Registration>>,
    },
    Call {
        procedure: Uri,
        rpc_call: RpcCall,
        reply: oneshot::Sender<Result<RpcResult>>,
    },
    Unregister {
        registration: Id,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        reply: oneshot::Sender<Result<CloseDetails>>,
    },
}

struct RegisteredProcedure {
    procedure: Uri,
    handler: Arc<dyn ProcedureHandler>,
}

/// A single session between a peer and a router, which exists for the lifetime
/// of one connection.
///
/// All session state is owned here and touched only by the session loop, so
/// commands and router messages are applied strictly in order.
pub struct Session {
    name: String,
    agent: String,
    message_tx: UnboundedSender<Message>,
    event_tx: UnboundedSender<SessionEvent>,

    state: SessionState,
    requests: RequestTracker,
    registry: HashMap<Id, RegisteredProcedure>,
    pending_join: Option<oneshot::Sender<Result<SessionInfo>>>,
    goodbye_request: Option<Id>,
}

impl Session {
    fn allowed_state_transition(from: &SessionState, to: &SessionState) -> bool {
        match (from, to) {
            (SessionState::Disconnected, SessionState::Connecting) => true,
            (SessionState::Connecting, SessionState::Joining(_)) => true,
            (SessionState::Joining(_), SessionState::Established(_)) => true,
            (SessionState::Established(_), SessionState::Leaving(_)) => true,
            (from, SessionState::Closed) => !matches!(from, SessionState::Closed),
            _ => false,
        }
    }

    /// Creates a new session that sends messages over `message_tx` and reports
    /// lifecycle events over `event_tx`.
    pub fn new(
        name: String,
        agent: String,
        message_tx: UnboundedSender<Message>,
        event_tx: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            name,
            agent,
            message_tx,
            event_tx,
            state: SessionState::default(),
            requests: RequestTracker::new(),
            registry: HashMap::default(),
            pending_join: None,
            goodbye_request: None,
        }
    }

    /// The name of the session, mostly for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Is the session closed?
    pub fn closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    fn established(&self) -> bool {
        matches!(self.state, SessionState::Established(_))
    }

    /// Attaches the session to its connection.
    pub fn start(&mut self) -> Result<()> {
        self.transition_state(SessionState::Connecting)
    }

    fn transition_state(&mut self, state: SessionState) -> Result<()> {
        if !Self::allowed_state_transition(&self.state, &state) {
            return Err(Error::msg(format!(
                "session cannot transition from the {} state to the {} state",
                self.state.name(),
                state.name(),
            )));
        }
        debug!(
            "Session {} transitioned from the {} state to the {} state",
            self.name,
            self.state.name(),
            state.name(),
        );
        self.state = state;
        if self.closed() {
            self.close_pending_work();
        }
        Ok(())
    }

    fn close_pending_work(&mut self) {
        if let Some(reply) = self.pending_join.take() {
            reply.send(Err(SessionClosedError.into())).ok();
        }
        self.goodbye_request = None;
        self.requests.fail_all();
        self.registry.clear();
    }

    /// Finishes the session after its connection is gone.
    ///
    /// Called exactly once, after the last command and the last message.
    pub fn finish(&mut self) {
        if !self.closed() {
            self.transition_state(SessionState::Closed).ok();
        }
        self.event_tx.send(SessionEvent::Disconnected).ok();
    }

    fn send_message(&self, message: Message) -> Result<()> {
        self.message_tx
            .send(message)
            .map_err(|_| TransportError("message stream closed".to_owned()).into())
    }

    /// Handles a command submitted by the owning peer.
    pub async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Join { realm, reply } => self.start_join(realm, reply),
            Command::Register {
                procedure,
                handler,
                reply,
            } => {
                if !self.established() {
                    reply.send(Err(NotEstablishedError.into())).ok();
                    return Ok(());
                }
                let request = self
                    .requests
                    .issue(RequestSlot::Register {
                        procedure: procedure.clone(),
                        handler,
                        reply,
                    })
                    .await;
                self.send_request(
                    request,
                    Message::Register(RegisterMessage {
                        request,
                        options: Dictionary::default(),
                        procedure,
                    }),
                );
                Ok(())
            }
            Command::Call {
                procedure,
                rpc_call,
                reply,
            } => {
                if !self.established() {
                    reply.send(Err(NotEstablishedError.into())).ok();
                    return Ok(());
                }
                let request = self.requests.issue(RequestSlot::Call { reply }).await;
                self.send_request(
                    request,
                    Message::Call(CallMessage {
                        request,
                        options: Dictionary::default(),
                        procedure,
                        arguments: rpc_call.arguments,
                        arguments_keyword: rpc_call.arguments_keyword,
                    }),
                );
                Ok(())
            }
            Command::Unregister {
                registration,
                reply,
            } => {
                if !self.established() {
                    reply.send(Err(NotEstablishedError.into())).ok();
                    return Ok(());
                }
                let request = self
                    .requests
                    .issue(RequestSlot::Unregister {
                        registration,
                        reply,
                    })
                    .await;
                self.send_request(
                    request,
                    Message::Unregister(UnregisterMessage {
                        request,
                        registered_registration: registration,
                    }),
                );
                Ok(())
            }
            Command::Leave { reply } => self.start_leave(reply).await,
        }
    }

    fn start_join(&mut self, realm: Uri, reply: oneshot::Sender<Result<SessionInfo>>) -> Result<()> {
        if !matches!(self.state, SessionState::Connecting) {
            reply
                .send(Err(BasicError::NotAllowed(format!(
                    "cannot join a realm in the {} state",
                    self.state.name(),
                ))
                .into()))
                .ok();
            return Ok(());
        }

        let mut details = Dictionary::default();
        if !self.agent.is_empty() {
            details.insert("agent".to_owned(), Value::String(self.agent.clone()));
        }
        details.insert(
            "roles".to_owned(),
            Value::Dictionary(Dictionary::from_iter([
                (
                    "caller".to_owned(),
                    Value::Dictionary(Dictionary::default()),
                ),
                (
                    "callee".to_owned(),
                    Value::Dictionary(Dictionary::default()),
                ),
            ])),
        );

        self.transition_state(SessionState::Joining(JoiningState {
            realm: realm.clone(),
        }))?;
        self.pending_join = Some(reply);

        if let Err(err) = self.send_message(Message::Hello(HelloMessage { realm, details })) {
            if let Some(reply) = self.pending_join.take() {
                reply.send(Err(err)).ok();
            }
            self.transition_state(SessionState::Closed)?;
        }
        Ok(())
    }

    async fn start_leave(&mut self, reply: oneshot::Sender<Result<CloseDetails>>) -> Result<()> {
        let established = match &self.state {
            SessionState::Established(state) => state.clone(),
            _ => {
                reply.send(Err(NotEstablishedError.into())).ok();
                return Ok(());
            }
        };

        // GOODBYE has no request ID on the wire, but it is tracked like any
        // other request so it resolves exactly once.
        let request = self.requests.issue(RequestSlot::Goodbye { reply }).await;
        self.goodbye_request = Some(request);

        if let Err(err) = self.send_message(goodbye_with_close_reason(CloseReason::Normal)) {
            self.goodbye_request = None;
            if let Some(slot) = self.requests.resolve(request) {
                slot.fail(err);
            }
            return Ok(());
        }
        self.transition_state(SessionState::Leaving(established))
    }

    fn send_request(&mut self, request: Id, message: Message) {
        if let Err(err) = self.send_message(message) {
            if let Some(slot) = self.requests.resolve(request) {
                slot.fail(err);
            }
        }
    }

    /// Handles a message received from the router.
    pub fn handle_message(&mut self, message: Message) -> Result<()> {
        match &self.state {
            SessionState::Disconnected | SessionState::Connecting | SessionState::Closed => {
                warn!(
                    "Session {} received {} message in the {} state",
                    self.name,
                    message.message_name(),
                    self.state.name(),
                );
                Ok(())
            }
            SessionState::Joining(state) => {
                let realm = state.realm.clone();
                self.handle_message_joining(realm, message)
            }
            SessionState::Established(state) => {
                let state = state.clone();
                self.handle_message_established(state, message)
            }
            SessionState::Leaving(state) => {
                let state = state.clone();
                self.handle_message_leaving(state, message)
            }
        }
    }

    fn handle_message_joining(&mut self, realm: Uri, message: Message) -> Result<()> {
        match message {
            Message::Welcome(message) => {
                info!(
                    "Session {} established in realm {realm} (session ID {})",
                    self.name, message.session,
                );
                let info = SessionInfo {
                    session_id: message.session,
                    realm,
                };
                self.transition_state(SessionState::Established(EstablishedState {
                    realm: info.realm.clone(),
                    session_id: info.session_id,
                }))?;
                if let Some(reply) = self.pending_join.take() {
                    reply.send(Ok(info.clone())).ok();
                }
                self.event_tx.send(SessionEvent::Joined(info)).ok();
                Ok(())
            }
            Message::Abort(_) => {
                let err = match error_from_message(&message) {
                    Ok(err) | Err(err) => err,
                };
                warn!("Session {} failed to join realm {realm}: {err}", self.name);
                // Resolve the join before closing, so the caller sees the
                // router's reason rather than a generic close error.
                if let Some(reply) = self.pending_join.take() {
                    reply.send(Err(err)).ok();
                }
                self.transition_state(SessionState::Closed)
            }
            message => {
                let reason = format!(
                    "received {} message while joining a realm",
                    message.message_name(),
                );
                let err: Error = InteractionError::ProtocolViolation(reason.clone()).into();
                self.send_message(abort_message_for_error(&err)).ok();
                if let Some(reply) = self.pending_join.take() {
                    reply.send(Err(err)).ok();
                }
                self.transition_state(SessionState::Closed)?;
                Err(InteractionError::ProtocolViolation(reason).into())
            }
        }
    }

    fn handle_message_established(
        &mut self,
        state: EstablishedState,
        message: Message,
    ) -> Result<()> {
        match message {
            Message::Goodbye(message) => {
                info!(
                    "Session {} received GOODBYE from the router in realm {} ({})",
                    self.name, state.realm, message.reason,
                );
                self.send_message(goodbye_and_out()).ok();
                let details = CloseDetails {
                    reason: message.reason,
                };
                self.transition_state(SessionState::Closed)?;
                self.event_tx.send(SessionEvent::Left(details)).ok();
                Ok(())
            }
            Message::Abort(_) => self.handle_abort(message),
            Message::Invocation(message) => self.handle_invocation(message),
            message => self.handle_response(message),
        }
    }

    fn handle_message_leaving(&mut self, state: EstablishedState, message: Message) -> Result<()> {
        match message {
            Message::Goodbye(message) => {
                info!(
                    "Session {} (session ID {}) left realm {}",
                    self.name, state.session_id, state.realm,
                );
                let details = CloseDetails {
                    reason: message.reason,
                };
                // Resolve the pending leave before closing, so it is not
                // failed as part of closing out pending work.
                if let Some(request) = self.goodbye_request.take() {
                    if let Some(slot) = self.requests.resolve(request) {
                        match slot {
                            RequestSlot::Goodbye { reply } => {
                                reply.send(Ok(details.clone())).ok();
                            }
                            slot => slot.fail(
                                BasicError::Internal(
                                    "goodbye request mapped to a different request kind".to_owned(),
                                )
                                .into(),
                            ),
                        }
                    }
                }
                self.transition_state(SessionState::Closed)?;
                self.event_tx.send(SessionEvent::Left(details)).ok();
                Ok(())
            }
            Message::Abort(_) => self.handle_abort(message),
            Message::Invocation(message) => self.handle_invocation(message),
            message => self.handle_response(message),
        }
    }

    fn handle_abort(&mut self, message: Message) -> Result<()> {
        let err = match error_from_message(&message) {
            Ok(err) | Err(err) => err,
        };
        warn!("Session {} was aborted by the router: {err}", self.name);
        self.transition_state(SessionState::Closed)
    }

    fn handle_response(&mut self, message: Message) -> Result<()> {
        let request = match message.request_id() {
            Some(request) => request,
            None => {
                warn!(
                    "Session {} received unexpected {} message",
                    self.name,
                    message.message_name(),
                );
                return Ok(());
            }
        };
        let slot = match self.requests.resolve(request) {
            Some(slot) => slot,
            None => {
                warn!(
                    "Session {} received {} message for unknown request {request}",
                    self.name,
                    message.message_name(),
                );
                return Ok(());
            }
        };
        match (message, slot) {
            (
                Message::Registered(message),
                RequestSlot::Register {
                    procedure,
                    handler,
                    reply,
                },
            ) => {
                self.registry.insert(
                    message.registration,
                    RegisteredProcedure {
                        procedure: procedure.clone(),
                        handler,
                    },
                );
                reply
                    .send(Ok(Registration {
                        id: message.registration,
                        procedure,
                    }))
                    .ok();
                Ok(())
            }
            (
                Message::Unregistered(_),
                RequestSlot::Unregister {
                    registration,
                    reply,
                },
            ) => {
                self.registry.remove(&registration);
                reply.send(Ok(())).ok();
                Ok(())
            }
            (Message::Result(message), RequestSlot::Call { reply }) => {
                reply
                    .send(Ok(RpcResult {
                        arguments: message.yield_arguments,
                        arguments_keyword: message.yield_arguments_keyword,
                    }))
                    .ok();
                Ok(())
            }
            (Message::Error(message), slot) => {
                // The request ID is authoritative. A mismatched request type
                // is worth noting, but the response still resolves the slot.
                if message.request_type != slot.request_type() {
                    warn!(
                        "Session {} received ERROR for {} request {request} with mismatched request type {}",
                        self.name,
                        slot.kind(),
                        message.request_type,
                    );
                }
                let text = match message.details.get("message") {
                    Some(Value::String(text)) => text.clone(),
                    _ => String::default(),
                };
                slot.fail(error_from_uri_reason_and_message(message.error, text));
                Ok(())
            }
            (message, slot) => {
                warn!(
                    "Session {} received {} message that does not match the pending {} request {request}",
                    self.name,
                    message.message_name(),
                    slot.kind(),
                );
                slot.fail(
                    InteractionError::ProtocolViolation(format!(
                        "{} response does not match the pending request",
                        message.message_name(),
                    ))
                    .into(),
                );
                Ok(())
            }
        }
    }

    fn handle_invocation(&mut self, message: InvocationMessage) -> Result<()> {
        let registered = match self.registry.get(&message.registered_registration) {
            Some(registered) => registered,
            None => {
                warn!(
                    "Session {} received INVOCATION for unknown registration {}",
                    self.name, message.registered_registration,
                );
                let err: Error = InteractionError::NoSuchRegistration.into();
                self.send_message(error_for_invocation(message.request, &err))
                    .ok();
                return Ok(());
            }
        };

        let handler = registered.handler.clone();
        let invocation = Invocation {
            procedure: registered.procedure.clone(),
            arguments: message.call_arguments,
            arguments_keyword: message.call_arguments_keyword,
        };
        let request = message.request;
        let message_tx = self.message_tx.clone();
        // Invocations run on their own task, so a slow procedure does not
        // stall the session.
        tokio::spawn(async move {
            let message = match handler.invoke(invocation).await {
                Ok(rpc_yield) => Message::Yield(YieldMessage {
                    invocation_request: request,
                    options: Dictionary::default(),
                    arguments: rpc_yield.arguments,
                    arguments_keyword: rpc_yield.arguments_keyword,
                }),
                Err(err) => error_for_invocation(request, &invocation_error(err)),
            };
            // The session may have closed while the invocation was running.
            message_tx.send(message).ok();
        });
        Ok(())
    }
}
