use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use futures_util::lock::Mutex;
use log::{
    error,
    info,
};
use thiserror::Error;
use tokio::sync::{
    broadcast::{
        self,
        error::RecvError,
    },
    mpsc,
    oneshot,
};

use crate::{
    core::{
        error::SessionClosedError,
        hash::{
            HashMap,
            HashSet,
        },
        id::Id,
        service::{
            Service,
            ServiceHandle,
        },
        stream::{
            MessageStream,
            TransportMessageStream,
        },
        types::{
            Dictionary,
            List,
        },
        uri::Uri,
    },
    message::message::Message,
    peer::{
        connector::ConnectorFactory,
        procedure::ProcedureHandler,
        session::{
            Command,
            Session,
            SessionEvent,
        },
    },
    serializer::serializer::{
        SerializerType,
        new_serializer,
    },
    transport::transport::TransportFactory,
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for WebSocket-specific connections.
#[derive(Debug, Default)]
pub struct WebSocketConfig {
    /// Additional headers to include in the WebSocket handshake request.
    pub headers: HashMap<String, String>,
}

/// Configuration for a [`Peer`].
#[derive(Debug)]
pub struct PeerConfig {
    /// Name of the peer, mostly for logging.
    pub name: String,
    /// Agent name, communicated to the router.
    pub agent: String,
    /// Allowed serializers.
    ///
    /// The actual serializer will be selected when the connection with the
    /// router is established.
    pub serializers: HashSet<SerializerType>,
    /// Additional configuration for WebSocket-specific connections.
    pub web_socket: Option<WebSocketConfig>,
}

impl PeerConfig {
    fn validate(&self) -> Result<()> {
        if self.serializers.is_empty() {
            return Err(Error::msg("at least one serializer is required"));
        }
        Ok(())
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT.to_owned(),
            agent: DEFAULT_AGENT.to_owned(),
            serializers: HashSet::from_iter([SerializerType::Json, SerializerType::MessagePack]),
            web_socket: None,
        }
    }
}

/// Information about an established session, as reported by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The session ID assigned by the router.
    pub session_id: Id,
    /// The realm the session was established in.
    pub realm: Uri,
}

/// Details of a session closing by a GOODBYE handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseDetails {
    /// The close reason communicated by the closing peer.
    pub reason: Uri,
}

/// A registration of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The registration ID assigned by the router.
    pub id: Id,
    /// The registered procedure.
    pub procedure: Uri,
}

/// A procedure call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RpcCall {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A result of a procedure call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RpcResult {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// Error for a peer not being connected for some operation.
#[derive(Debug, Error)]
#[error("peer is not connected")]
pub struct PeerNotConnectedError;

/// An observer of session lifecycle events.
///
/// Callbacks are delivered one at a time, in the order the events occurred.
/// [`Self::on_disconnect`] is always the last callback of a session and is
/// delivered exactly once.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// The session was established in a realm.
    async fn on_join(&self, info: SessionInfo) {
        let _ = info;
    }

    /// The session was closed by a GOODBYE handshake, from either side.
    async fn on_leave(&self, details: CloseDetails) {
        let _ = details;
    }

    /// The session is over and the connection is gone.
    async fn on_disconnect(&self) {}
}

struct PeerState {
    service: ServiceHandle,
    command_tx: mpsc::UnboundedSender<Command>,
}

/// A peer (a.k.a., client) that connects to a router, establishes a session in
/// a realm, and calls and registers procedures in the realm.
///
/// Each connection carries exactly one session. Once the session closes, for
/// any reason, the connection is dropped, and the peer must connect again for
/// a new session.
pub struct Peer<S> {
    config: PeerConfig,
    connector_factory: Box<dyn ConnectorFactory<S>>,
    transport_factory: Box<dyn TransportFactory<S>>,
    observer: Option<Arc<dyn SessionObserver>>,

    session_finished_tx: broadcast::Sender<()>,
    drop_tx: broadcast::Sender<()>,

    peer_state: Arc<Mutex<Option<PeerState>>>,
}

impl<S> Peer<S>
where
    S: Send + 'static,
{
    /// Creates a new peer.
    pub fn new(
        config: PeerConfig,
        connector_factory: Box<dyn ConnectorFactory<S>>,
        transport_factory: Box<dyn TransportFactory<S>>,
    ) -> Result<Self> {
        config.validate()?;
        let (session_finished_tx, _) = broadcast::channel(16);
        let (drop_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            connector_factory,
            transport_factory,
            observer: None,
            session_finished_tx,
            drop_tx,
            peer_state: Arc::new(Mutex::new(None)),
        })
    }

    /// Sets the observer for session lifecycle events.
    ///
    /// Must be set before connecting to take effect for a session.
    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    /// Receiver channel for the session finishing, for reconnection logic.
    pub fn session_finished_rx(&self) -> broadcast::Receiver<()> {
        self.session_finished_tx.subscribe()
    }

    /// Connects to a router.
    ///
    /// This method merely establishes a network connection with the router. It
    /// does not establish a session; [`Self::join_realm`] does that.
    pub async fn connect(&self, uri: &str) -> Result<()> {
        let connector = self.connector_factory.new_connector();
        let connection = connector.connect(&self.config, uri).await?;
        info!(
            "Connection established with {uri} for peer {}",
            self.config.name
        );

        let serializer = new_serializer(connection.serializer);
        let transport = self
            .transport_factory
            .new_transport(connection.stream, connection.serializer);
        self.direct_connect(Box::new(TransportMessageStream::new(transport, serializer)))
            .await
    }

    /// Directly connects to a router with the given message stream.
    pub async fn direct_connect(&self, stream: Box<dyn MessageStream>) -> Result<()> {
        let mut peer_state = self.peer_state.lock().await;
        if peer_state.is_some() {
            return Err(Error::msg("peer is already connected"));
        }

        let service = Service::new(self.config.name.clone(), stream);
        let service_message_rx = service.message_rx();
        let end_rx = service.end_rx();
        let drop_rx = self.drop_tx.subscribe();
        let service_handle = service.start();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut session = Session::new(
            self.config.name.clone(),
            self.config.agent.clone(),
            service_handle.message_tx(),
            event_tx,
        );
        session.start()?;

        if let Some(observer) = &self.observer {
            tokio::spawn(Self::observer_loop(observer.clone(), event_rx));
        }

        *peer_state = Some(PeerState {
            service: service_handle,
            command_tx,
        });

        tokio::spawn(Self::session_loop(
            session,
            self.peer_state.clone(),
            self.session_finished_tx.clone(),
            command_rx,
            service_message_rx,
            end_rx,
            drop_rx,
        ));

        Ok(())
    }

    async fn observer_loop(
        observer: Arc<dyn SessionObserver>,
        mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        // Events are delivered one at a time so observers see them in order.
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Joined(info) => observer.on_join(info).await,
                SessionEvent::Left(details) => observer.on_leave(details).await,
                SessionEvent::Disconnected => observer.on_disconnect().await,
            }
        }
    }

    async fn session_loop(
        mut session: Session,
        peer_state: Arc<Mutex<Option<PeerState>>>,
        session_finished_tx: broadcast::Sender<()>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        service_message_rx: broadcast::Receiver<Message>,
        end_rx: broadcast::Receiver<()>,
        drop_rx: broadcast::Receiver<()>,
    ) {
        match Self::session_loop_with_errors(
            &mut session,
            &mut command_rx,
            service_message_rx,
            end_rx,
            drop_rx,
        )
        .await
        {
            Ok(()) => info!("Peer session {} finished", session.name()),
            Err(err) => error!("Peer session {} failed: {err:#}", session.name()),
        }

        session.finish();

        // The session is over, so the connection goes with it.
        if let Some(peer_state) = peer_state.lock().await.take() {
            peer_state.service.cancel().ok();
            peer_state.service.join().await.ok();
        }
        session_finished_tx.send(()).ok();
    }

    async fn session_loop_with_errors(
        session: &mut Session,
        command_rx: &mut mpsc::UnboundedReceiver<Command>,
        mut service_message_rx: broadcast::Receiver<Message>,
        mut end_rx: broadcast::Receiver<()>,
        mut drop_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                // Received a command from this peer object.
                command = command_rx.recv() => {
                    match command {
                        Some(command) => session.handle_command(command).await?,
                        // The peer state was dropped, so the peer is
                        // disconnecting.
                        None => return Ok(()),
                    }
                }
                // Received a message from the service.
                message = service_message_rx.recv() => {
                    match message {
                        Ok(message) => {
                            let message_name = message.message_name();
                            if let Err(err) = session.handle_message(message) {
                                return Err(err.context(format!("failed to handle {message_name} message")));
                            }
                        }
                        Err(RecvError::Closed) => return Ok(()),
                        Err(err) => return Err(Error::new(err).context("failed to receive message from service")),
                    }
                }
                // Service ended, so the connection is gone.
                _ = end_rx.recv() => return Ok(()),
                // Peer was dropped.
                _ = drop_rx.recv() => return Ok(()),
            }

            if session.closed() {
                return Ok(());
            }
        }
    }

    async fn command_tx(&self) -> Result<mpsc::UnboundedSender<Command>> {
        match self.peer_state.lock().await.as_ref() {
            Some(peer_state) => Ok(peer_state.command_tx.clone()),
            None => Err(PeerNotConnectedError.into()),
        }
    }

    async fn submit<T>(
        &self,
        command: Command,
        reply_rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        let command_tx = self.command_tx().await?;
        command_tx.send(command).map_err(|_| SessionClosedError)?;
        match reply_rx.await {
            Ok(result) => result,
            // The session closed before the request resolved.
            Err(_) => Err(SessionClosedError.into()),
        }
    }

    /// Joins the realm, establishing a session.
    ///
    /// The session exists for as long as the router allows it to. The session
    /// will be lost in the following scenarios:
    /// 1. [`Self::leave_realm`] is called.
    /// 1. The router closes or aborts the session.
    /// 1. The underlying connection to the router is lost.
    ///
    /// In all cases, the connection is dropped with the session. To join
    /// again, reconnect first.
    pub async fn join_realm(&self, realm: &str) -> Result<SessionInfo> {
        let realm = Uri::try_from(realm)?;
        let (reply, reply_rx) = oneshot::channel();
        self.submit(Command::Join { realm, reply }, reply_rx).await
    }

    /// Leaves the realm, closing the session.
    ///
    /// Resolves once the router acknowledges the GOODBYE handshake.
    pub async fn leave_realm(&self) -> Result<CloseDetails> {
        let (reply, reply_rx) = oneshot::channel();
        self.submit(Command::Leave { reply }, reply_rx).await
    }

    /// Registers a procedure in the realm.
    ///
    /// The handler is invoked for every call routed to this peer, until the
    /// registration is removed or the session ends.
    pub async fn register(
        &self,
        procedure: Uri,
        handler: Arc<dyn ProcedureHandler>,
    ) -> Result<Registration> {
        let (reply, reply_rx) = oneshot::channel();
        self.submit(
            Command::Register {
                procedure,
                handler,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Removes a procedure registration.
    pub async fn unregister(&self, registration: &Registration) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.submit(
            Command::Unregister {
                registration: registration.id,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Calls a procedure in the realm and waits for its result.
    pub async fn call(&self, procedure: Uri, rpc_call: RpcCall) -> Result<RpcResult> {
        let (reply, reply_rx) = oneshot::channel();
        self.submit(
            Command::Call {
                procedure,
                rpc_call,
                reply,
            },
            reply_rx,
        )
        .await
    }

    /// Disconnects from the router.
    ///
    /// Any session over the connection is closed.
    pub async fn disconnect(&self) -> Result<()> {
        let mut peer_state = self.peer_state.lock().await;
        match peer_state.take() {
            Some(peer_state) => {
                info!(
                    "Peer {} was instructed to disconnect from the router",
                    self.config.name
                );
                peer_state.service.cancel()?;
                peer_state.service.join().await?;
            }
            None => (),
        }
        Ok(())
    }
}

impl<S> Drop for Peer<S> {
    fn drop(&mut self) {
        self.drop_tx.send(()).ok();
    }
}
