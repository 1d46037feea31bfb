mod connector;
mod peer;
mod procedure;
mod requests;
mod session;
mod web_socket_peer;

pub use connector::{
    Connection,
    Connector,
    ConnectorFactory,
    WebSocketConnectorFactory,
};
pub use peer::{
    CloseDetails,
    Peer,
    PeerConfig,
    PeerNotConnectedError,
    Registration,
    RpcCall,
    RpcResult,
    SessionInfo,
    SessionObserver,
    WebSocketConfig,
};
pub use procedure::{
    Invocation,
    ProcedureHandler,
    RpcYield,
};
pub use web_socket_peer::{
    WebSocketPeer,
    new_web_socket_peer,
};
