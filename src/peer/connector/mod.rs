mod connector;
mod web_socket_connector;

pub use connector::{
    Connection,
    Connector,
    ConnectorFactory,
};
pub use web_socket_connector::WebSocketConnectorFactory;
