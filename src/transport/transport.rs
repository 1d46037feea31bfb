use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    Stream,
};

use crate::serializer::serializer::SerializerType;

/// Data received from a [`Transport`].
pub enum TransportData {
    /// A health check that should be answered immediately.
    Ping(Vec<u8>),
    /// A serialized message.
    Message(Vec<u8>),
}

/// A transport, over which serialized messages are sent and received.
///
/// Implemented as a [`Stream`] and [`Sink`] that extracts out meaningful data
/// and reports framing violations to be handled at higher layers.
pub trait Transport:
    Send + Stream<Item = Result<TransportData>> + Sink<TransportData, Error = Error> + Unpin + Debug
{
}

/// A factory for creating a new [`Transport`] over an established connection.
pub trait TransportFactory<S>: Send + Sync {
    /// Creates a new [`Transport`] for messaging over the stream.
    fn new_transport(&self, stream: S, serializer_type: SerializerType) -> Box<dyn Transport>;
}
