use anyhow::Result;

use crate::{
    core::uri::Uri,
    message::message::Message,
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The type of serialization used for messages over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializerType {
    /// JSON serialization, over text frames.
    Json,
    /// MessagePack serialization, over binary frames.
    MessagePack,
}

impl SerializerType {
    /// The URI used to negotiate the serializer during connection establishment.
    pub fn uri(&self) -> Uri {
        match self {
            Self::Json => Uri::from_known("wamp.2.json"),
            Self::MessagePack => Uri::from_known("wamp.2.msgpack"),
        }
    }
}

impl TryFrom<&str> for SerializerType {
    type Error = String;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "wamp.2.json" => Ok(Self::Json),
            "wamp.2.msgpack" => Ok(Self::MessagePack),
            _ => Err(format!("unknown serializer: {value}")),
        }
    }
}

/// An object that serializes and deserializes messages for transmission over a transport.
pub trait Serializer: Send {
    /// The type of the serializer.
    fn serializer_type(&self) -> SerializerType;

    /// Serializes a message to bytes.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>>;

    /// Deserializes a message from bytes.
    fn deserialize(&self, buf: &[u8]) -> Result<Message>;
}

/// Creates a new [`Serializer`] of the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer),
        SerializerType::MessagePack => Box::new(MessagePackSerializer),
    }
}
