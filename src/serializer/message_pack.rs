use anyhow::Result;

use crate::{
    message::message::Message,
    serializer::serializer::{
        Serializer,
        SerializerType,
    },
};

/// A [`Serializer`] that serializes messages as MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::MessagePack
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        rmp_serde::to_vec(message).map_err(|err| err.into())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Message> {
        rmp_serde::from_slice(buf).map_err(|err| err.into())
    }
}
