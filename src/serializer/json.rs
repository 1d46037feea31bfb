use anyhow::Result;

use crate::{
    message::message::Message,
    serializer::serializer::{
        Serializer,
        SerializerType,
    },
};

/// A [`Serializer`] that serializes messages as JSON.
#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serializer_type(&self) -> SerializerType {
        SerializerType::Json
    }

    fn serialize(&self, message: &Message) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|err| err.into())
    }

    fn deserialize(&self, buf: &[u8]) -> Result<Message> {
        serde_json::from_slice(buf).map_err(|err| err.into())
    }
}
