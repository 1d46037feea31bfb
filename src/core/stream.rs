use anyhow::Result;
use async_trait::async_trait;
use futures_util::{
    SinkExt,
    StreamExt,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::{
    core::error::TransportError,
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// An ordered, bidirectional stream of messages between two peers.
///
/// The stream is the boundary between the session layer and the underlying
/// connection. Everything below it (framing, serialization, health checks) is
/// invisible to the session.
#[async_trait]
pub trait MessageStream: Send {
    /// Sends a message to the remote peer.
    async fn send_message(&mut self, message: Message) -> Result<()>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `None` once the stream is closed and no more messages will arrive.
    async fn receive_message(&mut self) -> Result<Option<Message>>;

    /// Closes the stream.
    async fn close(&mut self) -> Result<()>;
}

/// A [`MessageStream`] over a serialized transport.
pub struct TransportMessageStream {
    transport: Box<dyn Transport>,
    serializer: Box<dyn Serializer>,
}

impl TransportMessageStream {
    pub fn new(transport: Box<dyn Transport>, serializer: Box<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }
}

#[async_trait]
impl MessageStream for TransportMessageStream {
    async fn send_message(&mut self, message: Message) -> Result<()> {
        let data = self.serializer.serialize(&message)?;
        self.transport.send(TransportData::Message(data)).await
    }

    async fn receive_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.transport.next().await {
                Some(Ok(TransportData::Ping(data))) => {
                    // Ping the data back.
                    self.transport.send(TransportData::Ping(data)).await?;
                }
                Some(Ok(TransportData::Message(data))) => {
                    return self.serializer.deserialize(&data).map(Some);
                }
                Some(Err(err)) => return Err(err),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

/// A [`MessageStream`] over in-process channels, for connecting a peer directly
/// to another stream without a real transport.
#[derive(Debug)]
pub struct DirectMessageStream {
    tx: Option<UnboundedSender<Message>>,
    rx: UnboundedReceiver<Message>,
}

/// Creates a connected pair of [`DirectMessageStream`]s.
///
/// Messages sent on one end are received on the other.
pub fn direct_message_stream_pair() -> (DirectMessageStream, DirectMessageStream) {
    let (a_tx, a_rx) = unbounded_channel();
    let (b_tx, b_rx) = unbounded_channel();
    (
        DirectMessageStream {
            tx: Some(a_tx),
            rx: b_rx,
        },
        DirectMessageStream {
            tx: Some(b_tx),
            rx: a_rx,
        },
    )
}

#[async_trait]
impl MessageStream for DirectMessageStream {
    async fn send_message(&mut self, message: Message) -> Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(message)
                .map_err(|_| TransportError("stream closed".to_owned()).into()),
            None => Err(TransportError("stream closed".to_owned()).into()),
        }
    }

    async fn receive_message(&mut self) -> Result<Option<Message>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

#[cfg(test)]
mod stream_test {
    use pretty_assertions::assert_eq;

    use crate::{
        core::stream::{
            MessageStream,
            direct_message_stream_pair,
        },
        message::common::goodbye_and_out,
    };

    #[tokio::test]
    async fn delivers_messages_between_ends() {
        let (mut a, mut b) = direct_message_stream_pair();
        a.send_message(goodbye_and_out()).await.unwrap();
        assert_eq!(b.receive_message().await.unwrap(), Some(goodbye_and_out()));
    }

    #[tokio::test]
    async fn receive_ends_after_close() {
        let (mut a, mut b) = direct_message_stream_pair();
        a.close().await.unwrap();
        assert_eq!(b.receive_message().await.unwrap(), None);
        assert!(b.send_message(goodbye_and_out()).await.is_err());
    }
}
