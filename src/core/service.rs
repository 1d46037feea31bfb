use anyhow::{
    Error,
    Result,
};
use log::error;
use tokio::{
    sync::{
        broadcast,
        mpsc::{
            UnboundedReceiver,
            UnboundedSender,
            unbounded_channel,
        },
    },
    task::JoinHandle,
};

use crate::{
    core::{
        error::InteractionError,
        stream::MessageStream,
    },
    message::{
        common::abort_message_for_error,
        message::Message,
    },
};

/// A handle to an asynchronously-running [`Service`].
pub struct ServiceHandle {
    start_handle: JoinHandle<()>,
    cancel_tx: broadcast::Sender<()>,
    message_tx: UnboundedSender<Message>,
}

impl ServiceHandle {
    /// Joins the task running the service.
    pub async fn join(self) -> Result<()> {
        self.start_handle.await.map_err(Error::new)
    }

    /// Cancels the service.
    ///
    /// Cancellation is the correct way to cleanly exit a service.
    pub fn cancel(&self) -> Result<()> {
        self.cancel_tx.send(()).map(|_| ()).map_err(Error::new)
    }

    /// The message transmission channel.
    pub fn message_tx(&self) -> UnboundedSender<Message> {
        self.message_tx.clone()
    }
}

/// The core asynchronous service that sends and receives messages over an
/// underlying stream.
///
/// Received messages are passed to a channel for the session layer to process.
/// The service itself attaches no meaning to them, with one exception: if the
/// stream fails mid-read, an ABORT message is injected before the error
/// propagates, since the connection is about to close abruptly and the session
/// has no way of saying goodbye.
pub struct Service {
    name: String,
    stream: Box<dyn MessageStream>,
    message_tx: broadcast::Sender<Message>,
    end_tx: broadcast::Sender<()>,
    _end_rx: broadcast::Receiver<()>,
    cancel_tx: broadcast::Sender<()>,
    cancel_rx: broadcast::Receiver<()>,

    user_message_tx: UnboundedSender<Message>,
    user_message_rx: UnboundedReceiver<Message>,
}

impl Service {
    /// Creates a new service over the given stream.
    pub fn new(name: String, stream: Box<dyn MessageStream>) -> Self {
        let (message_tx, _) = broadcast::channel(16);
        let (end_tx, end_rx) = broadcast::channel(1);
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let (user_message_tx, user_message_rx) = unbounded_channel();
        Self {
            name,
            stream,
            message_tx,
            end_tx,
            _end_rx: end_rx,
            cancel_tx,
            cancel_rx,
            user_message_tx,
            user_message_rx,
        }
    }

    /// The message receiver channel.
    pub fn message_rx(&self) -> broadcast::Receiver<Message> {
        self.message_tx.subscribe()
    }

    /// The end receiver channel.
    pub fn end_rx(&self) -> broadcast::Receiver<()> {
        self.end_tx.subscribe()
    }

    /// Starts the service asynchronously.
    ///
    /// This method takes ownership of the service. All future interactions with
    /// the service should be made through the returned handle.
    pub fn start(self) -> ServiceHandle {
        let cancel_tx = self.cancel_tx.clone();
        let message_tx = self.user_message_tx.clone();
        let start_handle = tokio::spawn(self.run());
        ServiceHandle {
            start_handle,
            cancel_tx,
            message_tx,
        }
    }

    async fn run(mut self) {
        if let Err(err) = self.service_loop().await {
            error!("Service {} failed: {err:#}", self.name);
        }
        if let Err(err) = self.end().await {
            error!("Failed to end service {}: {err:#}", self.name);
        }
    }

    async fn service_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                message = self.stream.receive_message() => {
                    match message {
                        Ok(Some(message)) => {
                            // Send the message out for handling.
                            self.message_tx.send(message)?;
                        }
                        Ok(None) => {
                            return Ok(());
                        }
                        Err(err) => {
                            // The stream is about to close abruptly, so there
                            // is no chance for the session to say goodbye.
                            //
                            // Ignore the error because the stream may already
                            // be closed.
                            self.stream.send_message(abort_message_for_error(&InteractionError::ProtocolViolation("stream abruptly closed".to_owned()).into())).await.ok();
                            return Err(err);
                        }
                    }
                }
                message = self.user_message_rx.recv() => {
                    match message {
                        Some(message) => {
                            self.stream.send_message(message).await?;
                        }
                        None => {
                            return Err(Error::msg("user message stream closed"));
                        }
                    }
                }
                // We expect that cancellation is the correct way to cleanly
                // exit the service.
                _ = self.cancel_rx.recv() => {
                    // Messages queued before cancellation still go out to the
                    // remote peer, most notably GOODBYE acknowledgments.
                    //
                    // Ignore send errors because the stream may already be
                    // closed.
                    while let Ok(message) = self.user_message_rx.try_recv() {
                        self.stream.send_message(message).await.ok();
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn end(&mut self) -> Result<()> {
        // Ignore error with the stream, since it may already be closed.
        self.stream.close().await.ok();
        self.end_tx.send(())?;
        Ok(())
    }
}
