use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use tokio::sync::oneshot;

use crate::{
    core::{
        error::SessionClosedError,
        hash::HashMap,
        id::{
            Id,
            IdAllocator,
            SequentialIdAllocator,
        },
        types::Integer,
        uri::Uri,
    },
    message::message::Message,
    peer::{
        peer::{
            CloseDetails,
            Registration,
            RpcResult,
        },
        procedure::ProcedureHandler,
    },
};

/// A pending request awaiting a response from the router.
///
/// Each slot owns the reply channel for the operation that issued it, so
/// resolving a slot resolves the operation.
pub enum RequestSlot {
    Register {
        procedure: Uri,
        handler: Arc<dyn ProcedureHandler>,
        reply: oneshot::Sender<Result<Registration>>,
    },
    Call {
        reply: oneshot::Sender<Result<RpcResult>>,
    },
    Unregister {
        registration: Id,
        reply: oneshot::Sender<Result<()>>,
    },
    Goodbye {
        reply: oneshot::Sender<Result<CloseDetails>>,
    },
}

impl RequestSlot {
    /// The name of the request kind, mostly for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "REGISTER",
            Self::Call { .. } => "CALL",
            Self::Unregister { .. } => "UNREGISTER",
            Self::Goodbye { .. } => "GOODBYE",
        }
    }

    /// The message tag expected in the `request_type` field of an ERROR
    /// message responding to this request.
    pub fn request_type(&self) -> Integer {
        match self {
            Self::Register { .. } => Message::REGISTER_TAG,
            Self::Call { .. } => Message::CALL_TAG,
            Self::Unregister { .. } => Message::UNREGISTER_TAG,
            Self::Goodbye { .. } => Message::GOODBYE_TAG,
        }
    }

    /// Resolves the request with an error.
    pub fn fail(self, err: Error) {
        match self {
            Self::Register { reply, .. } => {
                reply.send(Err(err)).ok();
            }
            Self::Call { reply } => {
                reply.send(Err(err)).ok();
            }
            Self::Unregister { reply, .. } => {
                reply.send(Err(err)).ok();
            }
            Self::Goodbye { reply } => {
                reply.send(Err(err)).ok();
            }
        }
    }
}

/// The set of requests issued over a session that have not yet been resolved.
///
/// Request IDs are issued sequentially and are guaranteed to be unique among
/// pending requests. Every issued request is resolved exactly once: by a
/// response from the router, by a send failure, or by the session closing.
pub struct RequestTracker {
    allocator: Box<dyn IdAllocator>,
    pending: HashMap<Id, RequestSlot>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            allocator: Box::new(SequentialIdAllocator::default()),
            pending: HashMap::default(),
        }
    }

    /// Issues a new request ID for the slot.
    pub async fn issue(&mut self, slot: RequestSlot) -> Id {
        let id = loop {
            let id = self.allocator.generate_id().await;
            if !self.pending.contains_key(&id) {
                break id;
            }
        };
        self.pending.insert(id, slot);
        id
    }

    /// Resolves the request with the given ID, removing it from the pending set.
    pub fn resolve(&mut self, id: Id) -> Option<RequestSlot> {
        self.pending.remove(&id)
    }

    /// Fails every pending request with a [`SessionClosedError`].
    pub fn fail_all(&mut self) {
        for (_, slot) in self.pending.drain() {
            slot.fail(SessionClosedError.into());
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
