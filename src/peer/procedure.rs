use anyhow::Result;
use async_trait::async_trait;

use crate::core::{
    types::{
        Dictionary,
        List,
    },
    uri::Uri,
};

/// A single invocation of a procedure, routed to the peer that registered it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// The procedure being invoked.
    pub procedure: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// The result of a procedure invocation, sent back to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RpcYield {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A handler for invocations of a registered procedure.
///
/// Invocations run concurrently, so a handler may be invoked again while a
/// previous invocation is still in progress.
///
/// A returned error is transmitted back to the caller. An error with a known
/// reason URI (such as a [`WampError`](crate::core::error::WampError)) keeps
/// its reason. Any other error is reported as a generic invocation error.
#[async_trait]
pub trait ProcedureHandler: Send + Sync {
    /// Invokes the procedure, producing a result for the caller.
    async fn invoke(&self, invocation: Invocation) -> Result<RpcYield>;
}
