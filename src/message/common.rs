use anyhow::Error;

use crate::{
    core::{
        close::CloseReason,
        error::uri_for_error,
        id::Id,
        types::{
            Dictionary,
            Value,
        },
    },
    message::message::{
        AbortMessage,
        ErrorMessage,
        GoodbyeMessage,
        Message,
    },
};

fn details_for_error(error: &Error) -> Dictionary {
    Dictionary::from_iter([("message".to_owned(), Value::String(error.to_string()))])
}

/// Constructs an ABORT message communicating the given error.
pub fn abort_message_for_error(error: &Error) -> Message {
    Message::Abort(AbortMessage {
        details: details_for_error(error),
        reason: uri_for_error(error),
    })
}

/// Constructs a GOODBYE message with the given close reason.
pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

/// Constructs the GOODBYE message acknowledging a close initiated by the other peer.
pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// Constructs an ERROR message failing the given invocation request.
pub fn error_for_invocation(invocation_request: Id, error: &Error) -> Message {
    Message::Error(ErrorMessage {
        request_type: Message::INVOCATION_TAG,
        request: invocation_request,
        details: details_for_error(error),
        error: uri_for_error(error),
        ..Default::default()
    })
}
