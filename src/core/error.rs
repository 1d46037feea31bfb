use anyhow::Error;
use thiserror::Error;

use crate::{
    core::{
        types::Value,
        uri::Uri,
    },
    message::message::Message,
};

/// A basic error, used for common failure modes across the library.
///
/// Transmitted to remote peers as a `wamp.error.*` URI.
#[derive(Debug, Error)]
pub enum BasicError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotAllowed(String),
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    fn uri_component(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::Internal(_) => "internal",
        }
    }
}

/// An error occurring over some session interaction, as defined by the WAMP protocol.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("no such procedure")]
    NoSuchProcedure,
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    #[error("no such registration")]
    NoSuchRegistration,
    #[error("no such realm")]
    NoSuchRealm,
    #[error("{0}")]
    InvocationError(String),
}

impl InteractionError {
    fn uri_component(&self) -> &'static str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchRealm => "no_such_realm",
            Self::InvocationError(_) => "invocation_error",
        }
    }
}

/// An error over the underlying transport of a connection.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// An error resulting from attempting a session operation before the session is established.
#[derive(Debug, Error)]
#[error("session is not established")]
pub struct NotEstablishedError;

/// An error resulting from the session closing while an operation was pending.
#[derive(Debug, Clone, Error)]
#[error("session closed")]
pub struct SessionClosedError;

/// An application-level error with an arbitrary reason URI, received from or
/// transmitted to a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WampError {
    reason: Uri,
    message: String,
}

impl WampError {
    pub fn new<S>(reason: Uri, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// The reason URI for the error.
    pub fn reason(&self) -> &Uri {
        &self.reason
    }

    /// The human-readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The reason URI transmitted to remote peers for the given error.
pub fn uri_for_error(error: &Error) -> Uri {
    if let Some(error) = error.downcast_ref::<BasicError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else if let Some(error) = error.downcast_ref::<InteractionError>() {
        Uri::from_known(format!("wamp.error.{}", error.uri_component()))
    } else if let Some(error) = error.downcast_ref::<WampError>() {
        error.reason().clone()
    } else if error.downcast_ref::<NotEstablishedError>().is_some() {
        Uri::from_known("wamp.error.not_established")
    } else if error.downcast_ref::<SessionClosedError>().is_some() {
        Uri::from_known("wamp.error.session_closed")
    } else if error.downcast_ref::<TransportError>().is_some() {
        Uri::from_known("wamp.error.transport")
    } else {
        Uri::from_known("wamp.error.internal")
    }
}

/// Reconstructs an error from a reason URI and message received from a remote peer.
///
/// Known `wamp.error.*` reasons map back to their typed error. Anything else
/// becomes a [`WampError`] carrying the reason as is.
pub fn error_from_uri_reason_and_message(reason: Uri, message: String) -> Error {
    match reason.as_str() {
        "wamp.error.not_found" => BasicError::NotFound(message).into(),
        "wamp.error.invalid_argument" => BasicError::InvalidArgument(message).into(),
        "wamp.error.not_allowed" => BasicError::NotAllowed(message).into(),
        "wamp.error.internal" => BasicError::Internal(message).into(),
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.procedure_already_exists" => InteractionError::ProcedureAlreadyExists.into(),
        "wamp.error.no_such_registration" => InteractionError::NoSuchRegistration.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.invocation_error" => InteractionError::InvocationError(message).into(),
        _ => WampError::new(reason, message).into(),
    }
}

/// Extracts the reason URI and message text from an ABORT, GOODBYE, or ERROR message.
pub fn extract_error_uri_reason_and_message(message: &Message) -> Option<(&Uri, String)> {
    let (reason, details) = match message {
        Message::Abort(message) => (&message.reason, &message.details),
        Message::Goodbye(message) => (&message.reason, &message.details),
        Message::Error(message) => (&message.error, &message.details),
        _ => return None,
    };
    let text = match details.get("message") {
        Some(Value::String(text)) => text.clone(),
        _ => String::default(),
    };
    Some((reason, text))
}

/// Reconstructs the error communicated by an ABORT, GOODBYE, or ERROR message.
///
/// Fails if the message is of some other kind.
pub fn error_from_message(message: &Message) -> Result<Error, Error> {
    match extract_error_uri_reason_and_message(message) {
        Some((reason, text)) => Ok(error_from_uri_reason_and_message(reason.clone(), text)),
        None => Err(InteractionError::ProtocolViolation(format!(
            "{} message does not communicate an error",
            message.message_name()
        ))
        .into()),
    }
}

/// Wraps a procedure handler failure for transmission back to the caller.
///
/// Typed errors pass through unchanged so their reason URI survives. Everything
/// else becomes a generic invocation error.
pub fn invocation_error(error: Error) -> Error {
    if error.downcast_ref::<BasicError>().is_some()
        || error.downcast_ref::<InteractionError>().is_some()
        || error.downcast_ref::<WampError>().is_some()
    {
        error
    } else {
        InteractionError::InvocationError(error.to_string()).into()
    }
}

#[cfg(test)]
mod error_test {
    use crate::core::{
        error::{
            BasicError,
            InteractionError,
            WampError,
            error_from_uri_reason_and_message,
            invocation_error,
            uri_for_error,
        },
        uri::Uri,
    };

    #[test]
    fn maps_typed_errors_to_uris() {
        assert_eq!(
            uri_for_error(&BasicError::NotFound("missing".to_owned()).into()).as_str(),
            "wamp.error.not_found",
        );
        assert_eq!(
            uri_for_error(&InteractionError::NoSuchProcedure.into()).as_str(),
            "wamp.error.no_such_procedure",
        );
        assert_eq!(
            uri_for_error(&anyhow::Error::msg("anything")).as_str(),
            "wamp.error.internal",
        );
    }

    #[test]
    fn round_trips_known_reasons() {
        let error = error_from_uri_reason_and_message(
            Uri::try_from("wamp.error.no_such_realm").unwrap(),
            String::default(),
        );
        assert!(error.downcast_ref::<InteractionError>().is_some());
    }

    #[test]
    fn preserves_unknown_reasons() {
        let error = error_from_uri_reason_and_message(
            Uri::try_from("com.example.error.out_of_stock").unwrap(),
            "out of stock".to_owned(),
        );
        let error = error.downcast_ref::<WampError>().unwrap();
        assert_eq!(error.reason().as_str(), "com.example.error.out_of_stock");
        assert_eq!(error.message(), "out of stock");
    }

    #[test]
    fn wraps_untyped_invocation_failures() {
        let error = invocation_error(anyhow::Error::msg("boom"));
        assert_eq!(
            uri_for_error(&error).as_str(),
            "wamp.error.invocation_error"
        );
        assert_eq!(error.to_string(), "boom");

        let error = invocation_error(WampError::new(
            Uri::try_from("com.example.error.custom").unwrap(),
            "custom",
        )
        .into());
        assert_eq!(uri_for_error(&error).as_str(), "com.example.error.custom");
    }
}
