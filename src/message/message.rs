use serde_struct_tuple::{
    DeserializeStructTuple,
    SerializeStructTuple,
};
use serde_struct_tuple_enum::{
    DeserializeStructTupleEnum,
    SerializeStructTupleEnum,
};

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
    },
    uri::Uri,
};

/// Message for a client to initiate a session in a realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct HelloMessage {
    pub realm: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub details: Dictionary,
}

/// Message for a router to accept a client, and a session is now open.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct WelcomeMessage {
    pub session: Id,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub details: Dictionary,
}

/// Message for a peer to abort the opening of a session.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// Message for a peer to close a previously-opened session.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// Message for a peer to communicate that a request failed.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// Message for a caller to call a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// Message for a router to communicate the result of a call back to the caller.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub yield_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub yield_arguments_keyword: Dictionary,
}

/// Message for a callee to register a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
}

/// Message for a router to acknowledge a procedure registration.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// Message for a callee to unregister a procedure from the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// Message for a router to acknowledge a procedure unregistration.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// Message for a router to invoke a registered procedure on a callee.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub call_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub call_arguments_keyword: Dictionary,
}

/// Message for a callee to communicate the result of an invocation back to the router.
#[derive(Debug, Default, Clone, PartialEq, Eq, SerializeStructTuple, DeserializeStructTuple)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    #[serde_struct_tuple(default, skip_serializing_if = List::is_empty)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A message transmitted between peers.
///
/// Messages are serialized as lists, where the first element is the integer tag
/// identifying the message type.
#[derive(Debug, Clone, PartialEq, Eq, SerializeStructTupleEnum, DeserializeStructTupleEnum)]
#[tag(Integer)]
pub enum Message {
    #[tag = 1]
    Hello(HelloMessage),
    #[tag = 2]
    Welcome(WelcomeMessage),
    #[tag = 3]
    Abort(AbortMessage),
    #[tag = 6]
    Goodbye(GoodbyeMessage),
    #[tag = 8]
    Error(ErrorMessage),
    #[tag = 48]
    Call(CallMessage),
    #[tag = 50]
    Result(ResultMessage),
    #[tag = 64]
    Register(RegisterMessage),
    #[tag = 65]
    Registered(RegisteredMessage),
    #[tag = 66]
    Unregister(UnregisterMessage),
    #[tag = 67]
    Unregistered(UnregisteredMessage),
    #[tag = 68]
    Invocation(InvocationMessage),
    #[tag = 70]
    Yield(YieldMessage),
}

impl Message {
    /// The human-readable name of the message type, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Call(_) => "CALL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The request ID the message refers to, if any.
    ///
    /// For request messages, this is the ID of the request itself. For response
    /// messages, this is the ID of the request being responded to.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Call(message) => Some(message.request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary attached to the message, if any.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The reason URI attached to the message, if any.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod message_test {
    use pretty_assertions::assert_eq;

    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                Value,
            },
            uri::Uri,
        },
        message::message::{
            CallMessage,
            ErrorMessage,
            GoodbyeMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            RegisteredMessage,
            ResultMessage,
            WelcomeMessage,
            YieldMessage,
        },
    };

    #[test]
    fn serializes_hello() {
        let message = Message::Hello(HelloMessage {
            realm: Uri::try_from("com.example.realm").unwrap(),
            details: Dictionary::from_iter([("agent".to_owned(), Value::from("turnstile"))]),
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[1,"com.example.realm",{"agent":"turnstile"}]"#,
        );
    }

    #[test]
    fn deserializes_welcome() {
        assert_eq!(
            serde_json::from_str::<Message>(r#"[2,394892834,{"roles":{"dealer":{}}}]"#).unwrap(),
            Message::Welcome(WelcomeMessage {
                session: Id::try_from(394892834).unwrap(),
                details: Dictionary::from_iter([(
                    "roles".to_owned(),
                    Value::Dictionary(Dictionary::from_iter([(
                        "dealer".to_owned(),
                        Value::Dictionary(Dictionary::default()),
                    )])),
                )]),
            }),
        );
    }

    #[test]
    fn serializes_call_without_empty_arguments() {
        let message = Message::Call(CallMessage {
            request: Id::try_from(7814135).unwrap(),
            procedure: Uri::try_from("com.myapp.ping").unwrap(),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[48,7814135,{},"com.myapp.ping"]"#,
        );
    }

    #[test]
    fn serializes_call_with_arguments() {
        let message = Message::Call(CallMessage {
            request: Id::try_from(7814135).unwrap(),
            procedure: Uri::try_from("com.myapp.add2").unwrap(),
            arguments: Vec::from_iter([Value::from(23), Value::from(7)]),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[48,7814135,{},"com.myapp.add2",[23,7]]"#,
        );
    }

    #[test]
    fn deserializes_result_without_arguments() {
        assert_eq!(
            serde_json::from_str::<Message>(r#"[50,7814135,{}]"#).unwrap(),
            Message::Result(ResultMessage {
                call_request: Id::try_from(7814135).unwrap(),
                ..Default::default()
            }),
        );
    }

    #[test]
    fn deserializes_invocation() {
        assert_eq!(
            serde_json::from_str::<Message>(r#"[68,6131533,9823527,{},[23,7]]"#).unwrap(),
            Message::Invocation(InvocationMessage {
                request: Id::try_from(6131533).unwrap(),
                registered_registration: Id::try_from(9823527).unwrap(),
                call_arguments: Vec::from_iter([Value::from(23), Value::from(7)]),
                ..Default::default()
            }),
        );
    }

    #[test]
    fn serializes_yield() {
        let message = Message::Yield(YieldMessage {
            invocation_request: Id::try_from(6131533).unwrap(),
            arguments: Vec::from_iter([Value::from(30)]),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[70,6131533,{},[30]]"#,
        );
    }

    #[test]
    fn round_trips_error() {
        let message = Message::Error(ErrorMessage {
            request_type: Message::CALL_TAG,
            request: Id::try_from(7814135).unwrap(),
            error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
            ..Default::default()
        });
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"[8,48,7814135,{},"wamp.error.no_such_procedure"]"#);
        assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), message);
    }

    #[test]
    fn deserializes_registered() {
        assert_eq!(
            serde_json::from_str::<Message>(r#"[65,25349185,2103333224]"#).unwrap(),
            Message::Registered(RegisteredMessage {
                register_request: Id::try_from(25349185).unwrap(),
                registration: Id::try_from(2103333224).unwrap(),
            }),
        );
    }

    #[test]
    fn deserializes_goodbye() {
        assert_eq!(
            serde_json::from_str::<Message>(r#"[6,{"message":"The host is shutting down now."},"wamp.close.system_shutdown"]"#)
                .unwrap(),
            Message::Goodbye(GoodbyeMessage {
                details: Dictionary::from_iter([(
                    "message".to_owned(),
                    Value::from("The host is shutting down now."),
                )]),
                reason: Uri::try_from("wamp.close.system_shutdown").unwrap(),
            }),
        );
    }

    #[test]
    fn exposes_wire_tags() {
        assert_eq!(Message::HELLO_TAG, 1);
        assert_eq!(Message::GOODBYE_TAG, 6);
        assert_eq!(Message::ERROR_TAG, 8);
        assert_eq!(Message::CALL_TAG, 48);
        assert_eq!(Message::INVOCATION_TAG, 68);
        assert_eq!(Message::YIELD_TAG, 70);
    }

    #[test]
    fn fails_deserialization_of_unknown_tag() {
        assert!(serde_json::from_str::<Message>(r#"[1000,"com.example.realm",{}]"#).is_err());
    }
}
