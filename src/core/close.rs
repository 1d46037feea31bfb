use crate::core::uri::Uri;

/// The reason a session is closing, attached to GOODBYE messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The close was a normal part of the peer's operation.
    #[default]
    Normal,
    /// The closing peer is shutting down entirely.
    SystemShutdown,
    /// The session was killed by the remote peer.
    Killed,
    /// Acknowledgment of a close initiated by the other peer.
    GoodbyeAndOut,
}

impl CloseReason {
    /// The URI communicated to the remote peer for the close reason.
    pub fn uri(&self) -> Uri {
        match self {
            Self::Normal => Uri::from_known("wamp.close.normal"),
            Self::SystemShutdown => Uri::from_known("wamp.close.system_shutdown"),
            Self::Killed => Uri::from_known("wamp.close.killed"),
            Self::GoodbyeAndOut => Uri::from_known("wamp.close.goodbye_and_out"),
        }
    }
}
