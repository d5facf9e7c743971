//! Peer state module
//!
//! Lifecycle of a single peer session.

use std::fmt;

/// Phase of a peer wire session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// TCP connect in progress
    #[default]
    Connecting,
    /// Exchanging the 68-byte handshake
    Handshaking,
    /// Exchanging extension protocol handshakes
    ExtensionHandshaking,
    /// Waiting for the peer's bitfield
    AwaitingBitfield,
    /// Sending interested
    Interested,
    /// Waiting for unchoke
    AwaitingUnchoke,
    /// Requests may be sent
    Transferring,
    /// Session closed normally
    Done,
    /// Session hit an error and must not be reused
    Failed,
}

impl SessionState {
    /// Whether the session can no longer be used
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Whether block requests may be sent
    pub fn can_request(&self) -> bool {
        matches!(self, SessionState::Transferring)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::ExtensionHandshaking => "extension handshaking",
            SessionState::AwaitingBitfield => "awaiting bitfield",
            SessionState::Interested => "interested",
            SessionState::AwaitingUnchoke => "awaiting unchoke",
            SessionState::Transferring => "transferring",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}
