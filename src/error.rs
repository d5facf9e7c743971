//! Error types for the BitTorrent client
//!
//! This module defines the error taxonomy shared by the codec, the tracker
//! client, peer sessions and the download orchestrator.

use std::fmt;

/// Library result type
pub type Result<T> = std::result::Result<T, TorrentError>;

/// Error type for torrent operations
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Bencoding parse failure (also used for structurally invalid metainfo)
    MalformedInput {
        message: String,
        offset: Option<usize>,
    },

    /// Encode of a value kind bencoding cannot represent
    UnsupportedType {
        type_name: String,
    },

    /// Tracker transport failure or unparsable/incomplete response
    TrackerError {
        message: String,
        source: Option<String>,
    },

    /// Info hash echoed by the peer differs from the one we sent
    HandshakeMismatch {
        expected: [u8; 20],
        actual: [u8; 20],
    },

    /// Digest mismatch for a piece or for magnet metadata
    IntegrityError {
        message: String,
        piece: Option<u32>,
    },

    /// Socket open/read/write failure, including deadline breaches
    ConnectionError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// Peer sent something the protocol does not allow at this point
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// No peer could serve the remaining pieces
    ExhaustedPeers {
        remaining: usize,
        refreshes: usize,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Reading the torrent file or writing the output failed
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },
}

impl TorrentError {
    /// Create a new MalformedInput error
    pub fn malformed(message: impl Into<String>) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            offset: None,
        }
    }

    /// Create a new MalformedInput error at a byte offset
    pub fn malformed_at(message: impl Into<String>, offset: usize) -> Self {
        TorrentError::MalformedInput {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Create a new UnsupportedType error
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        TorrentError::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create a new TrackerError
    pub fn tracker_error(message: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new TrackerError with source
    pub fn tracker_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::TrackerError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new HandshakeMismatch
    pub fn handshake_mismatch(expected: [u8; 20], actual: [u8; 20]) -> Self {
        TorrentError::HandshakeMismatch { expected, actual }
    }

    /// Create a new IntegrityError
    pub fn integrity_error(message: impl Into<String>) -> Self {
        TorrentError::IntegrityError {
            message: message.into(),
            piece: None,
        }
    }

    /// Create a new IntegrityError for a piece
    pub fn piece_integrity_error(message: impl Into<String>, piece: u32) -> Self {
        TorrentError::IntegrityError {
            message: message.into(),
            piece: Some(piece),
        }
    }

    /// Create a new ConnectionError
    pub fn connection_error(message: impl Into<String>) -> Self {
        TorrentError::ConnectionError {
            message: message.into(),
            peer: None,
            source: None,
        }
    }

    /// Create a new ConnectionError with peer and source
    pub fn connection_error_full(message: impl Into<String>, peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ConnectionError {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new ExhaustedPeers error
    pub fn exhausted_peers(remaining: usize, refreshes: usize) -> Self {
        TorrentError::ExhaustedPeers { remaining, refreshes }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Attach the peer address to a ConnectionError
    pub fn with_peer(mut self, addr: impl Into<String>) -> Self {
        if let TorrentError::ConnectionError { peer, .. } = &mut self {
            if peer.is_none() {
                *peer = Some(addr.into());
            }
        }
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::TrackerError { source, .. }
            | TorrentError::ConnectionError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::StorageError { source, .. } => {
                *source = Some(source.as_ref().map_or_else(|| ctx.clone(), |s| format!("{}: {}", s, ctx)));
            }
            TorrentError::MalformedInput { message, .. } | TorrentError::IntegrityError { message, .. } => {
                *message = format!("{} ({})", message, ctx);
            }
            _ => {}
        }
        self
    }

    /// Whether a fresh attempt (new connection or different peer) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TorrentError::ConnectionError { .. }
                | TorrentError::HandshakeMismatch { .. }
                | TorrentError::IntegrityError { .. }
                | TorrentError::ProtocolError { .. }
        )
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentError::MalformedInput { message, offset } => {
                if let Some(offset) = offset {
                    write!(f, "Malformed input: {} (at byte {})", message, offset)
                } else {
                    write!(f, "Malformed input: {}", message)
                }
            }
            TorrentError::UnsupportedType { type_name } => {
                write!(f, "Unsupported type: {} cannot be bencoded", type_name)
            }
            TorrentError::TrackerError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Tracker error: {} (source: {})", message, src)
                } else {
                    write!(f, "Tracker error: {}", message)
                }
            }
            TorrentError::HandshakeMismatch { expected, actual } => {
                write!(
                    f,
                    "Handshake mismatch: expected info hash {}, got {}",
                    hex::encode(expected),
                    hex::encode(actual)
                )
            }
            TorrentError::IntegrityError { message, piece } => {
                if let Some(index) = piece {
                    write!(f, "Integrity error: {} (piece: {})", message, index)
                } else {
                    write!(f, "Integrity error: {}", message)
                }
            }
            TorrentError::ConnectionError { message, peer, source } => {
                match (peer, source) {
                    (Some(p), Some(s)) => write!(f, "Connection error: {} (peer: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Connection error: {} (peer: {})", message, p),
                    (None, Some(s)) => write!(f, "Connection error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Connection error: {}", message),
                }
            }
            TorrentError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            TorrentError::ExhaustedPeers { remaining, refreshes } => {
                write!(
                    f,
                    "Exhausted peers: {} pieces remaining after {} tracker refreshes without progress",
                    remaining, refreshes
                )
            }
            TorrentError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
            TorrentError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
        }
    }
}

impl std::error::Error for TorrentError {}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::ConnectionError {
            message: err.to_string(),
            peer: None,
            source: Some(err.kind().to_string()),
        }
    }
}

impl From<reqwest::Error> for TorrentError {
    fn from(err: reqwest::Error) -> Self {
        TorrentError::tracker_error_with_source("HTTP request failed", err.to_string())
    }
}

impl From<std::net::AddrParseError> for TorrentError {
    fn from(err: std::net::AddrParseError) -> Self {
        TorrentError::ConfigError {
            message: format!("Failed to parse address: {}", err),
            field: Some("peer".to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::connection_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_at() {
        let err = TorrentError::malformed_at("unterminated integer", 7);
        assert_eq!(err.to_string(), "Malformed input: unterminated integer (at byte 7)");
    }

    #[test]
    fn test_handshake_mismatch_display() {
        let err = TorrentError::handshake_mismatch([0xaa; 20], [0xbb; 20]);
        let text = err.to_string();
        assert!(text.contains(&"aa".repeat(20)));
        assert!(text.contains(&"bb".repeat(20)));
    }

    #[test]
    fn test_connection_error_with_peer() {
        let err = TorrentError::connection_error("reset").with_peer("127.0.0.1:6881");
        assert!(err.to_string().contains("127.0.0.1:6881"));
    }

    #[test]
    fn test_with_context() {
        let err = TorrentError::tracker_error("bad response").with_context("while announcing");
        assert!(err.to_string().contains("while announcing"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TorrentError::connection_error("reset").is_retryable());
        assert!(TorrentError::piece_integrity_error("hash mismatch", 3).is_retryable());
        assert!(TorrentError::handshake_mismatch([0; 20], [1; 20]).is_retryable());
        assert!(!TorrentError::tracker_error("down").is_retryable());
        assert!(!TorrentError::malformed("bad").is_retryable());
        assert!(!TorrentError::exhausted_peers(2, 10).is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::ConnectionError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: TorrentError = addr_err.into();
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }
}
