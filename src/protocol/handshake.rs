//! BitTorrent handshake protocol
//!
//! The fixed 68-byte preamble exchanged before framed messages begin.

use bytes::{BufMut, BytesMut};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::error::{Result, TorrentError};

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Length of a serialized handshake
pub const HANDSHAKE_LEN: usize = 68;

/// Reserved byte carrying the extension protocol flag
const EXTENSION_BYTE: usize = 5;

/// Extension protocol flag within that byte
const EXTENSION_FLAG: u8 = 0x10;

/// Client prefix of generated peer ids
const PEER_ID_PREFIX: &[u8; 8] = b"-RT0001-";

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved bytes (extension flags)
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with all reserved bits clear
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Create a handshake advertising extension protocol support
    pub fn with_extensions(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut handshake = Self::new(info_hash, peer_id);
        handshake.reserved[EXTENSION_BYTE] |= EXTENSION_FLAG;
        handshake
    }

    /// Whether the sender advertises the extension protocol
    pub fn supports_extensions(&self) -> bool {
        self.reserved[EXTENSION_BYTE] & EXTENSION_FLAG != 0
    }

    /// Generate a fresh peer ID: client prefix plus 12 random alphanumerics
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
        let mut rng = rand::thread_rng();
        for byte in peer_id[8..].iter_mut() {
            *byte = rng.sample(Alphanumeric);
        }
        trace!("Generated peer ID: {}", String::from_utf8_lossy(&peer_id));
        peer_id
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING.as_bytes());
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.to_vec()
    }

    /// Deserialize a handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_LEN {
            return Err(TorrentError::protocol_error_with_source(
                "Handshake data too short",
                format!("expected {} bytes, got {}", HANDSHAKE_LEN, data.len()),
            ));
        }

        if data[0] != PROTOCOL_LENGTH || &data[1..20] != PROTOCOL_STRING.as_bytes() {
            return Err(TorrentError::protocol_error_with_source(
                "Invalid protocol string",
                String::from_utf8_lossy(&data[1..20]).to_string(),
            ));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        debug!(
            "Handshake from peer {} (extensions: {})",
            hex::encode(peer_id),
            reserved[EXTENSION_BYTE] & EXTENSION_FLAG != 0
        );
        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Check the echoed info hash
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> Result<()> {
        if self.info_hash != *expected_info_hash {
            warn!(
                "Handshake info hash mismatch: expected {}, got {}",
                hex::encode(expected_info_hash),
                hex::encode(self.info_hash)
            );
            return Err(TorrentError::handshake_mismatch(*expected_info_hash, self.info_hash));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        let bytes = handshake.serialize();
        assert_eq!(bytes.len(), HANDSHAKE_LEN);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], b"BitTorrent protocol");
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..48], &[1u8; 20]);
        assert_eq!(&bytes[48..68], &[2u8; 20]);
        assert_eq!(Handshake::deserialize(&bytes).unwrap(), handshake);
    }

    #[test]
    fn test_extension_bit() {
        let handshake = Handshake::with_extensions([1u8; 20], [2u8; 20]);
        let bytes = handshake.serialize();
        assert_eq!(&bytes[20..28], &[0, 0, 0, 0, 0, 0x10, 0, 0]);
        assert!(Handshake::deserialize(&bytes).unwrap().supports_extensions());
        assert!(!Handshake::new([1u8; 20], [2u8; 20]).supports_extensions());
    }

    #[test]
    fn test_generate_peer_id() {
        let a = Handshake::generate_peer_id();
        let b = Handshake::generate_peer_id();
        assert_eq!(&a[..8], b"-RT0001-");
        assert!(a.iter().all(|c| c.is_ascii_alphanumeric() || *c == b'-'));
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_mismatch() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        assert!(handshake.validate(&[1u8; 20]).is_ok());
        let err = handshake.validate(&[3u8; 20]).unwrap_err();
        assert!(matches!(err, TorrentError::HandshakeMismatch { .. }));
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert!(Handshake::deserialize(&[19u8; 10]).is_err());
        let mut bytes = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        bytes[1] = b'X';
        assert!(Handshake::deserialize(&bytes).is_err());
    }
}
