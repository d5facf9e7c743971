//! Extension protocol and metadata exchange (ut_metadata)
//!
//! Carried inside `Message::Extended`. The extension handshake advertises
//! which extension names map to which message ids; metadata messages are a
//! bencoded dictionary optionally followed by raw bytes.

use tracing::debug;

use crate::bencode::{decode, decode_prefix, encode, Value};
use crate::error::{Result, TorrentError};

/// Extended message id of the extension handshake
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// Id we ask peers to use when sending us ut_metadata messages
pub const UT_METADATA_LOCAL_ID: u8 = 16;

/// Extension name for metadata exchange
pub const UT_METADATA: &str = "ut_metadata";

/// Size of each metadata piece
pub const METADATA_PIECE_SIZE: usize = 16384;

/// Largest info dictionary we accept from a peer
pub const MAX_METADATA_SIZE: usize = 8 * 1024 * 1024;

/// Extension handshake payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionHandshake {
    /// The peer's id for ut_metadata, if it supports it
    pub ut_metadata: Option<u8>,
    /// Size of the info dictionary in bytes, if the peer has it
    pub metadata_size: Option<usize>,
}

impl ExtensionHandshake {
    /// Our own handshake: `{"m": {"ut_metadata": 16}}`
    pub fn local() -> Self {
        Self {
            ut_metadata: Some(UT_METADATA_LOCAL_ID),
            metadata_size: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut m = Vec::new();
        if let Some(id) = self.ut_metadata {
            m.push((UT_METADATA, Value::Integer(id as i64)));
        }
        let mut entries = vec![("m", Value::dict(m))];
        if let Some(size) = self.metadata_size {
            entries.push(("metadata_size", Value::Integer(size as i64)));
        }
        encode(&Value::dict(entries))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let value = decode(payload)?;
        if value.as_dict().is_none() {
            return Err(TorrentError::protocol_error_with_source(
                "Extension handshake is not a dictionary",
                value.kind(),
            ));
        }

        // id 0 in the m dictionary means the extension is disabled
        let ut_metadata = value
            .get(b"m")
            .and_then(|m| m.get(UT_METADATA.as_bytes()))
            .and_then(Value::as_int)
            .filter(|id| (1..=255).contains(id))
            .map(|id| id as u8);

        let metadata_size = match value.get(b"metadata_size").and_then(Value::as_int) {
            Some(size) if size < 0 || size as u64 > MAX_METADATA_SIZE as u64 => {
                return Err(TorrentError::protocol_error_with_source(
                    "Peer advertised an implausible metadata_size",
                    size.to_string(),
                ));
            }
            Some(size) => Some(size as usize),
            None => None,
        };

        debug!(
            "Extension handshake: ut_metadata={:?}, metadata_size={:?}",
            ut_metadata, metadata_size
        );
        Ok(Self { ut_metadata, metadata_size })
    }
}

/// ut_metadata message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMessageType {
    Request = 0,
    Data = 1,
    Reject = 2,
}

impl MetadataMessageType {
    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            0 => Some(MetadataMessageType::Request),
            1 => Some(MetadataMessageType::Data),
            2 => Some(MetadataMessageType::Reject),
            _ => None,
        }
    }
}

/// A ut_metadata message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMessage {
    pub msg_type: MetadataMessageType,
    pub piece: u32,
    /// Present on data messages
    pub total_size: Option<usize>,
    /// Raw bytes trailing the dictionary on data messages
    pub data: Vec<u8>,
}

impl MetadataMessage {
    pub fn request(piece: u32) -> Self {
        Self {
            msg_type: MetadataMessageType::Request,
            piece,
            total_size: None,
            data: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut entries = vec![
            ("msg_type", Value::Integer(self.msg_type as i64)),
            ("piece", Value::Integer(self.piece as i64)),
        ];
        if let Some(size) = self.total_size {
            entries.push(("total_size", Value::Integer(size as i64)));
        }
        let mut out = encode(&Value::dict(entries));
        out.extend_from_slice(&self.data);
        out
    }

    /// Decode a dictionary plus trailing payload
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (header, consumed) = decode_prefix(payload)?;

        let msg_type = header
            .get(b"msg_type")
            .and_then(Value::as_int)
            .and_then(MetadataMessageType::from_int)
            .ok_or_else(|| TorrentError::protocol_error("metadata message without valid msg_type"))?;

        let piece = header
            .get(b"piece")
            .and_then(Value::as_int)
            .filter(|p| *p >= 0 && *p <= u32::MAX as i64)
            .ok_or_else(|| TorrentError::protocol_error("metadata message without valid piece"))?
            as u32;

        let total_size = header
            .get(b"total_size")
            .and_then(Value::as_int)
            .filter(|s| *s >= 0)
            .map(|s| s as usize);

        Ok(Self {
            msg_type,
            piece,
            total_size,
            data: payload[consumed..].to_vec(),
        })
    }
}

/// Number of metadata pieces for a given metadata size
pub fn metadata_piece_count(metadata_size: usize) -> usize {
    metadata_size.div_ceil(METADATA_PIECE_SIZE)
}
