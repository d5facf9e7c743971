//! BitTorrent protocol messages
//!
//! Length-prefixed peer wire messages. Ids outside the known set decode
//! to `Message::Unknown` so a session can skip them.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::{Result, TorrentError};

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
    Extended = 20,
}

impl MessageId {
    /// Map a wire byte to a known id
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageId::Choke),
            1 => Some(MessageId::Unchoke),
            2 => Some(MessageId::Interested),
            3 => Some(MessageId::NotInterested),
            4 => Some(MessageId::Have),
            5 => Some(MessageId::Bitfield),
            6 => Some(MessageId::Request),
            7 => Some(MessageId::Piece),
            8 => Some(MessageId::Cancel),
            9 => Some(MessageId::Port),
            20 => Some(MessageId::Extended),
            _ => None,
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    Port { listen_port: u16 },
    /// Extension protocol message; `ext_id` 0 is the extension handshake
    Extended { ext_id: u8, payload: Vec<u8> },
    /// Any id we do not understand, kept raw
    Unknown { id: u8, payload: Vec<u8> },
}

impl Message {
    /// Get the wire id (None for KeepAlive)
    pub fn id(&self) -> Option<u8> {
        let id = match self {
            Message::KeepAlive => return None,
            Message::Choke => MessageId::Choke,
            Message::Unchoke => MessageId::Unchoke,
            Message::Interested => MessageId::Interested,
            Message::NotInterested => MessageId::NotInterested,
            Message::Have { .. } => MessageId::Have,
            Message::Bitfield { .. } => MessageId::Bitfield,
            Message::Request { .. } => MessageId::Request,
            Message::Piece { .. } => MessageId::Piece,
            Message::Cancel { .. } => MessageId::Cancel,
            Message::Port { .. } => MessageId::Port,
            Message::Extended { .. } => MessageId::Extended,
            Message::Unknown { id, .. } => return Some(*id),
        };
        Some(id as u8)
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
            Message::Port { .. } => 3,
            Message::Extended { payload, .. } => 2 + payload.len() as u32,
            Message::Unknown { payload, .. } => 1 + payload.len() as u32,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());
        if let Some(id) = self.id() {
            buf.put_u8(id);
        }

        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => {}
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            Message::Port { listen_port } => buf.put_u16(*listen_port),
            Message::Extended { ext_id, payload } => {
                buf.put_u8(*ext_id);
                buf.put_slice(payload);
            }
            Message::Unknown { payload, .. } => buf.put_slice(payload),
        }

        trace!("Message serialized: {} bytes", buf.len());
        buf.to_vec()
    }

    /// Decode a frame body (id byte plus payload, no length prefix)
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        if frame.is_empty() {
            return Ok(Message::KeepAlive);
        }

        let mut buf = &frame[1..];
        let id = frame[0];
        let Some(message_id) = MessageId::from_u8(id) else {
            debug!("Unknown message id {} ({} byte payload)", id, buf.len());
            return Ok(Message::Unknown { id, payload: buf.to_vec() });
        };

        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => {
                Self::require(buf, 4, "Have")?;
                Message::Have { piece_index: buf.get_u32() }
            }
            MessageId::Bitfield => Message::Bitfield { bitfield: buf.to_vec() },
            MessageId::Request => {
                Self::require(buf, 12, "Request")?;
                Message::Request {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Piece => {
                Self::require(buf, 8, "Piece")?;
                let index = buf.get_u32();
                let begin = buf.get_u32();
                Message::Piece { index, begin, block: buf.to_vec() }
            }
            MessageId::Cancel => {
                Self::require(buf, 12, "Cancel")?;
                Message::Cancel {
                    index: buf.get_u32(),
                    begin: buf.get_u32(),
                    length: buf.get_u32(),
                }
            }
            MessageId::Port => {
                Self::require(buf, 2, "Port")?;
                Message::Port { listen_port: buf.get_u16() }
            }
            MessageId::Extended => {
                Self::require(buf, 1, "Extended")?;
                let ext_id = buf.get_u8();
                Message::Extended { ext_id, payload: buf.to_vec() }
            }
        };

        trace!("Decoded {:?} frame ({} bytes)", message_id, frame.len());
        Ok(message)
    }

    /// Deserialize a message from bytes (including length prefix)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(TorrentError::protocol_error_with_source(
                "Message too short",
                format!("missing length prefix, got {} bytes", data.len()),
            ));
        }
        let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() - 4 < length {
            return Err(TorrentError::protocol_error_with_source(
                "Message truncated",
                format!("length prefix {} but {} bytes follow", length, data.len() - 4),
            ));
        }
        Self::from_frame(&data[4..4 + length])
    }

    fn require(buf: &[u8], needed: usize, kind: &str) -> Result<()> {
        if buf.len() < needed {
            return Err(TorrentError::protocol_error_with_source(
                format!("{} message too short", kind),
                format!("expected {} bytes, got {}", needed, buf.len()),
            ));
        }
        Ok(())
    }
}
