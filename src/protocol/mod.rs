//! BitTorrent protocol module
//!
//! Implements the BitTorrent peer wire protocol and the extension protocol.

pub mod extension;
pub mod handshake;
pub mod message;
pub mod wire;

// Re-export main types
pub use extension::{
    metadata_piece_count, ExtensionHandshake, MetadataMessage, MetadataMessageType, EXTENSION_HANDSHAKE_ID,
    MAX_METADATA_SIZE, METADATA_PIECE_SIZE, UT_METADATA_LOCAL_ID,
};
pub use handshake::{Handshake, HANDSHAKE_LEN, PROTOCOL_LENGTH, PROTOCOL_STRING};
pub use message::{Message, MessageId};
pub use wire::{BitTorrentWire, WireProtocol, MAX_FRAME_LEN};
