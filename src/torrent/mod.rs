//! Torrent metadata module
//!
//! Metainfo from .torrent files and magnet links.

pub mod parser;
pub mod info;
pub mod magnet;

pub use parser::TorrentParser;
pub use info::{verify_digest, TorrentInfo, HASH_LEN};
pub use magnet::MagnetLink;
