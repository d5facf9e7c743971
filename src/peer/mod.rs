//! Peer module
//!
//! Peer wire sessions and the operations built on them.

pub mod connection;
pub mod fetcher;
pub mod metadata;
pub mod state;

pub use connection::{fetch_piece, fetch_piece_with_retry, PeerConnection, SessionOptions};
pub use fetcher::PeerFetcher;
pub use metadata::{fetch_metadata_from_peer, fetch_torrent_info, magnet_handshake, MagnetHandshake};
pub use state::SessionState;
