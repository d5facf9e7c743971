//! bittorrent-client
//!
//! A BitTorrent client core: bencoding, metainfo, tracker announces, the peer
//! wire protocol, magnet metadata exchange and verified piece download.

pub mod bencode;
pub mod cli;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::{Result, TorrentError};

pub use bencode::{decode, encode, Value};
pub use cli::{CliArgs, Command, Config};
pub use peer::{PeerConnection, PeerFetcher, SessionOptions, SessionState};
pub use protocol::{BitTorrentWire, ExtensionHandshake, Handshake, Message, MessageId, MetadataMessage, WireProtocol};
pub use storage::{DownloadManager, DownloadOptions, PeerSource, PieceFetcher};
pub use torrent::{MagnetLink, TorrentInfo, TorrentParser};
pub use tracker::{parse_compact_peers, AnnounceRequest, AnnounceResponse, TrackerClient, TrackerPeerSource};
