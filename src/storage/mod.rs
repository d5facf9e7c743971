//! Storage module
//!
//! Piece buffering, download orchestration and output writing.

pub mod download;
pub mod file;
pub mod piece;

pub use download::{download_single_piece, DownloadManager, DownloadOptions, PeerSource, PieceFetcher, WorkQueue};
pub use file::write_output;
pub use piece::{block_requests, BlockRequest, PieceBuffer, BLOCK_SIZE};
