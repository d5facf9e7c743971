//! Tracker module
//!
//! HTTP announces and compact peer list decoding.

pub mod client;
pub mod peers;
pub mod source;

pub use client::{AnnounceRequest, AnnounceResponse, TrackerClient, UNKNOWN_LEFT};
pub use peers::parse_compact_peers;
pub use source::TrackerPeerSource;
