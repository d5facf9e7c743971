//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use std::net::SocketAddrV4;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI arguments for the BitTorrent client
#[derive(Debug, Parser)]
#[command(name = "bittorrent-client")]
#[command(about = "A small BitTorrent client: decode, inspect, and download torrents", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Port announced to the tracker
    #[arg(long, global = true, default_value_t = 6881)]
    pub port: u16,

    /// Seconds allowed for a TCP connect to a peer
    #[arg(long, global = true, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Seconds allowed for each peer read or write
    #[arg(long, global = true, value_name = "SECS", default_value_t = 30)]
    pub io_timeout: u64,

    /// Connections tried per peer for one piece
    #[arg(long, global = true, default_value_t = 3)]
    pub attempts: usize,

    /// Pieces fetched concurrently during a full download
    #[arg(long, global = true, default_value_t = 1)]
    pub workers: usize,

    /// Tracker refreshes without progress before giving up
    #[arg(long, global = true, default_value_t = 10)]
    pub max_refreshes: usize,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no log output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode { value: String },

    /// Encode a JSON value as bencode
    Encode { json: String },

    /// Print torrent metainfo
    Info { torrent: PathBuf },

    /// List peers returned by the tracker
    Peers { torrent: PathBuf },

    /// Handshake with a peer and print its peer id
    Handshake { torrent: PathBuf, peer: SocketAddrV4 },

    /// Download and verify one piece
    #[command(name = "download_piece")]
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },

    /// Download the whole torrent
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
    },

    /// Print the tracker and info hash of a magnet link
    #[command(name = "magnet_parse")]
    MagnetParse { link: String },

    /// Handshake with the first tracker peer of a magnet link
    #[command(name = "magnet_handshake")]
    MagnetHandshake { link: String },

    /// Fetch and print metainfo for a magnet link
    #[command(name = "magnet_info")]
    MagnetInfo { link: String },

    /// Download one piece of a magnet link
    #[command(name = "magnet_download_piece")]
    MagnetDownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        link: String,
        index: u32,
    },

    /// Download the whole content of a magnet link
    #[command(name = "magnet_download")]
    MagnetDownload {
        #[arg(short, long)]
        output: PathBuf,
        link: String,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["bittorrent-client", "info", "sample.torrent"]).unwrap();
        assert_eq!(args.port, 6881);
        assert_eq!(args.connect_timeout, 10);
        assert_eq!(args.io_timeout, 30);
        assert_eq!(args.attempts, 3);
        assert_eq!(args.workers, 1);
        assert_eq!(args.max_refreshes, 10);
        assert_eq!(args.log_level(), tracing::Level::INFO);
        assert!(matches!(args.command, Command::Info { ref torrent } if torrent == &PathBuf::from("sample.torrent")));
    }

    #[test]
    fn test_download_piece() {
        let args = CliArgs::try_parse_from([
            "bittorrent-client",
            "download_piece",
            "-o",
            "/tmp/piece-0",
            "sample.torrent",
            "0",
        ])
        .unwrap();
        match args.command {
            Command::DownloadPiece { output, torrent, index } => {
                assert_eq!(output, PathBuf::from("/tmp/piece-0"));
                assert_eq!(torrent, PathBuf::from("sample.torrent"));
                assert_eq!(index, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_handshake_peer_address() {
        let args = CliArgs::try_parse_from(["bittorrent-client", "handshake", "sample.torrent", "127.0.0.1:6881"]).unwrap();
        assert!(matches!(args.command, Command::Handshake { peer, .. } if peer.port() == 6881));
        assert!(CliArgs::try_parse_from(["bittorrent-client", "handshake", "sample.torrent", "nonsense"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "bittorrent-client",
            "magnet_download",
            "-o",
            "out",
            "magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f",
            "--workers",
            "4",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.workers, 4);
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
        assert!(matches!(args.command, Command::MagnetDownload { .. }));
    }

    #[test]
    fn test_unknown_command() {
        assert!(CliArgs::try_parse_from(["bittorrent-client", "seed", "x"]).is_err());
    }
}
