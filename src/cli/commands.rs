//! Command handlers
//!
//! Each subcommand maps onto one library operation and prints its result.

use std::io::Write;
use std::net::SocketAddrV4;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bencode::{decode, encode, Value};
use crate::cli::args::Command;
use crate::cli::config::Config;
use crate::error::{Result, TorrentError};
use crate::peer::{fetch_torrent_info, magnet_handshake, PeerConnection, PeerFetcher, SessionOptions};
use crate::protocol::Handshake;
use crate::storage::{download_single_piece, write_output, DownloadManager};
use crate::torrent::{MagnetLink, TorrentInfo, TorrentParser};
use crate::tracker::{AnnounceRequest, TrackerClient, TrackerPeerSource, UNKNOWN_LEFT};

/// Run one command, writing its output to `out`
pub async fn execute<W: Write + Send>(command: &Command, config: &Config, out: &mut W) -> Result<()> {
    debug!("Executing {:?}", command);
    match command {
        Command::Decode { value } => {
            let decoded = decode(value.as_bytes())?;
            let json = serde_json::to_string(&decoded)
                .map_err(|e| TorrentError::malformed(format!("cannot render as JSON: {}", e)))?;
            emit(out, &json)
        }
        Command::Encode { json } => {
            let parsed: serde_json::Value =
                serde_json::from_str(json).map_err(|e| TorrentError::malformed(format!("invalid JSON: {}", e)))?;
            let mut bytes = encode(&Value::try_from(parsed)?);
            bytes.push(b'\n');
            out.write_all(&bytes).map_err(stdout_error)
        }
        Command::Info { torrent } => {
            let torrent = TorrentParser::parse_file(torrent).await?;
            print_info(out, &torrent)
        }
        Command::Peers { torrent } => {
            let torrent = TorrentParser::parse_file(torrent).await?;
            for peer in tracker_peers(&torrent.announce, torrent.info_hash, torrent.length, config).await? {
                emit(out, &peer.to_string())?;
            }
            Ok(())
        }
        Command::Handshake { torrent, peer } => {
            let torrent = TorrentParser::parse_file(torrent).await?;
            let mut session = PeerConnection::connect(*peer, torrent.info_hash, config.session_options()).await?;
            let result = session.handshake(Handshake::generate_peer_id()).await;
            session.close().await;
            emit(out, &format!("Peer ID: {}", hex::encode(result?.peer_id)))
        }
        Command::DownloadPiece { output, torrent, index } => {
            let torrent = TorrentParser::parse_file(torrent).await?;
            let peers = tracker_peers(&torrent.announce, torrent.info_hash, torrent.length, config).await?;
            let data = single_piece(torrent, &peers, *index, config.session_options()).await?;
            write_output(output, &data).await?;
            emit(out, &format!("Piece {} downloaded to {}.", index, output.display()))
        }
        Command::Download { output, torrent: path } => {
            let torrent = TorrentParser::parse_file(path).await?;
            let data = full_download(torrent, config, config.session_options()).await?;
            write_output(output, &data).await?;
            emit(out, &format!("Downloaded {} to {}.", path.display(), output.display()))
        }
        Command::MagnetParse { link } => {
            let magnet = MagnetLink::parse(link)?;
            if let Some(tracker) = magnet.trackers.first() {
                emit(out, &format!("Tracker URL: {}", tracker))?;
            }
            emit(out, &format!("Info Hash: {}", magnet.info_hash_hex()))
        }
        Command::MagnetHandshake { link } => {
            let magnet = MagnetLink::parse(link)?;
            let peers = tracker_peers(magnet.announce()?, magnet.info_hash, UNKNOWN_LEFT, config).await?;
            let options = config.session_options();

            let mut last_error = None;
            for peer in peers {
                match magnet_handshake(peer, &magnet, &options).await {
                    Ok(handshake) => {
                        let ext_id = handshake.extensions.ut_metadata.ok_or_else(|| {
                            TorrentError::protocol_error_with_source("Peer does not support metadata exchange", peer.to_string())
                        })?;
                        emit(out, &format!("Peer ID: {}", hex::encode(handshake.peer_id)))?;
                        return emit(out, &format!("Peer Metadata Extension ID: {}", ext_id));
                    }
                    Err(e) => {
                        warn!("Magnet handshake with {} failed: {}", peer, e);
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| TorrentError::exhausted_peers(1, 0)))
        }
        Command::MagnetInfo { link } => {
            let (torrent, _) = resolve_magnet(link, config).await?;
            print_info(out, &torrent)
        }
        Command::MagnetDownloadPiece { output, link, index } => {
            let (torrent, peers) = resolve_magnet(link, config).await?;
            let data = single_piece(torrent, &peers, *index, config.session_options().with_extensions()).await?;
            write_output(output, &data).await?;
            emit(out, &format!("Piece {} downloaded to {}.", index, output.display()))
        }
        Command::MagnetDownload { output, link } => {
            let (torrent, _) = resolve_magnet(link, config).await?;
            let data = full_download(torrent, config, config.session_options().with_extensions()).await?;
            write_output(output, &data).await?;
            emit(out, &format!("Downloaded {} to {}.", link, output.display()))
        }
    }
}

/// The fields printed by `info` and `magnet_info`
pub fn print_info<W: Write>(out: &mut W, torrent: &TorrentInfo) -> Result<()> {
    emit(out, &format!("Tracker URL: {}", torrent.announce))?;
    emit(out, &format!("Length: {}", torrent.length))?;
    emit(out, &format!("Info Hash: {}", torrent.info_hash_hex()))?;
    emit(out, &format!("Piece Length: {}", torrent.piece_length))?;
    emit(out, &format!("Piece Hashes: {}", torrent.pieces_hex()))
}

async fn tracker_peers(announce: &str, info_hash: [u8; 20], left: u64, config: &Config) -> Result<Vec<SocketAddrV4>> {
    let request = AnnounceRequest::new(announce, info_hash, Handshake::generate_peer_id(), config.port, left);
    Ok(TrackerClient::new()?.announce(&request).await?.peers)
}

async fn resolve_magnet(link: &str, config: &Config) -> Result<(TorrentInfo, Vec<SocketAddrV4>)> {
    let magnet = MagnetLink::parse(link)?;
    let peers = tracker_peers(magnet.announce()?, magnet.info_hash, UNKNOWN_LEFT, config).await?;
    let torrent = fetch_torrent_info(&peers, &magnet, &config.session_options()).await?;
    Ok((torrent, peers))
}

async fn single_piece(torrent: TorrentInfo, peers: &[SocketAddrV4], index: u32, options: SessionOptions) -> Result<Vec<u8>> {
    if index as usize >= torrent.piece_count() {
        return Err(TorrentError::config_error_with_field(
            format!("piece index {} out of range (torrent has {} pieces)", index, torrent.piece_count()),
            "index",
        ));
    }
    let fetcher = PeerFetcher::new(Arc::new(torrent), options);
    download_single_piece(&fetcher, peers, index).await
}

async fn full_download(torrent: TorrentInfo, config: &Config, options: SessionOptions) -> Result<Vec<u8>> {
    let request = AnnounceRequest::new(
        torrent.announce.clone(),
        torrent.info_hash,
        Handshake::generate_peer_id(),
        config.port,
        torrent.length,
    );
    let source = TrackerPeerSource::new(TrackerClient::new()?, request);
    let piece_count = torrent.piece_count();
    info!("Downloading '{}' ({} bytes, {} pieces)", torrent.name, torrent.length, piece_count);

    let fetcher = PeerFetcher::new(Arc::new(torrent), options);
    let manager = DownloadManager::new(Arc::new(fetcher), Arc::new(source), config.download_options());
    manager.run(piece_count).await
}

fn emit<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{}", line).map_err(stdout_error)
}

fn stdout_error(err: std::io::Error) -> TorrentError {
    TorrentError::StorageError {
        message: "Failed to write command output".to_string(),
        path: None,
        source: Some(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::CliArgs;
    use clap::Parser;

    fn config() -> Config {
        Config::from_args(&CliArgs::try_parse_from(["bittorrent-client", "decode", "i1e"]).unwrap())
    }

    async fn run(command: Command) -> Result<String> {
        let mut out = Vec::new();
        execute(&command, &config(), &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_decode_command() {
        let out = run(Command::Decode { value: "d3:foo3:bar5:helloi52ee".into() }).await.unwrap();
        assert_eq!(out, "{\"foo\":\"bar\",\"hello\":52}\n");

        let out = run(Command::Decode { value: "l5:helloi-52ee".into() }).await.unwrap();
        assert_eq!(out, "[\"hello\",-52]\n");

        assert!(matches!(
            run(Command::Decode { value: "5:hi".into() }).await,
            Err(TorrentError::MalformedInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_encode_command() {
        let out = run(Command::Encode { json: r#"{"b":[1,"x"],"a":2}"#.into() }).await.unwrap();
        assert_eq!(out, "d1:ai2e1:bli1e1:xee\n");

        assert!(matches!(
            run(Command::Encode { json: "1.5".into() }).await,
            Err(TorrentError::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn test_info_command() {
        let digest = [0x5au8; 20];
        let mut data = b"d8:announce10:http://x/a4:infod6:lengthi10e4:name1:f12:piece lengthi10e6:pieces20:".to_vec();
        data.extend_from_slice(&digest);
        data.extend_from_slice(b"ee");

        let path = std::env::temp_dir().join(format!("bittorrent-client-info-{}.torrent", std::process::id()));
        std::fs::write(&path, &data).unwrap();
        let out = run(Command::Info { torrent: path.clone() }).await;
        std::fs::remove_file(&path).unwrap();

        let mut info = b"d6:lengthi10e4:name1:f12:piece lengthi10e6:pieces20:".to_vec();
        info.extend_from_slice(&digest);
        info.push(b'e');
        let expected = format!(
            "Tracker URL: http://x/a\nLength: 10\nInfo Hash: {}\nPiece Length: 10\nPiece Hashes: {}\n",
            hex::encode(TorrentInfo::generate_info_hash(&info)),
            hex::encode(digest)
        );
        assert_eq!(out.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_info_missing_file() {
        let err = run(Command::Info { torrent: "/nonexistent/x.torrent".into() }).await.unwrap_err();
        assert!(matches!(err, TorrentError::StorageError { .. }));
    }

    #[tokio::test]
    async fn test_magnet_parse_command() {
        let out = run(Command::MagnetParse {
            link: "magnet:?xt=urn:btih:ad42ce8109f54c99613ce38f9b4d87e70f24a165&dn=magnet1.gif&tr=http%3A%2F%2Fbittorrent-test-tracker.codecrafters.io%2Fannounce".into(),
        })
        .await
        .unwrap();
        assert_eq!(
            out,
            "Tracker URL: http://bittorrent-test-tracker.codecrafters.io/announce\nInfo Hash: ad42ce8109f54c99613ce38f9b4d87e70f24a165\n"
        );
    }
}
