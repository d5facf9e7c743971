//! Magnet link metadata exchange
//!
//! Fetches the info dictionary for a magnet link from a peer over one
//! session: handshake, extension handshake, metadata requests, close.

use std::net::SocketAddrV4;

use tracing::{info, warn};

use crate::error::{Result, TorrentError};
use crate::peer::connection::{PeerConnection, SessionOptions};
use crate::protocol::{ExtensionHandshake, Handshake};
use crate::torrent::{MagnetLink, TorrentInfo, TorrentParser};

/// What a peer told us during a magnet handshake
#[derive(Debug, Clone)]
pub struct MagnetHandshake {
    pub peer_id: [u8; 20],
    pub extensions: ExtensionHandshake,
}

/// Handshake with extension support and exchange extension handshakes
pub async fn magnet_handshake(addr: SocketAddrV4, magnet: &MagnetLink, options: &SessionOptions) -> Result<MagnetHandshake> {
    let mut session = PeerConnection::connect(addr, magnet.info_hash, options.clone().with_extensions()).await?;
    let result = match session.handshake(Handshake::generate_peer_id()).await {
        Ok(remote) => session.extension_handshake().await.map(|extensions| MagnetHandshake {
            peer_id: remote.peer_id,
            extensions,
        }),
        Err(e) => Err(e),
    };
    session.close().await;
    result
}

/// Fetch and verify the info dictionary from one peer
pub async fn fetch_metadata_from_peer(addr: SocketAddrV4, magnet: &MagnetLink, options: &SessionOptions) -> Result<TorrentInfo> {
    let mut session = PeerConnection::connect(addr, magnet.info_hash, options.clone().with_extensions()).await?;
    let result = match session.handshake(Handshake::generate_peer_id()).await {
        Ok(_) => match session.extension_handshake().await {
            Ok(_) => session.fetch_metadata().await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };
    session.close().await;

    let announce = magnet.trackers.first().cloned().unwrap_or_default();
    TorrentParser::from_info_dict(announce, result?)
}

/// Try peers in order until one serves valid metadata
pub async fn fetch_torrent_info(peers: &[SocketAddrV4], magnet: &MagnetLink, options: &SessionOptions) -> Result<TorrentInfo> {
    let mut last_error = None;
    for peer in peers {
        match fetch_metadata_from_peer(*peer, magnet, options).await {
            Ok(torrent) => {
                info!("Metadata for {} fetched from {}", magnet.info_hash_hex(), peer);
                return Ok(torrent);
            }
            Err(e) => {
                warn!("Metadata fetch from {} failed: {}", peer, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| TorrentError::exhausted_peers(1, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, Value};
    use crate::protocol::{BitTorrentWire, Message, MetadataMessage, WireProtocol};
    use tokio::net::TcpListener;

    fn info_dict() -> Value {
        Value::dict([
            ("length", Value::Integer(1000)),
            ("name", Value::string("sample.txt")),
            ("piece length", Value::Integer(400)),
            ("pieces", Value::Bytes(vec![7u8; 60])),
        ])
    }

    async fn serve_metadata(listener: TcpListener, metadata: Vec<u8>, info_hash: [u8; 20]) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut wire = BitTorrentWire;
        wire.read_handshake(&mut stream).await.unwrap();
        wire.write_handshake(&mut stream, &Handshake::with_extensions(info_hash, [b'p'; 20]))
            .await
            .unwrap();
        wire.write_message(&mut stream, &Message::Bitfield { bitfield: vec![0xe0] }).await.unwrap();
        wire.read_message(&mut stream).await.unwrap();

        let handshake = format!("d1:md11:ut_metadatai1ee13:metadata_sizei{}ee", metadata.len());
        wire.write_message(&mut stream, &Message::Extended { ext_id: 0, payload: handshake.into_bytes() })
            .await
            .unwrap();

        if let Message::Extended { ext_id: 1, payload } = wire.read_message(&mut stream).await.unwrap() {
            let request = MetadataMessage::decode(&payload).unwrap();
            let mut reply = format!("d8:msg_typei1e5:piecei{}e10:total_sizei{}ee", request.piece, metadata.len()).into_bytes();
            reply.extend_from_slice(&metadata);
            wire.write_message(&mut stream, &Message::Extended { ext_id: 16, payload: reply }).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_fetch_torrent_info_over_tcp() {
        let metadata = encode(&info_dict());
        let info_hash = TorrentInfo::generate_info_hash(&metadata);
        let link = format!("magnet:?xt=urn:btih:{}&tr=http%3A%2F%2Ft%2Fannounce", hex::encode(info_hash));
        let magnet = MagnetLink::parse(&link).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = match listener.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => v4,
            other => panic!("unexpected {}", other),
        };
        let peer = tokio::spawn(serve_metadata(listener, metadata, info_hash));

        let torrent = fetch_torrent_info(&[addr], &magnet, &SessionOptions::default()).await.unwrap();
        assert_eq!(torrent.info_hash, info_hash);
        assert_eq!(torrent.announce, "http://t/announce");
        assert_eq!(torrent.length, 1000);
        assert_eq!(torrent.piece_count(), 3);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_torrent_info_without_peers() {
        let magnet = MagnetLink::parse("magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f").unwrap();
        let err = fetch_torrent_info(&[], &magnet, &SessionOptions::default()).await.unwrap_err();
        assert!(matches!(err, TorrentError::ExhaustedPeers { .. }));
    }
}
