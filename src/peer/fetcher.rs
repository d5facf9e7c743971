//! Piece fetching over real peer sessions

use std::net::SocketAddrV4;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::peer::connection::{fetch_piece_with_retry, SessionOptions};
use crate::storage::PieceFetcher;
use crate::torrent::TorrentInfo;

/// Fetches verified pieces of one torrent, reconnecting on failure
#[derive(Debug, Clone)]
pub struct PeerFetcher {
    torrent: Arc<TorrentInfo>,
    options: SessionOptions,
}

impl PeerFetcher {
    pub fn new(torrent: Arc<TorrentInfo>, options: SessionOptions) -> Self {
        Self { torrent, options }
    }
}

#[async_trait]
impl PieceFetcher for PeerFetcher {
    async fn fetch(&self, peer: SocketAddrV4, index: u32) -> Result<Vec<u8>> {
        fetch_piece_with_retry(peer, &self.torrent, index, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::Value;
    use crate::error::TorrentError;
    use crate::protocol::{BitTorrentWire, Handshake, Message, WireProtocol};
    use std::time::Duration;
    use tokio::net::TcpListener;

    const INFO_HASH: [u8; 20] = [0x33; 20];

    fn torrent(data: &[u8]) -> TorrentInfo {
        TorrentInfo {
            announce: "http://t/announce".to_string(),
            info: Value::dict(Vec::<(&str, Value)>::new()),
            info_hash: INFO_HASH,
            name: "t".to_string(),
            piece_length: data.len() as u64,
            length: data.len() as u64,
            pieces: vec![TorrentInfo::generate_info_hash(data)],
        }
    }

    async fn bind() -> (TcpListener, SocketAddrV4) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        match listener.local_addr().unwrap() {
            std::net::SocketAddr::V4(v4) => (listener, v4),
            other => panic!("unexpected {}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_after_dropped_connection() {
        let data = b"hello, piece".to_vec();
        let (listener, addr) = bind().await;
        let served = data.clone();

        let peer = tokio::spawn(async move {
            // first connection is dropped straight after accept
            let (first, _) = listener.accept().await.unwrap();
            drop(first);

            let (mut stream, _) = listener.accept().await.unwrap();
            let mut wire = BitTorrentWire;
            wire.read_handshake(&mut stream).await.unwrap();
            wire.write_handshake(&mut stream, &Handshake::new(INFO_HASH, [b'p'; 20])).await.unwrap();
            wire.write_message(&mut stream, &Message::Bitfield { bitfield: vec![0x80] }).await.unwrap();
            wire.read_message(&mut stream).await.unwrap();
            wire.write_message(&mut stream, &Message::Unchoke).await.unwrap();
            wire.read_message(&mut stream).await.unwrap();
            wire.write_message(&mut stream, &Message::Piece { index: 0, begin: 0, block: served })
                .await
                .unwrap();
        });

        let fetcher = PeerFetcher::new(Arc::new(torrent(&data)), SessionOptions::default());
        assert_eq!(fetcher.fetch(addr, 0).await.unwrap(), data);
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (listener, addr) = bind().await;
        let peer = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                drop(stream);
            }
        });

        let options = SessionOptions {
            max_attempts: 2,
            io_timeout: Duration::from_secs(2),
            ..SessionOptions::default()
        };
        let fetcher = PeerFetcher::new(Arc::new(torrent(b"x")), options);
        let err = fetcher.fetch(addr, 0).await.unwrap_err();
        assert!(matches!(err, TorrentError::ConnectionError { .. }));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_piece_not_retried() {
        let fetcher = PeerFetcher::new(Arc::new(torrent(b"x")), SessionOptions::default());
        let err = fetcher.fetch("127.0.0.1:9".parse().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, TorrentError::ConfigError { .. }));
    }
}
