//! Compact peer list decoding

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Result, TorrentError};

/// Bytes per compact peer record: 4 address bytes plus a 2-byte port
pub const COMPACT_PEER_LEN: usize = 6;

/// Parse a compact peer list
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<SocketAddrV4>> {
    if data.len() % COMPACT_PEER_LEN != 0 {
        return Err(TorrentError::tracker_error_with_source(
            "Invalid compact peers data length",
            format!("{} is not a multiple of {}", data.len(), COMPACT_PEER_LEN),
        ));
    }

    Ok(data
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_record() {
        let peers = parse_compact_peers(&[0xC0, 0xA8, 0x00, 0x01, 0x1A, 0xE1]).unwrap();
        assert_eq!(peers, vec!["192.168.0.1:6881".parse::<SocketAddrV4>().unwrap()]);
    }

    #[test]
    fn test_multiple_records_keep_order() {
        let data = [10, 0, 0, 1, 0, 1, 165, 232, 33, 77, 0xC9, 0x0B];
        let peers: Vec<SocketAddrV4> = vec!["10.0.0.1:1".parse().unwrap(), "165.232.33.77:51467".parse().unwrap()];
        assert_eq!(parse_compact_peers(&data).unwrap(), peers);
    }

    #[test]
    fn test_empty_and_ragged() {
        assert!(parse_compact_peers(&[]).unwrap().is_empty());
        let err = parse_compact_peers(&[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, TorrentError::TrackerError { .. }));
    }
}
