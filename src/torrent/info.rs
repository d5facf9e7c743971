//! Torrent information structures
//!
//! Read-only view over a decoded info dictionary.

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::bencode::{encode, Value};
use crate::error::{Result, TorrentError};

/// Length of a SHA1 digest
pub const HASH_LEN: usize = 20;

/// High-level torrent information
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    /// Tracker announce URL
    pub announce: String,
    /// The info dictionary, kept whole so it can be re-encoded
    pub info: Value,
    /// SHA1 hash of the canonical encoding of `info`
    pub info_hash: [u8; 20],
    /// Torrent name, empty when the dictionary has none
    pub name: String,
    /// Size of each piece in bytes
    pub piece_length: u64,
    /// Total content length in bytes
    pub length: u64,
    /// Expected piece hashes, in piece order
    pub pieces: Vec<[u8; 20]>,
}

impl TorrentInfo {
    /// Get number of pieces, `ceil(length / piece_length)`
    pub fn piece_count(&self) -> usize {
        Self::expected_piece_count(self.length, self.piece_length)
    }

    pub(crate) fn expected_piece_count(length: u64, piece_length: u64) -> usize {
        if piece_length == 0 {
            return 0;
        }
        length.div_ceil(piece_length) as usize
    }

    /// Byte length of a piece; only the final piece may be short
    pub fn piece_len(&self, index: usize) -> Option<u64> {
        let count = self.piece_count();
        if index >= count {
            return None;
        }
        if index == count - 1 {
            Some(self.length - (count as u64 - 1) * self.piece_length)
        } else {
            Some(self.piece_length)
        }
    }

    /// Get piece hash for a specific piece index
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        self.pieces.get(index).copied()
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// The concatenated piece hashes, hex encoded
    pub fn pieces_hex(&self) -> String {
        hex::encode(self.pieces.concat())
    }

    /// Check a reassembled piece against its expected hash
    pub fn verify_piece(&self, index: usize, data: &[u8]) -> Result<()> {
        let expected = self.piece_hash(index).ok_or_else(|| {
            TorrentError::piece_integrity_error(
                format!("no expected hash for piece (torrent has {})", self.pieces.len()),
                index as u32,
            )
        })?;
        verify_digest(index as u32, data, &expected)
    }

    /// Generate info hash from info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Info hash of a decoded info dictionary: digest of its canonical re-encoding
    pub fn info_hash_of(info: &Value) -> [u8; 20] {
        Self::generate_info_hash(&encode(info))
    }

    /// Parse piece hashes from concatenated bytes in torrent file
    pub fn parse_piece_hashes(pieces_bytes: &[u8]) -> Result<Vec<[u8; 20]>> {
        if pieces_bytes.len() % HASH_LEN != 0 {
            return Err(TorrentError::malformed(format!(
                "pieces field length must be a multiple of 20, got {}",
                pieces_bytes.len()
            )));
        }

        Ok(pieces_bytes
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect())
    }
}

/// Compare the SHA1 of `data` with `expected`
pub fn verify_digest(index: u32, data: &[u8], expected: &[u8; 20]) -> Result<()> {
    let actual = TorrentInfo::generate_info_hash(data);
    if actual != *expected {
        warn!(
            "Piece {} hash mismatch: expected {}, got {}",
            index,
            hex::encode(expected),
            hex::encode(actual)
        );
        return Err(TorrentError::piece_integrity_error(
            format!("hash mismatch over {} bytes", data.len()),
            index,
        ));
    }
    debug!("Piece {} verified ({} bytes)", index, data.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(length: u64, piece_length: u64, pieces: Vec<[u8; 20]>) -> TorrentInfo {
        TorrentInfo {
            announce: "http://tracker.example.com/announce".to_string(),
            info: Value::dict(Vec::<(&str, Value)>::new()),
            info_hash: [1u8; 20],
            name: "test".to_string(),
            piece_length,
            length,
            pieces,
        }
    }

    #[test]
    fn test_last_piece_length() {
        let info = info(1000, 400, vec![[0u8; 20]; 3]);
        assert_eq!(info.piece_count(), 3);
        assert_eq!(info.piece_len(0), Some(400));
        assert_eq!(info.piece_len(1), Some(400));
        assert_eq!(info.piece_len(2), Some(200));
        assert_eq!(info.piece_len(3), None);
    }

    #[test]
    fn test_exact_multiple_has_full_last_piece() {
        let info = info(800, 400, vec![[0u8; 20]; 2]);
        assert_eq!(info.piece_count(), 2);
        assert_eq!(info.piece_len(1), Some(400));
    }

    #[test]
    fn test_verify_piece_integrity_gate() {
        let data: Vec<u8> = (0..=255u8).cycle().take(400).collect();
        let hash = TorrentInfo::generate_info_hash(&data);
        let info = info(400, 400, vec![hash]);

        assert!(info.verify_piece(0, &data).is_ok());

        let mut flipped = data.clone();
        flipped[123] ^= 0x01;
        let err = info.verify_piece(0, &flipped).unwrap_err();
        assert!(matches!(err, TorrentError::IntegrityError { piece: Some(0), .. }));
    }

    #[test]
    fn test_verify_piece_out_of_range() {
        let info = info(400, 400, vec![[0u8; 20]]);
        assert!(matches!(
            info.verify_piece(5, b"x"),
            Err(TorrentError::IntegrityError { .. })
        ));
    }

    #[test]
    fn test_parse_piece_hashes() {
        let hashes: Vec<u8> = (0..40).collect();
        let result = TorrentInfo::parse_piece_hashes(&hashes).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1][0], 20);
        assert!(TorrentInfo::parse_piece_hashes(&[1u8; 21]).is_err());
    }

    #[test]
    fn test_pieces_hex() {
        let info = info(800, 400, vec![[0xab; 20], [0x01; 20]]);
        assert_eq!(info.pieces_hex(), format!("{}{}", "ab".repeat(20), "01".repeat(20)));
    }
}
