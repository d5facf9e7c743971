//! Torrent file parser
//!
//! Turns a decoded torrent dictionary (or a bare info dictionary fetched
//! from a peer) into a `TorrentInfo`.

use std::path::Path;

use tracing::{debug, error, info, trace};

use crate::bencode::{decode, Value};
use crate::error::{Result, TorrentError};
use crate::torrent::info::TorrentInfo;

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<TorrentInfo> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let root = decode(data)?;
        Self::parse_value(&root)
    }

    /// Parse a .torrent file from a file path. The file is read whole before decoding.
    pub async fn parse_file(path: &Path) -> Result<TorrentInfo> {
        info!("Loading torrent file from: {}", path.display());

        let data = tokio::fs::read(path).await.map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data).map_err(|e| e.with_context(path.display().to_string()))
    }

    /// Extract metainfo from a decoded torrent dictionary
    pub fn parse_value(root: &Value) -> Result<TorrentInfo> {
        if root.as_dict().is_none() {
            return Err(TorrentError::malformed(format!(
                "torrent root must be a dictionary, got {}",
                root.kind()
            )));
        }

        let announce = root
            .get(b"announce")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).to_string())
            .ok_or_else(|| TorrentError::malformed("missing announce field"))?;

        let info = root
            .get(b"info")
            .ok_or_else(|| TorrentError::malformed("missing info dictionary"))?;

        Self::from_info_dict(announce, info.clone())
    }

    /// Build metainfo from a bare info dictionary and an announce URL
    pub fn from_info_dict(announce: String, info: Value) -> Result<TorrentInfo> {
        if info.as_dict().is_none() {
            return Err(TorrentError::malformed(format!(
                "info must be a dictionary, got {}",
                info.kind()
            )));
        }

        let name = info
            .get(b"name")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).to_string())
            .unwrap_or_default();

        let piece_length = Self::positive_int(&info, b"piece length")?;
        if piece_length > u32::MAX as u64 {
            return Err(TorrentError::malformed(format!(
                "piece length {} exceeds {}",
                piece_length,
                u32::MAX
            )));
        }
        let length = Self::total_length(&info)?;

        let pieces_bytes = info
            .get(b"pieces")
            .and_then(Value::as_bytes)
            .ok_or_else(|| TorrentError::malformed("missing pieces field"))?;
        let pieces = TorrentInfo::parse_piece_hashes(pieces_bytes)?;

        let expected = TorrentInfo::expected_piece_count(length, piece_length);
        if pieces.len() != expected {
            return Err(TorrentError::malformed(format!(
                "{} piece hashes for {} bytes at piece length {} (expected {})",
                pieces.len(),
                length,
                piece_length,
                expected
            )));
        }

        let info_hash = TorrentInfo::info_hash_of(&info);

        info!(
            "Parsed torrent '{}': {} bytes, {} pieces, info hash {}",
            name,
            length,
            pieces.len(),
            hex::encode(info_hash)
        );
        Ok(TorrentInfo {
            announce,
            info,
            info_hash,
            name,
            piece_length,
            length,
            pieces,
        })
    }

    /// Single-file `length`, or the sum of `files[].length`
    fn total_length(info: &Value) -> Result<u64> {
        if info.get(b"length").is_some() {
            return Self::positive_int(info, b"length");
        }

        let files = info
            .get(b"files")
            .and_then(Value::as_list)
            .ok_or_else(|| TorrentError::malformed("neither length nor files found in info dict"))?;

        let mut total = 0u64;
        for file in files {
            let len = file
                .get(b"length")
                .and_then(Value::as_int)
                .filter(|&l| l >= 0)
                .ok_or_else(|| TorrentError::malformed("file entry missing length"))?;
            total = total
                .checked_add(len as u64)
                .ok_or_else(|| TorrentError::malformed("total file length overflows"))?;
        }
        debug!("Multi-file torrent with {} files, {} bytes", files.len(), total);
        Ok(total)
    }

    fn positive_int(dict: &Value, key: &[u8]) -> Result<u64> {
        let field = String::from_utf8_lossy(key);
        match dict.get(key).and_then(Value::as_int) {
            Some(v) if v > 0 => Ok(v as u64),
            Some(v) => Err(TorrentError::malformed(format!("{} must be positive, got {}", field, v))),
            None => Err(TorrentError::malformed(format!("missing {} field", field))),
        }
    }
}
