//! Magnet link parser
//!
//! Handles parsing of `magnet:?` URIs. Only the info hash (`xt`) and the
//! tracker (`tr`) are needed to start; the info dictionary itself has to be
//! fetched from a peer afterwards.

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, TorrentError};

/// Parsed magnet link information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// SHA1 info hash from the `xt` parameter
    pub info_hash: [u8; 20],
    /// Display name (`dn` parameter)
    pub display_name: Option<String>,
    /// Percent-decoded tracker URLs (`tr` parameters), in link order
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parse a magnet link string
    ///
    /// ```ignore
    /// let link = MagnetLink::parse("magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f&tr=http%3A%2F%2Ftracker%2Fannounce")?;
    /// ```
    pub fn parse(magnet_uri: &str) -> Result<Self> {
        debug!("Parsing magnet link: {}", magnet_uri);

        let url = Url::parse(magnet_uri.trim()).map_err(|e| {
            warn!("Invalid magnet URL format: {}", e);
            TorrentError::malformed(format!("invalid magnet link: {}", e))
        })?;

        if url.scheme() != "magnet" {
            return Err(TorrentError::malformed(format!(
                "not a magnet link: scheme is '{}'",
                url.scheme()
            )));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        // percent-decoding only: a literal '+' stays a '+'
        for pair in url.query().unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(raw)
                .map_err(|e| TorrentError::malformed(format!("magnet parameter {} is not UTF-8: {}", key, e)))?;
            match key {
                "xt" => {
                    if let Some(hash) = Self::extract_info_hash(&value)? {
                        info_hash = Some(hash);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                other => debug!("Ignoring magnet parameter: {}", other),
            }
        }

        let info_hash = info_hash.ok_or_else(|| {
            TorrentError::malformed("magnet link must contain an info hash (xt=urn:btih:<hash>)")
        })?;

        info!(
            "Parsed magnet link: info_hash={}, name={}, trackers={}",
            hex::encode(info_hash),
            display_name.as_deref().unwrap_or("(none)"),
            trackers.len()
        );

        Ok(Self {
            info_hash,
            display_name,
            trackers,
        })
    }

    /// The tracker to announce to: the first `tr` parameter
    pub fn announce(&self) -> Result<&str> {
        self.trackers
            .first()
            .map(String::as_str)
            .ok_or_else(|| TorrentError::tracker_error("magnet link has no tracker (tr) parameter"))
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// `urn:btih:<40 hex>` → hash; other URNs are ignored
    fn extract_info_hash(xt_value: &str) -> Result<Option<[u8; 20]>> {
        let Some(hash_str) = xt_value.strip_prefix("urn:btih:") else {
            debug!("xt parameter is not a BitTorrent info hash: {}", xt_value);
            return Ok(None);
        };

        if hash_str.len() != 40 {
            return Err(TorrentError::malformed(format!(
                "info hash has invalid length {} (expected 40 hex characters)",
                hash_str.len()
            )));
        }

        let bytes = hex::decode(hash_str)
            .map_err(|e| TorrentError::malformed(format!("info hash is not hex: {}", e)))?;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes);
        Ok(Some(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f&dn=sample.torrent&tr=http%3A%2F%2Fbittorrent-test-tracker.codecrafters.io%2Fannounce";

    #[test]
    fn test_parse_sample() {
        let link = MagnetLink::parse(SAMPLE).unwrap();
        assert_eq!(link.info_hash_hex(), "d69f91e6b2ae4c542468d1073a71d4ea13879a7f");
        assert_eq!(link.display_name.as_deref(), Some("sample.torrent"));
        assert_eq!(
            link.announce().unwrap(),
            "http://bittorrent-test-tracker.codecrafters.io/announce"
        );
    }

    #[test]
    fn test_uppercase_hex() {
        let link = MagnetLink::parse("magnet:?xt=urn:btih:D69F91E6B2AE4C542468D1073A71D4EA13879A7F").unwrap();
        assert_eq!(link.info_hash_hex(), "d69f91e6b2ae4c542468d1073a71d4ea13879a7f");
        assert!(link.announce().is_err());
    }

    #[test]
    fn test_first_tracker_is_announce() {
        let link = MagnetLink::parse(
            "magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f&tr=http://one/a&tr=http://two/a",
        )
        .unwrap();
        assert_eq!(link.trackers.len(), 2);
        assert_eq!(link.announce().unwrap(), "http://one/a");
    }

    #[test]
    fn test_plus_is_not_a_space() {
        let link = MagnetLink::parse(
            "magnet:?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f&dn=a+b%20c&tr=http%3A%2F%2Ft%2Fannounce%3Fk%3D1+2",
        )
        .unwrap();
        assert_eq!(link.display_name.as_deref(), Some("a+b c"));
        assert_eq!(link.announce().unwrap(), "http://t/announce?k=1+2");
    }

    #[test]
    fn test_missing_info_hash() {
        let err = MagnetLink::parse("magnet:?dn=x&tr=http://t/a").unwrap_err();
        assert!(matches!(err, TorrentError::MalformedInput { .. }));
    }

    #[test]
    fn test_bad_info_hash() {
        assert!(MagnetLink::parse("magnet:?xt=urn:btih:d69f91e6").is_err());
        assert!(MagnetLink::parse("magnet:?xt=urn:btih:zz9f91e6b2ae4c542468d1073a71d4ea13879a7f").is_err());
    }

    #[test]
    fn test_not_magnet() {
        assert!(MagnetLink::parse("http://example.com/?xt=urn:btih:d69f91e6b2ae4c542468d1073a71d4ea13879a7f").is_err());
        assert!(MagnetLink::parse("not a link").is_err());
    }
}
