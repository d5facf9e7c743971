//! HTTP tracker client
//!
//! Announces to a tracker with a GET request and decodes the compact
//! bencoded response.

use std::net::SocketAddrV4;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use super::peers::parse_compact_peers;
use crate::bencode::{decode, Value};
use crate::error::{Result, TorrentError};

/// Default request timeout for announces
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// `left` value sent before the torrent size is known (magnet links)
pub const UNKNOWN_LEFT: u64 = 999;

/// Parameters of one announce
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub announce_url: String,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// A fresh announce with nothing transferred yet
    pub fn new(announce_url: impl Into<String>, info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            announce_url: announce_url.into(),
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Full GET URL with all query parameters
    pub fn url(&self) -> String {
        let separator = if self.announce_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.announce_url,
            separator,
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left
        )
    }
}

/// Decoded announce response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    /// Seconds the tracker asks us to wait between announces
    pub interval: Option<u64>,
    pub peers: Vec<SocketAddrV4>,
}

impl AnnounceResponse {
    /// Decode a bencoded response body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value = decode(body)
            .map_err(|e| TorrentError::tracker_error_with_source("Malformed tracker response", e.to_string()))?;

        if value.as_dict().is_none() {
            return Err(TorrentError::tracker_error(format!(
                "tracker response must be a dictionary, got {}",
                value.kind()
            )));
        }

        if let Some(reason) = value.get(b"failure reason").and_then(Value::as_bytes) {
            let reason = String::from_utf8_lossy(reason).to_string();
            warn!("Tracker reported failure: {}", reason);
            return Err(TorrentError::tracker_error_with_source("Tracker returned failure", reason));
        }

        let interval = value
            .get(b"interval")
            .and_then(Value::as_int)
            .filter(|i| *i >= 0)
            .map(|i| i as u64);

        let peers = value
            .get(b"peers")
            .and_then(Value::as_bytes)
            .ok_or_else(|| TorrentError::tracker_error("tracker response has no compact peers field"))?;

        Ok(Self {
            interval,
            peers: parse_compact_peers(peers)?,
        })
    }
}

/// Tracker client backed by a shared HTTP client
#[derive(Debug, Clone)]
pub struct TrackerClient {
    http: Client,
}

impl TrackerClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TRACKER_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Announce and return the tracker's peer list
    pub async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        info!("Contacting tracker: {}", request.announce_url);
        let url = request.url();
        debug!("Announce URL: {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TorrentError::tracker_error_with_source(
                "Tracker returned an error status",
                status.to_string(),
            ));
        }

        let body = response.bytes().await?;
        let parsed = AnnounceResponse::parse(&body).map_err(|e| e.with_context(request.announce_url.clone()))?;
        info!(
            "Tracker returned {} peers (interval: {:?})",
            parsed.peers.len(),
            parsed.interval
        );
        Ok(parsed)
    }
}
