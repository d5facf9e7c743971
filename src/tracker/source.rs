//! Tracker-backed peer pool refill

use std::net::SocketAddrV4;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::client::{AnnounceRequest, TrackerClient};
use crate::error::Result;
use crate::protocol::Handshake;
use crate::storage::PeerSource;

/// Announces on every refill; once an announce has succeeded, later
/// failures fall back to the last peer list returned.
pub struct TrackerPeerSource {
    client: TrackerClient,
    request: AnnounceRequest,
    cached: Mutex<Option<Vec<SocketAddrV4>>>,
}

impl TrackerPeerSource {
    pub fn new(client: TrackerClient, request: AnnounceRequest) -> Self {
        Self {
            client,
            request,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PeerSource for TrackerPeerSource {
    async fn peers(&self) -> Result<Vec<SocketAddrV4>> {
        let mut request = self.request.clone();
        request.peer_id = Handshake::generate_peer_id();

        let mut cached = self.cached.lock().await;
        match self.client.announce(&request).await {
            Ok(response) => {
                *cached = Some(response.peers.clone());
                Ok(response.peers)
            }
            Err(e) => match cached.as_ref() {
                Some(peers) => {
                    warn!("Re-announce failed, reusing {} cached peers: {}", peers.len(), e);
                    Ok(peers.clone())
                }
                None => {
                    debug!("Initial announce failed with no cached peers");
                    Err(e)
                }
            },
        }
    }
}
