//! Download manager module
//!
//! Drives a work queue of piece indices against a pool of peers. Every
//! failed attempt puts its piece back at the front of the queue; the peer
//! pool is refilled from a `PeerSource` whenever it runs dry.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddrV4;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TorrentError};

/// Fetches one verified piece from one peer
#[async_trait]
pub trait PieceFetcher: Send + Sync {
    async fn fetch(&self, peer: SocketAddrV4, index: u32) -> Result<Vec<u8>>;
}

/// Supplies peer addresses when the pool is empty
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn peers(&self) -> Result<Vec<SocketAddrV4>>;
}

/// Double-ended queue of piece indices still to fetch
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    pending: VecDeque<u32>,
}

impl WorkQueue {
    /// Queue holding `0..piece_count`
    pub fn new(piece_count: usize) -> Self {
        Self {
            pending: (0..piece_count as u32).collect(),
        }
    }

    pub fn pop_front(&mut self) -> Option<u32> {
        self.pending.pop_front()
    }

    /// Put a failed piece back so it is the next one attempted
    pub fn requeue_front(&mut self, index: u32) {
        self.pending.push_front(index);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Concurrent piece fetches; 1 fetches strictly one piece at a time
    pub workers: usize,
    /// Peer pool refills allowed without a successful piece in between
    pub max_refreshes: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            max_refreshes: 10,
        }
    }
}

#[derive(Debug)]
struct Scheduler {
    queue: WorkQueue,
    peers: VecDeque<SocketAddrV4>,
    completed: BTreeMap<u32, Vec<u8>>,
    in_flight: usize,
    refreshes: usize,
    failure: Option<TorrentError>,
}

struct Coordinator {
    fetcher: Arc<dyn PieceFetcher>,
    source: Arc<dyn PeerSource>,
    state: Mutex<Scheduler>,
    notify: Notify,
    max_refreshes: usize,
}

impl Coordinator {
    /// Next (peer, piece) pair, or None once every piece is done
    async fn next_assignment(&self) -> Result<Option<(SocketAddrV4, u32)>> {
        loop {
            let mut state = self.state.lock().await;
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }

            if state.queue.is_empty() {
                if state.in_flight == 0 {
                    return Ok(None);
                }
                // registered before the lock is released so a completion can't be missed
                let notified = self.notify.notified();
                drop(state);
                notified.await;
                continue;
            }

            if state.peers.is_empty() {
                if let Err(e) = self.refill(&mut state).await {
                    error!("Download aborted: {}", e);
                    state.failure = Some(e.clone());
                    drop(state);
                    self.notify.notify_waiters();
                    return Err(e);
                }
                continue;
            }

            if let (Some(peer), Some(index)) = (state.peers.pop_front(), state.queue.pop_front()) {
                state.in_flight += 1;
                return Ok(Some((peer, index)));
            }
        }
    }

    async fn refill(&self, state: &mut Scheduler) -> Result<()> {
        state.refreshes += 1;
        if state.refreshes > self.max_refreshes {
            return Err(TorrentError::exhausted_peers(
                state.queue.len() + state.in_flight,
                state.refreshes - 1,
            ));
        }

        let peers = self.source.peers().await?;
        debug!(
            "Peer pool refilled with {} peers (refresh {}/{})",
            peers.len(),
            state.refreshes,
            self.max_refreshes
        );
        state.peers.extend(peers);
        Ok(())
    }

    async fn work(self: Arc<Self>, worker: usize) -> Result<()> {
        while let Some((peer, index)) = self.next_assignment().await? {
            debug!("Worker {}: fetching piece {} from {}", worker, index, peer);
            let result = self.fetcher.fetch(peer, index).await;

            let mut state = self.state.lock().await;
            state.in_flight -= 1;
            match result {
                Ok(data) => {
                    info!("Piece {} complete ({} bytes) from {}", index, data.len(), peer);
                    state.completed.insert(index, data);
                    state.refreshes = 0;
                }
                Err(e) => {
                    warn!("Piece {} failed against {}, requeueing: {}", index, peer, e);
                    state.queue.requeue_front(index);
                }
            }
            trace!(
                "Queue: {} pending, {} in flight, {} done",
                state.queue.len(),
                state.in_flight,
                state.completed.len()
            );
            drop(state);
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

/// Download manager for a whole torrent
pub struct DownloadManager {
    fetcher: Arc<dyn PieceFetcher>,
    source: Arc<dyn PeerSource>,
    options: DownloadOptions,
}

impl DownloadManager {
    pub fn new(fetcher: Arc<dyn PieceFetcher>, source: Arc<dyn PeerSource>, options: DownloadOptions) -> Self {
        Self { fetcher, source, options }
    }

    /// Fetch pieces `0..piece_count` and return them concatenated in index order
    pub async fn run(&self, piece_count: usize) -> Result<Vec<u8>> {
        info!(
            "Starting download of {} pieces with {} worker(s)",
            piece_count, self.options.workers
        );

        let coordinator = Arc::new(Coordinator {
            fetcher: self.fetcher.clone(),
            source: self.source.clone(),
            state: Mutex::new(Scheduler {
                queue: WorkQueue::new(piece_count),
                peers: VecDeque::new(),
                completed: BTreeMap::new(),
                in_flight: 0,
                refreshes: 0,
                failure: None,
            }),
            notify: Notify::new(),
            max_refreshes: self.options.max_refreshes,
        });

        let mut tasks = JoinSet::new();
        for worker in 0..self.options.workers.max(1) {
            tasks.spawn(coordinator.clone().work(worker));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| TorrentError::protocol_error_with_source("Download worker failed", e.to_string()));
            if let Err(e) = outcome.and_then(|r| r) {
                if first_error.is_none() {
                    // drops in-flight sessions, closing their sockets
                    tasks.abort_all();
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut state = coordinator.state.lock().await;
        let completed = std::mem::take(&mut state.completed);
        if completed.len() != piece_count {
            return Err(TorrentError::exhausted_peers(piece_count - completed.len(), state.refreshes));
        }

        let mut output = Vec::new();
        for (_, piece) in completed {
            output.extend_from_slice(&piece);
        }
        info!("Download complete: {} bytes", output.len());
        Ok(output)
    }
}

/// Fetch one piece, trying each peer in order
pub async fn download_single_piece(fetcher: &dyn PieceFetcher, peers: &[SocketAddrV4], index: u32) -> Result<Vec<u8>> {
    for peer in peers {
        match fetcher.fetch(*peer, index).await {
            Ok(data) => return Ok(data),
            Err(e) => warn!("Piece {} failed against {}: {}", index, peer, e),
        }
    }
    Err(TorrentError::exhausted_peers(1, 0))
}
