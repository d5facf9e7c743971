//! Peer connection module
//!
//! One peer wire session: handshake, optional extension handshake and
//! metadata exchange, then the interested/unchoke dance and block transfer.
//! The session owns its stream; every read and write carries a deadline.

use std::future::Future;
use std::net::SocketAddrV4;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::bencode::{decode, Value};
use crate::error::{Result, TorrentError};
use crate::peer::SessionState;
use crate::protocol::{
    metadata_piece_count, BitTorrentWire, ExtensionHandshake, Handshake, Message, MetadataMessage, MetadataMessageType,
    WireProtocol, EXTENSION_HANDSHAKE_ID, MAX_METADATA_SIZE,
};
use crate::storage::{block_requests, PieceBuffer, BLOCK_SIZE};
use crate::torrent::{verify_digest, TorrentInfo};

/// Per-session limits
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for the TCP connect
    pub connect_timeout: Duration,
    /// Deadline for each socket read or write
    pub io_timeout: Duration,
    /// Fresh connections tried per (peer, piece) before giving up on the peer
    pub max_attempts: usize,
    /// Request block size
    pub block_size: u32,
    /// Advertise the extension protocol in the handshake
    pub extensions: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            max_attempts: 3,
            block_size: BLOCK_SIZE,
            extensions: false,
        }
    }
}

impl SessionOptions {
    /// Same limits with the extension protocol advertised
    pub fn with_extensions(mut self) -> Self {
        self.extensions = true;
        self
    }
}

/// A session with one peer
pub struct PeerConnection<S = TcpStream> {
    addr: String,
    stream: S,
    wire: BitTorrentWire,
    options: SessionOptions,
    state: SessionState,
    info_hash: [u8; 20],
    remote: Option<Handshake>,
    bitfield_seen: bool,
    remote_extensions: Option<ExtensionHandshake>,
}

impl PeerConnection<TcpStream> {
    /// Open a TCP connection to a peer
    pub async fn connect(addr: SocketAddrV4, info_hash: [u8; 20], options: SessionOptions) -> Result<Self> {
        info!("Connecting to peer: {}", addr);

        let stream = timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                warn!("Connection timeout to {}", addr);
                TorrentError::connection_error_full(
                    "Connection timeout",
                    addr.to_string(),
                    format!("no answer within {:?}", options.connect_timeout),
                )
            })?
            .map_err(|e| {
                error!("Failed to connect to {}: {}", addr, e);
                TorrentError::connection_error_full("Failed to connect", addr.to_string(), e.to_string())
            })?;

        debug!("Connected to peer: {}", addr);
        Ok(Self::from_stream(stream, addr.to_string(), info_hash, options))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> PeerConnection<S> {
    /// Wrap an already-open stream
    pub fn from_stream(stream: S, addr: impl Into<String>, info_hash: [u8; 20], options: SessionOptions) -> Self {
        Self {
            addr: addr.into(),
            stream,
            wire: BitTorrentWire,
            options,
            state: SessionState::Handshaking,
            info_hash,
            remote: None,
            bitfield_seen: false,
            remote_extensions: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The peer's id, once the handshake completed
    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote.as_ref().map(|h| h.peer_id)
    }

    /// Whether both sides advertised the extension protocol
    pub fn supports_extensions(&self) -> bool {
        self.options.extensions && self.remote.as_ref().is_some_and(Handshake::supports_extensions)
    }

    /// The peer's extension handshake, once exchanged
    pub fn remote_extensions(&self) -> Option<&ExtensionHandshake> {
        self.remote_extensions.as_ref()
    }

    /// Exchange handshakes and check the echoed info hash
    pub async fn handshake(&mut self, peer_id: [u8; 20]) -> Result<Handshake> {
        let result = self.handshake_inner(peer_id).await;
        self.track(result)
    }

    async fn handshake_inner(&mut self, peer_id: [u8; 20]) -> Result<Handshake> {
        self.state = SessionState::Handshaking;
        let ours = if self.options.extensions {
            Handshake::with_extensions(self.info_hash, peer_id)
        } else {
            Handshake::new(self.info_hash, peer_id)
        };

        debug!("Sending handshake to peer: {}", self.addr);
        with_deadline(
            self.options.io_timeout,
            &self.addr,
            "sending handshake",
            self.wire.write_handshake(&mut self.stream, &ours),
        )
        .await?;

        let theirs = with_deadline(
            self.options.io_timeout,
            &self.addr,
            "reading handshake",
            self.wire.read_handshake(&mut self.stream),
        )
        .await?;
        theirs.validate(&self.info_hash)?;

        self.remote = Some(theirs.clone());
        self.state = if self.supports_extensions() {
            SessionState::ExtensionHandshaking
        } else {
            SessionState::AwaitingBitfield
        };
        info!(
            "Handshake complete with {} (peer id {}, state: {})",
            self.addr,
            hex::encode(theirs.peer_id),
            self.state
        );
        Ok(theirs)
    }

    /// Exchange extension handshakes; returns the peer's
    pub async fn extension_handshake(&mut self) -> Result<ExtensionHandshake> {
        let result = self.extension_handshake_inner().await;
        self.track(result)
    }

    async fn extension_handshake_inner(&mut self) -> Result<ExtensionHandshake> {
        if !self.supports_extensions() {
            return Err(TorrentError::protocol_error_with_source(
                "Peer does not support the extension protocol",
                self.addr.clone(),
            ));
        }
        self.state = SessionState::ExtensionHandshaking;

        while !self.bitfield_seen {
            match self.recv().await? {
                Message::Bitfield { .. } => self.bitfield_seen = true,
                Message::Extended { ext_id: EXTENSION_HANDSHAKE_ID, payload } => {
                    // some peers send theirs before the bitfield
                    self.remote_extensions = Some(ExtensionHandshake::decode(&payload)?);
                }
                other => trace!("Ignoring {:?} while waiting for bitfield", other.id()),
            }
        }

        debug!("Sending extension handshake to {}", self.addr);
        self.send(&Message::Extended {
            ext_id: EXTENSION_HANDSHAKE_ID,
            payload: ExtensionHandshake::local().encode(),
        })
        .await?;

        let remote = loop {
            if let Some(remote) = self.remote_extensions.clone() {
                break remote;
            }
            match self.recv().await? {
                Message::Extended { ext_id: EXTENSION_HANDSHAKE_ID, payload } => {
                    self.remote_extensions = Some(ExtensionHandshake::decode(&payload)?);
                }
                other => trace!("Ignoring {:?} while waiting for extension handshake", other.id()),
            }
        };

        self.state = SessionState::AwaitingBitfield;
        info!(
            "Extension handshake complete with {} (ut_metadata: {:?}, metadata_size: {:?})",
            self.addr, remote.ut_metadata, remote.metadata_size
        );
        Ok(remote)
    }

    /// Request one metadata piece and wait for its data
    pub async fn request_metadata(&mut self, piece: u32) -> Result<MetadataMessage> {
        let result = self.request_metadata_inner(piece).await;
        self.track(result)
    }

    async fn request_metadata_inner(&mut self, piece: u32) -> Result<MetadataMessage> {
        let ut_metadata = self
            .remote_extensions
            .as_ref()
            .and_then(|e| e.ut_metadata)
            .ok_or_else(|| {
                TorrentError::protocol_error_with_source("Peer does not support metadata exchange", self.addr.clone())
            })?;

        debug!("Requesting metadata piece {} from {}", piece, self.addr);
        self.send(&Message::Extended {
            ext_id: ut_metadata,
            payload: MetadataMessage::request(piece).encode(),
        })
        .await?;

        loop {
            let payload = match self.recv().await? {
                Message::Extended { ext_id, payload } if ext_id != EXTENSION_HANDSHAKE_ID => payload,
                other => {
                    trace!("Ignoring {:?} while waiting for metadata", other.id());
                    continue;
                }
            };

            let message = match MetadataMessage::decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring undecodable extended message from {}: {}", self.addr, e);
                    continue;
                }
            };

            match message.msg_type {
                MetadataMessageType::Reject => {
                    return Err(TorrentError::protocol_error_with_source(
                        "Peer rejected metadata request",
                        format!("piece {}", message.piece),
                    ));
                }
                MetadataMessageType::Data if message.piece == piece => return Ok(message),
                _ => trace!("Ignoring metadata message for piece {}", message.piece),
            }
        }
    }

    /// Fetch the whole info dictionary and check it against the info hash
    pub async fn fetch_metadata(&mut self) -> Result<Value> {
        let result = self.fetch_metadata_inner().await;
        self.track(result)
    }

    async fn fetch_metadata_inner(&mut self) -> Result<Value> {
        let advertised = self.remote_extensions.as_ref().and_then(|e| e.metadata_size);
        let pieces = advertised.map(metadata_piece_count).unwrap_or(1).max(1);

        if advertised.is_some_and(|size| size > MAX_METADATA_SIZE) {
            return Err(TorrentError::protocol_error_with_source(
                "Peer advertised an implausible metadata_size",
                self.addr.clone(),
            ));
        }

        let mut metadata = Vec::new();
        for piece in 0..pieces as u32 {
            let message = self.request_metadata_inner(piece).await?;
            if metadata.len() + message.data.len() > MAX_METADATA_SIZE {
                return Err(TorrentError::protocol_error_with_source(
                    "Metadata exceeds size limit",
                    format!("{} bytes", MAX_METADATA_SIZE),
                ));
            }
            metadata.extend_from_slice(&message.data);
        }

        if let Some(size) = advertised {
            if metadata.len() != size {
                return Err(TorrentError::integrity_error(format!(
                    "metadata is {} bytes, peer advertised {}",
                    metadata.len(),
                    size
                )));
            }
        }

        let digest = TorrentInfo::generate_info_hash(&metadata);
        if digest != self.info_hash {
            warn!(
                "Metadata from {} hashes to {}, expected {}",
                self.addr,
                hex::encode(digest),
                hex::encode(self.info_hash)
            );
            return Err(TorrentError::integrity_error("metadata does not match info hash"));
        }

        let info = decode(&metadata)?;
        info!("Received {} bytes of verified metadata from {}", metadata.len(), self.addr);
        Ok(info)
    }

    /// Wait for the bitfield (unless already seen), send interested, wait for unchoke
    pub async fn prepare_download(&mut self) -> Result<()> {
        let result = self.prepare_download_inner().await;
        self.track(result)
    }

    async fn prepare_download_inner(&mut self) -> Result<()> {
        if self.state == SessionState::Transferring {
            return Ok(());
        }

        self.state = SessionState::AwaitingBitfield;
        while !self.bitfield_seen {
            match self.recv().await? {
                Message::Bitfield { bitfield } => {
                    debug!("Bitfield from {} ({} bytes)", self.addr, bitfield.len());
                    self.bitfield_seen = true;
                }
                other => trace!("Ignoring {:?} while waiting for bitfield", other.id()),
            }
        }

        self.state = SessionState::Interested;
        self.send(&Message::Interested).await?;

        self.state = SessionState::AwaitingUnchoke;
        loop {
            match self.recv().await? {
                Message::Unchoke => break,
                other => trace!("Ignoring {:?} while waiting for unchoke", other.id()),
            }
        }

        self.state = SessionState::Transferring;
        debug!("Unchoked by {}", self.addr);
        Ok(())
    }

    /// Pipeline requests for every block of a piece and collect the blocks
    pub async fn download_piece(&mut self, index: u32, piece_len: u32) -> Result<Vec<u8>> {
        let result = self.download_piece_inner(index, piece_len).await;
        self.track(result)
    }

    async fn download_piece_inner(&mut self, index: u32, piece_len: u32) -> Result<Vec<u8>> {
        if !self.state.can_request() {
            return Err(TorrentError::protocol_error_with_source(
                "Cannot request blocks before unchoke",
                format!("session is {}", self.state),
            ));
        }

        let requests = block_requests(index, piece_len, self.options.block_size);
        debug!("Requesting piece {} ({} bytes, {} blocks) from {}", index, piece_len, requests.len(), self.addr);
        for request in &requests {
            self.send(&Message::Request {
                index: request.index,
                begin: request.begin,
                length: request.length,
            })
            .await?;
        }

        let mut buffer = PieceBuffer::new(index, piece_len as usize);
        while !buffer.is_complete() {
            match self.recv().await? {
                Message::Piece { index: got, begin, block } if got == index => {
                    trace!("Block {}+{} ({} bytes) from {}", index, begin, block.len(), self.addr);
                    buffer.insert(begin, block)?;
                }
                Message::Piece { index: got, .. } => {
                    debug!("Ignoring stray block for piece {} while fetching {}", got, index);
                }
                other => trace!("Ignoring {:?} during transfer", other.id()),
            }
        }

        Ok(buffer.assemble())
    }

    /// Run the ordinary flow after the handshake and verify the result
    pub async fn download_verified_piece(&mut self, index: u32, piece_len: u32, expected: &[u8; 20]) -> Result<Vec<u8>> {
        if self.supports_extensions() && self.remote_extensions.is_none() {
            self.extension_handshake().await?;
        }
        self.prepare_download().await?;
        let data = self.download_piece(index, piece_len).await?;
        let verified = verify_digest(index, &data, expected).map(|_| data);
        self.track(verified)
    }

    /// Shut the stream down
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!("Shutdown of {} failed: {}", self.addr, e);
        }
        if !self.state.is_terminal() {
            self.state = SessionState::Done;
        }
        debug!("Closed session with {} ({})", self.addr, self.state);
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        trace!("Sending {:?} to {}", message.id(), self.addr);
        with_deadline(
            self.options.io_timeout,
            &self.addr,
            "sending message",
            self.wire.write_message(&mut self.stream, message),
        )
        .await
    }

    async fn recv(&mut self) -> Result<Message> {
        let message = with_deadline(
            self.options.io_timeout,
            &self.addr,
            "waiting for peer message",
            self.wire.read_message(&mut self.stream),
        )
        .await?;
        trace!("Received {:?} from {}", message.id(), self.addr);
        Ok(message)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if self.state != SessionState::Failed {
                debug!("Session with {} failed while {}: {}", self.addr, self.state, e);
            }
            self.state = SessionState::Failed;
            e.with_peer(self.addr.clone())
        })
    }
}

async fn with_deadline<T>(limit: Duration, peer: &str, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TorrentError::connection_error_full(
            format!("Timed out {}", what),
            peer,
            format!("no progress within {:?}", limit),
        )),
    }
}

/// Connect, handshake, and fetch one verified piece
pub async fn fetch_piece(addr: SocketAddrV4, torrent: &TorrentInfo, index: u32, options: &SessionOptions) -> Result<Vec<u8>> {
    let (piece_len, expected) = match (torrent.piece_len(index as usize), torrent.piece_hash(index as usize)) {
        (Some(len), Some(hash)) => {
            let len = u32::try_from(len)
                .map_err(|_| TorrentError::malformed(format!("piece {} is {} bytes, too large to request", index, len)))?;
            (len, hash)
        }
        _ => {
            return Err(TorrentError::config_error_with_field(
                format!("piece index {} out of range (torrent has {} pieces)", index, torrent.piece_count()),
                "index",
            ))
        }
    };

    let mut session = PeerConnection::connect(addr, torrent.info_hash, options.clone()).await?;
    let result = match session.handshake(Handshake::generate_peer_id()).await {
        Ok(_) => session.download_verified_piece(index, piece_len, &expected).await,
        Err(e) => Err(e),
    };
    session.close().await;
    result
}

/// `fetch_piece` with up to `max_attempts` fresh connections; returns the last error
pub async fn fetch_piece_with_retry(
    addr: SocketAddrV4,
    torrent: &TorrentInfo,
    index: u32,
    options: &SessionOptions,
) -> Result<Vec<u8>> {
    let attempts = options.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match fetch_piece(addr, torrent, index, options).await {
            Ok(data) => return Ok(data),
            Err(e) if e.is_retryable() => {
                warn!("Piece {} from {} failed (attempt {}/{}): {}", index, addr, attempt, attempts, e);
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| TorrentError::connection_error("no attempts made").with_peer(addr.to_string())))
}
