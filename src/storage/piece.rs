//! Piece storage module
//!
//! Block planning for a piece and the per-offset buffer blocks are
//! collected into before verification.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{Result, TorrentError};

/// Default block size for requests (16 KiB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// One block request within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

/// Split a piece into block requests; the final block may be shorter
pub fn block_requests(index: u32, piece_len: u32, block_size: u32) -> Vec<BlockRequest> {
    if block_size == 0 {
        return Vec::new();
    }
    (0..piece_len)
        .step_by(block_size as usize)
        .map(|begin| BlockRequest {
            index,
            begin,
            length: block_size.min(piece_len - begin),
        })
        .collect()
}

/// Blocks received for one piece, keyed by offset
#[derive(Debug, Clone)]
pub struct PieceBuffer {
    index: u32,
    expected_len: usize,
    blocks: BTreeMap<u32, Vec<u8>>,
    received: usize,
}

impl PieceBuffer {
    pub fn new(index: u32, expected_len: usize) -> Self {
        Self {
            index,
            expected_len,
            blocks: BTreeMap::new(),
            received: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Store a block. A repeated offset replaces the earlier block.
    pub fn insert(&mut self, begin: u32, data: Vec<u8>) -> Result<()> {
        let end = begin as usize + data.len();
        if end > self.expected_len {
            return Err(TorrentError::protocol_error_with_source(
                "Block extends past end of piece",
                format!("piece {} block {}..{} of {}", self.index, begin, end, self.expected_len),
            ));
        }

        let len = data.len();
        if let Some(previous) = self.blocks.insert(begin, data) {
            self.received -= previous.len();
            trace!("Piece {}: replaced duplicate block at {}", self.index, begin);
        }
        self.received += len;
        Ok(())
    }

    /// Total bytes held
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.expected_len
    }

    /// Concatenate the blocks in ascending offset order
    pub fn assemble(self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.received);
        for block in self.blocks.into_values() {
            data.extend_from_slice(&block);
        }
        data
    }
}
