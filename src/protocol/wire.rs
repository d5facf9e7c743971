//! Wire protocol utilities
//!
//! Framing for the BitTorrent wire protocol over any async byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use super::{Handshake, Message, HANDSHAKE_LEN};
use crate::error::{Result, TorrentError};

/// Largest frame body a peer may send
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// WireProtocol trait for protocol utilities
#[allow(async_fn_in_trait)]
pub trait WireProtocol {
    /// Read a complete message from the stream
    async fn read_message<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Message>;

    /// Write a message to the stream
    async fn write_message<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()>;

    /// Read a handshake from the stream
    async fn read_handshake<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Handshake>;

    /// Write a handshake to the stream
    async fn write_handshake<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()>;
}

/// Default implementation of WireProtocol
#[derive(Debug, Default, Clone, Copy)]
pub struct BitTorrentWire;

impl WireProtocol for BitTorrentWire {
    async fn read_message<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Message> {
        let mut length_buf = [0u8; 4];
        reader.read_exact(&mut length_buf).await?;
        let length = u32::from_be_bytes(length_buf) as usize;

        if length == 0 {
            trace!("Received KeepAlive");
            return Ok(Message::KeepAlive);
        }
        check_frame_len(length)?;

        let mut frame = vec![0u8; length];
        reader.read_exact(&mut frame).await?;
        Message::from_frame(&frame)
    }

    async fn write_message<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, message: &Message) -> Result<()> {
        writer.write_all(&message.serialize()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_handshake<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Handshake> {
        let mut buf = [0u8; HANDSHAKE_LEN];
        reader.read_exact(&mut buf).await?;
        Handshake::deserialize(&buf)
    }

    async fn write_handshake<W: AsyncWrite + Unpin>(&mut self, writer: &mut W, handshake: &Handshake) -> Result<()> {
        writer.write_all(&handshake.serialize()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn check_frame_len(length: usize) -> Result<()> {
    if length > MAX_FRAME_LEN {
        return Err(TorrentError::protocol_error_with_source(
            "Frame too large",
            format!("{} bytes exceeds limit of {}", length, MAX_FRAME_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let mut wire = BitTorrentWire;

        let handshake = Handshake::with_extensions([7u8; 20], [8u8; 20]);
        wire.write_handshake(&mut client, &handshake).await.unwrap();
        wire.write_message(&mut client, &Message::Have { piece_index: 3 }).await.unwrap();
        wire.write_message(&mut client, &Message::KeepAlive).await.unwrap();

        assert_eq!(wire.read_handshake(&mut server).await.unwrap(), handshake);
        assert_eq!(wire.read_message(&mut server).await.unwrap(), Message::Have { piece_index: 3 });
        assert_eq!(wire.read_message(&mut server).await.unwrap(), Message::KeepAlive);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes()).await.unwrap();

        let err = BitTorrentWire.read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, TorrentError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_eof_is_connection_error() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let err = BitTorrentWire.read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, TorrentError::ConnectionError { .. }));
    }
}
