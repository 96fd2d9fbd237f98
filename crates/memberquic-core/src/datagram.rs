//! Packet delivery: QUIC datagram first, framed unidirectional stream as
//! fallback.
//!
//! Most gossip packets are small and loss tolerant, so they go out as
//! datagrams. Packets the peer cannot take as a datagram (datagrams
//! unsupported, or payload above the negotiated maximum) are written as one
//! length-prefixed frame on a fresh unidirectional stream.

use std::time::Instant;

use bytes::Bytes;
use memberquic_proto::codec::{self, FRAME_HEADER_LEN};
use quinn::{Connection, RecvStream, SendDatagramError};
use tracing::trace;

use crate::error::{Result, TransportError};

/// Send `payload` to the peer of `conn`.
///
/// Falls back to [`send_framed`] exactly once when the datagram path cannot
/// carry the payload. Other datagram errors mean the connection is broken and
/// are returned unchanged.
pub async fn send_packet(conn: &Connection, payload: &[u8]) -> Result<Instant> {
    let now = Instant::now();

    if conn.max_datagram_size().is_none() {
        send_framed(conn, payload).await?;
        return Ok(now);
    }

    match conn.send_datagram(Bytes::copy_from_slice(payload)) {
        Ok(()) => {}
        Err(SendDatagramError::TooLarge) => {
            trace!(len = payload.len(), "datagram too large, sending framed");
            send_framed(conn, payload).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(now)
}

/// Write `payload` as one `[u32 BE length][payload]` frame on a new
/// unidirectional stream, then finish the stream.
///
/// Payloads above [`codec::MAX_FRAME_SIZE`] are refused before a stream is
/// opened, since the receiver would drop them anyway.
pub async fn send_framed(conn: &Connection, payload: &[u8]) -> Result<()> {
    let frame = codec::encode_frame(payload)?;

    let mut stream = conn.open_uni().await?;
    stream.write_all(&frame).await?;
    stream
        .finish()
        .map_err(|e| TransportError::StreamIo(format!("finish: {e}")))?;
    Ok(())
}

/// Read one frame from a unidirectional stream.
///
/// The header is read in full before anything else; a declared length above
/// the ceiling fails without reading the payload.
pub async fn read_framed(recv: &mut RecvStream) -> Result<Bytes> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    recv.read_exact(&mut header)
        .await
        .map_err(|e| TransportError::StreamIo(format!("read frame header: {e}")))?;

    let len = codec::decode_frame_header(header)?;

    let mut buf = vec![0u8; len];
    recv.read_exact(&mut buf)
        .await
        .map_err(|e| TransportError::StreamIo(format!("read frame payload: {e}")))?;
    Ok(Bytes::from(buf))
}
