//! ZBXD frame header and single-frame async read/write.
//!
//! ```text
//! compact: "ZBXD" | flags | len u32 LE | reserved [0; 4] | payload
//! large:   "ZBXD" | flags | len u64 LE | reserved [0; 8] | payload
//! ```
//!
//! Both header forms are accepted on read. Writes always use the compact form.

use std::future::Future;
use std::task::Poll;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    ProtocolError, FLAG_COMPRESSION, FLAG_LARGE_PACKET, FLAG_PROTOCOL, MAGIC, MAX_PAYLOAD_BYTES,
};

/// Magic + flags.
pub const PREFIX_LEN: usize = 5;

/// Header size without the large-packet flag.
pub const COMPACT_HEADER_LEN: usize = PREFIX_LEN + 4 + 4;

/// Header size with the large-packet flag.
pub const LARGE_HEADER_LEN: usize = PREFIX_LEN + 8 + 8;

/// Initial body allocation cap, so a lying length field cannot reserve 128 MiB up front.
const INITIAL_BODY_CAPACITY: u64 = 64 * 1024;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub length: u64,
}

impl FrameHeader {
    /// Header for an outbound payload. Outbound frames are always compact.
    pub fn compact(length: usize) -> Result<Self, ProtocolError> {
        let length = length as u64;
        if length >= MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::PayloadTooLarge {
                size: length,
                max: MAX_PAYLOAD_BYTES,
            });
        }
        Ok(Self {
            flags: FLAG_PROTOCOL,
            length,
        })
    }

    pub fn is_large(&self) -> bool {
        self.flags & FLAG_LARGE_PACKET != 0
    }

    /// Validate magic and flags, returning the full header length they imply.
    pub fn header_len(prefix: &[u8]) -> Result<usize, ProtocolError> {
        if prefix.len() < PREFIX_LEN {
            return Err(ProtocolError::ShortHeader {
                needed: PREFIX_LEN,
                got: prefix.len(),
            });
        }

        let mut got = [0u8; 4];
        got.copy_from_slice(&prefix[..4]);
        if got != MAGIC {
            return Err(ProtocolError::InvalidMagic { got });
        }

        let flags = prefix[4];
        if flags & FLAG_PROTOCOL == 0 {
            return Err(ProtocolError::MissingProtocolFlag { flags });
        }
        if flags & FLAG_COMPRESSION != 0 {
            return Err(ProtocolError::CompressionUnsupported);
        }

        if flags & FLAG_LARGE_PACKET != 0 {
            Ok(LARGE_HEADER_LEN)
        } else {
            Ok(COMPACT_HEADER_LEN)
        }
    }

    /// Parse a complete header. Bytes past the header are ignored.
    pub fn parse(header: &[u8]) -> Result<Self, ProtocolError> {
        let expected = Self::header_len(header)?;
        if header.len() < expected {
            return Err(ProtocolError::ShortHeader {
                needed: expected,
                got: header.len(),
            });
        }

        let flags = header[4];
        let (length, reserved) = if expected == LARGE_HEADER_LEN {
            let mut len = [0u8; 8];
            len.copy_from_slice(&header[5..13]);
            (u64::from_le_bytes(len), &header[13..21])
        } else {
            let mut len = [0u8; 4];
            len.copy_from_slice(&header[5..9]);
            (u64::from(u32::from_le_bytes(len)), &header[9..13])
        };

        if reserved.iter().any(|b| *b != 0) {
            return Err(ProtocolError::NonZeroReserved {
                reserved: reserved.to_vec(),
            });
        }

        if length >= MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::PayloadTooLarge {
                size: length,
                max: MAX_PAYLOAD_BYTES,
            });
        }

        Ok(Self { flags, length })
    }

    /// Compact wire form. Large headers are never emitted.
    pub fn encode(&self) -> [u8; COMPACT_HEADER_LEN] {
        let mut out = [0u8; COMPACT_HEADER_LEN];
        out[..4].copy_from_slice(&MAGIC);
        out[4] = FLAG_PROTOCOL;
        // length < MAX_PAYLOAD_BYTES, always fits in u32
        out[5..9].copy_from_slice(&(self.length as u32).to_le_bytes());
        out
    }
}

/// Frame `payload` into one contiguous buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let header = FrameHeader::compact(payload.len())?;
    let mut out = Vec::with_capacity(COMPACT_HEADER_LEN + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Read exactly one frame and return its payload.
///
/// The body is not retried: after one read that waits for data, only bytes
/// already available are taken. A body shorter than `length` at that point
/// is a [`ProtocolError::LengthMismatch`], whether or not the peer closed.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; LARGE_HEADER_LEN];
    reader.read_exact(&mut header[..PREFIX_LEN]).await?;
    let header_len = FrameHeader::header_len(&header[..PREFIX_LEN])?;
    reader.read_exact(&mut header[PREFIX_LEN..header_len]).await?;
    let header = FrameHeader::parse(&header[..header_len])?;

    tracing::trace!(
        length = header.length,
        large = header.is_large(),
        "frame header"
    );

    let mut payload = Vec::with_capacity(header.length.min(INITIAL_BODY_CAPACITY) as usize);
    let mut body = (&mut *reader).take(header.length);
    if header.length > 0 && body.read_buf(&mut payload).await? > 0 {
        while (payload.len() as u64) < header.length {
            let mut read = std::pin::pin!(body.read_buf(&mut payload));
            match std::future::poll_fn(|cx| Poll::Ready(read.as_mut().poll(cx))).await {
                Poll::Ready(Ok(0)) | Poll::Pending => break,
                Poll::Ready(Ok(_)) => {}
                Poll::Ready(Err(e)) => return Err(e.into()),
            }
        }
    }

    let actual = payload.len() as u64;
    if actual != header.length {
        return Err(ProtocolError::LengthMismatch {
            declared: header.length,
            actual,
        });
    }

    Ok(payload)
}

/// Write `payload` as one compact frame in a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
