//! Buffered ZBXD codec for byte streams.
//!
//! Same validation as [`crate::frame::read_frame`], but incremental: returns
//! `Ok(None)` until a whole frame is buffered.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{FrameHeader, PREFIX_LEN};
use crate::ProtocolError;

/// Codec yielding frame payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let header_len = FrameHeader::header_len(&src[..PREFIX_LEN])?;
        if src.len() < header_len {
            return Ok(None);
        }

        let header = FrameHeader::parse(&src[..header_len])?;
        let length = header.length as usize;

        let total = header_len + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        Ok(Some(src.split_to(length).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Stream ended inside a frame
        if src.len() >= PREFIX_LEN {
            let header_len = FrameHeader::header_len(&src[..PREFIX_LEN])?;
            if src.len() >= header_len {
                let header = FrameHeader::parse(&src[..header_len])?;
                return Err(ProtocolError::LengthMismatch {
                    declared: header.length,
                    actual: (src.len() - header_len) as u64,
                });
            }
        }
        Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "stream ended inside frame header",
        )))
    }
}

impl<'a> Encoder<&'a [u8]> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = FrameHeader::compact(item.len())?;
        dst.reserve(crate::frame::COMPACT_HEADER_LEN + item.len());
        dst.extend_from_slice(&header.encode());
        dst.extend_from_slice(item);
        Ok(())
    }
}
