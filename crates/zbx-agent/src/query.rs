//! One-shot passive query client: ask an agent for a single item key.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;
use zbx_protocol::{write_frame, FrameCodec, ProtocolError, NOT_SUPPORTED};

use crate::transport::Dialer;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("connection closed without a reply")]
    NoReply,
}

/// Classified reply from an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryReply {
    Value(String),
    NotSupported(String),
}

impl QueryReply {
    pub fn from_payload(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        match text.strip_prefix(NOT_SUPPORTED) {
            Some(rest) if rest.is_empty() => QueryReply::NotSupported(String::new()),
            Some(rest) if rest.starts_with('\0') => QueryReply::NotSupported(rest[1..].to_owned()),
            _ => QueryReply::Value(text.into_owned()),
        }
    }
}

/// Request `key` from the agent behind `dialer`.
pub async fn query(dialer: &Dialer, key: &str) -> Result<QueryReply, QueryError> {
    let mut conn = dialer.dial().await?;
    write_frame(&mut conn, key.as_bytes()).await?;
    tracing::debug!(agent = dialer.addr(), key, "sent passive query");

    let mut codec = FrameCodec;
    let mut buf = BytesMut::with_capacity(1024);
    let payload = loop {
        if let Some(frame) = codec.decode(&mut buf)? {
            break frame;
        }
        if conn.read_buf(&mut buf).await? == 0 {
            match codec.decode_eof(&mut buf)? {
                Some(frame) => break frame,
                None => return Err(QueryError::NoReply),
            }
        }
    };
    let _ = conn.shutdown().await;

    Ok(QueryReply::from_payload(&payload))
}
