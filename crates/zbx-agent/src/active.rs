//! Active checks -- the agent registers with the server, learns which items
//! it is expected to send, then pushes batches of values.
//!
//! Every exchange (registration and each push) uses its own connection:
//! dial, write one frame, read one frame, close.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use zbx_protocol::{
    read_frame, write_frame, ActiveChecksRequest, ActiveChecksResponse, AgentDataRequest,
    AgentDataResponse, AgentDataValue, ProtocolError, SupportedItem, RESPONSE_SUCCESS,
};

use crate::transport::Dialer;

/// Failure text used when the server rejects a push without saying why.
pub const UNRECOGNIZED_REPLY: &str = "unrecognized reply from server";

#[derive(Debug, thiserror::Error)]
pub enum ActiveError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("malformed reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsuccessful response to active checks query: {response}")]
    Registration { response: String },
    #[error("send error: {0}")]
    Send(String),
}

/// A registered active-check session.
///
/// Sequence numbers are tracked per item id and handed out under a lock, so a
/// session may be shared between tasks (e.g. behind an `Arc`).
#[derive(Debug)]
pub struct ActiveSession {
    dialer: Dialer,
    session_id: String,
    hostname: String,
    sequences: Mutex<HashMap<u64, u64>>,
}

impl ActiveSession {
    /// Register `hostname` with the server reachable through `dialer`.
    ///
    /// Returns the session and the items the server expects to receive.
    pub async fn start(
        hostname: impl Into<String>,
        dialer: Dialer,
    ) -> Result<(Self, Vec<SupportedItem>), ActiveError> {
        let hostname = hostname.into();
        let body = serde_json::to_vec(&ActiveChecksRequest::new(hostname.as_str()))?;

        let reply = exchange(&dialer, &body).await?;
        let reply: ActiveChecksResponse = serde_json::from_slice(&reply)?;

        if reply.response != RESPONSE_SUCCESS {
            tracing::warn!(
                host = %hostname,
                server = dialer.addr(),
                response = %reply.response,
                "active checks registration refused"
            );
            return Err(ActiveError::Registration {
                response: reply.response,
            });
        }

        let sequences = reply.data.iter().map(|item| (item.item_id, 0)).collect();
        let session = Self {
            dialer,
            session_id: new_session_id(),
            hostname,
            sequences: Mutex::new(sequences),
        };

        tracing::info!(
            host = %session.hostname,
            server = session.dialer.addr(),
            session = %session.session_id,
            items = reply.data.len(),
            "active checks registered"
        );

        Ok((session, reply.data))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Sequence number the next push of `item_id` will carry.
    pub async fn next_sequence(&self, item_id: u64) -> Option<u64> {
        self.sequences.lock().await.get(&item_id).copied()
    }

    /// Push one batch of `item id -> value` over a new connection.
    ///
    /// Sequence numbers are consumed in iteration order even if the push
    /// fails, so they are never reused within the session.
    pub async fn push<I, V>(&self, values: I) -> Result<(), ActiveError>
    where
        I: IntoIterator<Item = (u64, V)>,
        V: Display,
    {
        let mut conn = self.dialer.dial().await?;

        let data = {
            let mut sequences = self.sequences.lock().await;
            values
                .into_iter()
                .map(|(item_id, value)| {
                    let next = sequences.entry(item_id).or_insert(0);
                    let id = *next;
                    *next += 1;
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default();
                    AgentDataValue {
                        id,
                        item_id,
                        value: value.to_string(),
                        clock: now.as_secs() as i64,
                        ns: i64::from(now.subsec_nanos()),
                    }
                })
                .collect::<Vec<_>>()
        };

        let count = data.len();
        let request = AgentDataRequest::new(self.session_id.as_str(), self.hostname.as_str(), data);
        let body = serde_json::to_vec(&request)?;

        write_frame(&mut conn, &body).await?;
        let reply = read_frame(&mut conn).await?;
        let _ = conn.shutdown().await;

        let reply: AgentDataResponse = serde_json::from_slice(&reply)?;
        if reply.response == RESPONSE_SUCCESS {
            tracing::debug!(session = %self.session_id, values = count, info = %reply.info, "agent data accepted");
            return Ok(());
        }

        let failure = if reply.info.is_empty() {
            UNRECOGNIZED_REPLY.to_owned()
        } else {
            reply.info
        };
        tracing::warn!(session = %self.session_id, error = %failure, "agent data rejected");
        Err(ActiveError::Send(failure))
    }
}

/// Dial, send `body` as one frame, and return the payload of the reply frame.
async fn exchange(dialer: &Dialer, body: &[u8]) -> Result<Vec<u8>, ActiveError> {
    let mut conn = dialer.dial().await?;
    write_frame(&mut conn, body).await?;
    let reply = read_frame(&mut conn).await?;
    let _ = conn.shutdown().await;
    Ok(reply)
}

/// 16 random bytes, lowercase hex.
fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Register over plain TCP.
pub async fn start_active(
    hostname: &str,
    server_address: &str,
) -> Result<(ActiveSession, Vec<SupportedItem>), ActiveError> {
    ActiveSession::start(hostname, Dialer::plain(server_address)).await
}

/// Register over TLS, presenting the identity configured in `config`.
pub async fn start_active_tls(
    hostname: &str,
    server_address: &str,
    config: Arc<rustls::ClientConfig>,
    server_name: &str,
) -> Result<(ActiveSession, Vec<SupportedItem>), ActiveError> {
    let dialer = Dialer::tls(server_address, config, server_name)?;
    ActiveSession::start(hostname, dialer).await
}
