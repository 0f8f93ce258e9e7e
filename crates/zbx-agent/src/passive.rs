//! Passive checks -- the server connects, sends one item key, and reads one
//! reply before the agent closes the connection.
//!
//! Malformed requests get no reply at all: the connection is simply closed.
//! Every well-formed request gets exactly one reply frame, either the item
//! value or `ZBX_NOTSUPPORTED\0<reason>`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use zbx_protocol::{read_frame, write_frame, NOT_SUPPORTED};

use crate::item::{ItemSource, ItemValue};
use crate::transport::Listener;

/// Reason sent for keys the source does not know.
pub const UNKNOWN_KEY_REASON: &str = "Item key unknown";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

/// Outcome of resolving one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Value(ItemValue),
    Unknown,
    Error(String),
}

impl Resolution {
    /// Reply payload for this outcome.
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Resolution::Value(value) => value.to_string().into_bytes(),
            Resolution::Unknown => not_supported(UNKNOWN_KEY_REASON),
            Resolution::Error(reason) => not_supported(&reason),
        }
    }
}

fn not_supported(reason: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(NOT_SUPPORTED.len() + 1 + reason.len());
    out.extend_from_slice(NOT_SUPPORTED.as_bytes());
    out.push(0);
    out.extend_from_slice(reason.as_bytes());
    out
}

/// Resolve `key` on the blocking pool. A panic inside the source is contained
/// there and reported as [`Resolution::Unknown`].
pub async fn resolve_guarded(source: &Arc<dyn ItemSource>, key: &str) -> Resolution {
    let task_source = Arc::clone(source);
    let task_key = key.to_owned();
    let outcome = tokio::task::spawn_blocking(move || task_source.resolve(&task_key)).await;

    match outcome {
        Ok(Ok(Some(value))) => {
            tracing::debug!(key, value = %value, "resolved key");
            Resolution::Value(value)
        }
        Ok(Ok(None)) => {
            tracing::warn!(key, "no value for key");
            Resolution::Unknown
        }
        Ok(Err(e)) => {
            tracing::error!(key, error = %e, "error resolving key");
            Resolution::Error(e.to_string())
        }
        Err(e) => {
            tracing::error!(key, error = %e, "item source failed, treating key as unknown");
            Resolution::Unknown
        }
    }
}

/// Read one request from `stream` and produce its reply payload, or `None`
/// when the request frame is invalid.
pub async fn process_request<S>(
    source: &Arc<dyn ItemSource>,
    stream: &mut S,
    remote: SocketAddr,
) -> Option<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let payload = match read_frame(stream).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(%remote, error = %e, "rejected request frame");
            return None;
        }
    };

    let key = String::from_utf8_lossy(&payload);
    tracing::debug!(%remote, key = %key, "server requested key");

    Some(resolve_guarded(source, &key).await.into_payload())
}

/// Serve a single passive-check connection, then close it.
pub async fn handle_connection<S>(source: Arc<dyn ItemSource>, mut stream: S, remote: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tracing::debug!(%remote, "new connection");

    if let Some(reply) = process_request(&source, &mut stream, remote).await {
        if let Err(e) = write_frame(&mut stream, &reply).await {
            tracing::error!(%remote, error = %e, "error writing reply");
        }
    }

    if let Err(e) = stream.shutdown().await {
        tracing::debug!(%remote, error = %e, "error closing connection");
    }
    tracing::debug!(%remote, "closing connection");
}

/// Run the accept loop until `shutdown` resolves or accepting fails.
///
/// Each connection, including its TLS handshake, runs in its own task.
pub async fn serve<F>(
    listener: Listener,
    source: Arc<dyn ItemSource>,
    shutdown: F,
) -> Result<(), AgentError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, tls = listener.is_tls(), "passive agent listening");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let incoming = accepted.map_err(AgentError::Accept)?;
                let source = source.clone();
                tokio::spawn(async move {
                    let remote = incoming.remote_addr();
                    match incoming.establish().await {
                        Ok(conn) => handle_connection(source, conn, remote).await,
                        Err(e) => tracing::warn!(%remote, error = %e, "failed to establish connection"),
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal, stopping accept loop");
                return Ok(());
            }
        }
    }
}

/// Listen on `address` over plain TCP and answer passive checks forever.
/// Only returns on error.
pub async fn start<S: ItemSource>(source: S, address: &str) -> Result<(), AgentError> {
    let listener = Listener::bind(address)
        .await
        .map_err(|source| AgentError::Bind {
            addr: address.to_owned(),
            source,
        })?;
    serve(listener, Arc::new(source), std::future::pending()).await
}

/// Like [`start`], over TLS.
pub async fn start_tls<S: ItemSource>(
    source: S,
    address: &str,
    config: Arc<rustls::ServerConfig>,
) -> Result<(), AgentError> {
    let listener = Listener::bind_tls(address, config)
        .await
        .map_err(|source| AgentError::Bind {
            addr: address.to_owned(),
            source,
        })?;
    serve(listener, Arc::new(source), std::future::pending()).await
}
