//! TCP transport with optional TLS -- listener for passive checks, dialer for
//! active checks and queries.
//!
//! The ZBXD protocol runs unchanged over either variant.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// A bidirectional byte stream, plain or encrypted.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

pub type BoxConnection = Box<dyn Connection>;

/// Accepts inbound connections.
pub struct Listener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind a plain TCP listener.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(Self::from_tcp(TcpListener::bind(addr).await?, None))
    }

    /// Bind a TLS listener.
    pub async fn bind_tls(addr: &str, config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        Ok(Self::from_tcp(TcpListener::bind(addr).await?, Some(config)))
    }

    pub fn from_tcp(inner: TcpListener, tls: Option<Arc<rustls::ServerConfig>>) -> Self {
        Self {
            inner,
            tls: tls.map(TlsAcceptor::from),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Accept the next TCP connection. The TLS handshake, if any, is deferred
    /// to [`Incoming::establish`] so it can run off the accept loop.
    pub async fn accept(&self) -> io::Result<Incoming> {
        let (stream, remote) = self.inner.accept().await?;
        Ok(Incoming {
            stream,
            remote,
            tls: self.tls.clone(),
        })
    }
}

/// An accepted TCP connection awaiting its (optional) TLS handshake.
pub struct Incoming {
    stream: TcpStream,
    remote: SocketAddr,
    tls: Option<TlsAcceptor>,
}

impl Incoming {
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub async fn establish(self) -> io::Result<BoxConnection> {
        match self.tls {
            Some(acceptor) => Ok(Box::new(acceptor.accept(self.stream).await?)),
            None => Ok(Box::new(self.stream)),
        }
    }
}

/// Opens a fresh connection to a fixed address on every call.
#[derive(Clone)]
pub enum Dialer {
    Plain {
        addr: String,
    },
    Tls {
        addr: String,
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

impl Dialer {
    pub fn plain(addr: impl Into<String>) -> Self {
        Dialer::Plain { addr: addr.into() }
    }

    /// TLS dialer verifying the server against `server_name`.
    pub fn tls(
        addr: impl Into<String>,
        config: Arc<rustls::ClientConfig>,
        server_name: &str,
    ) -> io::Result<Self> {
        let server_name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(Dialer::Tls {
            addr: addr.into(),
            connector: TlsConnector::from(config),
            server_name,
        })
    }

    pub fn addr(&self) -> &str {
        match self {
            Dialer::Plain { addr } | Dialer::Tls { addr, .. } => addr,
        }
    }

    pub async fn dial(&self) -> io::Result<BoxConnection> {
        match self {
            Dialer::Plain { addr } => Ok(Box::new(TcpStream::connect(addr.as_str()).await?)),
            Dialer::Tls {
                addr,
                connector,
                server_name,
            } => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                let stream = connector.connect(server_name.clone(), stream).await?;
                Ok(Box::new(stream))
            }
        }
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialer::Plain { addr } => f.debug_struct("Plain").field("addr", addr).finish(),
            Dialer::Tls {
                addr, server_name, ..
            } => f
                .debug_struct("Tls")
                .field("addr", addr)
                .field("server_name", server_name)
                .finish_non_exhaustive(),
        }
    }
}
