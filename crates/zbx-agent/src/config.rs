//! Configuration types for zbx-agent.
//! Parsed from a TOML file (default `zbx-agent.toml`).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::transport::{Dialer, Listener};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub passive: PassiveSection,
    #[serde(default)]
    pub active: ActiveSection,
    pub tls: Option<TlsSection>,
    #[serde(default)]
    pub log: LogSection,
    /// Static `key = "value"` items answered by the built-in source.
    #[serde(default)]
    pub items: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassiveSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for PassiveSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSection {
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,
}

impl Default for ActiveSection {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            push_interval_secs: default_push_interval(),
        }
    }
}

/// Certificate material. Paths point at PEM files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSection {
    /// CA bundle used to verify the remote side.
    pub ca_cert: String,
    /// Our certificate chain (required for `serve`, optional for dialing).
    pub cert: Option<String>,
    pub key: Option<String>,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Passive listener demands a client certificate signed by `ca_cert`.
    #[serde(default)]
    pub require_client_cert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub format: LogFormat,
}

// Default value functions
fn default_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "zbx-agent".into())
}
fn default_listen_addr() -> String {
    "0.0.0.0:10050".into()
}
fn default_server_addr() -> String {
    "127.0.0.1:10051".into()
}
fn default_push_interval() -> u64 {
    60
}
fn default_server_name() -> String {
    "localhost".into()
}

fn read_pem(path: &str) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {path}"))
}

impl TlsSection {
    pub fn server_config(&self) -> anyhow::Result<Arc<rustls::ServerConfig>> {
        let (cert, key) = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => (read_pem(cert)?, read_pem(key)?),
            _ => anyhow::bail!("tls.cert and tls.key are required to serve over TLS"),
        };
        let client_ca = if self.require_client_cert {
            Some(read_pem(&self.ca_cert)?)
        } else {
            None
        };
        Ok(zbx_protocol::tls::build_server_config(
            &cert,
            &key,
            client_ca.as_deref(),
        )?)
    }

    pub fn client_config(&self) -> anyhow::Result<Arc<rustls::ClientConfig>> {
        let ca = read_pem(&self.ca_cert)?;
        let identity = match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
            (None, None) => None,
            _ => anyhow::bail!("tls.cert and tls.key must be set together"),
        };
        let identity = identity
            .as_ref()
            .map(|(cert, key)| (cert.as_slice(), key.as_slice()));
        Ok(zbx_protocol::tls::build_client_config(&ca, identity)?)
    }
}

impl AgentConfig {
    /// Load config from file, or use defaults if missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AgentConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Passive listener, TLS when `[tls]` is configured.
    pub async fn listener(&self) -> anyhow::Result<Listener> {
        let addr = self.passive.listen_addr.as_str();
        let listener = match &self.tls {
            Some(tls) => Listener::bind_tls(addr, tls.server_config()?).await,
            None => Listener::bind(addr).await,
        };
        listener.with_context(|| format!("binding {addr}"))
    }

    /// Dialer for `addr`, TLS when `[tls]` is configured.
    pub fn dialer(&self, addr: &str) -> anyhow::Result<Dialer> {
        match &self.tls {
            Some(tls) => Ok(Dialer::tls(addr, tls.client_config()?, &tls.server_name)?),
            None => Ok(Dialer::plain(addr)),
        }
    }
}
