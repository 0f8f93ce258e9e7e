//! TLS configuration for certificate-authenticated connections.
//!
//! PEM material in, rustls configs out. The protocol bytes are identical over
//! plain TCP and TLS; this module only builds the session configs.

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("certificate error: {0}")]
    Certificate(String),
    #[error("private key error: {0}")]
    PrivateKey(String),
    #[error("tls config error: {0}")]
    Config(#[from] rustls::Error),
    #[error("client verifier error: {0}")]
    Verifier(String),
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
}

/// PEM-encoded certificate and private key.
#[derive(Debug, Clone)]
pub struct GeneratedCert {
    pub cert_pem: String,
    pub key_pem: String,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Parse every certificate in a PEM bundle.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("failed to parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(TlsError::Certificate("no certificates found".into()));
    }
    Ok(certs)
}

/// Parse the first private key in a PEM document.
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_slice(pem)
        .map_err(|e| TlsError::PrivateKey(format!("failed to parse private key: {e}")))
}

fn root_store(ca_pem: &[u8]) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| TlsError::Certificate(format!("failed to add CA certificate: {e}")))?;
    }
    Ok(roots)
}

/// Build the listener-side config.
///
/// With `client_ca_pem`, peers must present a certificate chaining to it.
pub fn build_server_config(
    cert_pem: &[u8],
    key_pem: &[u8],
    client_ca_pem: Option<&[u8]>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = parse_certificates(cert_pem)?;
    let key = parse_private_key(key_pem)?;
    let builder =
        ServerConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;

    let config = match client_ca_pem {
        Some(ca) => {
            let verifier = rustls::server::WebPkiClientVerifier::builder_with_provider(
                Arc::new(root_store(ca)?),
                provider(),
            )
            .build()
            .map_err(|e| TlsError::Verifier(e.to_string()))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)?
        }
        None => builder.with_no_client_auth().with_single_cert(certs, key)?,
    };

    Ok(Arc::new(config))
}

/// Build the dialer-side config.
///
/// The server must chain to `ca_pem`. `client_identity` is the
/// (certificate, key) PEM pair presented to servers requiring client auth.
pub fn build_client_config(
    ca_pem: &[u8],
    client_identity: Option<(&[u8], &[u8])>,
) -> Result<Arc<ClientConfig>, TlsError> {
    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store(ca_pem)?);

    let config = match client_identity {
        Some((cert_pem, key_pem)) => {
            let certs = parse_certificates(cert_pem)?;
            let key = parse_private_key(key_pem)?;
            builder.with_client_auth_cert(certs, key)?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

/// Generate a self-signed certificate valid for `names`.
pub fn generate_self_signed(names: Vec<String>) -> Result<GeneratedCert, TlsError> {
    let key_pair = rcgen::KeyPair::generate()?;
    let mut params = rcgen::CertificateParams::new(names)?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "zbx-agent");
    let cert = params.self_signed(&key_pair)?;

    tracing::debug!("generated self-signed certificate");

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}
