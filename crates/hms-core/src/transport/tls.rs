//! TLS configuration for both ends of the link.
//!
//! The server presents a certificate from a [`ServerCredential`].  The client
//! encrypts but does **not** authenticate the server: any certificate is
//! accepted, while handshake signatures are still checked against the
//! presented key.  TLS 1.2 and 1.3 are both enabled.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ServerConfig, SignatureScheme};
use thiserror::Error;

pub use tokio_rustls::{TlsAcceptor, TlsConnector};

static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),

    #[error("invalid server name: {name}")]
    InvalidServerName { name: String },

    #[error("certificate error: {0}")]
    Certificate(String),
}

/// Certificate chain and private key presented by the server.
pub struct ServerCredential {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl ServerCredential {
    pub fn new(cert_chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { cert_chain, key }
    }
}

impl Clone for ServerCredential {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl std::fmt::Debug for ServerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCredential")
            .field("certificates", &self.cert_chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Builds the server-side rustls configuration.
///
/// # Errors
///
/// Returns [`TlsError::Config`] if the key does not match the certificate or
/// is in an unsupported format.
pub fn server_tls_config(credential: &ServerCredential) -> Result<Arc<ServerConfig>, TlsError> {
    if credential.cert_chain.is_empty() {
        return Err(TlsError::Certificate("empty certificate chain".into()));
    }
    let config = ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .with_no_client_auth()
        .with_single_cert(credential.cert_chain.clone(), credential.key.clone_key())?;
    Ok(Arc::new(config))
}

/// Builds a client configuration that accepts any server certificate.
///
/// # Errors
///
/// Returns [`TlsError::Config`] if the protocol versions are rejected by the
/// crypto provider.
pub fn client_tls_config() -> Result<Arc<ClientConfig>, TlsError> {
    let provider = provider();
    let verifier = Arc::new(AcceptAnyServerCert {
        algorithms: provider.signature_verification_algorithms,
    });
    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Converts a host string (DNS name or IP literal) into a TLS server name.
///
/// # Errors
///
/// Returns [`TlsError::InvalidServerName`] if `host` is neither.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_owned()).map_err(|_| TlsError::InvalidServerName {
        name: host.to_owned(),
    })
}

/// Skips certificate validation but still verifies handshake signatures.
#[derive(Debug)]
pub struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_accepts_dns_and_ip() {
        assert!(server_name("localhost").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        let result = server_name("not a host!");

        assert!(matches!(result, Err(TlsError::InvalidServerName { .. })));
    }

    #[test]
    fn test_client_config_builds() {
        assert!(client_tls_config().is_ok());
    }

    #[test]
    fn test_server_config_rejects_empty_chain() {
        let credential = ServerCredential::new(
            Vec::new(),
            PrivateKeyDer::Pkcs8(Vec::<u8>::new().into()),
        );

        let result = server_tls_config(&credential);

        assert!(matches!(result, Err(TlsError::Certificate(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let credential = ServerCredential::new(
            vec![CertificateDer::from(vec![1u8, 2, 3])],
            PrivateKeyDer::Pkcs8(vec![9u8; 8].into()),
        );

        let text = format!("{credential:?}");

        assert!(text.contains("<redacted>"));
        assert!(!text.contains('9'));
    }
}
