//! Self-signed server certificate generation.
//!
//! The server creates its TLS identity once at startup and passes the
//! resulting [`ServerCredential`] into the TLS configuration.  Nothing is
//! written to disk; a restart produces a new certificate.

use hms_core::transport::ServerCredential;
use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};
use tracing::info;

/// Validity period of a generated certificate (about 100 years).
const VALIDITY_DAYS: i64 = 36_500;

const COMMON_NAME: &str = "hms-server";

/// Generates a self-signed certificate for `hosts` and its private key.
///
/// # Errors
///
/// Returns [`rcgen::Error`] if key generation or signing fails.
pub fn generate_self_signed(hosts: &[String]) -> Result<ServerCredential, rcgen::Error> {
    let mut params = CertificateParams::new(hosts.to_vec())?;
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);
    params.distinguished_name.push(DnType::CommonName, COMMON_NAME);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    info!(hosts = ?hosts, "generated self-signed server certificate");

    Ok(ServerCredential::new(
        vec![cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    ))
}

/// Host names placed in the certificate when none are configured.
pub fn default_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_credential_builds_server_config() {
        // Arrange
        let credential = generate_self_signed(&default_hosts()).expect("generate");

        // Act
        let config = hms_core::transport::server_tls_config(&credential);

        // Assert
        assert_eq!(credential.cert_chain.len(), 1);
        assert!(config.is_ok());
    }

    #[test]
    fn test_each_call_produces_a_new_certificate() {
        let a = generate_self_signed(&default_hosts()).expect("a");
        let b = generate_self_signed(&default_hosts()).expect("b");

        assert_ne!(a.cert_chain[0], b.cert_chain[0]);
    }
}
