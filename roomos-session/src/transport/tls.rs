//! Certificate trust for device connections
//!
//! RoomOS endpoints ship with self-signed certificates, so the system trust
//! store alone rejects most of them. Three policies are supported:
//!
//! - `WebPki`: normal validation against the bundled web PKI roots
//! - `AcceptInvalid`: accept any certificate (lab use)
//! - `Pinned`: accept only the certificate with a given SHA-256 fingerprint
//!   (trust on first use; the fingerprint shows up in the rejection message)

use crate::{Result, SessionError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, Error as TlsError, SignatureScheme};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_tungstenite::Connector;
use tracing::debug;

/// How device certificates are validated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Validate against web PKI roots
    #[default]
    WebPki,
    /// Accept any certificate
    AcceptInvalid,
    /// Accept only this SHA-256 fingerprint (hex, colons optional)
    Pinned(String),
}

impl TrustPolicy {
    /// Build the TLS connector for this policy
    ///
    /// `None` means the WebSocket library's default (web PKI) connector.
    pub fn connector(&self) -> Result<Option<Connector>> {
        let expected = match self {
            TrustPolicy::WebPki => return Ok(None),
            TrustPolicy::AcceptInvalid => None,
            TrustPolicy::Pinned(fingerprint) => {
                let normalized = normalize_fingerprint(fingerprint);
                if normalized.len() != 64 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(SessionError::Configuration(format!(
                        "'{}' is not a SHA-256 fingerprint",
                        fingerprint
                    )));
                }
                Some(normalized)
            }
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = DeviceCertVerifier {
            expected,
            provider: provider.clone(),
        };

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| SessionError::Configuration(format!("TLS setup failed: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

/// SHA-256 fingerprint of a DER certificate, lowercase hex without separators
pub fn certificate_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Strip separators and lowercase a user-supplied fingerprint
///
/// ```rust
/// use roomos_session::transport::tls::normalize_fingerprint;
///
/// assert_eq!(normalize_fingerprint("AB:cd:01"), "abcd01");
/// ```
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !matches!(c, ':' | ' ' | '-'))
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug)]
struct DeviceCertVerifier {
    expected: Option<String>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for DeviceCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, TlsError> {
        let actual = certificate_fingerprint(end_entity.as_ref());
        match &self.expected {
            None => {
                debug!("Accepting device certificate {} without validation", actual);
                Ok(ServerCertVerified::assertion())
            }
            Some(expected) if *expected == actual => Ok(ServerCertVerified::assertion()),
            Some(expected) => Err(TlsError::General(format!(
                "certificate fingerprint {} does not match pinned {}",
                actual, expected
            ))),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
